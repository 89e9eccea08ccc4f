//! OAuth 2.0 Refresh Grant
//!
//! Exchanges a stored refresh token for a new access token (RFC 6749
//! section 6). The authorization-code handshake that produces the first
//! token pair lives outside this crate.
//!
//! # Security
//!
//! - Never logs token values or the client secret
//! - Ignores any refresh token the provider returns; the stored one is kept
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthRefreshClient, RemoteAuthClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> core_auth::Result<()> {
//! # use bridge_traits::http::HttpClient;
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let client = OAuthRefreshClient::new(http_client, "https://oauth2.googleapis.com/token");
//! let refreshed = client.refresh("1//0g...", "client-id", "client-secret").await?;
//! println!("new token lives {}s", refreshed.expires_in_secs);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{AuthError, Result};
use crate::types::RefreshedAccessToken;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Remote identity provider that can mint access tokens.
///
/// Implementations make exactly one attempt per call.
#[async_trait]
pub trait RemoteAuthClient: Send + Sync {
    async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<RefreshedAccessToken>;
}

/// [`RemoteAuthClient`] that POSTs a form-encoded refresh grant through the
/// host's [`HttpClient`].
pub struct OAuthRefreshClient {
    http_client: Arc<dyn HttpClient>,
    token_endpoint: String,
}

impl OAuthRefreshClient {
    pub fn new(http_client: Arc<dyn HttpClient>, token_endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            token_endpoint: token_endpoint.into(),
        }
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    fn encode_grant(refresh_token: &str, client_id: &str, client_secret: &str) -> Result<Bytes> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        serde_urlencoded::to_string(&params[..])
            .map(Bytes::from)
            .map_err(|e| AuthError::RefreshFailed(format!("Failed to encode token request: {}", e)))
    }
}

#[async_trait]
impl RemoteAuthClient for OAuthRefreshClient {
    #[instrument(skip_all, fields(endpoint = %self.token_endpoint))]
    async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<RefreshedAccessToken> {
        let body = Self::encode_grant(refresh_token, client_id, client_secret)?;
        let request = HttpRequest::new(HttpMethod::Post, self.token_endpoint.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body);

        debug!("Requesting access token refresh");

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if !response.is_success() {
            let status = response.status;
            let reason = match response.json::<TokenErrorResponse>() {
                Ok(err) => err.to_string(),
                Err(_) => response
                    .text()
                    .unwrap_or_else(|_| "Unable to read error response".to_string()),
            };

            warn!(status, reason = %reason, "Token endpoint rejected refresh");
            return Err(AuthError::RefreshFailed(format!(
                "Token endpoint returned {}: {}",
                status, reason
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::RefreshFailed(format!("Failed to parse token response: {}", e)))?;

        if token.access_token.is_empty() {
            return Err(AuthError::RefreshFailed(
                "Token endpoint returned an empty access token".to_string(),
            ));
        }

        let expires_in_secs = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        info!(expires_in_secs, "Access token refreshed");

        Ok(RefreshedAccessToken {
            access_token: token.access_token,
            expires_in_secs,
        })
    }
}

/// Successful token endpoint response.
///
/// `refresh_token` is deliberately absent: a rotated token in the response is
/// dropped during deserialization.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// RFC 6749 section 5.2 error body.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

impl std::fmt::Display for TokenErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{} ({})", self.error, description),
            None => f.write_str(&self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpResponse, StreamingResponse};
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_stream(&self, request: HttpRequest) -> BridgeResult<StreamingResponse>;
        }
    }

    const ENDPOINT: &str = "https://oauth2.example.com/token";

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn client_with(mock: MockHttpClient) -> OAuthRefreshClient {
        OAuthRefreshClient::new(Arc::new(mock), ENDPOINT)
    }

    #[tokio::test]
    async fn test_refresh_posts_form_encoded_grant() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| {
                let body = req
                    .body
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                req.method == HttpMethod::Post
                    && req.url == ENDPOINT
                    && req.headers.get("Content-Type").map(String::as_str)
                        == Some("application/x-www-form-urlencoded")
                    && body
                        == "grant_type=refresh_token&refresh_token=1%2F%2Frt&client_id=cid&client_secret=s%26cret"
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"access_token":"ya29.new","expires_in":1800,"token_type":"Bearer"}"#,
                ))
            });

        let refreshed = client_with(mock)
            .refresh("1//rt", "cid", "s&cret")
            .await
            .unwrap();

        assert_eq!(refreshed.access_token, "ya29.new");
        assert_eq!(refreshed.expires_in_secs, 1800);
    }

    #[tokio::test]
    async fn test_missing_expires_in_defaults_to_one_hour() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"ya29.new"}"#)));

        let refreshed = client_with(mock).refresh("rt", "cid", "cs").await.unwrap();

        assert_eq!(refreshed.expires_in_secs, DEFAULT_EXPIRES_IN_SECS);
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_ignored() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|_| {
            Ok(response(
                200,
                r#"{"access_token":"ya29.new","expires_in":60,"refresh_token":"1//rotated"}"#,
            ))
        });

        let refreshed = client_with(mock).refresh("rt", "cid", "cs").await.unwrap();

        assert_eq!(
            refreshed,
            RefreshedAccessToken {
                access_token: "ya29.new".to_string(),
                expires_in_secs: 60,
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_grant_is_refresh_failed() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|_| {
            Ok(response(
                400,
                r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
            ))
        });

        let err = client_with(mock).refresh("rt", "cid", "cs").await.unwrap_err();

        match err {
            AuthError::RefreshFailed(message) => {
                assert!(message.contains("400"));
                assert!(message.contains("invalid_grant"));
                assert!(message.contains("expired or revoked"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(503, "backend unavailable")));

        let err = client_with(mock).refresh("rt", "cid", "cs").await.unwrap_err();

        assert!(matches!(err, AuthError::RefreshFailed(ref m) if m.contains("backend unavailable")));
    }

    #[tokio::test]
    async fn test_transport_error_is_refresh_failed() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".to_string())));

        let err = client_with(mock).refresh("rt", "cid", "cs").await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, "not json")));

        let err = client_with(mock).refresh("rt", "cid", "cs").await.unwrap_err();

        assert!(matches!(err, AuthError::RefreshFailed(_)));
    }
}
