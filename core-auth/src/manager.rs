//! # Credential Manager
//!
//! Hands out usable access tokens for a user, refreshing them when they are
//! about to expire.
//!
//! ## Overview
//!
//! Every remote call the core makes starts with
//! [`CredentialManager::get_valid_credential`]. A credential whose access
//! token outlives the refresh skew is returned straight from storage. One that
//! doesn't is refreshed through the [`RemoteAuthClient`], persisted, and then
//! returned.
//!
//! ## Single flight
//!
//! Refreshes are serialized per user. The first caller that finds a stale
//! credential performs the refresh; callers that arrive meanwhile wait for it
//! and receive its outcome. That is the refreshed credential, or the same
//! `RefreshFailed` or `Timeout` error the refresh produced. Nobody retries on
//! their own. Different users never wait on each other.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{CredentialManager, CredentialManagerConfig, UserId};
//! # async fn example(manager: CredentialManager) -> core_auth::Result<()> {
//! let user_id = UserId::new("user-123")?;
//! let credential = manager.get_valid_credential(&user_id).await?;
//! // Use credential.access_token for API calls...
//! # Ok(())
//! # }
//! ```

use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::config::{DEFAULT_REFRESH_SKEW, DEFAULT_REMOTE_TIMEOUT};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::SingleFlight;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AuthError, Result};
use crate::oauth::RemoteAuthClient;
use crate::token_store::TokenStore;
use crate::types::{Credential, OAuthClientCredentials, RefreshedAccessToken, UserId};

/// Tuning knobs for [`CredentialManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialManagerConfig {
    /// Minimum remaining lifetime for a token to be handed out as-is
    pub refresh_skew: Duration,
    /// Time allowed for one refresh round trip
    pub refresh_timeout: Duration,
}

impl Default for CredentialManagerConfig {
    fn default() -> Self {
        Self {
            refresh_skew: DEFAULT_REFRESH_SKEW,
            refresh_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

/// Owns the credential lifecycle for every user.
pub struct CredentialManager {
    token_store: Arc<dyn TokenStore>,
    auth_client: Arc<dyn RemoteAuthClient>,
    client_credentials: OAuthClientCredentials,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    config: CredentialManagerConfig,
    /// Per-user refresh flights, also serializing registration and revocation
    refreshes: Arc<SingleFlight<UserId, Result<Credential>>>,
}

impl CredentialManager {
    pub fn new(
        token_store: Arc<dyn TokenStore>,
        auth_client: Arc<dyn RemoteAuthClient>,
        client_credentials: OAuthClientCredentials,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        config: CredentialManagerConfig,
    ) -> Self {
        Self {
            token_store,
            auth_client,
            client_credentials,
            clock,
            event_bus,
            config,
            refreshes: Arc::new(SingleFlight::new()),
        }
    }

    pub fn config(&self) -> &CredentialManagerConfig {
        &self.config
    }

    /// Returns a credential whose access token is usable for at least the
    /// configured skew, refreshing and persisting it first when needed.
    ///
    /// The refreshed token is written to storage before this returns. On
    /// refresh failure or timeout the stored credential is left exactly as
    /// it was.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NoCredential`] if the user never authorized
    /// - [`AuthError::RefreshFailed`] if the token endpoint rejected the grant
    /// - [`AuthError::Timeout`] if the token endpoint did not answer in time
    /// - [`AuthError::Storage`] if the credential could not be read or written
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_valid_credential(&self, user_id: &UserId) -> Result<Credential> {
        let credential = self.load(user_id).await?;
        if credential.is_usable(self.clock.now(), self.config.refresh_skew) {
            debug!("Token is valid, no refresh needed");
            return Ok(credential);
        }

        self.refreshes
            .run(user_id, || async {
                // Registration may have replaced the credential while we waited.
                let credential = self.load(user_id).await?;
                if credential.is_usable(self.clock.now(), self.config.refresh_skew) {
                    debug!("Token became valid while waiting, no refresh needed");
                    return Ok(credential);
                }

                self.refresh_in_flight(credential).await
            })
            .await
    }

    /// Persist the first token pair for a user, replacing any previous one.
    ///
    /// Called once the authorization handshake has produced tokens. A
    /// response without a refresh token cannot be kept alive and is rejected.
    #[instrument(skip(self, access_token, refresh_token), fields(user_id = %user_id))]
    pub async fn register_credential(
        &self,
        user_id: &UserId,
        access_token: &str,
        refresh_token: &str,
        expires_in_secs: u64,
    ) -> Result<Credential> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidInput {
                field: "refresh_token".to_string(),
                message: "a refresh token is required to keep the credential alive".to_string(),
            });
        }
        if access_token.trim().is_empty() {
            return Err(AuthError::InvalidInput {
                field: "access_token".to_string(),
                message: "cannot be empty".to_string(),
            });
        }

        let credential = self
            .refreshes
            .exclusive(user_id, || async {
                let now = self.clock.now();
                let mut credential = Credential::new(
                    user_id.clone(),
                    access_token,
                    refresh_token,
                    expires_at_after(now, expires_in_secs)?,
                    now,
                );
                if let Some(existing) = self.token_store.get(user_id).await? {
                    credential.created_at = existing.created_at;
                }

                self.token_store.upsert(&credential).await?;
                Ok::<_, AuthError>(credential)
            })
            .await?;

        info!(expires_at = %credential.expires_at, "Credential registered");
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::CredentialRegistered {
                user_id: user_id.to_string(),
            }));

        Ok(credential)
    }

    /// Forget the user's credential. Returns `false` if none was stored.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn revoke_credential(&self, user_id: &UserId) -> Result<bool> {
        let deleted = self
            .refreshes
            .exclusive(user_id, || self.token_store.delete(user_id))
            .await?;
        info!(deleted, "Credential revoked");
        Ok(deleted)
    }

    async fn load(&self, user_id: &UserId) -> Result<Credential> {
        self.token_store.get(user_id).await?.ok_or_else(|| {
            warn!("No credential found for user");
            AuthError::NoCredential {
                user_id: user_id.to_string(),
            }
        })
    }

    /// Must be called from inside the user's refresh flight.
    async fn refresh_in_flight(&self, credential: Credential) -> Result<Credential> {
        let user_id = credential.user_id.clone();
        info!("Token expired or expiring soon, refreshing");
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing {
                user_id: user_id.to_string(),
            }));

        let refreshed = match timeout(
            self.config.refresh_timeout,
            self.auth_client.refresh(
                &credential.refresh_token,
                &self.client_credentials.client_id,
                &self.client_credentials.client_secret,
            ),
        )
        .await
        {
            Ok(Ok(refreshed)) => refreshed,
            Ok(Err(e)) => {
                error!(error = %e, "Token refresh failed");
                self.emit_auth_error(&user_id, format!("Token refresh failed: {}", e), false);
                return Err(e);
            }
            Err(_) => {
                let timeout_ms = self.config.refresh_timeout.as_millis() as u64;
                error!(timeout_ms, "Token refresh timed out");
                self.emit_auth_error(&user_id, "Token refresh timeout".to_string(), true);
                return Err(AuthError::Timeout {
                    operation: "token refresh".to_string(),
                    timeout_ms,
                });
            }
        };

        self.persist_refresh(credential, refreshed).await
    }

    async fn persist_refresh(
        &self,
        credential: Credential,
        refreshed: RefreshedAccessToken,
    ) -> Result<Credential> {
        let now = self.clock.now();
        let expires_at = expires_at_after(now, refreshed.expires_in_secs)?;

        let updated = self
            .token_store
            .update_access_token(&credential.user_id, &refreshed.access_token, expires_at)
            .await?;
        if !updated {
            warn!("Credential disappeared during refresh");
            return Err(AuthError::NoCredential {
                user_id: credential.user_id.to_string(),
            });
        }

        info!(expires_at = %expires_at, "Token refreshed and stored");
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                user_id: credential.user_id.to_string(),
                expires_at: expires_at.timestamp(),
            }));

        Ok(Credential {
            access_token: refreshed.access_token,
            expires_at,
            updated_at: now,
            ..credential
        })
    }

    fn emit_auth_error(&self, user_id: &UserId, message: String, recoverable: bool) {
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
            user_id: Some(user_id.to_string()),
            message,
            recoverable,
        }));
    }
}

fn expires_at_after(now: DateTime<Utc>, expires_in_secs: u64) -> Result<DateTime<Utc>> {
    i64::try_from(expires_in_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::InvalidInput {
            field: "expires_in".to_string(),
            message: format!("{} seconds is out of range", expires_in_secs),
        })
}
