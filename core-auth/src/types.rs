use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use core_library::UserId;

/// Stored OAuth credential for one user.
///
/// The refresh token is written once, when the user first authorizes, and
/// is never rotated by a refresh; only the access token and its expiry
/// change afterwards.
///
/// # Examples
///
/// ```
/// use core_auth::{Credential, UserId};
/// use chrono::{Duration, Utc};
/// use std::time::Duration as StdDuration;
///
/// let now = Utc::now();
/// let credential = Credential::new(
///     UserId::new("user-1").unwrap(),
///     "ya29.a0...",
///     "1//0g...",
///     now + Duration::minutes(10),
///     now,
/// );
///
/// assert!(credential.is_usable(now, StdDuration::from_secs(60)));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: UserId,
    /// Bearer token presented to the remote service
    pub access_token: String,
    /// Long-lived token exchanged for new access tokens
    pub refresh_token: String,
    /// When the access token stops being accepted (UTC)
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential first stored at `now`.
    pub fn new(
        user_id: UserId,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the access token outlives `now` by strictly more than `skew`.
    pub fn is_usable(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match chrono::Duration::from_std(skew) {
            Ok(skew) => self.expires_at - now > skew,
            Err(_) => false,
        }
    }

    /// Time left before expiry, or `None` once expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Result of a refresh-token grant.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedAccessToken {
    pub access_token: String,
    /// Lifetime of the new token in seconds
    pub expires_in_secs: u64,
}

impl fmt::Debug for RefreshedAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedAccessToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_in_secs", &self.expires_in_secs)
            .finish()
    }
}

/// Registered OAuth client identity sent with every refresh.
#[derive(Clone)]
pub struct OAuthClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for OAuthClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}
