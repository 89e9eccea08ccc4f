//! Credential Storage
//!
//! Durable per-user OAuth credentials in the shared SQLite database.
//!
//! ## Security
//!
//! - Token values are never logged; only user ids and expiry times are
//! - [`Credential`]'s `Debug` output redacts both tokens
//! - The refresh token is only ever written by [`TokenStore::upsert`]
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{Credential, SqliteTokenStore, TokenStore, UserId};
//! use chrono::{Duration, Utc};
//! # async fn example(pool: sqlx::SqlitePool) -> core_auth::Result<()> {
//! let store = SqliteTokenStore::new(pool);
//! let user_id = UserId::new("user-1")?;
//! let now = Utc::now();
//!
//! store
//!     .upsert(&Credential::new(user_id.clone(), "access", "refresh", now + Duration::hours(1), now))
//!     .await?;
//!
//! let stored = store.get(&user_id).await?;
//! assert!(stored.is_some());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_library::models::millis_to_datetime;
use core_library::LibraryError;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::types::{Credential, UserId};

const TABLE: &str = "oauth_tokens";

/// Persistent store of one credential per user.
///
/// Each call is atomic on its own. [`CredentialManager`](crate::CredentialManager)
/// serializes the read-check-refresh-write sequence per user on top of it.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, user_id: &UserId) -> Result<Option<Credential>>;

    /// Insert or replace the full record, refresh token included.
    async fn upsert(&self, credential: &Credential) -> Result<()>;

    /// Replace the access token and its expiry together, leaving the refresh
    /// token untouched. Returns `false` when the user has no row.
    async fn update_access_token(
        &self,
        user_id: &UserId,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Remove the user's credential. Returns `false` when there was none.
    async fn delete(&self, user_id: &UserId) -> Result<bool>;

    async fn count(&self) -> Result<u64>;
}

/// SQLite-backed [`TokenStore`] over the `oauth_tokens` table.
///
/// `updated_at` on access token updates is stamped from the store's clock.
#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        debug!("Initializing SqliteTokenStore");
        Self { pool, clock }
    }
}

#[derive(FromRow)]
struct TokenRow {
    user_id: String,
    access_token: String,
    refresh_token: String,
    expires_at_ms: i64,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl TryFrom<TokenRow> for Credential {
    type Error = LibraryError;

    fn try_from(row: TokenRow) -> std::result::Result<Self, LibraryError> {
        Ok(Credential {
            user_id: UserId::new(row.user_id)?,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at: millis_to_datetime(TABLE, row.expires_at_ms)?,
            created_at: millis_to_datetime(TABLE, row.created_at_ms)?,
            updated_at: millis_to_datetime(TABLE, row.updated_at_ms)?,
        })
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get(&self, user_id: &UserId) -> Result<Option<Credential>> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT user_id, access_token, refresh_token, expires_at_ms, created_at_ms, updated_at_ms \
             FROM oauth_tokens WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(LibraryError::from)?;

        match row {
            Some(row) => {
                let credential = Credential::try_from(row).map_err(|e| {
                    warn!(error = %e, "Stored credential is unreadable");
                    e
                })?;
                debug!(expires_at = %credential.expires_at, "Credential loaded");
                Ok(Some(credential))
            }
            None => {
                debug!("No credential stored");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, credential), fields(user_id = %credential.user_id))]
    async fn upsert(&self, credential: &Credential) -> Result<()> {
        sqlx::query(
            "INSERT INTO oauth_tokens \
             (user_id, access_token, refresh_token, expires_at_ms, created_at_ms, updated_at_ms) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (user_id) DO UPDATE SET \
             access_token = excluded.access_token, \
             refresh_token = excluded.refresh_token, \
             expires_at_ms = excluded.expires_at_ms, \
             updated_at_ms = excluded.updated_at_ms",
        )
        .bind(credential.user_id.as_str())
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at.timestamp_millis())
        .bind(credential.created_at.timestamp_millis())
        .bind(credential.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(LibraryError::from)?;

        info!(expires_at = %credential.expires_at, "Credential stored");
        Ok(())
    }

    #[instrument(skip(self, access_token), fields(user_id = %user_id))]
    async fn update_access_token(
        &self,
        user_id: &UserId,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE oauth_tokens \
             SET access_token = ?, expires_at_ms = ?, updated_at_ms = ? \
             WHERE user_id = ?",
        )
        .bind(access_token)
        .bind(expires_at.timestamp_millis())
        .bind(self.clock.unix_timestamp_millis())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(LibraryError::from)?;

        let updated = result.rows_affected() > 0;
        if !updated {
            warn!("Access token update matched no credential");
        }
        Ok(updated)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn delete(&self, user_id: &UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE user_id = ?")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(LibraryError::from)?;

        let deleted = result.rows_affected() > 0;
        info!(deleted, "Credential deleted");
        Ok(deleted)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM oauth_tokens")
            .fetch_one(&self.pool)
            .await
            .map_err(LibraryError::from)?;

        Ok(count.max(0) as u64)
    }
}
