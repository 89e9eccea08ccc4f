//! # Metadata Cache
//!
//! Per-user file listing backed by the local file index.
//!
//! ## Freshness
//!
//! A user's cached set is served as-is only when every record in it was
//! stamped within the freshness window. One straggler is enough to force a
//! full resynchronization.
//!
//! ## Resynchronization
//!
//! ```text
//! delete cached set -> valid credential -> remote listing -> stamp -> replace set
//! ```
//!
//! The cached set is deleted before anything remote happens. If a later step
//! fails, the set stays empty and the error is returned to the caller.
//!
//! One resync runs per user at a time. Callers that queue behind it receive
//! its outcome, including an empty listing or an error, rather than starting
//! another.

use bridge_traits::storage::{RemoteFileClient, UploadedFile};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_auth::CredentialManager;
use core_library::{CachedFileRecord, FileIndexStore, UserId};
use core_runtime::config::{DEFAULT_FRESHNESS_WINDOW, DEFAULT_REMOTE_TIMEOUT};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_runtime::SingleFlight;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, SyncError};

/// Configuration for [`MetadataCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataCacheConfig {
    /// Maximum age of a cached record before the set is resynchronized
    pub freshness_window: Duration,
    /// Upper bound on the remote listing call
    pub remote_timeout: Duration,
}

impl Default for MetadataCacheConfig {
    fn default() -> Self {
        Self {
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

/// Serves file listings from the local index, resynchronizing when stale.
pub struct MetadataCache {
    file_index: Arc<dyn FileIndexStore>,
    credentials: Arc<CredentialManager>,
    remote: Arc<dyn RemoteFileClient>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    config: MetadataCacheConfig,
    /// Per-user resync flights, also serializing point updates
    resyncs: Arc<SingleFlight<UserId, Result<Vec<CachedFileRecord>>>>,
}

impl MetadataCache {
    pub fn new(
        file_index: Arc<dyn FileIndexStore>,
        credentials: Arc<CredentialManager>,
        remote: Arc<dyn RemoteFileClient>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        config: MetadataCacheConfig,
    ) -> Self {
        Self {
            file_index,
            credentials,
            remote,
            clock,
            event_bus,
            config,
            resyncs: Arc::new(SingleFlight::new()),
        }
    }

    pub fn config(&self) -> &MetadataCacheConfig {
        &self.config
    }

    /// The user's files, from the cache when fresh and from the remote
    /// service otherwise.
    ///
    /// A fresh cache is returned without fetching a credential or calling
    /// the remote service.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Auth`] if no valid credential could be obtained
    /// - [`SyncError::RemoteList`] if the remote listing failed
    /// - [`SyncError::Timeout`] if the remote listing did not finish in time
    ///
    /// In all three cases the user's cache is left empty.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_files(&self, user_id: &UserId) -> Result<Vec<CachedFileRecord>> {
        let records = self.file_index.find_by_user(user_id).await?;
        if !self.is_stale(&records, self.clock.now()) {
            debug!(file_count = records.len(), "Serving fresh cached listing");
            return Ok(records);
        }

        self.resyncs
            .run(user_id, || async {
                // A point update may have refreshed the set while we waited.
                let records = self.file_index.find_by_user(user_id).await?;
                if !self.is_stale(&records, self.clock.now()) {
                    debug!(file_count = records.len(), "Cached listing became fresh");
                    return Ok(records);
                }

                self.resync_in_flight(user_id).await
            })
            .await
    }

    /// Rebuild the user's cached set from the remote service regardless of
    /// its freshness.
    ///
    /// A caller that has to wait for a resync already running for the user
    /// gets that resync's outcome.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn resync(&self, user_id: &UserId) -> Result<Vec<CachedFileRecord>> {
        self.resyncs
            .run(user_id, || self.resync_in_flight(user_id))
            .await
    }

    /// Whether `records` must be rebuilt before being served at `now`.
    pub fn is_stale(&self, records: &[CachedFileRecord], now: DateTime<Utc>) -> bool {
        if records.is_empty() {
            return true;
        }

        // A window too large for chrono never expires anything.
        let window = chrono::Duration::from_std(self.config.freshness_window).ok();

        records.iter().any(|record| match (record.last_synced_at, window) {
            (None, _) => true,
            (Some(synced_at), Some(window)) => now - synced_at > window,
            (Some(_), None) => false,
        })
    }

    /// Add a file the remote service confirmed as uploaded.
    #[instrument(skip(self, file), fields(user_id = %user_id, remote_file_id = %file.id))]
    pub async fn record_upload(
        &self,
        user_id: &UserId,
        file: UploadedFile,
    ) -> Result<CachedFileRecord> {
        let record = CachedFileRecord::from_uploaded(user_id, file, self.clock.now());
        self.resyncs
            .exclusive(user_id, || self.file_index.upsert(&record))
            .await?;

        debug!("Cached uploaded file");
        Ok(record)
    }

    /// Drop a file the remote service confirmed as deleted.
    ///
    /// Returns `false` when the file was not cached, which is not an error.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn record_delete(&self, user_id: &UserId, remote_file_id: &str) -> Result<bool> {
        let removed = self
            .resyncs
            .exclusive(user_id, || {
                self.file_index.delete_by_remote_id(user_id, remote_file_id)
            })
            .await?;

        debug!(removed, "Applied remote delete to cache");
        Ok(removed)
    }

    /// Must be called from inside the user's resync flight.
    async fn resync_in_flight(&self, user_id: &UserId) -> Result<Vec<CachedFileRecord>> {
        info!("Cached listing is stale, resynchronizing");
        let _ = self
            .event_bus
            .emit(CoreEvent::Cache(CacheEvent::ResyncStarted {
                user_id: user_id.to_string(),
            }));

        let cleared = self.file_index.delete_all_for_user(user_id).await?;
        debug!(cleared, "Cleared cached listing");

        match self.fetch_and_store(user_id).await {
            Ok(records) => {
                info!(file_count = records.len(), "Resync completed");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Cache(CacheEvent::ResyncCompleted {
                        user_id: user_id.to_string(),
                        file_count: records.len() as u64,
                    }));
                Ok(records)
            }
            Err(e) => {
                error!(error = %e, "Resync failed, cache left empty");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Cache(CacheEvent::ResyncFailed {
                        user_id: user_id.to_string(),
                        message: e.to_string(),
                    }));
                Err(e)
            }
        }
    }

    async fn fetch_and_store(&self, user_id: &UserId) -> Result<Vec<CachedFileRecord>> {
        let credential = self.credentials.get_valid_credential(user_id).await?;

        let remote_files = match timeout(
            self.config.remote_timeout,
            self.remote.list_owned_files(&credential.access_token),
        )
        .await
        {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => {
                warn!(error = %e, "Remote listing failed");
                return Err(SyncError::RemoteList(e));
            }
            Err(_) => {
                let timeout_ms = self.config.remote_timeout.as_millis() as u64;
                warn!(timeout_ms, "Remote listing timed out");
                return Err(SyncError::Timeout {
                    operation: "remote listing".to_string(),
                    timeout_ms,
                });
            }
        };

        let now = self.clock.now();
        let mut records: Vec<CachedFileRecord> = remote_files
            .into_iter()
            .map(|file| CachedFileRecord::from_remote(user_id, file, now))
            .collect();
        records.sort_by(|a, b| {
            a.file_name
                .cmp(&b.file_name)
                .then_with(|| a.remote_file_id.cmp(&b.remote_file_id))
        });

        self.file_index
            .replace_all_for_user(user_id, &records)
            .await?;

        Ok(records)
    }
}
