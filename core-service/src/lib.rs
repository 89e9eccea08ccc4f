//! Core service façade and bootstrap helpers.
//!
//! This crate wires the credential manager, the metadata cache and the remote
//! file client into the use cases a host exposes: list, upload, download and
//! delete, each on behalf of an explicit user. Desktop hosts typically enable
//! the `desktop-shims` feature so [`CoreService::bootstrap`] can fall back to
//! the reqwest HTTP client; other hosts inject their own collaborators through
//! [`CoreDependencies`].

pub mod error;

pub use error::{CoreError, Result};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{
    error::BridgeError,
    storage::{FileDownload, RemoteFileClient},
    time::Clock,
    ByteStream,
};
use chrono::{DateTime, Utc};
use core_auth::{
    Credential, CredentialManager, CredentialManagerConfig, OAuthClientCredentials,
    OAuthRefreshClient, RemoteAuthClient, SqliteTokenStore, TokenStore, UserId,
};
use core_library::{
    db::{create_pool, DatabaseConfig},
    CachedFileRecord, FileIndexStore, SqliteFileIndexStore,
};
use core_runtime::{
    config::{CoreConfig, DEFAULT_FRESHNESS_WINDOW, DEFAULT_REFRESH_SKEW, DEFAULT_REMOTE_TIMEOUT},
    events::{CoreEvent, EventBus, FileEvent, Receiver},
    logging::{init_logging, strip_path},
};
use core_sync::{MetadataCache, MetadataCacheConfig};
use provider_google_drive::GoogleDriveConnector;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// Aggregated handle to every collaborator the core requires.
pub struct CoreDependencies {
    pub token_store: Arc<dyn TokenStore>,
    pub auth_client: Arc<dyn RemoteAuthClient>,
    pub client_credentials: OAuthClientCredentials,
    pub file_index: Arc<dyn FileIndexStore>,
    pub remote_files: Arc<dyn RemoteFileClient>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
}

/// Timing knobs shared by the credential manager, the cache and the
/// service's own remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub refresh_skew: Duration,
    pub freshness_window: Duration,
    pub remote_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            refresh_skew: DEFAULT_REFRESH_SKEW,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

impl From<&CoreConfig> for ServiceConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            refresh_skew: config.refresh_skew,
            freshness_window: config.freshness_window,
            remote_timeout: config.remote_timeout,
        }
    }
}

/// File metadata as handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadataView {
    pub remote_file_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: Option<u64>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<CachedFileRecord> for FileMetadataView {
    fn from(record: CachedFileRecord) -> Self {
        Self {
            remote_file_id: record.remote_file_id,
            file_name: record.file_name,
            mime_type: record.mime_type,
            size_bytes: record.size_bytes,
            last_synced_at: record.last_synced_at,
        }
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    credentials: Arc<CredentialManager>,
    cache: Arc<MetadataCache>,
    remote_files: Arc<dyn RemoteFileClient>,
    event_bus: EventBus,
    config: ServiceConfig,
}

impl CoreService {
    /// Create a new service from explicitly injected collaborators.
    pub fn new(deps: CoreDependencies, config: ServiceConfig) -> Self {
        let credentials = Arc::new(CredentialManager::new(
            deps.token_store,
            deps.auth_client,
            deps.client_credentials,
            Arc::clone(&deps.clock),
            deps.event_bus.clone(),
            CredentialManagerConfig {
                refresh_skew: config.refresh_skew,
                refresh_timeout: config.remote_timeout,
            },
        ));

        let cache = Arc::new(MetadataCache::new(
            deps.file_index,
            Arc::clone(&credentials),
            Arc::clone(&deps.remote_files),
            deps.clock,
            deps.event_bus.clone(),
            MetadataCacheConfig {
                freshness_window: config.freshness_window,
                remote_timeout: config.remote_timeout,
            },
        ));

        Self {
            credentials,
            cache,
            remote_files: deps.remote_files,
            event_bus: deps.event_bus,
            config,
        }
    }

    /// Build a service backed by SQLite and Google Drive from `config`.
    ///
    /// Opens (and migrates) the database at `config.database_path` and
    /// installs the configured logging subscriber unless the host already
    /// installed one.
    ///
    /// ```no_run
    /// # async fn example() -> core_service::Result<()> {
    /// use core_runtime::config::CoreConfig;
    /// use core_service::CoreService;
    ///
    /// let config = CoreConfig::builder()
    ///     .database_path("/var/lib/drive/files.db")
    ///     .oauth_client("client-id", "client-secret")
    ///     .build()?;
    /// let core = CoreService::bootstrap(config).await?;
    /// let events = core.subscribe_events();
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        if let Some(logging) = config.logging.clone() {
            if let Err(e) = init_logging(logging) {
                warn!(error = %e, "Logging already initialized, keeping existing subscriber");
            }
        }

        let database_path = config.database_path.to_string_lossy();
        info!(database = %strip_path(&database_path), "Bootstrapping core service");

        let pool = create_pool(DatabaseConfig::new(config.database_path.clone())).await?;

        let deps = CoreDependencies {
            token_store: Arc::new(SqliteTokenStore::with_clock(
                pool.clone(),
                Arc::clone(&config.clock),
            )),
            auth_client: Arc::new(OAuthRefreshClient::new(
                Arc::clone(&config.http_client),
                config.oauth.token_endpoint.clone(),
            )),
            client_credentials: OAuthClientCredentials::new(
                config.oauth.client_id.clone(),
                config.oauth.client_secret.clone(),
            ),
            file_index: Arc::new(SqliteFileIndexStore::new(pool)),
            remote_files: Arc::new(GoogleDriveConnector::new(Arc::clone(&config.http_client))),
            clock: Arc::clone(&config.clock),
            event_bus: EventBus::new(config.event_buffer_size),
        };

        Ok(Self::new(deps, ServiceConfig::from(&config)))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn credentials(&self) -> Arc<CredentialManager> {
        Arc::clone(&self.credentials)
    }

    pub fn cache(&self) -> Arc<MetadataCache> {
        Arc::clone(&self.cache)
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// A credential usable for at least the refresh skew.
    pub async fn get_valid_credential(&self, user_id: &UserId) -> Result<Credential> {
        Ok(self.credentials.get_valid_credential(user_id).await?)
    }

    /// Persist the token pair produced by the authorization handshake.
    pub async fn register_credential(
        &self,
        user_id: &UserId,
        access_token: &str,
        refresh_token: &str,
        expires_in_secs: u64,
    ) -> Result<Credential> {
        Ok(self
            .credentials
            .register_credential(user_id, access_token, refresh_token, expires_in_secs)
            .await?)
    }

    pub async fn revoke_credential(&self, user_id: &UserId) -> Result<bool> {
        Ok(self.credentials.revoke_credential(user_id).await?)
    }

    /// The user's files, served from the cache while it is fresh.
    pub async fn list_files(&self, user_id: &UserId) -> Result<Vec<FileMetadataView>> {
        let records = self.cache.list_files(user_id).await?;
        Ok(records.into_iter().map(FileMetadataView::from).collect())
    }

    /// Upload a new file and add it to the user's cached listing.
    ///
    /// The cache is only touched once the remote service confirmed the file.
    #[instrument(skip(self, content), fields(user_id = %user_id, file_name = %name))]
    pub async fn upload_file(
        &self,
        user_id: &UserId,
        name: &str,
        mime_type: &str,
        content: ByteStream,
    ) -> Result<FileMetadataView> {
        let credential = self.credentials.get_valid_credential(user_id).await?;

        let uploaded = self
            .bounded(
                "remote upload",
                self.remote_files
                    .upload_file(&credential.access_token, name, mime_type, content),
                CoreError::RemoteUpload,
            )
            .await?;

        let record = self.cache.record_upload(user_id, uploaded).await?;

        info!(remote_file_id = %record.remote_file_id, "File uploaded");
        let _ = self.event_bus.emit(CoreEvent::File(FileEvent::Uploaded {
            user_id: user_id.to_string(),
            remote_file_id: record.remote_file_id.clone(),
            file_name: record.file_name.clone(),
        }));

        Ok(FileMetadataView::from(record))
    }

    /// Fetch a file's metadata together with a stream over its content.
    ///
    /// The cache is neither consulted nor updated.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn download_file(
        &self,
        user_id: &UserId,
        remote_file_id: &str,
    ) -> Result<FileDownload> {
        let credential = self.credentials.get_valid_credential(user_id).await?;

        let download = self
            .bounded(
                "remote download",
                self.remote_files
                    .get_file_metadata_and_content(&credential.access_token, remote_file_id),
                CoreError::RemoteDownload,
            )
            .await?;

        info!(mime_type = %download.file.mime_type, "Download ready");
        Ok(download)
    }

    /// Delete a file remotely, then drop it from the user's cache.
    ///
    /// When the remote delete fails the cache is left as it was.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn delete_file(&self, user_id: &UserId, remote_file_id: &str) -> Result<()> {
        let credential = self.credentials.get_valid_credential(user_id).await?;

        self.bounded(
            "remote delete",
            self.remote_files
                .delete_file(&credential.access_token, remote_file_id),
            CoreError::RemoteDelete,
        )
        .await?;

        let was_cached = self.cache.record_delete(user_id, remote_file_id).await?;

        info!(was_cached, "File deleted");
        let _ = self.event_bus.emit(CoreEvent::File(FileEvent::Deleted {
            user_id: user_id.to_string(),
            remote_file_id: remote_file_id.to_string(),
            was_cached,
        }));

        Ok(())
    }

    /// Run one remote call under the configured timeout. Never retried.
    async fn bounded<T, F>(
        &self,
        operation: &str,
        call: F,
        on_error: fn(BridgeError) -> CoreError,
    ) -> Result<T>
    where
        F: Future<Output = bridge_traits::error::Result<T>>,
    {
        match timeout(self.config.remote_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation, status = ?e.status(), error = %e, "Remote call failed");
                Err(on_error(e))
            }
            Err(_) => {
                let timeout_ms = self.config.remote_timeout.as_millis() as u64;
                warn!(operation, timeout_ms, "Remote call timed out");
                Err(CoreError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms,
                })
            }
        }
    }
}
