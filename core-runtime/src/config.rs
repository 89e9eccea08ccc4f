//! # Core Configuration Module
//!
//! Builder-based configuration for the file service core.
//!
//! ## Overview
//!
//! [`CoreConfig`] holds the settings and collaborators the core needs.
//! [`CoreConfigBuilder`] validates them up front so a misconfigured host fails
//! at startup with an actionable message instead of on the first request.
//!
//! ## Required Settings
//!
//! - `database_path` - SQLite file holding credentials and the file index
//! - `oauth_client` - OAuth client id and secret used for the refresh grant
//!
//! ## Optional Settings (with defaults)
//!
//! - `HttpClient` - desktop default (reqwest) with the `desktop-shims` feature
//! - `Clock` - [`SystemClock`]
//! - `refresh_skew` - 60 seconds
//! - `freshness_window` - 15 seconds
//! - `remote_timeout` - 30 seconds
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/drive/files.db")
//!     .oauth_client("client-id", "client-secret")
//!     .freshness_window(Duration::from_secs(300))
//!     .build()?;
//! ```
//!
//! Or from the process environment:
//!
//! ```ignore
//! let config = CoreConfigBuilder::from_env()?.build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::{redact_if_sensitive, LoggingConfig};
use bridge_traits::{Clock, HttpClient, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Google's OAuth 2.0 token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Credentials are refreshed when they expire within this window.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Cached listings older than this are resynchronized.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(15);

/// Upper bound for any single remote call.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_DATABASE_PATH: &str = "DRIVE_DATABASE_PATH";
pub const ENV_CLIENT_ID: &str = "GOOGLE_OAUTH_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GOOGLE_OAUTH_CLIENT_SECRET";
pub const ENV_TOKEN_ENDPOINT: &str = "GOOGLE_TOKEN_SERVER_URI";
pub const ENV_FRESHNESS_WINDOW_SECS: &str = "DRIVE_CACHE_FRESHNESS_SECS";
pub const ENV_REMOTE_TIMEOUT_SECS: &str = "DRIVE_REMOTE_TIMEOUT_SECS";

/// OAuth client registration used for the refresh-token grant.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &redact_if_sensitive("client_secret", &self.client_secret),
            )
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// OAuth client used to refresh access tokens
    pub oauth: OAuthClientConfig,

    /// A credential is usable only while it has more than this left
    pub refresh_skew: Duration,

    /// Maximum age of a cached file record before a resync
    pub freshness_window: Duration,

    /// Timeout applied to every remote call
    pub remote_timeout: Duration,

    /// HTTP client for the token endpoint and the file API
    pub http_client: Arc<dyn HttpClient>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Logging to install at bootstrap, if the host has not done so
    pub logging: Option<LoggingConfig>,

    /// Event bus channel capacity
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("oauth", &self.oauth)
            .field("refresh_skew", &self.refresh_skew)
            .field("freshness_window", &self.freshness_window)
            .field("remote_timeout", &self.remote_timeout)
            .field("http_client", &"HttpClient { ... }")
            .field("clock", &"Clock { ... }")
            .field("logging", &self.logging)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - OAuth client id and token endpoint are present
    /// - Durations are non-zero
    /// - The event buffer can hold at least one event
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.oauth.client_id.trim().is_empty() {
            return Err(Error::Config("OAuth client id cannot be empty".to_string()));
        }

        if !self.oauth.token_endpoint.starts_with("http://")
            && !self.oauth.token_endpoint.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "Token endpoint must be an http(s) URL, got '{}'",
                self.oauth.token_endpoint
            )));
        }

        for (name, value) in [
            ("Refresh skew", self.refresh_skew),
            ("Freshness window", self.freshness_window),
            ("Remote timeout", self.remote_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::{ReqwestHttpClient, DEFAULT_CONNECT_TIMEOUT};

    // Operations carry their own deadlines; the client only bounds silence.
    let connect_timeout = DEFAULT_CONNECT_TIMEOUT.min(timeout);
    let client = ReqwestHttpClient::with_timeouts(connect_timeout, timeout).map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject a platform-native adapter with .http_client()."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    client_id: Option<String>,
    client_secret: Option<String>,
    token_endpoint: Option<String>,
    refresh_skew: Option<Duration>,
    freshness_window: Option<Duration>,
    remote_timeout: Option<Duration>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    logging: Option<LoggingConfig>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Starts a builder from the process environment.
    ///
    /// Unset variables are left for the caller to provide; malformed ones are
    /// reported as [`Error::InvalidEnv`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            builder = builder.database_path(path);
        }
        builder.client_id = lookup(ENV_CLIENT_ID);
        builder.client_secret = lookup(ENV_CLIENT_SECRET);
        builder.token_endpoint = lookup(ENV_TOKEN_ENDPOINT);

        if let Some(secs) = parse_secs(&lookup, ENV_FRESHNESS_WINDOW_SECS)? {
            builder = builder.freshness_window(secs);
        }
        if let Some(secs) = parse_secs(&lookup, ENV_REMOTE_TIMEOUT_SECS)? {
            builder = builder.remote_timeout(secs);
        }

        Ok(builder)
    }

    /// Sets the database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the OAuth client id and secret.
    pub fn oauth_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Overrides the token endpoint. Default: [`DEFAULT_TOKEN_ENDPOINT`].
    pub fn token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = Some(url.into());
        self
    }

    /// Default: 60 seconds.
    pub fn refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = Some(skew);
        self
    }

    /// Default: 15 seconds.
    pub fn freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = Some(window);
        self
    }

    /// Default: 30 seconds.
    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = Some(timeout);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the time source. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Installs a global `tracing` subscriber during bootstrap.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig`, validating all required dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Database path or OAuth client is missing
    /// - No HTTP client is available on this platform
    /// - Validation fails
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config(
                "Database path is required. Use .database_path() to set it.".to_string(),
            )
        })?;

        let client_id = self.client_id.ok_or_else(|| {
            Error::Config(
                "OAuth client id is required. Use .oauth_client() to set it.".to_string(),
            )
        })?;

        let client_secret = self.client_secret.ok_or_else(|| {
            Error::Config(
                "OAuth client secret is required. Use .oauth_client() to set it.".to_string(),
            )
        })?;

        let remote_timeout = self.remote_timeout.unwrap_or(DEFAULT_REMOTE_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(remote_timeout)?,
        };

        let config = CoreConfig {
            database_path,
            oauth: OAuthClientConfig {
                client_id,
                client_secret,
                token_endpoint: self
                    .token_endpoint
                    .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string()),
            },
            refresh_skew: self.refresh_skew.unwrap_or(DEFAULT_REFRESH_SKEW),
            freshness_window: self.freshness_window.unwrap_or(DEFAULT_FRESHNESS_WINDOW),
            remote_timeout,
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            logging: self.logging,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_secs<F>(lookup: &F, var: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| Error::InvalidEnv {
                var: var.to_string(),
                message: format!("expected whole seconds, got '{}' ({})", raw, e),
            }),
    }
}
