use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Remote upload failed: {0}")]
    RemoteUpload(#[source] BridgeError),

    #[error("Remote delete failed: {0}")]
    RemoteDelete(#[source] BridgeError),

    #[error("Remote download failed: {0}")]
    RemoteDownload(#[source] BridgeError),

    #[error("Operation timed out: {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl CoreError {
    /// The user has to authorize again before the request can succeed.
    ///
    /// Covers a missing credential, a rejected refresh, and an access token
    /// the remote service answered with 401.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            CoreError::Auth(e) | CoreError::Sync(SyncError::Auth(e)) => e.is_unauthorized(),
            _ => self.remote_status() == Some(401),
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            CoreError::Timeout { .. } => true,
            CoreError::Auth(e) => matches!(e, AuthError::Timeout { .. }),
            CoreError::Sync(e) => e.is_timeout(),
            CoreError::RemoteUpload(e) | CoreError::RemoteDelete(e) | CoreError::RemoteDownload(e) => {
                e.is_timeout()
            }
            _ => false,
        }
    }

    /// Status the remote file service answered with, for callers that pass
    /// it through unchanged.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            CoreError::RemoteUpload(e) | CoreError::RemoteDelete(e) | CoreError::RemoteDownload(e) => {
                e.status()
            }
            CoreError::Sync(SyncError::RemoteList(e)) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
