use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// The remote listing call failed; the user's cache was left empty.
    #[error("Remote listing failed: {0}")]
    RemoteList(#[source] BridgeError),

    #[error("Operation timed out: {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Credential error: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Library(#[from] LibraryError),
}

impl SyncError {
    pub fn is_timeout(&self) -> bool {
        match self {
            SyncError::Timeout { .. } | SyncError::Auth(AuthError::Timeout { .. }) => true,
            SyncError::RemoteList(e) => e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
