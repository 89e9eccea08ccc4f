use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// No credential row exists for the user.
    #[error("No credential stored for user {user_id}")]
    NoCredential { user_id: String },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Operation timed out: {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Credential storage error: {0}")]
    Storage(#[from] LibraryError),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },
}

impl AuthError {
    /// The caller has to re-authorize before the user can be served again.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::NoCredential { .. } | AuthError::RefreshFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
