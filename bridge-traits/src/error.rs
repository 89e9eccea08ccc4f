use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote endpoint answered with a non-success status.
    #[error("Remote request failed (status {status}): {message}")]
    Remote { status: u16, message: String },

    /// The transport gave up waiting on the remote endpoint.
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),
}

impl From<std::io::Error> for BridgeError {
    fn from(error: std::io::Error) -> Self {
        BridgeError::Io(Arc::new(error))
    }
}

impl BridgeError {
    /// Status code reported by the remote endpoint, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            BridgeError::Timeout(_) => true,
            BridgeError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
