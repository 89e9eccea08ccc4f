//! Error types for Google Drive provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Google Drive provider errors
#[derive(Error, Debug)]
pub enum GoogleDriveError {
    /// Authentication failed or token is invalid
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Google Drive API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// File not found
    #[error("File not found: {file_id}")]
    FileNotFound { file_id: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, GoogleDriveError>;

impl GoogleDriveError {
    /// Classify a non-success status from the Drive API.
    pub fn from_status(
        status: u16,
        message: String,
        file_id: Option<&str>,
        retry_after_seconds: Option<u64>,
    ) -> Self {
        match (status, file_id) {
            (401, _) => GoogleDriveError::AuthenticationFailed(message),
            (429, _) => GoogleDriveError::RateLimitExceeded {
                retry_after_seconds: retry_after_seconds.unwrap_or(0),
            },
            (404, Some(file_id)) => GoogleDriveError::FileNotFound {
                file_id: file_id.to_string(),
            },
            _ => GoogleDriveError::ApiError {
                status_code: status,
                message,
            },
        }
    }

    /// HTTP status this error corresponds to, if it came from the API.
    pub fn status(&self) -> Option<u16> {
        match self {
            GoogleDriveError::AuthenticationFailed(_) => Some(401),
            GoogleDriveError::ApiError { status_code, .. } => Some(*status_code),
            GoogleDriveError::RateLimitExceeded { .. } => Some(429),
            GoogleDriveError::FileNotFound { .. } => Some(404),
            GoogleDriveError::ParseError(_) => None,
            GoogleDriveError::BridgeError(e) => e.status(),
        }
    }
}

impl From<GoogleDriveError> for BridgeError {
    fn from(error: GoogleDriveError) -> Self {
        match error {
            GoogleDriveError::BridgeError(e) => e,
            GoogleDriveError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            other => match other.status() {
                Some(status) => BridgeError::Remote {
                    status,
                    message: other.to_string(),
                },
                None => BridgeError::OperationFailed(other.to_string()),
            },
        }
    }
}
