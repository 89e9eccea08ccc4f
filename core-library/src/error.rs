use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[source] Arc<sqlx::Error>),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    /// A stored row could not be mapped back into its model.
    #[error("Corrupt record in {table}: {message}")]
    CorruptRecord { table: String, message: String },
}

impl From<sqlx::Error> for LibraryError {
    fn from(error: sqlx::Error) -> Self {
        LibraryError::Database(Arc::new(error))
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
