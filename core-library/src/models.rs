//! Domain models shared by the persistence layer and the services above it.

use bridge_traits::storage::{RemoteFile, UploadedFile};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LibraryError, Result};

// =============================================================================
// Identifiers
// =============================================================================

/// Identity of the end user whose credentials and files are being managed.
///
/// This is the subject identifier issued by the identity provider. It is
/// threaded explicitly through every core call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id, rejecting blank values.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "user_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Cached file metadata
// =============================================================================

/// One entry of a user's cached remote file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFileRecord {
    pub user_id: UserId,
    pub remote_file_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: Option<u64>,
    /// When this record was last confirmed against the remote service.
    /// `None` marks the record as never synced.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl CachedFileRecord {
    /// Maps a remote listing entry, stamped with `synced_at`.
    pub fn from_remote(user_id: &UserId, file: RemoteFile, synced_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.clone(),
            remote_file_id: file.id,
            file_name: file.name,
            mime_type: file.mime_type,
            size_bytes: file.size_bytes,
            last_synced_at: Some(synced_at),
        }
    }

    /// Maps the metadata returned by a successful upload.
    pub fn from_uploaded(user_id: &UserId, file: UploadedFile, synced_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.clone(),
            remote_file_id: file.id,
            file_name: file.name,
            mime_type: file.mime_type,
            size_bytes: None,
            last_synced_at: Some(synced_at),
        }
    }

    /// Time elapsed since the last sync, or `None` if never synced.
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_synced_at.map(|synced| now - synced)
    }
}

/// Converts a stored millisecond timestamp back into a `DateTime`.
pub fn millis_to_datetime(table: &str, millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| LibraryError::CorruptRecord {
        table: table.to_string(),
        message: format!("timestamp out of range: {}", millis),
    })
}
