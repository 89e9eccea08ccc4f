//! Remote File Storage Abstraction
//!
//! Describes the remote file-storage service the core talks to. The access
//! token is passed on every call so one client instance can serve many users.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::http::ByteStream;

/// File entry as reported by the remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Provider-assigned file identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// MIME type reported by the provider
    pub mime_type: String,
    /// Size in bytes (absent for provider-native documents and folders)
    pub size_bytes: Option<u64>,
}

/// Metadata returned by the remote service after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

/// File metadata paired with a stream over its content.
pub struct FileDownload {
    pub file: RemoteFile,
    pub content: ByteStream,
}

impl FileDownload {
    /// `Content-Disposition` header value that serves the file as an attachment.
    pub fn content_disposition(&self) -> String {
        let name = self.file.name.replace(['"', '\\'], "_");
        format!("attachment; filename=\"{}\"", name)
    }
}

impl fmt::Debug for FileDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDownload")
            .field("file", &self.file)
            .field("content", &"ByteStream { ... }")
            .finish()
    }
}

/// Remote file-storage client.
///
/// Implementations translate each call into the provider's wire protocol.
/// They must not retry failed calls and must not cache anything; the metadata
/// cache in `core-sync` owns local state.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::RemoteFileClient;
///
/// async fn count_files(client: &dyn RemoteFileClient, token: &str) -> Result<usize> {
///     Ok(client.list_owned_files(token).await?.len())
/// }
/// ```
#[async_trait]
pub trait RemoteFileClient: Send + Sync {
    /// List every file owned by the token's user, following pagination.
    async fn list_owned_files(&self, access_token: &str) -> Result<Vec<RemoteFile>>;

    /// Create a new file from `content`.
    async fn upload_file(
        &self,
        access_token: &str,
        name: &str,
        mime_type: &str,
        content: ByteStream,
    ) -> Result<UploadedFile>;

    /// Fetch a file's metadata and open a stream over its bytes.
    async fn get_file_metadata_and_content(
        &self,
        access_token: &str,
        remote_file_id: &str,
    ) -> Result<FileDownload>;

    /// Permanently delete a file.
    async fn delete_file(&self, access_token: &str, remote_file_id: &str) -> Result<()>;
}
