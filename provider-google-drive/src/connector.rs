//! Google Drive API connector implementation
//!
//! Implements the `RemoteFileClient` trait for Google Drive API v3.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{ByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::{FileDownload, RemoteFile, RemoteFileClient, UploadedFile};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::GoogleDriveError;
use crate::types::{ApiErrorResponse, DriveFile, FilesListResponse, UploadMetadata};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive upload endpoint for single-request uploads
const DRIVE_UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart&fields=id,name,mimeType";

/// Google Drive upload endpoint that opens a resumable session
const DRIVE_RESUMABLE_UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/drive/v3/files?uploadType=resumable&fields=id,name,mimeType";

/// Bytes buffered per upload request.
///
/// Content shorter than one chunk goes up in a single multipart request;
/// anything longer goes through a resumable session one chunk at a time.
/// Drive requires every chunk but the last to be a multiple of 256 KiB.
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Status Drive answers a non-final resumable chunk with
const RESUME_INCOMPLETE: u16 = 308;

/// Maximum results per page (Google Drive API limit)
const MAX_PAGE_SIZE: u32 = 1000;

/// Files the user owns and has not trashed
const OWNED_FILES_QUERY: &str = "'me' in owners and trashed=false";

/// Fields to request for file resources
const FILE_FIELDS: &str = "id,name,mimeType,size";

/// Google Drive API connector
///
/// Implements `RemoteFileClient` for Google Drive API v3. The access token
/// is supplied on every call, so one connector serves every user.
///
/// # Features
///
/// - Paginated listing of owned, non-trashed files
/// - Multipart uploads for small files, chunked resumable uploads otherwise
/// - Streaming downloads
/// - Status mapping to [`GoogleDriveError`] without retries
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveConnector;
/// use bridge_traits::storage::RemoteFileClient;
///
/// let connector = GoogleDriveConnector::new(http_client);
/// let files = connector.list_owned_files(&credential.access_token).await?;
/// ```
pub struct GoogleDriveConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,
    /// Upper bound on upload bytes held in memory at once
    upload_chunk_size: usize,
}

impl GoogleDriveConnector {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
        }
    }

    /// Override the upload chunk size. See [`DEFAULT_UPLOAD_CHUNK_SIZE`].
    pub fn with_upload_chunk_size(mut self, chunk_size: usize) -> Self {
        self.upload_chunk_size = chunk_size.max(1);
        self
    }

    /// Convert DriveFile to RemoteFile
    fn convert_file(drive_file: DriveFile) -> RemoteFile {
        RemoteFile {
            size_bytes: drive_file.size.as_deref().and_then(|s| s.parse().ok()),
            id: drive_file.id,
            name: drive_file.name,
            mime_type: drive_file.mime_type,
        }
    }

    fn file_url(file_id: &str) -> String {
        format!("{}/files/{}", DRIVE_API_BASE, urlencoding::encode(file_id))
    }

    fn list_url(page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/files?q={}&fields={}&pageSize={}",
            DRIVE_API_BASE,
            urlencoding::encode(OWNED_FILES_QUERY),
            urlencoding::encode(&format!("nextPageToken,files({})", FILE_FIELDS)),
            MAX_PAGE_SIZE
        );

        if let Some(page_token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(page_token)));
        }

        url
    }

    fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }

    fn retry_after(headers: &HashMap<String, String>) -> Option<u64> {
        Self::header(headers, "retry-after").and_then(|v| v.parse().ok())
    }

    /// Last byte offset of a resumable session's `Range: bytes=0-N` header.
    fn acknowledged_end(headers: &HashMap<String, String>) -> Option<u64> {
        Self::header(headers, "range")?
            .strip_prefix("bytes=0-")?
            .parse()
            .ok()
    }

    /// Prefer the API's own error message over the raw body.
    fn error_message(body: &[u8]) -> String {
        serde_json::from_slice::<ApiErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())
    }

    fn check_status(
        response: HttpResponse,
        file_id: Option<&str>,
    ) -> std::result::Result<HttpResponse, GoogleDriveError> {
        if response.is_success() {
            debug!(status = response.status, "API request succeeded");
            return Ok(response);
        }

        warn!(status = response.status, "API request failed");
        Err(GoogleDriveError::from_status(
            response.status,
            Self::error_message(&response.body),
            file_id,
            Self::retry_after(&response.headers),
        ))
    }

    async fn send(
        &self,
        request: HttpRequest,
        file_id: Option<&str>,
    ) -> std::result::Result<HttpResponse, GoogleDriveError> {
        let response = self.http_client.execute(request).await?;
        Self::check_status(response, file_id)
    }

    fn multipart_body(boundary: &str, metadata: &[u8], mime_type: &str, content: &[u8]) -> Bytes {
        let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata);
        body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        Bytes::from(body)
    }

    /// Read up to `limit` bytes; fewer means the stream is exhausted.
    async fn read_chunk(content: &mut ByteStream, limit: usize) -> Result<Vec<u8>> {
        let mut chunk = Vec::with_capacity(limit.min(DEFAULT_UPLOAD_CHUNK_SIZE));
        (&mut *content)
            .take(limit as u64)
            .read_to_end(&mut chunk)
            .await?;
        Ok(chunk)
    }

    fn parse_uploaded(response: &HttpResponse) -> std::result::Result<DriveFile, GoogleDriveError> {
        response.json().map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse upload response: {}", e))
        })
    }

    async fn upload_multipart(
        &self,
        access_token: &str,
        mime_type: &str,
        metadata: &[u8],
        data: &[u8],
    ) -> std::result::Result<DriveFile, GoogleDriveError> {
        let boundary = format!("drive-files-{}", Uuid::new_v4().simple());

        let request = HttpRequest::new(HttpMethod::Post, DRIVE_UPLOAD_URL)
            .bearer_token(access_token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", boundary),
            )
            .body(Self::multipart_body(&boundary, metadata, mime_type, data));

        let response = self.send(request, None).await?;
        Self::parse_uploaded(&response)
    }

    /// Open a resumable session and send `first` followed by the rest of
    /// `content`, one chunk per request.
    ///
    /// One chunk is read ahead so the last request can carry the total size.
    async fn upload_resumable(
        &self,
        access_token: &str,
        mime_type: &str,
        metadata: Vec<u8>,
        first: Vec<u8>,
        content: &mut ByteStream,
    ) -> Result<(DriveFile, u64)> {
        let request = HttpRequest::new(HttpMethod::Post, DRIVE_RESUMABLE_UPLOAD_URL)
            .bearer_token(access_token)
            .header("Content-Type", "application/json; charset=UTF-8")
            .header("X-Upload-Content-Type", mime_type)
            .body(Bytes::from(metadata));
        let response = self.send(request, None).await?;
        let session_url = Self::header(&response.headers, "location")
            .map(str::to_string)
            .ok_or_else(|| {
                GoogleDriveError::ParseError(
                    "Resumable upload session has no Location header".to_string(),
                )
            })?;
        debug!("Opened resumable upload session");

        let mut offset: u64 = 0;
        let mut chunk = first;
        loop {
            let next = Self::read_chunk(content, self.upload_chunk_size).await?;
            let end = offset + chunk.len() as u64;
            let last = next.is_empty();
            let content_range = if last {
                format!("bytes {}-{}/{}", offset, end - 1, end)
            } else {
                format!("bytes {}-{}/*", offset, end - 1)
            };

            let request = HttpRequest::new(HttpMethod::Put, session_url.as_str())
                .bearer_token(access_token)
                .header("Content-Range", content_range)
                .body(Bytes::from(chunk));
            let response = self.http_client.execute(request).await?;

            if response.status == RESUME_INCOMPLETE && !last {
                let acknowledged = Self::acknowledged_end(&response.headers);
                if acknowledged != Some(end - 1) {
                    warn!(?acknowledged, expected = end - 1, "Upload chunk not fully acknowledged");
                    return Err(GoogleDriveError::ParseError(format!(
                        "Drive acknowledged {} of {} uploaded bytes",
                        acknowledged.map_or(0, |e| e + 1),
                        end
                    ))
                    .into());
                }
                debug!(bytes = end, "Upload chunk acknowledged");
            } else {
                let response = Self::check_status(response, None)?;
                if !last {
                    return Err(GoogleDriveError::ApiError {
                        status_code: response.status,
                        message: "upload session closed before the last chunk".to_string(),
                    }
                    .into());
                }
                return Ok((Self::parse_uploaded(&response)?, end));
            }

            offset = end;
            chunk = next;
        }
    }
}

#[async_trait]
impl RemoteFileClient for GoogleDriveConnector {
    #[instrument(skip_all)]
    async fn list_owned_files(&self, access_token: &str) -> Result<Vec<RemoteFile>> {
        info!("Listing files from Google Drive");

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let request = HttpRequest::new(HttpMethod::Get, Self::list_url(page_token.as_deref()))
                .bearer_token(access_token)
                .header("Accept", "application/json");

            let response = self.send(request, None).await?;
            let page: FilesListResponse = response.json().map_err(|e| {
                GoogleDriveError::ParseError(format!("Failed to parse files list response: {}", e))
            })?;

            debug!(page_size = page.files.len(), "Received listing page");
            files.extend(page.files.into_iter().map(Self::convert_file));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(file_count = files.len(), "Listed files from Google Drive");
        Ok(files)
    }

    #[instrument(skip(self, access_token, content), fields(name = %name, mime_type = %mime_type))]
    async fn upload_file(
        &self,
        access_token: &str,
        name: &str,
        mime_type: &str,
        mut content: ByteStream,
    ) -> Result<UploadedFile> {
        let metadata = serde_json::to_vec(&UploadMetadata { name, mime_type }).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to encode upload metadata: {}", e))
        })?;

        let first = Self::read_chunk(&mut content, self.upload_chunk_size).await?;
        let (uploaded, bytes) = if first.len() < self.upload_chunk_size {
            let uploaded = self
                .upload_multipart(access_token, mime_type, &metadata, &first)
                .await?;
            (uploaded, first.len() as u64)
        } else {
            self.upload_resumable(access_token, mime_type, metadata, first, &mut content)
                .await?
        };

        info!(file_id = %uploaded.id, bytes, "Uploaded file to Google Drive");
        Ok(UploadedFile {
            id: uploaded.id,
            name: uploaded.name,
            mime_type: uploaded.mime_type,
        })
    }

    #[instrument(skip(self, access_token), fields(file_id = %remote_file_id))]
    async fn get_file_metadata_and_content(
        &self,
        access_token: &str,
        remote_file_id: &str,
    ) -> Result<FileDownload> {
        let url = format!("{}?fields={}", Self::file_url(remote_file_id), FILE_FIELDS);
        let request = HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(access_token)
            .header("Accept", "application/json");

        let response = self.send(request, Some(remote_file_id)).await?;
        let drive_file: DriveFile = response.json().map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse file metadata: {}", e))
        })?;

        let url = format!("{}?alt=media", Self::file_url(remote_file_id));
        let request = HttpRequest::new(HttpMethod::Get, url).bearer_token(access_token);
        let stream = self.http_client.execute_stream(request).await?;

        if !stream.is_success() {
            warn!(status = stream.status, "Content download failed");
            return Err(GoogleDriveError::from_status(
                stream.status,
                "content download failed".to_string(),
                Some(remote_file_id),
                Self::retry_after(&stream.headers),
            )
            .into());
        }

        info!("Opened download stream");
        Ok(FileDownload {
            file: Self::convert_file(drive_file),
            content: stream.body,
        })
    }

    #[instrument(skip(self, access_token), fields(file_id = %remote_file_id))]
    async fn delete_file(&self, access_token: &str, remote_file_id: &str) -> Result<()> {
        let request = HttpRequest::new(HttpMethod::Delete, Self::file_url(remote_file_id))
            .bearer_token(access_token);

        self.send(request, Some(remote_file_id)).await?;

        info!("Deleted file from Google Drive");
        Ok(())
    }
}
