//! # Host Bridge Traits
//!
//! Collaborator traits the core depends on but does not implement itself.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations, buffered or streamed
//! - [`RemoteFileClient`](storage::RemoteFileClient) - List, upload, download and
//!   delete files in the remote storage service
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError`
//! and keep the remote status code when there is one.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{ByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, StreamingResponse};
pub use storage::{FileDownload, RemoteFile, RemoteFileClient, UploadedFile};
pub use time::{Clock, LogLevel, ManualClock, SystemClock};
