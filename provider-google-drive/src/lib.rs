//! # Google Drive Provider
//!
//! Implements the `RemoteFileClient` trait for Google Drive API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - Listing of files owned by the authenticated user, across all pages
//! - Multipart uploads
//! - Streaming downloads
//! - Permanent deletes
//!
//! Non-success statuses are classified by [`GoogleDriveError`] and handed
//! back unchanged in status. Nothing is retried here.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{GoogleDriveConnector, DEFAULT_UPLOAD_CHUNK_SIZE};
pub use error::{GoogleDriveError, Result};
