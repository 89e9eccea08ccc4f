//! # Sync Module
//!
//! Keeps a local, per-user copy of the remote file listing.
//!
//! ## Overview
//!
//! [`MetadataCache`] answers listing requests from the local file index while
//! the cached set is fresh, and rebuilds it from the remote service when it
//! is not:
//! - Empty sets and sets with any unstamped or aged record are stale
//! - Resynchronization is single-flighted per user
//! - Uploads and deletes confirmed remotely are applied as point updates
//!
//! A failed resynchronization leaves the user's cache empty, so the next read
//! retries from scratch instead of serving data from before the failure.

pub mod cache;
pub mod error;

pub use cache::{MetadataCache, MetadataCacheConfig};
pub use error::{Result, SyncError};
