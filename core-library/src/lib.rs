//! # Library Persistence Module
//!
//! Owns the SQLite database shared by the credential store and the file index.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pooling and schema migrations ([`db`])
//! - Shared identifiers and the cached file model ([`models`])
//! - The per-user file index repository ([`repositories`])

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{CachedFileRecord, UserId};
pub use repositories::{FileIndexStore, SqliteFileIndexStore};
