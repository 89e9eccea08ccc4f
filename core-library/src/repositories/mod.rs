//! # Repository Pattern Implementation
//!
//! Repository traits with SQLite implementations built on `sqlx`.
//!
//! ## Available Repositories
//!
//! - `FileIndexStore` - Per-user cached remote file listing

pub mod file_index;

pub use file_index::{FileIndexStore, SqliteFileIndexStore};
