//! File index repository
//!
//! Durable record of each user's cached remote file listing.

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

use crate::error::{LibraryError, Result};
use crate::models::{millis_to_datetime, CachedFileRecord, UserId};

const TABLE: &str = "file_metadata";

/// Repository trait for a user's cached file listing.
///
/// Every call is atomic on its own. Callers that need read-modify-write
/// sequences to be serialized per user must do so themselves.
#[async_trait]
pub trait FileIndexStore: Send + Sync {
    /// All records for `user_id`, ordered by file name.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<CachedFileRecord>>;

    /// Swap the user's whole set for `records` in one transaction.
    async fn replace_all_for_user(
        &self,
        user_id: &UserId,
        records: &[CachedFileRecord],
    ) -> Result<()>;

    /// Remove every record for `user_id`, returning how many were removed.
    async fn delete_all_for_user(&self, user_id: &UserId) -> Result<u64>;

    /// Insert or replace one record keyed by `(user_id, remote_file_id)`.
    async fn upsert(&self, record: &CachedFileRecord) -> Result<()>;

    /// Remove one record. Returns `false` when it was not cached.
    async fn delete_by_remote_id(&self, user_id: &UserId, remote_file_id: &str) -> Result<bool>;

    async fn count_for_user(&self, user_id: &UserId) -> Result<u64>;
}

/// SQLite-backed [`FileIndexStore`].
pub struct SqliteFileIndexStore {
    pool: SqlitePool,
}

impl SqliteFileIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct FileMetadataRow {
    user_id: String,
    remote_file_id: String,
    file_name: String,
    mime_type: String,
    size_bytes: Option<i64>,
    last_synced_at_ms: Option<i64>,
}

impl TryFrom<FileMetadataRow> for CachedFileRecord {
    type Error = LibraryError;

    fn try_from(row: FileMetadataRow) -> Result<Self> {
        let size_bytes = row
            .size_bytes
            .map(|size| {
                u64::try_from(size).map_err(|_| LibraryError::CorruptRecord {
                    table: TABLE.to_string(),
                    message: format!("negative size for {}: {}", row.remote_file_id, size),
                })
            })
            .transpose()?;

        Ok(CachedFileRecord {
            user_id: UserId::new(row.user_id)?,
            last_synced_at: row
                .last_synced_at_ms
                .map(|ms| millis_to_datetime(TABLE, ms))
                .transpose()?,
            remote_file_id: row.remote_file_id,
            file_name: row.file_name,
            mime_type: row.mime_type,
            size_bytes,
        })
    }
}

fn size_to_db(record: &CachedFileRecord) -> Result<Option<i64>> {
    record
        .size_bytes
        .map(|size| {
            i64::try_from(size).map_err(|_| LibraryError::InvalidInput {
                field: "size_bytes".to_string(),
                message: format!("{} does not fit in a signed 64-bit column", size),
            })
        })
        .transpose()
}

const UPSERT_SQL: &str = "INSERT INTO file_metadata \
     (user_id, remote_file_id, file_name, mime_type, size_bytes, last_synced_at_ms) \
     VALUES (?, ?, ?, ?, ?, ?) \
     ON CONFLICT (user_id, remote_file_id) DO UPDATE SET \
     file_name = excluded.file_name, \
     mime_type = excluded.mime_type, \
     size_bytes = excluded.size_bytes, \
     last_synced_at_ms = excluded.last_synced_at_ms";

#[async_trait]
impl FileIndexStore for SqliteFileIndexStore {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<CachedFileRecord>> {
        let rows: Vec<FileMetadataRow> = sqlx::query_as(
            "SELECT user_id, remote_file_id, file_name, mime_type, size_bytes, last_synced_at_ms \
             FROM file_metadata WHERE user_id = ? ORDER BY file_name, remote_file_id",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Loaded cached file records");
        rows.into_iter().map(CachedFileRecord::try_from).collect()
    }

    #[instrument(skip(self, records), fields(user_id = %user_id, count = records.len()))]
    async fn replace_all_for_user(
        &self,
        user_id: &UserId,
        records: &[CachedFileRecord],
    ) -> Result<()> {
        if let Some(foreign) = records.iter().find(|r| &r.user_id != user_id) {
            return Err(LibraryError::InvalidInput {
                field: "records".to_string(),
                message: format!(
                    "record {} belongs to another user",
                    foreign.remote_file_id
                ),
            });
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM file_metadata WHERE user_id = ?")
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await?;

        for record in records {
            sqlx::query(UPSERT_SQL)
                .bind(record.user_id.as_str())
                .bind(&record.remote_file_id)
                .bind(&record.file_name)
                .bind(&record.mime_type)
                .bind(size_to_db(record)?)
                .bind(record.last_synced_at.map(|t| t.timestamp_millis()))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Replaced cached file records");
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn delete_all_for_user(&self, user_id: &UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_metadata WHERE user_id = ?")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, record), fields(user_id = %record.user_id, remote_file_id = %record.remote_file_id))]
    async fn upsert(&self, record: &CachedFileRecord) -> Result<()> {
        sqlx::query(UPSERT_SQL)
            .bind(record.user_id.as_str())
            .bind(&record.remote_file_id)
            .bind(&record.file_name)
            .bind(&record.mime_type)
            .bind(size_to_db(record)?)
            .bind(record.last_synced_at.map(|t| t.timestamp_millis()))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn delete_by_remote_id(&self, user_id: &UserId, remote_file_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM file_metadata WHERE user_id = ? AND remote_file_id = ?")
                .bind(user_id.as_str())
                .bind(remote_file_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_for_user(&self, user_id: &UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_metadata WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}
