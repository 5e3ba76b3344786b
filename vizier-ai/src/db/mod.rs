//! Job store
//!
//! Durable record of every image ever seen, keyed by content fingerprint,
//! plus the append-only analysis result entries. The store is the only
//! shared mutable resource of a run; every write is one transaction and is
//! retried on `database is locked` (see [`crate::utils::retry_on_lock`]).

pub mod images;
pub mod results;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use vizier_common::db::{get_setting_i64, init_database, DatabaseOptions, MAX_LOCK_WAIT_MS_KEY};
use vizier_common::{Error, Result};

pub use images::UpsertOutcome;

/// Handle to the SQLite job store
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl JobStore {
    /// Open (or create) the store at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = init_database(db_path, &DatabaseOptions::default()).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an initialized pool, creating the job tables if missing
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_tables(&pool).await?;
        let max_lock_wait_ms = get_setting_i64(&pool, MAX_LOCK_WAIT_MS_KEY, 5000)
            .await?
            .max(0) as u64;
        Ok(Self {
            pool,
            max_lock_wait_ms,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn max_lock_wait_ms(&self) -> u64 {
        self.max_lock_wait_ms
    }
}

/// Create job store tables
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            guid TEXT PRIMARY KEY,
            fingerprint TEXT NOT NULL UNIQUE,
            filename TEXT NOT NULL,
            directory TEXT,
            byte_size INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
            discovered_at TEXT NOT NULL,
            last_processed TEXT,
            processing_ms INTEGER,
            average_hash TEXT,
            difference_hash TEXT,
            perceptual_hash TEXT,
            metadata TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_id TEXT NOT NULL REFERENCES images(guid) ON DELETE CASCADE,
            analyzer_kind TEXT NOT NULL,
            variant TEXT,
            outcome TEXT NOT NULL CHECK (outcome IN ('success', 'error')),
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_status ON images(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_results_image ON analysis_results(image_id, analyzer_kind, variant)",
    )
    .execute(pool)
    .await?;

    tracing::debug!("Job store tables initialized (images, analysis_results)");

    Ok(())
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}' in database: {}", value, e)))
}

pub(crate) fn parse_uuid(value: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID '{}' in database: {}", value, e)))
}
