//! Image rows: dedup gate, status lifecycle, advisory metadata

use super::{parse_timestamp, parse_uuid, JobStore};
use crate::models::{ImageMetadata, ImageRecord, ImageStatus, PerceptualHashes, StoreStats};
use crate::services::fingerprinter::hamming_distance;
use crate::utils::retry_on_lock;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;
use vizier_common::{Error, Result};

/// Result of the dedup upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub image_id: Uuid,
    /// Status as stored after the upsert (unchanged for existing rows)
    pub status: ImageStatus,
    /// False when the fingerprint already existed
    pub inserted: bool,
}

const IMAGE_COLUMNS: &str = "guid, fingerprint, filename, directory, byte_size, status, \
    discovered_at, last_processed, processing_ms, average_hash, difference_hash, \
    perceptual_hash, metadata";

impl JobStore {
    /// Insert a new image in `pending`, or return the existing row untouched.
    ///
    /// The insert is a single `ON CONFLICT DO NOTHING` statement, so workers
    /// racing on one fingerprint all observe the same image id.
    pub async fn upsert_image(
        &self,
        fingerprint: &str,
        filename: &str,
        directory: Option<&str>,
        byte_size: u64,
    ) -> Result<UpsertOutcome> {
        let new_id = Uuid::new_v4().to_string();
        let new_id = new_id.as_str();
        let discovered_at = Utc::now().to_rfc3339();
        let discovered_at = discovered_at.as_str();
        let byte_size = byte_size as i64;
        let pool = &self.pool;

        let (guid, status, inserted) = retry_on_lock("upsert_image", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO images (guid, fingerprint, filename, directory, byte_size, status, discovered_at)
                VALUES (?, ?, ?, ?, ?, 'pending', ?)
                ON CONFLICT(fingerprint) DO NOTHING
                "#,
            )
            .bind(new_id)
            .bind(fingerprint)
            .bind(filename)
            .bind(directory)
            .bind(byte_size)
            .bind(discovered_at)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;

            let row: (String, String) =
                sqlx::query_as("SELECT guid, status FROM images WHERE fingerprint = ?")
                    .bind(fingerprint)
                    .fetch_one(&mut *tx)
                    .await?;

            tx.commit().await?;
            Ok((row.0, row.1, inserted))
        })
        .await?;

        let image_id = parse_uuid(&guid)?;
        let status = status.parse::<ImageStatus>().map_err(Error::Internal)?;

        if inserted {
            tracing::debug!(fingerprint, image_id = %image_id, "Registered new image");
        } else {
            tracing::debug!(
                fingerprint,
                image_id = %image_id,
                status = %status,
                "Fingerprint already known"
            );
        }

        Ok(UpsertOutcome {
            image_id,
            status,
            inserted,
        })
    }

    /// True iff the fingerprint's status is `completed`
    pub async fn is_completed(&self, fingerprint: &str) -> Result<bool> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM images WHERE fingerprint = ?")
                .bind(fingerprint)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status.as_deref() == Some(ImageStatus::Completed.as_str()))
    }

    /// Set status and stamp `last_processed`.
    ///
    /// Backward transitions are not rejected here; callers only move forward.
    pub async fn set_status(&self, image_id: Uuid, status: ImageStatus) -> Result<()> {
        let id = image_id.to_string();
        let id = id.as_str();
        let now = Utc::now().to_rfc3339();
        let now = now.as_str();
        let pool = &self.pool;

        let updated = retry_on_lock("set_status", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;
            let updated = sqlx::query("UPDATE images SET status = ?, last_processed = ? WHERE guid = ?")
                .bind(status.as_str())
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tx.commit().await?;
            Ok(updated)
        })
        .await?;

        if updated == 0 {
            return Err(Error::NotFound(format!("Image {}", image_id)));
        }

        tracing::debug!(image_id = %image_id, status = %status, "Image status updated");
        Ok(())
    }

    pub async fn record_processing_time(&self, image_id: Uuid, processing_ms: u64) -> Result<()> {
        let id = image_id.to_string();
        let id = id.as_str();
        let ms = processing_ms as i64;
        let pool = &self.pool;

        retry_on_lock("record_processing_time", self.max_lock_wait_ms, || async move {
            sqlx::query("UPDATE images SET processing_ms = ? WHERE guid = ?")
                .bind(ms)
                .bind(id)
                .execute(pool)
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn record_perceptual_hashes(&self, image_id: Uuid, hashes: &PerceptualHashes) -> Result<()> {
        let id = image_id.to_string();
        let id = id.as_str();
        let pool = &self.pool;

        retry_on_lock("record_perceptual_hashes", self.max_lock_wait_ms, || async move {
            sqlx::query(
                "UPDATE images SET average_hash = ?, difference_hash = ?, perceptual_hash = ? WHERE guid = ?",
            )
            .bind(&hashes.average)
            .bind(&hashes.difference)
            .bind(&hashes.frequency)
            .bind(id)
            .execute(pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn record_metadata(&self, image_id: Uuid, metadata: &ImageMetadata) -> Result<()> {
        let id = image_id.to_string();
        let id = id.as_str();
        let json = serde_json::to_string(metadata)
            .map_err(|e| Error::Internal(format!("Failed to serialize metadata: {}", e)))?;
        let json = json.as_str();
        let pool = &self.pool;

        retry_on_lock("record_metadata", self.max_lock_wait_ms, || async move {
            sqlx::query("UPDATE images SET metadata = ? WHERE guid = ?")
                .bind(json)
                .bind(id)
                .execute(pool)
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn get_image(&self, fingerprint: &str) -> Result<Option<ImageRecord>> {
        let sql = format!("SELECT {} FROM images WHERE fingerprint = ?", IMAGE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(image_from_row).transpose()
    }

    pub async fn get_image_by_id(&self, image_id: Uuid) -> Result<Option<ImageRecord>> {
        let sql = format!("SELECT {} FROM images WHERE guid = ?", IMAGE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(image_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(image_from_row).transpose()
    }

    /// Images in discovery order, optionally filtered by status
    pub async fn list_images(&self, status: Option<ImageStatus>) -> Result<Vec<ImageRecord>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM images WHERE status = ? ORDER BY discovered_at, filename",
                    IMAGE_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM images ORDER BY discovered_at, filename",
                    IMAGE_COLUMNS
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.iter().map(image_from_row).collect()
    }

    /// Images whose difference hash is within `max_distance` bits of `difference_hash`,
    /// nearest first
    pub async fn find_similar(
        &self,
        difference_hash: &str,
        max_distance: u32,
        exclude: Option<Uuid>,
    ) -> Result<Vec<(ImageRecord, u32)>> {
        let sql = format!(
            "SELECT {} FROM images WHERE difference_hash IS NOT NULL",
            IMAGE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut matches = Vec::new();
        for row in &rows {
            let image = image_from_row(row)?;
            if Some(image.image_id) == exclude {
                continue;
            }
            let Some(hashes) = &image.perceptual_hashes else {
                continue;
            };
            if let Some(distance) = hamming_distance(difference_hash, &hashes.difference) {
                if distance <= max_distance {
                    matches.push((image, distance));
                }
            }
        }

        matches.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.filename.cmp(&b.0.filename)));
        Ok(matches)
    }

    /// Counts per status and total result entries
    pub async fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();

        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM images GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        for (status, count) in rows {
            let count = count as u64;
            stats.total_images += count;
            match status.parse::<ImageStatus>() {
                Ok(ImageStatus::Pending) => stats.pending = count,
                Ok(ImageStatus::Processing) => stats.processing = count,
                Ok(ImageStatus::Completed) => stats.completed = count,
                Ok(ImageStatus::Failed) => stats.failed = count,
                Err(e) => tracing::warn!("{}", e),
            }
        }

        let (total, errors): (i64, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), SUM(CASE WHEN outcome = 'error' THEN 1 ELSE 0 END) FROM analysis_results",
        )
        .fetch_one(&self.pool)
        .await?;
        stats.total_results = total as u64;
        stats.error_results = errors.unwrap_or(0) as u64;

        Ok(stats)
    }
}

fn image_from_row(row: &SqliteRow) -> Result<ImageRecord> {
    let guid: String = row.get("guid");
    let status: String = row.get("status");
    let discovered_at: String = row.get("discovered_at");
    let last_processed: Option<String> = row.get("last_processed");
    let processing_ms: Option<i64> = row.get("processing_ms");
    let byte_size: i64 = row.get("byte_size");

    let average: Option<String> = row.get("average_hash");
    let difference: Option<String> = row.get("difference_hash");
    let frequency: Option<String> = row.get("perceptual_hash");
    let perceptual_hashes = match (average, difference, frequency) {
        (Some(average), Some(difference), Some(frequency)) => Some(PerceptualHashes {
            average,
            difference,
            frequency,
        }),
        _ => None,
    };

    let metadata: Option<String> = row.get("metadata");
    let metadata = match metadata {
        Some(json) => match serde_json::from_str::<ImageMetadata>(&json) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(image_id = %guid, "Ignoring unreadable stored metadata: {}", e);
                None
            }
        },
        None => None,
    };

    Ok(ImageRecord {
        image_id: parse_uuid(&guid)?,
        fingerprint: row.get("fingerprint"),
        filename: row.get("filename"),
        directory: row.get("directory"),
        byte_size: byte_size.max(0) as u64,
        status: status.parse::<ImageStatus>().map_err(Error::Internal)?,
        discovered_at: parse_timestamp(&discovered_at)?,
        last_processed: last_processed.as_deref().map(parse_timestamp).transpose()?,
        processing_ms: processing_ms.map(|ms| ms.max(0) as u64),
        perceptual_hashes,
        metadata,
    })
}
