//! Append-only analysis result entries
//!
//! Reprocessing appends; nothing is updated in place. The aggregate view
//! reads the newest entry per `(analyzer_kind, variant)`.

use super::{parse_timestamp, parse_uuid, JobStore};
use crate::models::{AnalyzerKind, Outcome, StoredResult};
use crate::utils::retry_on_lock;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;
use vizier_common::{Error, Result};

impl JobStore {
    /// Append one result entry, returning its row id
    pub async fn append_result(
        &self,
        image_id: Uuid,
        analyzer_kind: AnalyzerKind,
        variant: Option<&str>,
        outcome: Outcome,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        let id = image_id.to_string();
        let id = id.as_str();
        let payload_json = payload.to_string();
        let payload_json = payload_json.as_str();
        let created_at = Utc::now().to_rfc3339();
        let created_at = created_at.as_str();
        let pool = &self.pool;

        let row_id = retry_on_lock("append_result", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;
            let row_id = sqlx::query(
                r#"
                INSERT INTO analysis_results (image_id, analyzer_kind, variant, outcome, payload, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(analyzer_kind.as_str())
            .bind(variant)
            .bind(outcome.as_str())
            .bind(payload_json)
            .bind(created_at)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            tx.commit().await?;
            Ok(row_id)
        })
        .await?;

        tracing::debug!(
            image_id = %image_id,
            analyzer = %analyzer_kind,
            variant = variant.unwrap_or(""),
            outcome = outcome.as_str(),
            "Appended analysis result"
        );

        Ok(row_id)
    }

    /// Full history for an image, oldest first
    pub async fn results_for(&self, image_id: Uuid) -> Result<Vec<StoredResult>> {
        let rows = sqlx::query(
            r#"
            SELECT id, image_id, analyzer_kind, variant, outcome, payload, created_at
            FROM analysis_results
            WHERE image_id = ?
            ORDER BY id
            "#,
        )
        .bind(image_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(result_from_row).collect()
    }

    /// Newest entry per `(analyzer_kind, variant)`
    pub async fn latest_results(&self, image_id: Uuid) -> Result<Vec<StoredResult>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.image_id, r.analyzer_kind, r.variant, r.outcome, r.payload, r.created_at
            FROM analysis_results r
            WHERE r.image_id = ?
              AND r.id = (
                  SELECT MAX(r2.id) FROM analysis_results r2
                  WHERE r2.image_id = r.image_id
                    AND r2.analyzer_kind = r.analyzer_kind
                    AND r2.variant IS r.variant
              )
            ORDER BY r.analyzer_kind DESC, r.variant
            "#,
        )
        .bind(image_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(result_from_row).collect()
    }
}

fn result_from_row(row: &SqliteRow) -> Result<StoredResult> {
    let image_id: String = row.get("image_id");
    let kind: String = row.get("analyzer_kind");
    let outcome: String = row.get("outcome");
    let payload: String = row.get("payload");
    let created_at: String = row.get("created_at");

    Ok(StoredResult {
        id: row.get("id"),
        image_id: parse_uuid(&image_id)?,
        analyzer_kind: kind.parse::<AnalyzerKind>().map_err(Error::Internal)?,
        variant: row.get("variant"),
        outcome: outcome.parse::<Outcome>().map_err(Error::Internal)?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| Error::Internal(format!("Invalid result payload in database: {}", e)))?,
        created_at: parse_timestamp(&created_at)?,
    })
}
