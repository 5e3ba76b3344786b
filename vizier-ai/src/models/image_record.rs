//! Persisted rows of the job store

use crate::models::{AnalyzerKind, ImageMetadata, ImageStatus, PerceptualHashes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// One image ever seen, keyed by content fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_id: Uuid,
    pub fingerprint: String,
    pub filename: String,
    pub directory: Option<String>,
    pub byte_size: u64,
    pub status: ImageStatus,
    pub discovered_at: DateTime<Utc>,
    pub last_processed: Option<DateTime<Utc>>,
    pub processing_ms: Option<u64>,
    pub perceptual_hashes: Option<PerceptualHashes>,
    pub metadata: Option<ImageMetadata>,
}

/// Outcome of one analyzer/variant call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "error" => Ok(Outcome::Error),
            other => Err(format!("Unknown outcome: {}", other)),
        }
    }
}

/// Append-only analysis result entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub id: i64,
    pub image_id: Uuid,
    pub analyzer_kind: AnalyzerKind,
    pub variant: Option<String>,
    pub outcome: Outcome,
    /// Verbatim analyzer response, or an error envelope
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Aggregate store counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_images: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_results: u64,
    pub error_results: u64,
}
