//! Aggregated per-image result view
//!
//! A [`ResultRecord`] groups every analyzer outcome of one fingerprint:
//!
//! ```text
//! {file_info, processing_info{status, processing_time_ms, errors[]},
//!  analysis{visual{variant: payload}, llm{variant: payload}, metadata}}
//! ```
//!
//! It is produced by the orchestrator for one pass and only read downstream.

use crate::error::PipelineError;
use crate::models::{
    AnalyzerKind, ImageMetadata, ImageRecord, ImageStatus, Outcome, StoredResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub file_info: FileInfo,
    pub processing_info: ProcessingInfo,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub filename: String,
    pub directory: Option<String>,
    /// Absent when the file could not be read
    pub fingerprint: Option<String>,
    pub image_id: Option<Uuid>,
    pub byte_size: Option<u64>,
    pub discovered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub status: ImageStatus,
    pub processing_time_ms: u64,
    /// True when the record was served from the store without analyzer calls
    pub deduplicated: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub errors: Vec<ErrorEntry>,
}

/// One recorded failure, image-level or per analyzer/variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error class, e.g. "decode_error", "transport_error"
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<AnalyzerKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub message: String,
}

impl ErrorEntry {
    /// Image-level failure
    pub fn from_pipeline_error(err: &PipelineError) -> Self {
        Self {
            class: err.class().to_string(),
            analyzer: None,
            variant: None,
            message: err.to_string(),
        }
    }

    /// Per-variant failure reconstructed from a stored error envelope
    fn from_stored(result: &StoredResult) -> Self {
        let error = &result.payload["error"];
        let class = match error["kind"].as_str() {
            // Failed before any request was sent
            Some("empty_input") => "empty_input",
            Some("invalid_request") => "invalid_request",
            _ => "transport_error",
        };
        let message = match (error["kind"].as_str(), error["detail"].as_str()) {
            (Some(kind), Some(detail)) => format!(
                "{} after {} attempt(s): {}",
                kind,
                error["attempts"].as_u64().unwrap_or(0),
                detail
            ),
            _ => result.payload.to_string(),
        };
        Self {
            class: class.to_string(),
            analyzer: Some(result.analyzer_kind),
            variant: result.variant.clone(),
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Visual-classifier responses keyed by variant
    pub visual: BTreeMap<String, serde_json::Value>,
    /// LLM responses keyed by variant (`P1`, or `<model title>:P1` for additional models)
    pub llm: BTreeMap<String, serde_json::Value>,
    pub metadata: Option<ImageMetadata>,
}

impl ResultRecord {
    /// Record for a file that never reached the store (unreadable file)
    pub fn unstored(path: &Path, error: &PipelineError) -> Self {
        Self {
            file_info: FileInfo {
                path: path.display().to_string(),
                filename: file_name_of(path),
                directory: directory_of(path),
                fingerprint: None,
                image_id: None,
                byte_size: None,
                discovered_at: None,
            },
            processing_info: ProcessingInfo {
                status: ImageStatus::Failed,
                processing_time_ms: 0,
                deduplicated: false,
                processed_at: None,
                errors: vec![ErrorEntry::from_pipeline_error(error)],
            },
            analysis: Analysis::default(),
        }
    }

    /// Assemble from the stored image row and its newest result per variant.
    ///
    /// Successful entries populate `analysis`; error entries become
    /// `processing_info.errors`. `image_errors` carries pass-level failures
    /// (decode, encoding) that have no result entry.
    pub fn assemble(
        path: &Path,
        image: &ImageRecord,
        latest: &[StoredResult],
        image_errors: Vec<ErrorEntry>,
        deduplicated: bool,
    ) -> Self {
        let mut analysis = Analysis {
            metadata: image.metadata.clone(),
            ..Default::default()
        };
        let mut errors = image_errors;

        for result in latest {
            let variant = result.variant.clone().unwrap_or_default();
            match result.outcome {
                Outcome::Success => {
                    let target = match result.analyzer_kind {
                        AnalyzerKind::VisualClassifier => &mut analysis.visual,
                        AnalyzerKind::Llm => &mut analysis.llm,
                    };
                    target.insert(variant, result.payload.clone());
                }
                Outcome::Error => errors.push(ErrorEntry::from_stored(result)),
            }
        }

        Self {
            file_info: FileInfo {
                path: path.display().to_string(),
                filename: image.filename.clone(),
                directory: image.directory.clone(),
                fingerprint: Some(image.fingerprint.clone()),
                image_id: Some(image.image_id),
                byte_size: Some(image.byte_size),
                discovered_at: Some(image.discovered_at),
            },
            processing_info: ProcessingInfo {
                status: image.status,
                processing_time_ms: image.processing_ms.unwrap_or(0),
                deduplicated,
                processed_at: image.last_processed,
                errors,
            },
            analysis,
        }
    }

    pub fn status(&self) -> ImageStatus {
        self.processing_info.status
    }

    /// Number of successful analyzer/variant entries
    pub fn success_count(&self) -> usize {
        self.analysis.visual.len() + self.analysis.llm.len()
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn directory_of(path: &Path) -> Option<String> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(status: ImageStatus) -> ImageRecord {
        ImageRecord {
            image_id: Uuid::new_v4(),
            fingerprint: "ab".repeat(32),
            filename: "cat.jpg".to_string(),
            directory: Some("/photos".to_string()),
            byte_size: 17_000,
            status,
            discovered_at: Utc::now(),
            last_processed: Some(Utc::now()),
            processing_ms: Some(420),
            perceptual_hashes: None,
            metadata: None,
        }
    }

    fn stored(image_id: Uuid, kind: AnalyzerKind, variant: &str, outcome: Outcome, payload: serde_json::Value) -> StoredResult {
        StoredResult {
            id: 1,
            image_id,
            analyzer_kind: kind,
            variant: Some(variant.to_string()),
            outcome,
            payload,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_assemble_splits_successes_and_errors() {
        let img = image(ImageStatus::Completed);
        let results = vec![
            stored(img.image_id, AnalyzerKind::VisualClassifier, "fast", Outcome::Success, json!({"prompt": "a cat"})),
            stored(
                img.image_id,
                AnalyzerKind::Llm,
                "P1",
                Outcome::Error,
                json!({"error": {"kind": "timeout", "attempts": 3, "detail": "elapsed"}}),
            ),
        ];

        let record = ResultRecord::assemble(Path::new("/photos/cat.jpg"), &img, &results, vec![], false);

        assert_eq!(record.status(), ImageStatus::Completed);
        assert_eq!(record.analysis.visual["fast"], json!({"prompt": "a cat"}));
        assert!(record.analysis.llm.is_empty());
        assert_eq!(record.processing_info.errors.len(), 1);
        let err = &record.processing_info.errors[0];
        assert_eq!(err.analyzer, Some(AnalyzerKind::Llm));
        assert_eq!(err.variant.as_deref(), Some("P1"));
        assert_eq!(err.message, "timeout after 3 attempt(s): elapsed");
        assert_eq!(err.class, "transport_error");
        assert_eq!(record.success_count(), 1);
    }

    #[test]
    fn test_error_class_follows_failure_kind() {
        let img = image(ImageStatus::Failed);
        let envelope = |kind: &str| json!({"error": {"kind": kind, "attempts": 0, "detail": "x"}});
        let results = vec![
            stored(img.image_id, AnalyzerKind::Llm, "P1", Outcome::Error, envelope("invalid_request")),
            stored(img.image_id, AnalyzerKind::Llm, "P2", Outcome::Error, envelope("empty_input")),
            stored(img.image_id, AnalyzerKind::VisualClassifier, "fast", Outcome::Error, envelope("status")),
        ];

        let record = ResultRecord::assemble(Path::new("cat.jpg"), &img, &results, vec![], false);
        let classes: Vec<&str> = record
            .processing_info
            .errors
            .iter()
            .map(|e| e.class.as_str())
            .collect();
        assert_eq!(classes, vec!["invalid_request", "empty_input", "transport_error"]);
    }

    #[test]
    fn test_unstored_record_has_no_fingerprint() {
        let err = PipelineError::Read {
            path: "/missing.png".into(),
            detail: "No such file".into(),
        };
        let record = ResultRecord::unstored(Path::new("/missing.png"), &err);
        assert!(record.file_info.fingerprint.is_none());
        assert_eq!(record.status(), ImageStatus::Failed);
        assert_eq!(record.processing_info.errors[0].class, "read_error");
    }

    #[test]
    fn test_serialized_layout() {
        let img = image(ImageStatus::Failed);
        let record = ResultRecord::assemble(Path::new("cat.jpg"), &img, &[], vec![], true);
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["file_info"]["fingerprint"].is_string());
        assert_eq!(value["processing_info"]["status"], "failed");
        assert_eq!(value["processing_info"]["deduplicated"], true);
        assert!(value["analysis"]["visual"].is_object());
        assert!(value["analysis"]["llm"].is_object());
    }
}
