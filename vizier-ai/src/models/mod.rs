//! Data models for vizier-ai
//!
//! Plain data shared by the job store, the analyzer clients and the
//! orchestrator.

pub mod analysis;
pub mod image_metadata;
pub mod image_record;
pub mod image_status;
pub mod prompt_catalog;
pub mod result_record;

pub use analysis::{AnalysisTask, AnalyzerKind, AnalyzerTarget, VisualMode, VisualOperation};
pub use image_metadata::{ImageMetadata, PerceptualHashes};
pub use image_record::{ImageRecord, Outcome, StoreStats, StoredResult};
pub use image_status::ImageStatus;
pub use prompt_catalog::{PromptCatalog, PromptDefinition};
pub use result_record::{Analysis, ErrorEntry, FileInfo, ProcessingInfo, ResultRecord};
