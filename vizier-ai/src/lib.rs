//! vizier-ai library interface
//!
//! Content-addressed image analysis pipeline: fingerprint, deduplicate,
//! preprocess, fan out to the configured analyzers and persist every
//! outcome in the SQLite job store.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::{AnalysisConfig, FileConfig};
pub use crate::db::JobStore;
pub use crate::error::{CallFailure, FailureKind, PipelineError, PipelineResult};
pub use crate::models::{ImageStatus, ResultRecord};
pub use crate::services::{AnalysisOrchestrator, BatchRunner, BatchSummary};
