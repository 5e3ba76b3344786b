//! Service modules for the image analysis pipeline

pub mod analyzer_client;
pub mod api_log;
pub mod batch_runner;
pub mod fingerprinter;
pub mod image_preprocessor;
pub mod image_scanner;
pub mod llm_client;
pub mod orchestrator;
pub mod retry;
pub mod visual_client;

pub use analyzer_client::{AnalyzerEndpoint, EndpointRequest, RetryingAnalyzerClient};
pub use api_log::{ApiExchange, ApiLogger};
pub use batch_runner::{BatchError, BatchRunner, BatchSummary};
pub use fingerprinter::{hamming_distance, ContentFingerprinter, FileFingerprint};
pub use image_preprocessor::{ImagePreprocessor, PreparedImage};
pub use image_scanner::{ImageScanner, ScanError};
pub use llm_client::LlmEndpoint;
pub use orchestrator::AnalysisOrchestrator;
pub use retry::{Backoff, RetryPolicy};
pub use visual_client::VisualClassifierEndpoint;
