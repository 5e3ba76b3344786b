//! Job store and pipeline construction for tests

use std::sync::Arc;
use tempfile::TempDir;
use vizier_ai::config::{AnalysisConfig, FileConfig, LlmModelSection};
use vizier_ai::db::JobStore;
use vizier_ai::services::AnalysisOrchestrator;

/// Fresh job store in a temporary directory.
///
/// The `TempDir` must outlive the store.
pub async fn test_store() -> (TempDir, JobStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = JobStore::open(&temp_dir.path().join("vizier.db"))
        .await
        .unwrap();
    (temp_dir, store)
}

/// Visual classifier only, pointed at `base_url`, no retry delay
pub fn visual_file_config(base_url: &str, modes: &[&str], max_attempts: u32) -> FileConfig {
    let mut file = FileConfig::default();
    file.visual.enabled = true;
    file.visual.base_url = base_url.to_string();
    file.visual.modes = modes.iter().map(|m| m.to_string()).collect();
    file.visual.operations = vec!["prompt".to_string()];
    file.visual.timeout_secs = 5;
    file.llm.enabled = false;
    file.retry.max_attempts = max_attempts;
    file.retry.delay_ms = 0;
    file.pipeline.concurrency = 4;
    file
}

/// Add the LLM analyzer at `{base_url}/v1/chat/completions`
pub fn with_llm(mut file: FileConfig, base_url: &str, prompts: &[&str], timeout_secs: u64) -> FileConfig {
    file.llm.enabled = true;
    file.llm.url = Some(format!("{}/v1/chat/completions", base_url));
    file.llm.api_key = Some("test-key".to_string());
    file.llm.model = "vision-test".to_string();
    file.llm.prompts = prompts.iter().map(|p| p.to_string()).collect();
    file.llm.timeout_secs = timeout_secs;
    file
}

/// Add an `[[llm.models]]` entry served at `{base_url}/{title}/v1/chat/completions`
/// with model `{title}-model` and key `{title}-key`
pub fn with_llm_model(mut file: FileConfig, base_url: &str, title: &str, prompts: &[&str]) -> FileConfig {
    file.llm.enabled = true;
    file.llm.models.push(LlmModelSection {
        title: Some(title.to_string()),
        url: Some(format!("{}/{}/v1/chat/completions", base_url, title)),
        api_key: Some(format!("{}-key", title)),
        model: format!("{}-model", title),
        prompts: Some(prompts.iter().map(|p| p.to_string()).collect()),
        timeout_secs: Some(5),
    });
    file
}

pub fn orchestrator(file: &FileConfig, store: JobStore) -> Arc<AnalysisOrchestrator> {
    let config = Arc::new(AnalysisConfig::from_file_config(file).unwrap());
    Arc::new(AnalysisOrchestrator::new(config, store, None).unwrap())
}
