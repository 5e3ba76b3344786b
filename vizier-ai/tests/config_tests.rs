//! Loading `vizier.toml` into a validated pipeline configuration

use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;
use vizier_ai::config::{AnalysisConfig, FileConfig, LLM_API_KEY_ENV, VISUAL_URL_ENV};
use vizier_ai::models::AnalysisTask;
use vizier_ai::services::{Backoff, RetryPolicy};
use vizier_common::config::load_toml_config;

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_full_config_file() {
    std::env::remove_var(VISUAL_URL_ENV);
    std::env::remove_var(LLM_API_KEY_ENV);

    let dir = TempDir::new().unwrap();
    let catalog = write(
        &dir,
        "prompts.json",
        r#"{"TAGS": {"TITLE": "Tags", "PROMPT_TEXT": "List tags.", "TEMPERATURE": 0.1, "MAX_TOKENS": 100}}"#,
    );
    let config_path = write(
        &dir,
        "vizier.toml",
        &format!(
            r#"
            [visual]
            base_url = "http://clip.local:7860/"
            modes = ["caption"]
            operations = ["prompt", "analyze"]

            [llm]
            enabled = true
            url = "https://llm.local/v1/chat/completions"
            api_key = "from-toml"
            model = "vision"
            prompts = ["TAGS"]
            prompt_catalog = "{}"

            [[llm.models]]
            title = "local"
            url = "http://ollama.local:11434/v1/chat/completions"
            api_key = "unused"
            model = "llava:13b"
            timeout_secs = 120

            [retry]
            max_attempts = 5
            backoff = "exponential"
            delay_ms = 100
            max_delay_ms = 1000

            [pipeline]
            concurrency = 2
            log_api_communication = true
            "#,
            catalog.display().to_string().replace('\\', "/")
        ),
    );

    let file: FileConfig = load_toml_config(Some(&config_path)).unwrap();
    let config = AnalysisConfig::from_file_config(&file).unwrap();

    assert_eq!(config.visual.as_ref().unwrap().base_url, "http://clip.local:7860");
    assert_eq!(config.llm.len(), 2);
    assert_eq!(config.llm[0].api_key, "from-toml");
    assert_eq!(config.llm[0].title, "vision");
    assert_eq!(config.llm[1].model, "llava:13b");
    assert_eq!(config.llm[1].timeout, Duration::from_secs(120));

    let variants: Vec<String> = config.tasks.iter().map(AnalysisTask::variant).collect();
    assert_eq!(
        variants,
        vec!["caption", "analyze:caption", "TAGS", "local:TAGS"]
    );

    assert_eq!(
        config.retry,
        RetryPolicy::new(
            5,
            Backoff::Exponential {
                initial: Duration::from_millis(100),
                factor: 2.0,
                max: Duration::from_millis(1000),
            }
        )
    );
    assert_eq!(config.concurrency, 2);
    assert!(config.log_api_communication);
    assert!(config.catalog.get("P1").is_none());
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    std::env::remove_var(VISUAL_URL_ENV);
    let dir = TempDir::new().unwrap();

    let file: FileConfig = load_toml_config(Some(&dir.path().join("absent.toml"))).unwrap();
    let config = AnalysisConfig::from_file_config(&file).unwrap();

    assert!(config.llm.is_empty());
    assert_eq!(config.tasks.len(), 2);
    assert!(!config.force_reprocess);
}

#[test]
#[serial]
fn test_unknown_mode_rejected_at_startup() {
    std::env::remove_var(VISUAL_URL_ENV);
    let dir = TempDir::new().unwrap();
    let config_path = write(&dir, "vizier.toml", "[visual]\nmodes = [\"psychic\"]\n");

    let file: FileConfig = load_toml_config(Some(&config_path)).unwrap();
    let err = AnalysisConfig::from_file_config(&file).unwrap_err();
    assert!(err.to_string().contains("psychic"));
}

#[test]
#[serial]
fn test_env_overrides_visual_url() {
    std::env::set_var(VISUAL_URL_ENV, "http://override:9000/");
    let config = AnalysisConfig::from_file_config(&FileConfig::default()).unwrap();
    std::env::remove_var(VISUAL_URL_ENV);

    assert_eq!(config.visual.unwrap().base_url, "http://override:9000");
}

#[test]
#[serial]
fn test_llm_without_key_is_config_error() {
    std::env::remove_var(LLM_API_KEY_ENV);
    let mut file = FileConfig::default();
    file.llm.enabled = true;
    file.llm.url = Some("https://llm.local/v1/chat/completions".to_string());

    let err = AnalysisConfig::from_file_config(&file).unwrap_err();
    assert!(err.to_string().contains(LLM_API_KEY_ENV));
}
