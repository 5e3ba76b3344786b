//! Configuration for vizier-ai
//!
//! `vizier.toml` is deserialized into [`FileConfig`] (every key optional,
//! compiled defaults otherwise), environment overrides are applied, and the
//! result is validated once into an immutable [`AnalysisConfig`] that is
//! passed to the orchestrator at construction.
//!
//! Secret resolution priority: environment, then TOML. An `[[llm.models]]`
//! entry's own `api_key` takes precedence over both.

use crate::error::{PipelineError, PipelineResult};
use crate::models::{AnalysisTask, PromptCatalog, VisualMode, VisualOperation};
use crate::services::retry::{Backoff, RetryPolicy};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the LLM API key
pub const LLM_API_KEY_ENV: &str = "VIZIER_LLM_API_KEY";

/// Environment variable overriding the visual classifier base URL
pub const VISUAL_URL_ENV: &str = "VIZIER_VISUAL_URL";

// ============================================================================
// File representation
// ============================================================================

/// Raw `vizier.toml` contents
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub root_folder: Option<PathBuf>,
    pub visual: VisualSection,
    pub llm: LlmSection,
    pub retry: RetrySection,
    pub preprocess: PreprocessSection,
    pub pipeline: PipelineSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisualSection {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub modes: Vec<String>,
    pub operations: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for VisualSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:7860".to_string(),
            model: "ViT-L-14/openai".to_string(),
            modes: vec!["best".to_string(), "fast".to_string()],
            operations: vec!["prompt".to_string()],
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub enabled: bool,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    /// Display label for the configured model
    pub title: Option<String>,
    pub prompts: Vec<String>,
    /// JSON prompt catalog; built-in catalog when unset
    pub prompt_catalog: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Additional models, each run as its own analyzer target
    pub models: Vec<LlmModelSection>,
}

/// One `[[llm.models]]` entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmModelSection {
    /// Unique label, prefixed to this model's variants; the model name when unset
    pub title: Option<String>,
    pub url: Option<String>,
    /// Falls back to the shared `[llm]` key resolution when unset
    pub api_key: Option<String>,
    pub model: String,
    /// Falls back to `[llm] prompts`
    pub prompts: Option<Vec<String>>,
    /// Falls back to `[llm] timeout_secs`
    pub timeout_secs: Option<u64>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            api_key: None,
            model: String::new(),
            title: None,
            prompts: vec!["P1".to_string(), "P2".to_string()],
            prompt_catalog: None,
            timeout_secs: 60,
            models: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    /// "fixed" or "exponential"
    pub backoff: String,
    pub delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: "fixed".to_string(),
            delay_ms: 2000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessSection {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub max_payload_bytes: usize,
}

impl Default for PreprocessSection {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            jpeg_quality: 90,
            max_payload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub concurrency: usize,
    pub force_reprocess: bool,
    pub perceptual_hashes: bool,
    pub log_api_communication: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            concurrency: 4,
            force_reprocess: false,
            perceptual_hashes: true,
            log_api_communication: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// EnvFilter directive, e.g. "info" or "vizier_ai=debug"
    pub level: Option<String>,
}

// ============================================================================
// Validated configuration
// ============================================================================

/// Visual classifier endpoint settings
#[derive(Debug, Clone, PartialEq)]
pub struct VisualSettings {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Settings for one LLM model
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    /// `None` for the primary `[llm]` model, otherwise the entry title
    pub key: Option<String>,
    pub title: String,
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

/// Preprocessing limits
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessSettings {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    /// Upper bound on the base64 payload length
    pub max_payload_bytes: usize,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        let section = PreprocessSection::default();
        Self {
            max_dimension: section.max_dimension,
            jpeg_quality: section.jpeg_quality,
            max_payload_bytes: section.max_payload_bytes,
        }
    }
}

/// Immutable, validated pipeline configuration
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub visual: Option<VisualSettings>,
    /// Primary model first, then `[[llm.models]]` in file order
    pub llm: Vec<LlmSettings>,
    /// Analyzer/variant pairs run for every image, in dispatch order
    pub tasks: Vec<AnalysisTask>,
    pub catalog: Arc<PromptCatalog>,
    pub retry: RetryPolicy,
    pub preprocess: PreprocessSettings,
    pub concurrency: usize,
    pub force_reprocess: bool,
    pub perceptual_hashes: bool,
    pub log_api_communication: bool,
}

impl AnalysisConfig {
    /// Validate file configuration, applying environment overrides
    pub fn from_file_config(file: &FileConfig) -> PipelineResult<Self> {
        let retry = build_retry_policy(&file.retry)?;
        let preprocess = build_preprocess(&file.preprocess)?;

        let mut tasks = Vec::new();

        let visual = if file.visual.enabled {
            let base_url = std::env::var(VISUAL_URL_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| file.visual.base_url.clone());
            if base_url.trim().is_empty() {
                return Err(PipelineError::Config(
                    "Visual classifier enabled but base_url is empty".to_string(),
                ));
            }

            let operations = parse_all::<VisualOperation>(&file.visual.operations)?;
            let modes = parse_all::<VisualMode>(&file.visual.modes)?;
            if modes.is_empty() || operations.is_empty() {
                warn!("Visual classifier enabled with no modes or operations configured");
            }
            for operation in &operations {
                for mode in &modes {
                    tasks.push(AnalysisTask::Visual {
                        operation: *operation,
                        mode: *mode,
                    });
                }
            }

            Some(VisualSettings {
                base_url: base_url.trim_end_matches('/').to_string(),
                model: file.visual.model.clone(),
                timeout: timeout_from_secs(file.visual.timeout_secs, "visual")?,
            })
        } else {
            None
        };

        let catalog = match &file.llm.prompt_catalog {
            Some(path) => PromptCatalog::load(path)?,
            None => PromptCatalog::default(),
        };

        let mut llm = Vec::new();
        if file.llm.enabled {
            if let Some(url) = file.llm.url.clone().filter(|u| !u.trim().is_empty()) {
                let api_key = resolve_llm_api_key(file.llm.api_key.as_deref())?;
                push_llm_tasks(&mut tasks, &catalog, None, &file.llm.prompts)?;
                llm.push(LlmSettings {
                    key: None,
                    title: file
                        .llm
                        .title
                        .clone()
                        .unwrap_or_else(|| file.llm.model.clone()),
                    url,
                    api_key,
                    model: file.llm.model.clone(),
                    timeout: timeout_from_secs(file.llm.timeout_secs, "llm")?,
                });
            }

            let mut titles = HashSet::new();
            for (index, entry) in file.llm.models.iter().enumerate() {
                let settings = build_llm_model(&file.llm, entry, index + 1)?;
                if !titles.insert(settings.title.clone()) {
                    return Err(PipelineError::Config(format!(
                        "Duplicate [[llm.models]] title '{}'",
                        settings.title
                    )));
                }
                let prompts = entry.prompts.as_ref().unwrap_or(&file.llm.prompts);
                push_llm_tasks(&mut tasks, &catalog, settings.key.as_deref(), prompts)?;
                llm.push(settings);
            }

            if llm.is_empty() {
                return Err(PipelineError::Config(
                    "LLM enabled but neither [llm] url nor any [[llm.models]] entry is set"
                        .to_string(),
                ));
            }
        }

        dedup_tasks(&mut tasks);

        if tasks.is_empty() {
            warn!("No analyzer tasks configured; every image will end failed");
        }

        if file.pipeline.concurrency == 0 {
            return Err(PipelineError::Config(
                "[pipeline] concurrency must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            visual,
            llm,
            tasks,
            catalog: Arc::new(catalog),
            retry,
            preprocess,
            concurrency: file.pipeline.concurrency,
            force_reprocess: file.pipeline.force_reprocess,
            perceptual_hashes: file.pipeline.perceptual_hashes,
            log_api_communication: file.pipeline.log_api_communication,
        })
    }
}

/// Resolve the LLM API key
///
/// **Priority:** ENV → TOML
pub fn resolve_llm_api_key(toml_key: Option<&str>) -> PipelineResult<String> {
    let env_key = std::env::var(LLM_API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("LLM API key found in environment and TOML. Using environment (highest priority).");
    }

    if let Some(key) = env_key {
        info!("LLM API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("LLM API key loaded from TOML config");
        return Ok(key.to_string());
    }

    Err(PipelineError::Config(format!(
        "LLM API key not configured. Set {} or [llm] api_key in vizier.toml",
        LLM_API_KEY_ENV
    )))
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn build_llm_model(
    shared: &LlmSection,
    entry: &LlmModelSection,
    position: usize,
) -> PipelineResult<LlmSettings> {
    let model = entry.model.trim();
    if model.is_empty() {
        return Err(PipelineError::Config(format!(
            "[[llm.models]] entry {} has no model",
            position
        )));
    }

    let title = entry
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(model)
        .to_string();
    if title.contains(':') {
        return Err(PipelineError::Config(format!(
            "LLM model title '{}' must not contain ':'",
            title
        )));
    }

    let url = entry
        .url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| PipelineError::Config(format!("LLM model '{}' has no url", title)))?;

    let api_key = match entry.api_key.as_deref().filter(|k| is_valid_key(k)) {
        Some(key) => key.to_string(),
        None => resolve_llm_api_key(shared.api_key.as_deref())?,
    };

    Ok(LlmSettings {
        key: Some(title.clone()),
        title,
        url,
        api_key,
        model: model.to_string(),
        timeout: timeout_from_secs(entry.timeout_secs.unwrap_or(shared.timeout_secs), "llm.models")?,
    })
}

fn push_llm_tasks(
    tasks: &mut Vec<AnalysisTask>,
    catalog: &PromptCatalog,
    model: Option<&str>,
    prompts: &[String],
) -> PipelineResult<()> {
    for id in prompts {
        if catalog.get(id).is_none() {
            return Err(PipelineError::Config(format!(
                "Unknown prompt id '{}' (catalog has: {})",
                id,
                catalog.ids().collect::<Vec<_>>().join(", ")
            )));
        }
        tasks.push(AnalysisTask::Llm {
            model: model.map(str::to_string),
            prompt_id: id.clone(),
        });
    }
    Ok(())
}

fn build_retry_policy(section: &RetrySection) -> PipelineResult<RetryPolicy> {
    if section.max_attempts == 0 {
        return Err(PipelineError::Config(
            "[retry] max_attempts must be at least 1".to_string(),
        ));
    }

    let backoff = match section.backoff.trim().to_ascii_lowercase().as_str() {
        "fixed" => Backoff::Fixed(Duration::from_millis(section.delay_ms)),
        "exponential" => Backoff::Exponential {
            initial: Duration::from_millis(section.delay_ms),
            factor: 2.0,
            max: Duration::from_millis(section.max_delay_ms.max(section.delay_ms)),
        },
        other => {
            return Err(PipelineError::Config(format!(
                "Unknown [retry] backoff '{}' (expected fixed or exponential)",
                other
            )))
        }
    };

    Ok(RetryPolicy::new(section.max_attempts, backoff))
}

fn build_preprocess(section: &PreprocessSection) -> PipelineResult<PreprocessSettings> {
    if section.max_dimension == 0 {
        return Err(PipelineError::Config(
            "[preprocess] max_dimension must be positive".to_string(),
        ));
    }
    if !(1..=100).contains(&section.jpeg_quality) {
        return Err(PipelineError::Config(format!(
            "[preprocess] jpeg_quality {} outside 1..=100",
            section.jpeg_quality
        )));
    }
    if section.max_payload_bytes == 0 {
        return Err(PipelineError::Config(
            "[preprocess] max_payload_bytes must be positive".to_string(),
        ));
    }
    Ok(PreprocessSettings {
        max_dimension: section.max_dimension,
        jpeg_quality: section.jpeg_quality,
        max_payload_bytes: section.max_payload_bytes,
    })
}

fn timeout_from_secs(secs: u64, section: &str) -> PipelineResult<Duration> {
    if secs == 0 {
        return Err(PipelineError::Config(format!(
            "[{}] timeout_secs must be positive",
            section
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_all<T>(values: &[String]) -> PipelineResult<Vec<T>>
where
    T: std::str::FromStr<Err = String>,
{
    values
        .iter()
        .map(|v| v.parse::<T>().map_err(PipelineError::Config))
        .collect()
}

fn dedup_tasks(tasks: &mut Vec<AnalysisTask>) {
    let mut seen = HashSet::new();
    tasks.retain(|task| seen.insert(task.clone()));
}
