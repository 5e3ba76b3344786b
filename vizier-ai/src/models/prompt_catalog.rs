//! LLM prompt catalog
//!
//! Maps prompt ids to `{title, prompt_text, temperature, max_tokens}`. Loaded
//! once at startup and shared read-only. The on-disk JSON format uses
//! upper-case keys:
//!
//! ```json
//! {"P1": {"TITLE": "...", "PROMPT_TEXT": "...", "TEMPERATURE": 0.7, "MAX_TOKENS": 3000}}
//! ```

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One prompt definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDefinition {
    #[serde(rename = "TITLE")]
    pub title: String,
    #[serde(rename = "PROMPT_TEXT")]
    pub prompt_text: String,
    #[serde(rename = "TEMPERATURE")]
    pub temperature: f64,
    #[serde(rename = "MAX_TOKENS")]
    pub max_tokens: u32,
}

impl PromptDefinition {
    fn validate(&self, id: &str) -> PipelineResult<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(PipelineError::Config(format!(
                "Prompt {}: temperature {} outside 0.0..=1.0",
                id, self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(PipelineError::Config(format!(
                "Prompt {}: max_tokens must be positive",
                id
            )));
        }
        if self.prompt_text.trim().is_empty() {
            return Err(PipelineError::Config(format!(
                "Prompt {}: prompt text is empty",
                id
            )));
        }
        Ok(())
    }
}

/// Validated prompt catalog
#[derive(Debug, Clone, PartialEq)]
pub struct PromptCatalog {
    prompts: BTreeMap<String, PromptDefinition>,
}

impl PromptCatalog {
    /// Build from definitions, validating each entry
    pub fn new(prompts: BTreeMap<String, PromptDefinition>) -> PipelineResult<Self> {
        if prompts.is_empty() {
            return Err(PipelineError::Config("Prompt catalog is empty".to_string()));
        }
        for (id, prompt) in &prompts {
            prompt.validate(id)?;
        }
        Ok(Self { prompts })
    }

    /// Parse catalog JSON
    pub fn from_json(json: &str) -> PipelineResult<Self> {
        let prompts: BTreeMap<String, PromptDefinition> = serde_json::from_str(json)
            .map_err(|e| PipelineError::Config(format!("Invalid prompt catalog: {}", e)))?;
        Self::new(prompts)
    }

    /// Load a catalog file
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Cannot read prompt catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        let catalog = Self::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            prompts = catalog.len(),
            "Loaded prompt catalog"
        );
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&PromptDefinition> {
        self.prompts.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

impl Default for PromptCatalog {
    /// Built-in catalog used when no catalog file is configured
    fn default() -> Self {
        let mut prompts = BTreeMap::new();
        prompts.insert(
            "P1".to_string(),
            PromptDefinition {
                title: "Detailed Image Description".to_string(),
                prompt_text: "Describe the contents of this image accurately and thoroughly. \
                    Identify the main subject first, then the setting (indoors or outdoors, \
                    time of day if visible). Cover people, objects, animals, natural elements \
                    and structures, noting colors, positions and sizes. Describe the palette \
                    and lighting, transcribe any visible text, and comment on the composition \
                    from foreground to background. Mention anything unclear. Use plain language \
                    suitable for someone who cannot see the image and stick to observable \
                    details."
                    .to_string(),
                temperature: 0.7,
                max_tokens: 3000,
            },
        );
        prompts.insert(
            "P2".to_string(),
            PromptDefinition {
                title: "Art Critique from Multiple Perspectives".to_string(),
                prompt_text: "Critique this image as an art critic would, from each of these \
                    viewpoints in turn: the artist, a gallery owner, a curator, a 12-year-old, \
                    a 19-year-old and a 50-year-old. For each viewpoint discuss the visual \
                    elements (composition, color, style, technique), the emotional impact, \
                    possible meaning or symbolism, and relevant trends or historical context. \
                    Wrap each viewpoint in its own tag inside a <critique> element and keep \
                    every critique distinct, insightful and constructive."
                    .to_string(),
                temperature: 0.8,
                max_tokens: 2000,
            },
        );
        Self { prompts }
    }
}
