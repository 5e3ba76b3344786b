//! LLM chat-completion endpoint
//!
//! `POST {url}` with `Authorization: Bearer {key}` and a chat-completion
//! body carrying the prompt text and the image as a `data:` URL. The
//! response is returned verbatim.
//!
//! One endpoint exists per configured model; it only accepts tasks
//! addressed to that model.

use crate::config::LlmSettings;
use crate::models::{AnalysisTask, AnalyzerKind, PromptCatalog};
use crate::services::analyzer_client::{AnalyzerEndpoint, EndpointRequest};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LlmEndpoint {
    key: Option<String>,
    url: String,
    api_key: String,
    model: String,
    catalog: Arc<PromptCatalog>,
}

impl LlmEndpoint {
    pub fn new(settings: &LlmSettings, catalog: Arc<PromptCatalog>) -> Self {
        Self {
            key: settings.key.clone(),
            url: settings.url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            catalog,
        }
    }
}

impl AnalyzerEndpoint for LlmEndpoint {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Llm
    }

    fn build_request(&self, task: &AnalysisTask, payload: &str) -> Result<EndpointRequest, String> {
        let AnalysisTask::Llm { model, prompt_id } = task else {
            return Err(format!("{} is not an LLM task", task));
        };
        if *model != self.key {
            return Err(format!("{} is addressed to another LLM model", task));
        }
        let prompt = self
            .catalog
            .get(prompt_id)
            .ok_or_else(|| format!("Unknown prompt id '{}'", prompt_id))?;

        Ok(EndpointRequest {
            url: self.url.clone(),
            body: json!({
                "model": self.model,
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": prompt.prompt_text},
                        {"type": "image_url", "image_url": {"url": format!("data:image/jpeg;base64,{}", payload)}},
                    ],
                }],
                "temperature": prompt.temperature,
                "max_tokens": prompt.max_tokens,
            }),
            bearer_token: Some(self.api_key.clone()),
        })
    }
}
