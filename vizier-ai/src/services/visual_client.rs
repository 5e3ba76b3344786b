//! Visual classifier (CLIP interrogator) endpoint
//!
//! `POST {base}/interrogator/prompt` or `POST {base}/interrogator/analyze`
//! with `{image, model, mode}`. The response object is returned verbatim.

use crate::config::VisualSettings;
use crate::models::{AnalysisTask, AnalyzerKind};
use crate::services::analyzer_client::{AnalyzerEndpoint, EndpointRequest};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct VisualClassifierEndpoint {
    base_url: String,
    model: String,
}

impl VisualClassifierEndpoint {
    pub fn new(settings: &VisualSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        }
    }
}

impl AnalyzerEndpoint for VisualClassifierEndpoint {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::VisualClassifier
    }

    fn build_request(&self, task: &AnalysisTask, payload: &str) -> Result<EndpointRequest, String> {
        let AnalysisTask::Visual { operation, mode } = task else {
            return Err(format!("{} is not a visual classifier task", task));
        };

        Ok(EndpointRequest {
            url: format!("{}{}", self.base_url, operation.path()),
            body: json!({
                "image": payload,
                "model": self.model,
                "mode": mode.as_str(),
            }),
            bearer_token: None,
        })
    }
}
