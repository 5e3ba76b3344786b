//! Closed enumeration of analyzers, visual modes and per-pass tasks
//!
//! Every analyzer/variant a pass may run is one [`AnalysisTask`]. Unknown
//! kinds, modes or operations are rejected when configuration is parsed,
//! never at call time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Analyzer families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnalyzerKind {
    #[serde(rename = "visual-classifier")]
    VisualClassifier,
    #[serde(rename = "llm")]
    Llm,
}

impl AnalyzerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerKind::VisualClassifier => "visual-classifier",
            AnalyzerKind::Llm => "llm",
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyzerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visual-classifier" => Ok(AnalyzerKind::VisualClassifier),
            "llm" => Ok(AnalyzerKind::Llm),
            other => Err(format!("Unknown analyzer kind: {}", other)),
        }
    }
}

/// Interrogator modes accepted by the visual classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    Best,
    Fast,
    Classic,
    Negative,
    Caption,
}

impl VisualMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualMode::Best => "best",
            VisualMode::Fast => "fast",
            VisualMode::Classic => "classic",
            VisualMode::Negative => "negative",
            VisualMode::Caption => "caption",
        }
    }
}

impl FromStr for VisualMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(VisualMode::Best),
            "fast" => Ok(VisualMode::Fast),
            "classic" => Ok(VisualMode::Classic),
            "negative" => Ok(VisualMode::Negative),
            "caption" => Ok(VisualMode::Caption),
            other => Err(format!(
                "Unknown visual mode '{}' (expected best, fast, classic, negative or caption)",
                other
            )),
        }
    }
}

/// Interrogator endpoint selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualOperation {
    /// `POST {base}/interrogator/prompt`
    Prompt,
    /// `POST {base}/interrogator/analyze`
    Analyze,
}

impl VisualOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualOperation::Prompt => "prompt",
            VisualOperation::Analyze => "analyze",
        }
    }

    /// Path appended to the classifier base URL
    pub fn path(&self) -> &'static str {
        match self {
            VisualOperation::Prompt => "/interrogator/prompt",
            VisualOperation::Analyze => "/interrogator/analyze",
        }
    }
}

impl FromStr for VisualOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(VisualOperation::Prompt),
            "analyze" => Ok(VisualOperation::Analyze),
            other => Err(format!(
                "Unknown visual operation '{}' (expected prompt or analyze)",
                other
            )),
        }
    }
}

/// One analyzer/variant call of a processing pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnalysisTask {
    Visual {
        operation: VisualOperation,
        mode: VisualMode,
    },
    Llm {
        /// Title of an `[[llm.models]]` entry; `None` for the primary `[llm]` model
        model: Option<String>,
        prompt_id: String,
    },
}

/// Endpoint a task is dispatched to; one client exists per target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnalyzerTarget {
    Visual,
    Llm(Option<String>),
}

impl fmt::Display for AnalyzerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerTarget::Visual => f.write_str(AnalyzerKind::VisualClassifier.as_str()),
            AnalyzerTarget::Llm(None) => f.write_str(AnalyzerKind::Llm.as_str()),
            AnalyzerTarget::Llm(Some(title)) => write!(f, "{}[{}]", AnalyzerKind::Llm, title),
        }
    }
}

impl AnalysisTask {
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            AnalysisTask::Visual { .. } => AnalyzerKind::VisualClassifier,
            AnalysisTask::Llm { .. } => AnalyzerKind::Llm,
        }
    }

    pub fn target(&self) -> AnalyzerTarget {
        match self {
            AnalysisTask::Visual { .. } => AnalyzerTarget::Visual,
            AnalysisTask::Llm { model, .. } => AnalyzerTarget::Llm(model.clone()),
        }
    }

    /// Variant name persisted with each result entry
    ///
    /// Prompt-operation visual tasks use the bare mode name, analyze tasks
    /// are prefixed so both can run for the same mode. Primary LLM tasks use
    /// the prompt id; additional models prefix it with their title.
    pub fn variant(&self) -> String {
        match self {
            AnalysisTask::Visual {
                operation: VisualOperation::Prompt,
                mode,
            } => mode.as_str().to_string(),
            AnalysisTask::Visual {
                operation: VisualOperation::Analyze,
                mode,
            } => format!("analyze:{}", mode.as_str()),
            AnalysisTask::Llm {
                model: None,
                prompt_id,
            } => prompt_id.clone(),
            AnalysisTask::Llm {
                model: Some(title),
                prompt_id,
            } => format!("{}:{}", title, prompt_id),
        }
    }
}

impl fmt::Display for AnalysisTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.variant())
    }
}
