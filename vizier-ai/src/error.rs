//! Error types for vizier-ai
//!
//! Propagation rules for a processing pass:
//! - `Read`, `Decode`, `Encoding` abort the current image only and are
//!   recorded in the result record's error list
//! - `Transport` is recorded per analyzer/variant entry, never per image
//! - `Persistence` is fatal to the run and is always returned to the caller
//! - `Config` is raised once at startup

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum PipelineError {
    /// File missing or unreadable
    #[error("Read error for {path}: {detail}")]
    Read { path: PathBuf, detail: String },

    /// Unrecognized or corrupt image data
    #[error("Decode error for {path}: {detail}")]
    Decode { path: PathBuf, detail: String },

    /// Transport encoding failed or produced nothing
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Analyzer call failed after the retry budget was spent
    #[error("Transport error: {0}")]
    Transport(#[from] CallFailure),

    /// Job store write or read failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] vizier_common::Error),

    /// Invalid configuration detected at startup
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Only persistence failures may abort a batch run
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Persistence(_))
    }

    /// Short machine-readable class name, stored in error entries
    pub fn class(&self) -> &'static str {
        match self {
            PipelineError::Read { .. } => "read_error",
            PipelineError::Decode { .. } => "decode_error",
            PipelineError::Encoding(_) => "encoding_error",
            PipelineError::Transport(_) => "transport_error",
            PipelineError::Persistence(_) => "persistence_error",
            PipelineError::Config(_) => "config_error",
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Why a single analyzer call failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Payload was empty, no request was sent
    EmptyInput,
    /// Per-call timeout elapsed
    Timeout,
    /// Connection or other transport failure
    Connect,
    /// Endpoint answered with a non-2xx status
    Status(u16),
    /// Response body was not valid JSON
    Decode,
    /// Task cannot be expressed as a request for this analyzer
    InvalidRequest,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::EmptyInput => "empty_input",
            FailureKind::Timeout => "timeout",
            FailureKind::Connect => "connect",
            FailureKind::Status(_) => "status",
            FailureKind::Decode => "decode",
            FailureKind::InvalidRequest => "invalid_request",
        }
    }
}

/// Typed failure of one analyzer call, carrying the last attempt's detail
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} after {attempts} attempt(s): {detail}", kind.as_str())]
pub struct CallFailure {
    pub kind: FailureKind,
    pub attempts: u32,
    pub detail: String,
}

impl CallFailure {
    pub fn empty_input() -> Self {
        Self {
            kind: FailureKind::EmptyInput,
            attempts: 0,
            detail: "payload is empty, request not sent".to_string(),
        }
    }

    /// Error envelope persisted as the payload of a failed result entry
    pub fn to_envelope(&self) -> serde_json::Value {
        let mut envelope = serde_json::json!({
            "error": {
                "kind": self.kind.as_str(),
                "attempts": self.attempts,
                "detail": self.detail,
            }
        });
        if let FailureKind::Status(code) = self.kind {
            envelope["error"]["status"] = serde_json::json!(code);
        }
        envelope
    }
}
