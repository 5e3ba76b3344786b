//! API communication log
//!
//! Appends one JSON line per analyzer request/response exchange to
//! `<root>/logs/api_communication.jsonl`. Image data is replaced by a
//! `"<redacted N bytes>"` marker. Logging is best-effort: failures are
//! reported with `warn!` and never reach the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// File name inside the logs directory
pub const API_LOG_FILE: &str = "api_communication.jsonl";

/// One logged exchange
#[derive(Debug, Clone, Serialize)]
pub struct ApiExchange {
    pub timestamp: DateTime<Utc>,
    pub analyzer: String,
    pub variant: String,
    pub url: String,
    pub attempt: u32,
    /// Request body with image data redacted
    pub request: Value,
    pub status: Option<u16>,
    pub response: Option<Value>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Append-only JSONL writer
#[derive(Debug)]
pub struct ApiLogger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ApiLogger {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: logs_dir.join(API_LOG_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one exchange; never fails
    pub async fn record(&self, exchange: &ApiExchange) {
        if let Err(e) = self.append(exchange).await {
            tracing::warn!(
                path = %self.path.display(),
                "Failed to write API communication log: {}",
                e
            );
        }
    }

    async fn append(&self, exchange: &ApiExchange) -> std::io::Result<()> {
        let mut line = serde_json::to_string(exchange)?;
        line.push('\n');

        // Serialize writers so lines never interleave
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// Copy of `body` with image data replaced by a size marker.
///
/// Redacts any string under an `image` key and any `data:image/` URL.
pub fn redact_image_data(body: &Value) -> Value {
    match body {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let redacted = match value {
                        Value::String(s) if key == "image" => redaction_marker(s.len()),
                        other => redact_image_data(other),
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_image_data).collect()),
        Value::String(s) if s.starts_with("data:image/") => redaction_marker(s.len()),
        other => other.clone(),
    }
}

fn redaction_marker(len: usize) -> Value {
    Value::String(format!("<redacted {} bytes>", len))
}
