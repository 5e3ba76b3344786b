//! Retrying analyzer client
//!
//! One instance per analyzer target (the visual classifier, each LLM model). Each call resolves to either the
//! endpoint's JSON response (verbatim) or a typed [`CallFailure`] carrying
//! the last attempt's detail; it never panics or returns an untyped error.
//!
//! Every transport error, timeout, non-2xx status or undecodable body
//! consumes one attempt. With `max_attempts = N` and a failing endpoint,
//! exactly N requests are sent.

use crate::error::{CallFailure, FailureKind, PipelineError, PipelineResult};
use crate::models::{AnalysisTask, AnalyzerKind};
use crate::services::api_log::{redact_image_data, ApiExchange, ApiLogger};
use crate::services::retry::RetryPolicy;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

const USER_AGENT: &str = concat!("vizier/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Fully built HTTP request for one analyzer/variant call
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointRequest {
    pub url: String,
    pub body: Value,
    pub bearer_token: Option<String>,
}

/// Maps an [`AnalysisTask`] and image payload to an HTTP request
pub trait AnalyzerEndpoint: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    /// Build the request; `Err` when the task does not belong to this endpoint
    fn build_request(&self, task: &AnalysisTask, payload: &str) -> Result<EndpointRequest, String>;
}

/// HTTP client with a bounded retry policy
#[derive(Clone)]
pub struct RetryingAnalyzerClient {
    http_client: reqwest::Client,
    endpoint: Arc<dyn AnalyzerEndpoint>,
    policy: RetryPolicy,
    timeout: Duration,
    api_log: Option<Arc<ApiLogger>>,
}

impl RetryingAnalyzerClient {
    pub fn new(
        endpoint: Arc<dyn AnalyzerEndpoint>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PipelineError::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            policy,
            timeout,
            api_log: None,
        })
    }

    /// Log every exchange to the API communication log
    pub fn with_api_log(mut self, logger: Arc<ApiLogger>) -> Self {
        self.api_log = Some(logger);
        self
    }

    pub fn kind(&self) -> AnalyzerKind {
        self.endpoint.kind()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one analyzer/variant call with retries.
    ///
    /// An empty payload fails with [`FailureKind::EmptyInput`] before any
    /// request is sent.
    pub async fn call(&self, task: &AnalysisTask, payload: &str) -> Result<Value, CallFailure> {
        if payload.trim().is_empty() {
            tracing::warn!(task = %task, "Empty payload, analyzer call skipped");
            return Err(CallFailure::empty_input());
        }

        let request = self
            .endpoint
            .build_request(task, payload)
            .map_err(|detail| CallFailure {
                kind: FailureKind::InvalidRequest,
                attempts: 0,
                detail,
            })?;

        self.send_with_retry(&request, &task.variant()).await
    }

    /// POST `request` until it succeeds or the attempt budget is spent
    pub async fn send_with_retry(
        &self,
        request: &EndpointRequest,
        variant: &str,
    ) -> Result<Value, CallFailure> {
        let kind = self.kind();
        let max_attempts = self.policy.max_attempts;
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                tracing::debug!(
                    analyzer = %kind,
                    variant,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Waiting before retry"
                );
                tokio::time::sleep(delay).await;
            }

            let started = Instant::now();
            let outcome = self.send_once(request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            if let Some(logger) = &self.api_log {
                logger
                    .record(&exchange_entry(kind, variant, request, attempt, &outcome, elapsed_ms))
                    .await;
            }

            match outcome {
                Ok((_, body)) => {
                    if attempt > 1 {
                        tracing::info!(analyzer = %kind, variant, attempt, elapsed_ms, "Analyzer call succeeded after retry");
                    } else {
                        tracing::debug!(analyzer = %kind, variant, elapsed_ms, "Analyzer call succeeded");
                    }
                    return Ok(body);
                }
                Err(failure) => {
                    tracing::warn!(
                        analyzer = %kind,
                        variant,
                        attempt,
                        max_attempts,
                        failure = failure.kind.as_str(),
                        "Analyzer call attempt failed: {}",
                        failure.detail
                    );
                    last_failure = Some(failure);
                }
            }
        }

        let last = last_failure.unwrap_or(AttemptFailure {
            kind: FailureKind::Connect,
            status: None,
            detail: "no attempt made".to_string(),
        });

        tracing::error!(
            analyzer = %kind,
            variant,
            attempts = max_attempts,
            "Analyzer call failed after exhausting retries: {}",
            last.detail
        );

        Err(CallFailure {
            kind: last.kind,
            attempts: max_attempts,
            detail: last.detail,
        })
    }

    /// One POST; the success status is returned with the body for the API log
    async fn send_once(&self, request: &EndpointRequest) -> Result<(u16, Value), AttemptFailure> {
        let mut builder = self.http_client.post(&request.url).json(&request.body);
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let exchange = async {
            let response = builder.send().await.map_err(AttemptFailure::from_reqwest)?;
            let status = response.status();

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(AttemptFailure {
                    kind: FailureKind::Status(status.as_u16()),
                    status: Some(status.as_u16()),
                    detail: format!("HTTP {}: {}", status, truncate(&text, MAX_ERROR_BODY_CHARS)),
                });
            }

            let bytes = response.bytes().await.map_err(AttemptFailure::from_reqwest)?;
            let body = serde_json::from_slice::<Value>(&bytes).map_err(|e| AttemptFailure {
                kind: FailureKind::Decode,
                status: Some(status.as_u16()),
                detail: format!("Invalid JSON response: {}", e),
            })?;
            Ok((status.as_u16(), body))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(AttemptFailure {
                kind: FailureKind::Timeout,
                status: None,
                detail: format!("No response within {:?}", self.timeout),
            }),
        }
    }
}

/// Failure of a single attempt
#[derive(Debug)]
struct AttemptFailure {
    kind: FailureKind,
    status: Option<u16>,
    detail: String,
}

impl AttemptFailure {
    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_decode() {
            FailureKind::Decode
        } else {
            FailureKind::Connect
        };
        Self {
            kind,
            status: err.status().map(|s| s.as_u16()),
            detail: err.to_string(),
        }
    }
}

fn exchange_entry(
    kind: AnalyzerKind,
    variant: &str,
    request: &EndpointRequest,
    attempt: u32,
    outcome: &Result<(u16, Value), AttemptFailure>,
    elapsed_ms: u64,
) -> ApiExchange {
    let (status, response, error) = match outcome {
        Ok((status, body)) => (Some(*status), Some(body.clone()), None),
        Err(failure) => (failure.status, None, Some(failure.detail.clone())),
    };
    ApiExchange {
        timestamp: Utc::now(),
        analyzer: kind.as_str().to_string(),
        variant: variant.to_string(),
        url: request.url.clone(),
        attempt,
        request: redact_image_data(&request.body),
        status,
        response,
        error,
        elapsed_ms,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoEndpoint;

    impl AnalyzerEndpoint for EchoEndpoint {
        fn kind(&self) -> AnalyzerKind {
            AnalyzerKind::Llm
        }

        fn build_request(&self, task: &AnalysisTask, payload: &str) -> Result<EndpointRequest, String> {
            match task {
                AnalysisTask::Llm { .. } => Ok(EndpointRequest {
                    // Nothing listens on port 9 of the loopback interface
                    url: "http://127.0.0.1:9/unreachable".to_string(),
                    body: json!({"image": payload}),
                    bearer_token: None,
                }),
                _ => Err("not an llm task".to_string()),
            }
        }
    }

    fn client(attempts: u32) -> RetryingAnalyzerClient {
        RetryingAnalyzerClient::new(
            Arc::new(EchoEndpoint),
            RetryPolicy::fixed(attempts, Duration::ZERO),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_payload_short_circuits() {
        let task = AnalysisTask::Llm {
            model: None,
            prompt_id: "P1".into(),
        };
        let failure = client(3).call(&task, "   ").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::EmptyInput);
        assert_eq!(failure.attempts, 0);
    }

    #[tokio::test]
    async fn test_foreign_task_is_invalid_request() {
        let task = AnalysisTask::Visual {
            operation: crate::models::VisualOperation::Prompt,
            mode: crate::models::VisualMode::Fast,
        };
        let failure = client(3).call(&task, "AAAA").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_connection_refused_consumes_budget() {
        let task = AnalysisTask::Llm {
            model: None,
            prompt_id: "P1".into(),
        };
        let failure = client(2).call(&task, "AAAA").await.unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert!(matches!(failure.kind, FailureKind::Connect | FailureKind::Timeout));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
