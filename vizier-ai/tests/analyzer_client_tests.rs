//! Retrying analyzer client against a mock HTTP endpoint

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vizier_ai::config::VisualSettings;
use vizier_ai::error::FailureKind;
use vizier_ai::models::{AnalysisTask, VisualMode, VisualOperation};
use vizier_ai::services::api_log::API_LOG_FILE;
use vizier_ai::services::{ApiLogger, RetryPolicy, RetryingAnalyzerClient, VisualClassifierEndpoint};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_prompt() -> AnalysisTask {
    AnalysisTask::Visual {
        operation: VisualOperation::Prompt,
        mode: VisualMode::Fast,
    }
}

fn client(server: &MockServer, policy: RetryPolicy, timeout: Duration) -> RetryingAnalyzerClient {
    let endpoint = VisualClassifierEndpoint::new(&VisualSettings {
        base_url: server.uri(),
        model: "ViT-L-14/openai".to_string(),
        timeout,
    });
    RetryingAnalyzerClient::new(Arc::new(endpoint), policy, timeout).unwrap()
}

#[tokio::test]
async fn test_timeouts_consume_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"prompt": "late"}))
                .set_delay(Duration::from_millis(800)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client = client(
        &server,
        RetryPolicy::fixed(3, Duration::ZERO),
        Duration::from_millis(100),
    );
    let failure = client.call(&fast_prompt(), "QUJD").await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(failure.attempts, 3);
}

#[tokio::test]
async fn test_recovers_within_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/interrogator/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prompt": "third try"})))
        .mount(&server)
        .await;

    let client = client(
        &server,
        RetryPolicy::fixed(3, Duration::from_millis(10)),
        Duration::from_secs(5),
    );
    let body = client.call(&fast_prompt(), "QUJD").await.unwrap();

    assert_eq!(body, json!({"prompt": "third try"}));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_last_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
        .mount(&server)
        .await;

    let client = client(&server, RetryPolicy::fixed(2, Duration::ZERO), Duration::from_secs(5));
    let failure = client.call(&fast_prompt(), "QUJD").await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::Status(404));
    assert_eq!(failure.attempts, 2);
    assert!(failure.detail.contains("no such route"));
}

#[tokio::test]
async fn test_exchanges_are_logged_without_image_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prompt": "logged"})))
        .mount(&server)
        .await;

    let logs = TempDir::new().unwrap();
    let logger = Arc::new(ApiLogger::new(logs.path()));
    let client = client(&server, RetryPolicy::fixed(2, Duration::ZERO), Duration::from_secs(5))
        .with_api_log(logger);

    let payload = "A".repeat(4096);
    client.call(&fast_prompt(), &payload).await.unwrap();

    let content = std::fs::read_to_string(logs.path().join(API_LOG_FILE)).unwrap();
    let lines: Vec<Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["attempt"], 1);
    assert_eq!(lines[0]["status"], 503);
    assert_eq!(lines[1]["attempt"], 2);
    assert_eq!(lines[1]["response"]["prompt"], "logged");
    assert_eq!(lines[1]["analyzer"], "visual-classifier");
    assert_eq!(lines[1]["variant"], "fast");
    assert!(!content.contains(&payload));
}

#[tokio::test]
async fn test_logged_status_is_the_response_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"prompt": "accepted"})))
        .mount(&server)
        .await;

    let logs = TempDir::new().unwrap();
    let client = client(&server, RetryPolicy::fixed(1, Duration::ZERO), Duration::from_secs(5))
        .with_api_log(Arc::new(ApiLogger::new(logs.path())));

    let body = client.call(&fast_prompt(), "QUJD").await.unwrap();
    assert_eq!(body["prompt"], "accepted");

    let content = std::fs::read_to_string(logs.path().join(API_LOG_FILE)).unwrap();
    let entry: Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
    assert_eq!(entry["status"], 202);
    assert!(entry["error"].is_null());
}
