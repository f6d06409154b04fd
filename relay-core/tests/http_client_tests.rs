//! HTTP backend client against a mock server

use relay_core::config::StaticCredentials;
use relay_core::http::{AttemptOutcome, BackendClient, HttpBackendClient};
use relay_core::protocol::{CanonicalRequest, Turn};
use relay_core::providers::error::MAX_RETRY_HINT;
use relay_core::providers::{
    BackendDescriptor, ChainEntry, ChainSpec, Dialect, FailureKind, FallbackOrchestrator,
    HealthPolicy, HealthSnapshot, HealthTracker, Registry,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn descriptor(server: &MockServer) -> BackendDescriptor {
    BackendDescriptor {
        name: "mock".to_string(),
        base_url: format!("{}/v1", server.uri()),
        dialect: Dialect::OpenAiCompatible,
        credential: Some("MOCK_API_KEY".to_string()),
        credential_optional: false,
        capabilities: Default::default(),
        requests_per_minute: None,
        max_concurrent: 2,
        default_model: "mock-model".to_string(),
        headers: BTreeMap::new(),
    }
}

fn client() -> HttpBackendClient {
    HttpBackendClient::new(Arc::new(
        StaticCredentials::new().with("MOCK_API_KEY", "sk-test-123456"),
    ))
    .unwrap()
}

fn request() -> CanonicalRequest {
    CanonicalRequest::new(vec![Turn::user("Test message")]).with_system("Be brief.")
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "model": "mock-model-0613",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn failure_of(outcome: AttemptOutcome) -> (bool, relay_core::providers::Failure) {
    match outcome {
        AttemptOutcome::FatalFailure { failure, .. } => (true, failure),
        AttemptOutcome::RetryableFailure { failure, .. } => (false, failure),
        AttemptOutcome::Success { reply, .. } => panic!("unexpected success: {reply:?}"),
    }
}

#[tokio::test]
async fn test_successful_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test-123456"))
        .and(header_exists("x-request-id"))
        .and(body_partial_json(json!({
            "model": "mock-model",
            "stream": false,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Test message"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hello!")))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .attempt(&descriptor(&server), "mock-model", &request(), TIMEOUT)
        .await;

    match outcome {
        AttemptOutcome::Success { reply, backend, .. } => {
            assert_eq!(backend, "mock");
            assert_eq!(reply.text, "Hello!");
            assert_eq!(reply.model.as_deref(), Some("mock-model-0613"));
            assert_eq!(reply.usage.total_tokens, Some(15));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Invalid API key", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .attempt(&descriptor(&server), "mock-model", &request(), TIMEOUT)
        .await;

    let (fatal, failure) = failure_of(outcome);
    assert!(fatal);
    assert_eq!(failure.kind, FailureKind::Auth);
    assert_eq!(failure.detail, "HTTP 401: Invalid API key");
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "7")
                .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .attempt(&descriptor(&server), "mock-model", &request(), TIMEOUT)
        .await;

    let (fatal, failure) = failure_of(outcome);
    assert!(!fatal);
    assert_eq!(failure.kind, FailureKind::RateLimited);
    assert_eq!(failure.retry_after, Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .attempt(&descriptor(&server), "mock-model", &request(), TIMEOUT)
        .await;

    let (fatal, failure) = failure_of(outcome);
    assert!(!fatal);
    assert_eq!(failure.kind, FailureKind::Transport);
}

#[tokio::test]
async fn test_malformed_success_body_is_bad_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let outcome = client()
        .attempt(&descriptor(&server), "mock-model", &request(), TIMEOUT)
        .await;

    let (fatal, failure) = failure_of(outcome);
    assert!(!fatal);
    assert_eq!(failure.kind, FailureKind::BadResponse);
}

#[tokio::test]
async fn test_empty_choices_is_bad_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let outcome = client()
        .attempt(&descriptor(&server), "mock-model", &request(), TIMEOUT)
        .await;

    assert_eq!(failure_of(outcome).1.kind, FailureKind::BadResponse);
}

#[tokio::test]
async fn test_missing_credential_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let client = HttpBackendClient::new(Arc::new(StaticCredentials::new())).unwrap();
    let outcome = client
        .attempt(&descriptor(&server), "mock-model", &request(), TIMEOUT)
        .await;

    let (fatal, failure) = failure_of(outcome);
    assert!(fatal);
    assert_eq!(failure.kind, FailureKind::Auth);
}

#[tokio::test]
async fn test_optional_credential_goes_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("free tier")))
        .expect(1)
        .mount(&server)
        .await;

    let mut descriptor = descriptor(&server);
    descriptor.credential_optional = true;
    let client = HttpBackendClient::new(Arc::new(StaticCredentials::new())).unwrap();
    let outcome = client
        .attempt(&descriptor, "mock-model", &request(), TIMEOUT)
        .await;
    assert!(outcome.is_success());

    let received = server.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_descriptor_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("http-referer", "https://relay.invalid"))
        .and(header("x-title", "Relay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let mut descriptor = descriptor(&server);
    descriptor
        .headers
        .insert("HTTP-Referer".to_string(), "https://relay.invalid".to_string());
    descriptor
        .headers
        .insert("X-Title".to_string(), "Relay".to_string());

    let outcome = client()
        .attempt(&descriptor, "mock-model", &request(), TIMEOUT)
        .await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_attempt_timeout_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("too late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let outcome = client()
        .attempt(
            &descriptor(&server),
            "mock-model",
            &request(),
            Duration::from_millis(200),
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    let (fatal, failure) = failure_of(outcome);
    assert!(!fatal);
    assert_eq!(failure.kind, FailureKind::Transport);
    assert!(failure.timed_out);
}

#[tokio::test]
async fn test_connection_refused_is_transport() {
    let server = MockServer::start().await;
    let descriptor = descriptor(&server);
    drop(server);

    let outcome = client()
        .attempt(&descriptor, "mock-model", &request(), TIMEOUT)
        .await;

    let (fatal, failure) = failure_of(outcome);
    assert!(!fatal);
    assert_eq!(failure.kind, FailureKind::Transport);
}

#[tokio::test]
async fn test_reported_exhaustion_throttles_next_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-limit-requests", "30")
                .insert_header("x-ratelimit-remaining-requests", "0")
                .insert_header("x-ratelimit-reset-requests", "30s")
                .set_body_json(completion("last one")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let descriptor = descriptor(&server);
    let first = client
        .attempt(&descriptor, "mock-model", &request(), TIMEOUT)
        .await;
    assert!(first.is_success());

    let (fatal, failure) = failure_of(
        client
            .attempt(&descriptor, "mock-model", &request(), TIMEOUT)
            .await,
    );
    assert!(!fatal);
    assert_eq!(failure.kind, FailureKind::Throttled);
    assert!(failure.retry_after.is_some());
}

#[tokio::test]
async fn test_per_minute_budget_throttles() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let mut descriptor = descriptor(&server);
    descriptor.requests_per_minute = Some(1);

    assert!(client
        .attempt(&descriptor, "mock-model", &request(), TIMEOUT)
        .await
        .is_success());
    let (_, failure) = failure_of(
        client
            .attempt(&descriptor, "mock-model", &request(), TIMEOUT)
            .await,
    );
    assert_eq!(failure.kind, FailureKind::Throttled);
}

#[tokio::test]
async fn test_full_concurrency_cap_is_throttled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let client = client();
    let mut descriptor = descriptor(&server);
    descriptor.max_concurrent = 1;
    let budget = client.rate_limiter().budget_for(&descriptor);
    let _held = budget.acquire().await.unwrap();

    let (fatal, failure) = failure_of(
        client
            .attempt(&descriptor, "mock-model", &request(), Duration::from_millis(200))
            .await,
    );
    assert!(!fatal);
    assert_eq!(failure.kind, FailureKind::Throttled);
    assert!(!failure.timed_out);
}

#[tokio::test]
async fn test_huge_retry_after_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1e300"))
        .mount(&server)
        .await;

    let (_, failure) = failure_of(
        client()
            .attempt(&descriptor(&server), "mock-model", &request(), TIMEOUT)
            .await,
    );
    assert_eq!(failure.kind, FailureKind::RateLimited);
    assert_eq!(failure.retry_after, Some(MAX_RETRY_HINT));
}

/// Chain `normal = [mock, spare]`, both served by `server`, `mock` capped at one attempt in flight
fn orchestrator_over(
    server: &MockServer,
) -> (FallbackOrchestrator, Arc<HttpBackendClient>, Arc<HealthTracker>, BackendDescriptor) {
    let mut primary = descriptor(server);
    primary.max_concurrent = 1;
    let mut spare = descriptor(server);
    spare.name = "spare".to_string();

    let mut registry = Registry::default();
    registry.insert_backend(primary.clone());
    registry.insert_backend(spare);
    registry
        .insert_chain(ChainSpec::new(
            "normal",
            vec![
                ChainEntry::new("mock", "mock-model"),
                ChainEntry::new("spare", "mock-model"),
            ],
        ))
        .unwrap();

    let client = Arc::new(client());
    let health = Arc::new(HealthTracker::new(HealthPolicy::default().without_jitter()));
    let orchestrator = FallbackOrchestrator::new(
        Arc::new(registry),
        Arc::clone(&health),
        client.clone(),
        Arc::new(StaticCredentials::new().with("MOCK_API_KEY", "sk-test-123456")),
    );
    (orchestrator, client, health, primary)
}

#[tokio::test]
async fn test_waiting_for_a_slot_leaves_health_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("from the spare")))
        .expect(1)
        .mount(&server)
        .await;

    let (orchestrator, client, health, primary) = orchestrator_over(&server);
    let budget = client.rate_limiter().budget_for(&primary);
    let _held = budget.acquire().await.unwrap();

    // the primary gets half of the two seconds to find a slot
    let request = request().with_timeout(Duration::from_secs(2));
    let response = orchestrator.resolve("normal", &request).await.unwrap();

    assert_eq!(response.backend, "spare");
    assert!(response.fallback_used);
    assert_eq!(health.snapshot("mock"), HealthSnapshot::default());

    let recent = orchestrator.attempt_log().recent(2);
    assert_eq!(recent[1].backend, "mock");
    assert_eq!(recent[1].outcome, "throttled");
    assert!(recent[1].latency >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_huge_retry_after_cools_down_no_longer_than_auth_window() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "18446744073709551615"))
        .mount(&server)
        .await;

    let (orchestrator, _, health, _) = orchestrator_over(&server);
    let result = orchestrator.resolve("normal", &request()).await;
    assert!(result.is_err());

    let auth_window = health.policy().auth_cooldown;
    let remaining = health.snapshot("mock").cooldown_remaining.unwrap();
    assert!(remaining <= auth_window);
    assert!(remaining > auth_window - Duration::from_secs(60));
}
