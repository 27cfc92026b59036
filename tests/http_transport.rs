//! HttpTransport against a mock backend.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::json;
use wealthwise_sync::config::{CircuitBreakerConfig, HttpConfig};
use wealthwise_sync::resilience::{CircuitBreakers, CircuitState};
use wealthwise_sync::transport::http::HttpTransport;
use wealthwise_sync::transport::{
    Dependency, Endpoint, ErrorKind, FetchError, GuardedTransport, Method, Transport,
};

mod common;

use common::MockResponse;

fn config(backend: SocketAddr, ai: SocketAddr) -> HttpConfig {
    HttpConfig {
        backend_url: format!("http://{}/api", backend),
        ai_url: format!("http://{}", ai),
        request_timeout_ms: 2_000,
        ..HttpConfig::default()
    }
}

async fn transport_for(response: MockResponse) -> (HttpTransport, common::RequestLog) {
    let (addr, log) = common::start_mock_backend(response).await;
    (HttpTransport::new(&config(addr, addr)).unwrap(), log)
}

#[tokio::test]
async fn test_success_unwraps_envelope_and_sends_headers() {
    let (transport, log) = transport_for(MockResponse::json(
        200,
        r#"{"success":true,"data":{"totalValue":1250.5}}"#,
    ))
    .await;
    transport.set_token("token-123");

    let endpoint = Endpoint::get("/portfolio/overview").with_query("range", "1M");
    let payload = transport.perform(&endpoint).await.unwrap();
    assert_eq!(payload, json!({"totalValue": 1250.5}));

    let requests = log.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/api/portfolio/overview?range=1M");
    assert_eq!(requests[0].header("authorization"), Some("Bearer token-123"));
    assert_eq!(requests[0].header("x-request-id").map(str::len), Some(36));
}

#[tokio::test]
async fn test_request_ids_differ_per_call() {
    let (transport, log) = transport_for(MockResponse::json(200, "[]")).await;
    let endpoint = Endpoint::get("/accounts");

    transport.perform(&endpoint).await.unwrap();
    transport.perform(&endpoint).await.unwrap();

    let requests = log.lock().unwrap();
    assert_ne!(requests[0].header("x-request-id"), requests[1].header("x-request-id"));
    assert_eq!(requests[0].header("authorization"), None);
}

#[tokio::test]
async fn test_post_body_is_sent_as_json() {
    let (transport, log) = transport_for(MockResponse::json(200, r#"{"reply":"hi"}"#)).await;
    let endpoint = Endpoint::get("/api/ai/chat")
        .with_dependency(Dependency::Ai)
        .with_body(Method::Post, json!({"message": "hello"}));

    let payload = transport.perform(&endpoint).await.unwrap();
    assert_eq!(payload, json!({"reply": "hi"}));

    let requests = log.lock().unwrap();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].target, "/api/ai/chat");
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body, json!({"message": "hello"}));
}

#[tokio::test]
async fn test_auth_statuses_map_to_unauthorized() {
    for status in [401, 403] {
        let (transport, _) = transport_for(MockResponse::json(status, r#"{"error":"nope"}"#)).await;
        let err = transport.perform(&Endpoint::get("/auth/me")).await.unwrap_err();
        assert_eq!(err, FetchError::Unauthorized(status));
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let (transport, _) =
        transport_for(MockResponse::json(429, "{}").with_header("Retry-After", "7")).await;
    let err = transport.perform(&Endpoint::get("/market/quotes")).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
    );

    let (transport, _) = transport_for(MockResponse::json(429, "{}")).await;
    let err = transport.perform(&Endpoint::get("/market/quotes")).await.unwrap_err();
    assert_eq!(err, FetchError::RateLimited { retry_after: None });
}

#[tokio::test]
async fn test_server_and_client_errors() {
    let (transport, _) = transport_for(MockResponse::json(503, "{}")).await;
    let err = transport.perform(&Endpoint::get("/budgets")).await.unwrap_err();
    assert_eq!(err, FetchError::Status(503));
    assert_eq!(err.kind(), ErrorKind::Transient);

    let (transport, _) = transport_for(MockResponse::json(404, "{}")).await;
    let err = transport.perform(&Endpoint::get("/budgets/9")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Client);
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let (transport, _) = transport_for(MockResponse::json(200, "not json")).await;
    let err = transport.perform(&Endpoint::get("/goals")).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn test_unreachable_backend_is_a_transport_error() {
    let addr = common::closed_port().await;
    let transport = HttpTransport::new(&config(addr, addr)).unwrap();
    let err = transport.perform(&Endpoint::get("/accounts")).await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
    assert!(err.is_dependency_failure());
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let (addr, _) = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        MockResponse::json(200, "{}")
    })
    .await;
    let transport = HttpTransport::new(&HttpConfig {
        request_timeout_ms: 100,
        ..config(addr, addr)
    })
    .unwrap();

    let err = transport.perform(&Endpoint::get("/transactions")).await.unwrap_err();
    assert_eq!(err, FetchError::Timeout(Duration::from_millis(100)));
}

#[tokio::test]
async fn test_ai_dependency_uses_its_own_base_url() {
    let (backend, backend_log) = common::start_mock_backend(MockResponse::json(200, "{}")).await;
    let (ai, ai_log) = common::start_mock_backend(MockResponse::json(200, "{}")).await;
    let transport = HttpTransport::new(&config(backend, ai)).unwrap();

    transport
        .perform(&Endpoint::get("/api/ai/insights").with_dependency(Dependency::Ai))
        .await
        .unwrap();

    assert!(backend_log.lock().unwrap().is_empty());
    assert_eq!(ai_log.lock().unwrap()[0].target, "/api/ai/insights");
}

#[tokio::test]
async fn test_breaker_short_circuits_failing_ai_service() {
    let (backend, _) = common::start_mock_backend(MockResponse::json(200, "{}")).await;
    let (ai, ai_log) = common::start_mock_backend(MockResponse::json(502, "{}")).await;
    let breakers = CircuitBreakers::new(CircuitBreakerConfig::default());
    let transport = GuardedTransport::new(
        HttpTransport::new(&config(backend, ai)).unwrap(),
        breakers.clone(),
    );
    let chat = Endpoint::get("/api/ai/chat").with_dependency(Dependency::Ai);

    for _ in 0..5 {
        assert_eq!(transport.perform(&chat).await, Err(FetchError::Status(502)));
    }
    assert_eq!(breakers.get_or_create("ai").state(), CircuitState::Open);

    let err = transport.perform(&chat).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircuitOpen);
    assert_eq!(ai_log.lock().unwrap().len(), 5);

    // The backend is not behind a breaker.
    assert!(transport.perform(&Endpoint::get("/accounts")).await.is_ok());
}
