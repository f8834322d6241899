//! Dialogue Backend Contract Tests
//!
//! Verify exact HTTP wire-format compliance for the backend client:
//! request shape, response parsing, and error mapping. The full
//! conversation loop is covered separately in `call_flow.rs`.

use lumen::backend::{BackendClient, SessionId};
use lumen::config::BackendConfig;
use lumen::error::CallError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> BackendClient {
    BackendClient::new(&BackendConfig {
        base_url: server.uri(),
        ..BackendConfig::default()
    })
    .expect("client construction")
}

#[tokio::test]
async fn bootstrap_posts_to_session_route_and_parses_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agent/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionId": "abc",
            "openingLine": "Hi there"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let bootstrap = client(&server)
        .bootstrap_session()
        .await
        .expect("bootstrap should succeed");
    assert_eq!(bootstrap.session_id.as_str(), "abc");
    assert_eq!(bootstrap.opening_line, "Hi there");
}

#[tokio::test]
async fn bootstrap_maps_server_error_body_to_bootstrap_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agent/session"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "error": "backend offline" })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .bootstrap_session()
        .await
        .expect_err("5xx must fail");
    match err {
        CallError::Bootstrap(message) => assert!(message.contains("backend offline")),
        other => panic!("expected Bootstrap error, got {other:?}"),
    }
}

#[tokio::test]
async fn respond_sends_camel_case_body_and_parses_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agent/respond"))
        .and(body_partial_json(json!({
            "sessionId": "abc",
            "message": "My name is Sam"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reply": "Nice to meet you, Sam",
            "followUp": "What's your question?",
            "ended": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server)
        .respond(&SessionId::new("abc"), "My name is Sam")
        .await
        .expect("respond should succeed");
    assert_eq!(reply.reply, "Nice to meet you, Sam");
    assert_eq!(reply.follow_up.as_deref(), Some("What's your question?"));
    assert!(!reply.ended);
}

#[tokio::test]
async fn respond_parses_null_follow_up_and_ended_flag() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agent/respond"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reply": "Thanks, goodbye!",
            "followUp": null,
            "ended": true
        })))
        .mount(&server)
        .await;

    let reply = client(&server)
        .respond(&SessionId::new("abc"), "bye")
        .await
        .expect("respond should succeed");
    assert_eq!(reply.follow_up, None);
    assert!(reply.ended);
}

#[tokio::test]
async fn respond_maps_server_error_to_response_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agent/respond"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "nlu crashed" })))
        .mount(&server)
        .await;

    let err = client(&server)
        .respond(&SessionId::new("abc"), "hello")
        .await
        .expect_err("5xx must fail");
    match err {
        CallError::Response(message) => assert!(message.contains("nlu crashed")),
        other => panic!("expected Response error, got {other:?}"),
    }
}

#[tokio::test]
async fn respond_falls_back_to_status_when_error_body_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agent/respond"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .respond(&SessionId::new("abc"), "hello")
        .await
        .expect_err("5xx must fail");
    match err {
        CallError::Response(message) => assert!(message.contains("503")),
        other => panic!("expected Response error, got {other:?}"),
    }
}

#[tokio::test]
async fn validation_failure_issues_no_request() {
    let server = MockServer::start().await;

    // Zero expected requests: a missing message must be rejected client-side.
    Mock::given(method("POST"))
        .and(path("/api/agent/respond"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .respond(&SessionId::new("abc"), "")
        .await
        .expect_err("empty message must be rejected");
    assert!(matches!(err, CallError::Validation));
}

#[tokio::test]
async fn custom_routes_are_honored() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/call/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionId": "s-1",
            "openingLine": "Hello"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(&BackendConfig {
        base_url: server.uri(),
        session_path: "/v2/call/session".to_owned(),
        ..BackendConfig::default()
    })
    .expect("client construction");

    client
        .bootstrap_session()
        .await
        .expect("custom route should resolve");
}

#[tokio::test]
async fn configured_timeout_surfaces_as_bootstrap_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agent/session"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "sessionId": "s", "openingLine": "Hi" }))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = BackendClient::new(&BackendConfig {
        base_url: server.uri(),
        request_timeout_ms: Some(100),
        ..BackendConfig::default()
    })
    .expect("client construction");

    let err = client
        .bootstrap_session()
        .await
        .expect_err("timeout must fail the request");
    assert!(matches!(err, CallError::Bootstrap(_)));
}
