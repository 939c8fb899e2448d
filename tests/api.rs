//! API endpoint integration tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;
use voxloop::api::{ApiServer, ApiServerBuilder};

mod common;
use common::{FakeEngine, Fixture, Harness, RecordingService};

/// Build a server around the harness orchestrator; the fixture keeps its directories alive
fn build_test_server(harness: Harness) -> (ApiServer, Fixture) {
    let Harness {
        orchestrator,
        fixture,
    } = harness;
    (ApiServerBuilder::new(orchestrator).build(), fixture)
}

async fn send(server: &ApiServer, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = server
        .router()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = Harness::new(&[], RecordingService::replying("unused"), FakeEngine::writing());
    let (server, _h) = build_test_server(harness);

    let (status, json) = send(&server, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_loop_conversation_continue() {
    let harness = Harness::new(
        &["hello there, how are you"],
        RecordingService::replying("Doing well."),
        FakeEngine::writing(),
    );
    let (server, _h) = build_test_server(harness);

    let (status, json) = send(&server, "POST", "/loop_conversation").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reply"], "Doing well.");
    assert_eq!(json["user_text"], "hello there, how are you");
    assert_eq!(json["should_stop"], false);
    assert!(json["audio_url"].as_str().unwrap().starts_with("/static/audio/response_"));
}

#[tokio::test]
async fn test_published_audio_is_served() {
    let harness = Harness::new(
        &["hello there, how are you"],
        RecordingService::replying("Doing well."),
        FakeEngine::writing(),
    );
    let (server, _h) = build_test_server(harness);

    let (_, json) = send(&server, "POST", "/loop_conversation").await;
    let url = json["audio_url"].as_str().unwrap().to_string();

    let response = server
        .router()
        .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"RIFF"));
}

#[tokio::test]
async fn test_loop_conversation_rejected() {
    let harness = Harness::new(&["ok"], RecordingService::replying("unused"), FakeEngine::writing());
    let (server, _h) = build_test_server(harness);

    let (status, json) = send(&server, "POST", "/loop_conversation").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_text"], "[unrecognized input]");
    assert_eq!(json["reply"], "I didn't hear anything clear. Please try again.");
    assert_eq!(json["should_stop"], false);
    assert!(json.get("audio_url").is_none());
}

#[tokio::test]
async fn test_loop_conversation_stopped() {
    let harness = Harness::new(
        &["okay byebye for now"],
        RecordingService::replying("unused"),
        FakeEngine::writing(),
    );
    let (server, _h) = build_test_server(harness);

    let (status, json) = send(&server, "POST", "/loop_conversation").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reply"], "Conversation stopped.");
    assert_eq!(json["user_text"], "okay byebye for now");
    assert_eq!(json["should_stop"], true);
}

#[tokio::test]
async fn test_loop_conversation_failure_is_500() {
    let harness = Harness::new(
        &["hello there, how are you"],
        RecordingService::failing(),
        FakeEngine::writing(),
    );
    let (server, _h) = build_test_server(harness);

    let (status, json) = send(&server, "POST", "/loop_conversation").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("429"));
    assert_eq!(json["should_stop"], false);
    assert!(json.get("reply").is_none());
}

#[tokio::test]
async fn test_reset_chat() {
    let harness = Harness::new(
        &["hello there, how are you"],
        RecordingService::replying("Hi."),
        FakeEngine::writing(),
    );
    let (server, _h) = build_test_server(harness);
    send(&server, "POST", "/loop_conversation").await;

    let (status, json) = send(&server, "POST", "/reset_chat").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({ "status": "reset" }));

    let orchestrator = server.state().orchestrator.lock().await;
    let history = orchestrator.history(&server.state().session).unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_greeting_endpoint() {
    let harness = Harness::new(&[], RecordingService::replying("unused"), FakeEngine::writing());
    let (server, _h) = build_test_server(harness);

    let (status, json) = send(&server, "GET", "/greeting").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reply"], "Hello dear, how can I assist you?");
    assert!(json["audio_url"].as_str().unwrap().starts_with("/static/audio/greeting_"));
}

#[tokio::test]
async fn test_greeting_failure_is_500() {
    let harness = Harness::new(&[], RecordingService::replying("unused"), FakeEngine::silent());
    let (server, _h) = build_test_server(harness);

    let (status, json) = send(&server, "GET", "/greeting").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("synthesis timed out"));
}

#[tokio::test]
async fn test_sweep_endpoint() {
    let harness = Harness::new(&[], RecordingService::replying("unused"), FakeEngine::writing());
    let (server, h) = build_test_server(harness);
    send(&server, "GET", "/greeting").await;
    send(&server, "GET", "/greeting").await;
    assert_eq!(h.published_files(), 2);

    let (status, json) = send(&server, "POST", "/maintenance/sweep").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({ "removed": 2 }));
    assert_eq!(h.published_files(), 0);
}
