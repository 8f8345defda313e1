//! Shared helpers for the API integration tests.
//!
//! Each test binary points the stores at its own temporary directory
//! before anything opens a database, then talks to the router through
//! `tower::ServiceExt::oneshot`.
#![allow(dead_code)]

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

static SETUP: OnceLock<tempfile::TempDir> = OnceLock::new();

pub fn test_app() -> Router {
    SETUP.get_or_init(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        std::env::set_var("VERISIFT_CHAT_DB_PATH", dir.path().join("chat.db"));
        std::env::set_var("VERISIFT_HISTORY_DB_PATH", dir.path().join("history.db"));
        dir
    });
    verisift::create_app(verisift::AppState::new())
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// POST a chat turn and drain the whole SSE body.
pub async fn post_sse(app: Router, uri: &str, body: Value) -> String {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Parse every SSE frame into its JSON envelope.
pub fn parse_events(raw: &str) -> Vec<Value> {
    raw.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|payload| serde_json::from_str(payload).ok())
        .collect()
}

/// Content of the first `message` event in an SSE body.
pub fn first_message_content(raw: &str) -> String {
    parse_events(raw)
        .iter()
        .find(|e| e["type"] == "message")
        .and_then(|e| e["data"]["message"]["content"].as_str())
        .unwrap_or_default()
        .to_string()
}

/// Create a fresh chat session and return its id.
pub async fn create_session(app: Router) -> String {
    let (status, body) = post_json(app, "/chat/sessions", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    body["session_id"].as_str().expect("session_id").to_string()
}
