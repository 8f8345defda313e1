//! Phase snapshot UPSERT law through the HTTP API. Own binary so that
//! `load-latest` sees only this test's task.

mod helpers;

use axum::http::StatusCode;
use helpers::{get_json, post_json, test_app};
use serde_json::json;

#[tokio::test]
async fn test_save_phase_twice_upserts_single_snapshot() {
    let phases = json!({
        "detect": "running", "claims": "idle", "evidence": "idle",
        "report": "idle", "simulation": "idle", "content": "idle",
    });
    let (status, body) = post_json(
        test_app(),
        "/pipeline/save-phase",
        json!({
            "task_id": "task-upsert-api",
            "input_text": "测试文本",
            "phases": phases,
            "phase": "detect",
            "status": "running",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "detect");
    assert_eq!(body["status"], "running");

    let phases_done = json!({
        "detect": "done", "claims": "idle", "evidence": "idle",
        "report": "idle", "simulation": "idle", "content": "idle",
    });
    let (status, _) = post_json(
        test_app(),
        "/pipeline/save-phase",
        json!({
            "task_id": "task-upsert-api",
            "input_text": "测试文本",
            "phases": phases_done,
            "phase": "detect",
            "status": "done",
            "duration_ms": 321,
            "payload": {"label": "suspicious"},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, latest) = get_json(test_app(), "/pipeline/load-latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["task_id"], "task-upsert-api");
    assert_eq!(latest["phases"]["detect"], "done");

    let detect_snapshots: Vec<_> = latest["snapshots"]
        .as_array()
        .expect("snapshots")
        .iter()
        .filter(|s| s["phase"] == "detect")
        .collect();
    assert_eq!(detect_snapshots.len(), 1, "UPSERT must keep one row");
    assert_eq!(detect_snapshots[0]["status"], "done");
    assert_eq!(detect_snapshots[0]["duration_ms"], 321);
    assert_eq!(detect_snapshots[0]["payload"]["label"], "suspicious");
}

#[tokio::test]
async fn test_save_phase_rejects_empty_task_id() {
    let (status, body) = post_json(
        test_app(),
        "/pipeline/save-phase",
        json!({
            "task_id": "  ",
            "input_text": "x",
            "phases": {"detect": "idle", "claims": "idle", "evidence": "idle",
                        "report": "idle", "simulation": "idle", "content": "idle"},
            "phase": "detect",
            "status": "idle",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap_or("").contains("task_id"));
}
