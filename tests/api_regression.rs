//! End-to-end API regression tests against the rule-path pipeline.

mod helpers;

use axum::http::StatusCode;
use helpers::{
    create_session, first_message_content, get_json, parse_events, post_json, post_sse, test_app,
};
use serde_json::json;

#[tokio::test]
async fn test_healthz() {
    let (status, body) = get_json(test_app(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_analyze_stream_full_pipeline() {
    let session_id = create_session(test_app()).await;

    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/analyze 震惊！内部消息称100%真实，必须立即转发。", "context": null}),
    )
    .await;

    let events = parse_events(&raw);

    // Every stage opens and closes, in pipeline order.
    let stage_updates: Vec<(String, String)> = events
        .iter()
        .filter(|e| e["type"] == "stage")
        .map(|e| {
            (
                e["data"]["stage"].as_str().unwrap_or("").to_string(),
                e["data"]["status"].as_str().unwrap_or("").to_string(),
            )
        })
        .collect();
    let running: Vec<&str> = stage_updates
        .iter()
        .filter(|(_, s)| s == "running")
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(
        running,
        vec!["risk", "claims", "evidence_search", "evidence_align", "report"]
    );
    for (stage, _) in stage_updates.iter().filter(|(_, s)| s == "running") {
        assert!(
            stage_updates
                .iter()
                .any(|(name, status)| name == stage && (status == "done" || status == "failed")),
            "stage {stage} never closed"
        );
    }

    // Exactly one message before exactly one done.
    let kinds: Vec<&str> = events
        .iter()
        .filter_map(|e| e["type"].as_str())
        .collect();
    assert_eq!(kinds.iter().filter(|k| **k == "message").count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == "done").count(), 1);
    assert!(kinds.iter().position(|k| *k == "message") < kinds.iter().position(|k| *k == "done"));

    // The final message binds a record id.
    let message = events
        .iter()
        .find(|e| e["type"] == "message")
        .expect("message event");
    let record_id = message["data"]["message"]["meta"]["record_id"]
        .as_str()
        .expect("record_id")
        .to_string();

    // The record exists, with the expected rule-path verdict.
    let (status, detail) = get_json(test_app(), &format!("/history/{record_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let label = detail["report"]["risk_label"].as_str().unwrap_or("");
    assert!(
        label == "suspicious" || label == "likely_misinformation",
        "unexpected label {label}"
    );
    let points = detail["report"]["suspicious_points"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert!(points.iter().any(|p| p.as_str().unwrap_or("").contains("c1")));
}

#[tokio::test]
async fn test_why_without_record_shows_usage() {
    let session_id = create_session(test_app()).await;
    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/why", "context": null}),
    )
    .await;
    let content = first_message_content(&raw);
    assert!(content.contains("用法：/why"));
}

#[tokio::test]
async fn test_evidence_only_reuses_session_claims() {
    let session_id = create_session(test_app()).await;
    let text = "网传某地突发事件已被官方证实，请立即转发提醒家人。";

    let raw_claims = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": format!("/claims_only {text}"), "context": null}),
    )
    .await;
    assert!(first_message_content(&raw_claims).contains("主张抽取完成"));

    let raw_evidence = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": format!("/evidence_only {text}"), "context": null}),
    )
    .await;
    let content = first_message_content(&raw_evidence);
    assert!(content.contains("证据检索完成"));
    assert!(raw_evidence.contains("复用 session 的 claims"));
    assert!(!raw_evidence.contains("自动执行主张抽取前置阶段"));
}

#[tokio::test]
async fn test_evidence_only_new_text_auto_plans_claims() {
    let session_id = create_session(test_app()).await;

    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/evidence_only 网传某高校已停课并封校，家长群紧急转发。", "context": null}),
    )
    .await;
    let content = first_message_content(&raw);
    assert!(content.contains("证据检索完成"));
    assert!(raw.contains("自动执行主张抽取前置阶段"));
}

#[tokio::test]
async fn test_simulate_requires_report_context() {
    let session_id = create_session(test_app()).await;
    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/simulate", "context": null}),
    )
    .await;
    let content = first_message_content(&raw);
    assert!(content.contains("缺少 report 中间态"));
    assert!(content.contains("/report_only"));
    assert!(content.contains("record_id"));
}

#[tokio::test]
async fn test_single_skill_chain_to_report() {
    let session_id = create_session(test_app()).await;
    let text = "网传某地突发重大医疗事件，已导致多人死亡，官方尚未回应。";

    for command in [
        format!("/claims_only {text}"),
        format!("/evidence_only {text}"),
        "/align_only".to_string(),
    ] {
        let raw = post_sse(
            test_app(),
            &format!("/chat/sessions/{session_id}/messages/stream"),
            json!({"text": command, "context": null}),
        )
        .await;
        assert!(raw.contains("\"type\":\"done\""));
    }

    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/report_only", "context": null}),
    )
    .await;
    assert!(raw.contains("【报告详情】"));
    assert!(raw.contains("[识别场景]"));
    assert!(raw.contains("[风险评分]"));
    assert!(raw.contains("[可疑点]"));
    let content = first_message_content(&raw);
    assert!(content.contains("report_only 完成"));
    assert!(content.contains("未写入历史记录"));

    // With the report in place, simulate now runs and emits its blocks.
    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/simulate", "context": null}),
    )
    .await;
    assert!(raw.contains("【舆情预演-情绪分布】"));
    assert!(raw.contains("【舆情预演-叙事分支】"));
    assert!(raw.contains("【舆情预演-引爆点】"));
    assert!(raw.contains("【舆情预演-应对建议】"));
    assert!(raw.contains("\"stage\":\"simulate\",\"status\":\"running\""));
    assert!(raw.contains("\"stage\":\"simulate\",\"status\":\"done\""));
    assert!(first_message_content(&raw).contains("simulate 完成"));

    // content_generate completes against the same report context.
    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/content_generate style=formal", "context": null}),
    )
    .await;
    assert!(raw.contains("【应对内容生成结果】"));
    let content = first_message_content(&raw);
    assert!(content.contains("content_generate 完成"));
    assert!(content.contains("澄清稿：3 个版本"));

    // content_show renders the stored bundle between markers.
    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/content_show clarification short", "context": null}),
    )
    .await;
    assert!(raw.contains("-----BEGIN CLARIFICATION_SHORT-----"));
    assert!(first_message_content(&raw).contains("content_show 完成"));
}

#[tokio::test]
async fn test_detect_endpoint_rule_path() {
    let (status, body) = post_json(
        test_app(),
        "/detect",
        json!({"text": "shocking news, 100% true, must share immediately"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["score"].as_i64().unwrap_or(0) > 60);
    assert_eq!(body["label"], "high_risk");
    assert!(body["strategy"]["max_claims"].as_i64().is_some());
}

#[tokio::test]
async fn test_detect_claims_endpoint() {
    let (status, body) = post_json(
        test_app(),
        "/detect/claims",
        json!({"text": "某医院2026-01-02宣布感染率下降20%。官方通报称数据属实。"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let claims = body["claims"].as_array().expect("claims");
    assert!(!claims.is_empty());
    assert_eq!(claims[0]["claim_id"], "c1");
}

#[tokio::test]
async fn test_history_feedback_missing_record_404() {
    let (status, body) = post_json(
        test_app(),
        "/history/no-such-record/feedback",
        json!({"status": "accurate"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "history not found");
}

#[tokio::test]
async fn test_history_feedback_rejects_bad_status() {
    let (status, _) = post_json(
        test_app(),
        "/history/whatever/feedback",
        json!({"status": "definitely-wrong"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_simulate_endpoint_rule_path() {
    let (status, body) = post_json(
        test_app(),
        "/simulate",
        json!({"text": "网传某事件即将引发大规模讨论，平台情绪激烈。"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["narratives"].as_array().unwrap_or(&Vec::new()).is_empty());
    assert!(!body["flashpoints"].as_array().unwrap_or(&Vec::new()).is_empty());
    assert!(body["suggestion"]["summary"].as_str().is_some());
}

#[tokio::test]
async fn test_chat_non_streaming_guidance() {
    let (status, body) = post_json(
        test_app(),
        "/chat",
        json!({"text": "你好"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["session_id"].as_str().is_some());
    assert!(body["assistant_message"]["content"].as_str().is_some());
}

#[tokio::test]
async fn test_session_detail_roundtrip() {
    let session_id = create_session(test_app()).await;
    let _ = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/help", "context": null}),
    )
    .await;

    let (status, body) = get_json(test_app(), &format!("/chat/sessions/{session_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["session_id"], json!(session_id));
    let messages = body["messages"].as_array().expect("messages");
    assert!(messages.len() >= 2, "user + assistant messages expected");

    let (status, _) = get_json(test_app(), "/chat/sessions/chat_does_not_exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
