//! `/list` against a fresh database. Own binary so no other test has
//! written a history record first.

mod helpers;

use helpers::{create_session, first_message_content, post_sse, test_app};
use serde_json::json;

#[tokio::test]
async fn test_list_on_fresh_database() {
    let session_id = create_session(test_app()).await;
    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/list", "context": null}),
    )
    .await;

    let content = first_message_content(&raw);
    assert!(content.contains("暂无可用的历史记录"));
    // Single message, then done; no stage events for a record tool.
    let events = helpers::parse_events(&raw);
    assert!(events.iter().all(|e| e["type"] != "stage"));
    assert_eq!(
        events.iter().filter(|e| e["type"] == "message").count(),
        1
    );
    assert_eq!(events.iter().filter(|e| e["type"] == "done").count(), 1);
}

#[tokio::test]
async fn test_unclear_text_gets_clarify_prompt() {
    let session_id = create_session(test_app()).await;
    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "这段话不知道要干嘛", "context": null}),
    )
    .await;
    let content = first_message_content(&raw);
    assert!(content.contains("意图还不够明确"));
    assert!(content.contains("文本预览"));
}
