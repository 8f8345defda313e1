//! Per-session budget enforcement. Own binary: the budget env ceilings are
//! process-wide.

mod helpers;

use helpers::{create_session, first_message_content, post_sse, test_app};
use serde_json::json;

// The ceilings are env vars; serialize the tests that flip them.
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn env_guard() -> std::sync::MutexGuard<'static, ()> {
    match ENV_LOCK.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[tokio::test]
async fn test_tool_budget_blocks_and_keeps_llm_counter() {
    let _guard = env_guard();
    std::env::set_var("VERISIFT_SESSION_TOOL_MAX_CALLS", "1");
    std::env::set_var("VERISIFT_SESSION_LLM_MAX_CALLS", "20");

    let session_id = create_session(test_app()).await;
    let sessions = verisift::SessionStore::new();
    sessions
        .update_meta_fields(
            &session_id,
            std::collections::BTreeMap::from([
                ("tool_call_count".to_string(), json!(1)),
                ("llm_call_count".to_string(), json!(0)),
            ]),
        )
        .expect("seed budget counters");

    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/claims_only 测试文本", "context": null}),
    )
    .await;
    let content = first_message_content(&raw);
    assert!(content.contains("工具调用已达上限"));

    // The refused dispatch consumed nothing.
    let meta = sessions.get_meta(&session_id);
    assert_eq!(meta["llm_call_count"], json!(0));
    assert_eq!(meta["tool_call_count"], json!(1));
}

#[tokio::test]
async fn test_llm_budget_blocks_llm_tools() {
    let _guard = env_guard();
    std::env::set_var("VERISIFT_SESSION_TOOL_MAX_CALLS", "50");
    std::env::set_var("VERISIFT_SESSION_LLM_MAX_CALLS", "1");

    let session_id = create_session(test_app()).await;
    let sessions = verisift::SessionStore::new();
    sessions
        .update_meta_fields(
            &session_id,
            std::collections::BTreeMap::from([
                ("tool_call_count".to_string(), json!(0)),
                ("llm_call_count".to_string(), json!(1)),
            ]),
        )
        .expect("seed budget counters");

    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/claims_only 测试文本", "context": null}),
    )
    .await;
    let content = first_message_content(&raw);
    assert!(content.contains("LLM 调用已达上限"));
}

#[tokio::test]
async fn test_record_tools_ignore_budgets() {
    let _guard = env_guard();
    std::env::set_var("VERISIFT_SESSION_TOOL_MAX_CALLS", "1");

    let session_id = create_session(test_app()).await;
    let sessions = verisift::SessionStore::new();
    sessions
        .update_meta_fields(
            &session_id,
            std::collections::BTreeMap::from([("tool_call_count".to_string(), json!(99))]),
        )
        .expect("seed budget counters");

    let raw = post_sse(
        test_app(),
        &format!("/chat/sessions/{session_id}/messages/stream"),
        json!({"text": "/list", "context": null}),
    )
    .await;
    let content = first_message_content(&raw);
    assert!(!content.contains("工具调用已达上限"));
}
