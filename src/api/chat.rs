//! Chat endpoints: non-streaming `/chat`, the SSE variants, and session
//! CRUD.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::chat::messages;
use crate::chat::parser::parse_tool;
use crate::chat::sse::{event_stream, sse_headers, EventSender};
use crate::guardrails;
use crate::llm::acquire_slot;
use crate::orchestrator;
use crate::stages::{pipeline as stage_pipeline, report as report_stage, risk};
use crate::store::sessions::MessageRow;
use crate::types::{ChatAction, ChatMessage, ChatReference, ChatRequest, ChatResponse, ChatSession};

use super::error::ApiError;
use super::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionCreateRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub meta: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

fn default_list_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<ChatSession>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    pub session: ChatSession,
    pub messages: Vec<MessageRow>,
}

#[derive(Debug, Deserialize)]
pub struct SessionMessageRequest {
    pub text: String,
    #[serde(default)]
    pub context: Option<Value>,
}

fn ensure_session(state: &AppState, session_id: Option<&str>) -> Result<String, ApiError> {
    if let Some(id) = session_id {
        if state.dispatcher.sessions.get_session(id)?.is_some() {
            return Ok(id.to_string());
        }
    }
    let created = state.dispatcher.sessions.create_session(None, None)?;
    Ok(created.session_id)
}

/// POST /chat/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionCreateRequest>,
) -> Result<Json<ChatSession>, ApiError> {
    let created = state
        .dispatcher
        .sessions
        .create_session(payload.title, payload.meta)?;
    Ok(Json(created))
}

/// GET /chat/sessions?limit=N
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions = state.dispatcher.sessions.list_sessions(query.limit)?;
    Ok(Json(SessionListResponse { sessions }))
}

/// GET /chat/sessions/{id}
pub async fn session_detail(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetailResponse>, ApiError> {
    let session = state
        .dispatcher
        .sessions
        .get_session(&session_id)?
        .ok_or_else(|| ApiError::not_found("session_not_found"))?;
    let messages = state.dispatcher.sessions.list_messages(&session_id, 50)?;
    Ok(Json(SessionDetailResponse { session, messages }))
}

/// POST /chat/sessions/{id}/messages/stream — the session-scoped SSE turn.
pub async fn session_message_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<SessionMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if state
        .dispatcher
        .sessions
        .get_session(&session_id)?
        .is_none()
    {
        return Err(ApiError::not_found("session_not_found"));
    }

    let (tx, rx) = EventSender::channel(&session_id);
    let dispatcher = state.dispatcher;
    let text = payload.text;
    let context = payload.context;
    tokio::spawn(async move {
        dispatcher
            .dispatch_stream(&text, context.as_ref(), &tx)
            .await;
    });

    Ok((sse_headers(), event_stream(rx)))
}

/// POST /chat/stream — session resolved (or created) from the payload.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = ensure_session(&state, payload.session_id.as_deref())?;

    let (tx, rx) = EventSender::channel(&session_id);
    let dispatcher = state.dispatcher;
    let text = payload.text;
    let context = payload.context;
    tokio::spawn(async move {
        dispatcher
            .dispatch_stream(&text, context.as_ref(), &tx)
            .await;
    });

    Ok((sse_headers(), event_stream(rx)))
}

/// POST /chat — non-streaming minimal orchestration.
pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = ensure_session(&state, payload.session_id.as_deref())?;
    let sessions = &state.dispatcher.sessions;
    let history = &state.dispatcher.history;
    let text = payload.text.trim().to_string();

    let _ = sessions.append_message(&session_id, "user", &text, None, None, None);

    let meta = sessions.get_meta(&session_id);
    let (tool, args) = parse_tool(&text, &meta);
    let str_arg = |key: &str| {
        args.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let msg = match tool.as_str() {
        "why" => {
            let record_id = resolve_record_id(&str_arg("record_id"), payload.context.as_ref());
            if record_id.is_empty() {
                messages::build_why_usage_message()
            } else {
                messages::run_why(history, &record_id)
            }
        }
        "more_evidence" => {
            let record_id = resolve_record_id(&str_arg("record_id"), payload.context.as_ref());
            if record_id.is_empty() {
                messages::build_why_usage_message()
            } else {
                messages::run_more_evidence(history, &record_id)
            }
        }
        "rewrite" => {
            let record_id = resolve_record_id(&str_arg("record_id"), payload.context.as_ref());
            if record_id.is_empty() {
                messages::build_why_usage_message()
            } else {
                messages::run_rewrite(history, &record_id, &str_arg("style"))
            }
        }
        "list" => messages::run_list(
            history,
            args.get("limit").and_then(Value::as_i64).unwrap_or(10),
        ),
        "load_history" => messages::run_load_history(history, &str_arg("record_id")),
        "analyze" => {
            let analyze_text = str_arg("text");
            if analyze_text.is_empty() {
                ChatMessage::assistant("用法：/analyze <待分析文本>。")
                    .with_actions(base_actions())
            } else {
                run_analyze_blocking(&state, &session_id, &analyze_text).await?
            }
        }
        _ => ChatMessage::assistant(format!(
            "目前 /chat 支持最小工具白名单编排。\n\n\
             - 若要发起分析：发送 `/analyze <待分析文本>`（建议粘贴完整原文）\n\
             - 流式单技能编排请使用 /chat/stream 或会话级 SSE 端点\n\n\
             你输入的是：{}",
            text.chars().take(200).collect::<String>()
        ))
        .with_actions({
            let mut actions = base_actions();
            actions.push(ChatAction::command(
                "示例：开始分析",
                "/analyze 网传某事件100%真实，内部人士称...",
            ));
            actions
        }),
    };

    let _ = sessions.append_message(
        &session_id,
        "assistant",
        &msg.content,
        serde_json::to_value(&msg.actions).ok(),
        serde_json::to_value(&msg.references).ok(),
        msg.meta.clone(),
    );

    Ok(Json(ChatResponse {
        session_id,
        assistant_message: msg,
    }))
}

fn resolve_record_id(parsed: &str, context: Option<&Value>) -> String {
    if !parsed.is_empty() {
        return parsed.to_string();
    }
    context
        .and_then(|ctx| {
            ["record_id", "recordId"]
                .iter()
                .filter_map(|k| ctx.get(*k).and_then(Value::as_str))
                .find(|s| !s.trim().is_empty())
        })
        .unwrap_or_default()
        .to_string()
}

fn base_actions() -> Vec<ChatAction> {
    vec![
        ChatAction::link("打开对话工作台", "/chat"),
        ChatAction::link("检测结果", "/result"),
        ChatAction::link("历史记录", "/history"),
    ]
}

/// The non-streaming full pipeline behind POST /chat.
async fn run_analyze_blocking(
    state: &AppState,
    session_id: &str,
    text: &str,
) -> Result<ChatMessage, ApiError> {
    let sanitized = guardrails::sanitize_text(text);
    let analyze_text = sanitized.sanitized;

    let risk_result = {
        let _slot = acquire_slot().await;
        risk::detect_risk_snapshot(&analyze_text).await
    };
    let claims = {
        let _slot = acquire_slot().await;
        orchestrator::run_claims(&analyze_text, risk_result.strategy.as_ref()).await
    };
    let evidences =
        stage_pipeline::retrieve_evidence(&claims, risk_result.strategy.as_ref()).await;
    let aligned = {
        let _slot = acquire_slot().await;
        stage_pipeline::align_evidences(&claims, &evidences, risk_result.strategy.as_ref()).await
    };
    let report = {
        let _slot = acquire_slot().await;
        report_stage::build_report(&claims, &aligned, &analyze_text).await
    };

    let record_id = state.dispatcher.history.save_report(
        &analyze_text,
        &serde_json::to_value(&report).unwrap_or(Value::Null),
        Some(&json!({
            "label": risk_result.label,
            "confidence": risk_result.confidence,
            "score": risk_result.score,
            "reasons": risk_result.reasons,
        })),
        None,
    )?;

    let updates = BTreeMap::from([
        ("record_id".to_string(), json!(record_id)),
        ("bound_record_id".to_string(), json!(record_id)),
    ]);
    let _ = state
        .dispatcher
        .sessions
        .update_meta_fields(session_id, updates);

    let mut refs = vec![ChatReference {
        title: format!("历史记录已保存：{record_id}"),
        href: "/history".to_string(),
        description: Some("可在历史记录页查看详情并回放。".to_string()),
    }];
    for item in aligned.iter().take(5) {
        if item.url.starts_with("http") {
            refs.push(ChatReference {
                title: item.title.chars().take(80).collect(),
                href: item.url.clone(),
                description: Some(format!(
                    "立场: {} · 置信度: {}",
                    item.stance,
                    item.alignment_confidence
                        .map(|c| format!("{c:.2}"))
                        .unwrap_or_else(|| "N/A".to_string())
                )),
            });
        }
    }

    let mut actions = base_actions();
    actions.push(ChatAction::command(
        "加载本次结果到前端",
        format!("/load_history {record_id}"),
    ));
    actions.push(ChatAction::command("为什么这样判定", format!("/why {record_id}")));

    Ok(ChatMessage::assistant(format!(
        "已完成一次全链路分析，并写入历史记录。\n\n\
         - 风险快照: {}（score={}）\n\
         - 主张数: {}\n\
         - 对齐证据数: {}\n\
         - 报告风险: {}（{}）\n\
         - 场景: {}\n",
        risk_result.label,
        risk_result.score,
        claims.len(),
        aligned.len(),
        report.risk_label,
        report.risk_score,
        report.detected_scenario,
    ))
    .with_actions(actions)
    .with_references(refs)
    .with_meta(json!({"record_id": record_id})))
}
