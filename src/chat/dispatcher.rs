//! Per-turn dispatcher.
//!
//! One user turn runs the linear machine PARSE -> SANITIZE -> BUDGET ->
//! CACHE_LOOKUP -> PLAN -> EXECUTE -> PERSIST -> EMIT -> DONE. Any step's
//! failure jumps to the error emit; the turn always terminates with exactly
//! one `message` (or `error`) followed by one `done`.
//!
//! Intermediate artifacts live in two places: phase snapshots in the
//! pipeline-state store (resume, REST visibility) and per-input-hash
//! payload buckets in the session meta (cross-tool reuse within a session).

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::chat::messages;
use crate::chat::parser::parse_tool;
use crate::chat::sse::EventSender;
use crate::config;
use crate::guardrails;
use crate::llm::acquire_slot;
use crate::orchestrator;
use crate::stages::{content as content_stage, pipeline, report as report_stage, risk, simulate};
use crate::store::pipeline_state::PhaseUpsert;
use crate::store::{HistoryStore, PipelineStateStore, SessionStore};
use crate::types::{
    idle_phases, ChatAction, ChatMessage, ChatReference, ClaimItem, EvidenceItem, Phase,
    PhaseStatus, Report, SimulateResponse,
};

const LLM_TOOLS: [&str; 7] = [
    "analyze",
    "claims_only",
    "evidence_only",
    "align_only",
    "report_only",
    "simulate",
    "content_generate",
];

const RECORD_TOOLS: [&str; 7] = [
    "load_history",
    "list",
    "why",
    "more_evidence",
    "rewrite",
    "compare",
    "deep_dive",
];

/// Stable hash of a canonical JSON payload, used for session cache keys.
pub fn stable_hash_payload(payload: &Value) -> String {
    let canonical = serde_json::to_string(payload).unwrap_or_default();
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

/// Bucket key for one input text.
pub fn hash_input_text(text: &str) -> String {
    format!("{:x}", md5::compute(text.trim().as_bytes()))
}

fn str_arg(args: &Map<String, Value>, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The dispatcher and its stores.
#[derive(Clone, Copy, Default)]
pub struct Dispatcher {
    pub sessions: SessionStore,
    pub history: HistoryStore,
    pub pipeline_state: PipelineStateStore,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one streamed turn. Emits the full ordered SSE sequence and never
    /// leaves the stream without a terminating `done`.
    pub async fn dispatch_stream(&self, text: &str, context: Option<&Value>, tx: &EventSender) {
        let session_id = tx.session_id().to_string();

        // User message lands first, best-effort.
        let user_meta = context.map(|ctx| json!({"context": ctx}));
        if let Err(e) =
            self.sessions
                .append_message(&session_id, "user", text, None, None, user_meta)
        {
            warn!(error = %e, "failed to persist user message");
        }

        let meta = self.sessions.get_meta(&session_id);
        let (tool, mut args) = parse_tool(text, &meta);

        // Front-end context supplies a record id when the session has none.
        if str_arg(&args, "record_id").is_empty() {
            if let Some(ctx) = context {
                let ctx_record = ["record_id", "recordId"]
                    .iter()
                    .filter_map(|k| ctx.get(*k).and_then(Value::as_str))
                    .find(|s| !s.trim().is_empty())
                    .unwrap_or_default()
                    .to_string();
                if !ctx_record.is_empty() {
                    args.insert("record_id".to_string(), Value::String(ctx_record));
                }
            }
        }

        if tool == "help" {
            let msg = if args.get("clarify").and_then(Value::as_bool).unwrap_or(false) {
                messages::build_intent_clarify_message(&str_arg(&args, "text"))
            } else {
                messages::build_help_message()
            };
            self.finish_with_message(&session_id, tx, msg);
            return;
        }

        // SANITIZE: whitelist + per-tool validator, fail-closed.
        let validation = guardrails::validate_tool_call(&tool, &args);
        if !validation.is_valid {
            let msg = match tool.as_str() {
                "why" | "load_history" | "more_evidence" | "rewrite" => {
                    messages::build_why_usage_message()
                }
                "compare" => ChatMessage::assistant(
                    "用法：/compare <record_id_1> <record_id_2>\n\n例如：/compare rec_abc123 rec_def456",
                )
                .with_actions(vec![ChatAction::command("列出最近记录", "/list")]),
                "deep_dive" => ChatMessage::assistant(
                    "用法：/deep_dive <record_id> [focus] [claim_index]\n\n\
                     - focus 可选：general（默认）/evidence/claims/timeline/sources\n\
                     - claim_index：指定深入分析第几条主张（从0开始）",
                )
                .with_actions(vec![ChatAction::command("列出最近记录", "/list")]),
                _ => ChatMessage::assistant(format!(
                    "参数校验失败：\n- {}\n\n请检查输入后重试。",
                    validation.errors.join("\n- ")
                ))
                .with_actions(vec![ChatAction::command("查看帮助", "/help")]),
            };
            self.finish_with_message(&session_id, tx, msg);
            return;
        }

        if !validation.warnings.is_empty() {
            tx.token(guardrails::build_warning_message(&validation.warnings));
        }
        let args = validation.args;

        // Record-centric tools answer straight from the history store.
        if RECORD_TOOLS.contains(&tool.as_str()) {
            let msg = self.run_record_tool(&session_id, &tool, &args);
            self.finish_with_message(&session_id, tx, msg);
            return;
        }

        // BUDGET: per-session ceilings fail closed before any planning.
        if let Some(msg) = self.check_budgets(&meta, &tool) {
            self.finish_with_message(&session_id, tx, msg);
            return;
        }
        self.consume_budget(&session_id, &meta, &tool);

        // EXECUTE.
        match tool.as_str() {
            "analyze" => self.run_analyze(&session_id, &args, tx).await,
            "claims_only" => self.run_claims_only(&session_id, &args, tx).await,
            "evidence_only" => self.run_evidence_only(&session_id, &args, tx).await,
            "align_only" => self.run_align_only(&session_id, &args, tx).await,
            "report_only" => self.run_report_only(&session_id, &args, tx).await,
            "simulate" => self.run_simulate(&session_id, &args, tx).await,
            "content_generate" => self.run_content(&session_id, &args, tx).await,
            "export" => {
                let msg = ChatMessage::assistant(
                    "导出功能请在历史记录页使用：打开记录详情后选择导出。",
                )
                .with_actions(vec![ChatAction::link("打开历史记录", "/history")]);
                self.finish_with_message(&session_id, tx, msg);
            }
            other => {
                // Unreachable after the whitelist check.
                tx.error(format!("未知工具：{other}"));
                tx.done();
            }
        }
    }

    // ========================================================================
    // Shared plumbing
    // ========================================================================

    fn finish_with_message(&self, session_id: &str, tx: &EventSender, msg: ChatMessage) {
        self.persist_assistant_message(session_id, &msg);
        tx.message(&msg);
        tx.done();
    }

    fn persist_assistant_message(&self, session_id: &str, msg: &ChatMessage) {
        let result = self.sessions.append_message(
            session_id,
            "assistant",
            &msg.content,
            serde_json::to_value(&msg.actions).ok(),
            serde_json::to_value(&msg.references).ok(),
            msg.meta.clone(),
        );
        if let Err(e) = result {
            warn!(error = %e, "failed to persist assistant message");
        }
    }

    fn check_budgets(
        &self,
        meta: &BTreeMap<String, Value>,
        tool: &str,
    ) -> Option<ChatMessage> {
        let count_of = |key: &str| meta.get(key).and_then(Value::as_i64).unwrap_or(0);

        if let Some(max_tools) = config::session_tool_max_calls() {
            if count_of("tool_call_count") >= max_tools {
                return Some(
                    ChatMessage::assistant(format!(
                        "工具调用已达上限（{max_tools}）。\n\n\
                         本会话的工具调用预算已用完，可以新建会话继续，或提高 \
                         VERISIFT_SESSION_TOOL_MAX_CALLS 后重试。"
                    ))
                    .with_actions(vec![ChatAction::link("打开历史记录", "/history")]),
                );
            }
        }
        if LLM_TOOLS.contains(&tool) {
            if let Some(max_llm) = config::session_llm_max_calls() {
                if count_of("llm_call_count") >= max_llm {
                    return Some(
                        ChatMessage::assistant(format!(
                            "LLM 调用已达上限（{max_llm}）。\n\n\
                             本会话的模型调用预算已用完，可以新建会话继续，或提高 \
                             VERISIFT_SESSION_LLM_MAX_CALLS 后重试。"
                        ))
                        .with_actions(vec![ChatAction::link("打开历史记录", "/history")]),
                    );
                }
            }
        }
        None
    }

    fn consume_budget(&self, session_id: &str, meta: &BTreeMap<String, Value>, tool: &str) {
        let count_of = |key: &str| meta.get(key).and_then(Value::as_i64).unwrap_or(0);
        let mut updates = BTreeMap::from([(
            "tool_call_count".to_string(),
            json!(count_of("tool_call_count") + 1),
        )]);
        if LLM_TOOLS.contains(&tool) {
            updates.insert(
                "llm_call_count".to_string(),
                json!(count_of("llm_call_count") + 1),
            );
        }
        if let Err(e) = self.sessions.update_meta_fields(session_id, updates) {
            warn!(error = %e, "failed to update budget counters");
        }
    }

    fn bump_llm_budget(&self, session_id: &str) {
        let meta = self.sessions.get_meta(session_id);
        let count = meta
            .get("llm_call_count")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let _ = self.sessions.update_meta(session_id, "llm_call_count", json!(count + 1));
    }

    fn run_record_tool(
        &self,
        session_id: &str,
        tool: &str,
        args: &Map<String, Value>,
    ) -> ChatMessage {
        let record_id = str_arg(args, "record_id");
        let msg = match tool {
            "load_history" => messages::run_load_history(&self.history, &record_id),
            "list" => messages::run_list(
                &self.history,
                args.get("limit").and_then(Value::as_i64).unwrap_or(10),
            ),
            "why" => messages::run_why(&self.history, &record_id),
            "more_evidence" => messages::run_more_evidence(&self.history, &record_id),
            "rewrite" => messages::run_rewrite(&self.history, &record_id, &str_arg(args, "style")),
            "compare" => messages::run_compare(
                &self.history,
                &str_arg(args, "record_id_1"),
                &str_arg(args, "record_id_2"),
            ),
            "deep_dive" => messages::run_deep_dive(
                &self.history,
                &record_id,
                &str_arg(args, "focus"),
                args.get("claim_index").and_then(Value::as_i64).map(|i| i as usize),
            ),
            _ => messages::build_help_message(),
        };

        // Successful lookups bind the record to the session for follow-ups.
        if tool == "load_history" {
            if let Some(bound) = msg
                .meta
                .as_ref()
                .and_then(|m| m.get("record_id"))
                .and_then(Value::as_str)
            {
                let _ = self
                    .sessions
                    .update_meta(session_id, "bound_record_id", json!(bound));
            }
        }
        msg
    }

    fn upsert_phase(
        &self,
        task_id: &str,
        input_text: &str,
        phases: &BTreeMap<Phase, PhaseStatus>,
        phase: Phase,
        status: PhaseStatus,
        duration_ms: Option<i64>,
        payload: Option<&Value>,
    ) {
        let meta = json!({"source": "chat"});
        let result = self.pipeline_state.upsert_phase_snapshot(&PhaseUpsert {
            task_id,
            input_text,
            phases,
            phase,
            status,
            duration_ms,
            error_message: None,
            payload,
            meta: Some(&meta),
        });
        if let Err(e) = result {
            warn!(task_id, phase = %phase, error = %e, "phase snapshot upsert failed");
        }
    }

    fn bucket(&self, session_id: &str, input_hash: &str) -> Value {
        self.sessions
            .get_meta(session_id)
            .get("phase_payload_buckets")
            .and_then(|b| b.get(input_hash))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn store_bucket_payload(
        &self,
        session_id: &str,
        input_hash: &str,
        input_text: &str,
        phase_key: &str,
        payload: Value,
    ) {
        let meta = self.sessions.get_meta(session_id);
        let mut buckets = meta
            .get("phase_payload_buckets")
            .cloned()
            .unwrap_or_else(|| json!({}));
        if !buckets.is_object() {
            buckets = json!({});
        }
        let bucket = buckets
            .as_object_mut()
            .and_then(|map| {
                if !map.contains_key(input_hash) {
                    map.insert(input_hash.to_string(), json!({}));
                }
                map.get_mut(input_hash)
            })
            .and_then(Value::as_object_mut);
        if let Some(bucket) = bucket {
            bucket.insert(phase_key.to_string(), payload);
            bucket.insert("input_text".to_string(), json!(input_text));
            bucket.insert("updated_at".to_string(), json!(now_ts()));
        }

        let updates = BTreeMap::from([
            ("phase_payload_buckets".to_string(), buckets),
            ("input_text_hash".to_string(), json!(input_hash)),
        ]);
        if let Err(e) = self.sessions.update_meta_fields(session_id, updates) {
            warn!(error = %e, "failed to store phase payload bucket");
        }
    }

    /// Claims for `input_hash`, reused from the bucket when present,
    /// otherwise produced by the auto-inserted claims prerequisite.
    async fn resolve_claims(
        &self,
        session_id: &str,
        input_hash: &str,
        text: &str,
        tx: &EventSender,
    ) -> Vec<ClaimItem> {
        let cached: Option<Vec<ClaimItem>> = self
            .bucket(session_id, input_hash)
            .get("claims")
            .and_then(|p| p.get("claims"))
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());

        if let Some(claims) = cached {
            if !claims.is_empty() {
                tx.token(format!("复用 session 的 claims（{} 条）\n", claims.len()));
                return claims;
            }
        }

        tx.token("自动执行主张抽取前置阶段…\n");
        tx.stage("claims", "running");
        self.bump_llm_budget(session_id);
        let claims = {
            let _slot = acquire_slot().await;
            orchestrator::run_claims(text, None).await
        };
        tx.stage("claims", "done");
        self.store_bucket_payload(
            session_id,
            input_hash,
            text,
            "claims",
            json!({"claims": &claims, "count": claims.len()}),
        );
        claims
    }

    /// Retrieved (pre-alignment) evidence for `input_hash`, from the bucket
    /// or the auto-inserted retrieval prerequisite.
    async fn resolve_evidence(
        &self,
        session_id: &str,
        input_hash: &str,
        text: &str,
        claims: &[ClaimItem],
        tx: &EventSender,
    ) -> Vec<EvidenceItem> {
        let cached: Option<Vec<EvidenceItem>> = self
            .bucket(session_id, input_hash)
            .get("evidence")
            .and_then(|p| p.get("evidences"))
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());
        if let Some(evidences) = cached {
            if !evidences.is_empty() {
                tx.token(format!("复用 session 的证据（{} 条）\n", evidences.len()));
                return evidences;
            }
        }

        tx.token("自动执行证据检索前置阶段…\n");
        tx.stage("evidence_search", "running");
        let evidences = pipeline::retrieve_evidence(claims, None).await;
        tx.stage("evidence_search", "done");
        self.store_bucket_payload(
            session_id,
            input_hash,
            text,
            "evidence",
            json!({"evidences": &evidences, "count": evidences.len()}),
        );
        evidences
    }

    /// Report context for simulate / content_generate: the session bucket,
    /// the task's phase snapshot, then the bound history record.
    fn resolve_report_context(
        &self,
        session_id: &str,
        record_id: &str,
    ) -> Option<(Report, String, Option<String>)> {
        let meta = self.sessions.get_meta(session_id);

        if let Some(hash) = meta.get("input_text_hash").and_then(Value::as_str) {
            let bucket = self.bucket(session_id, hash);
            if let Some(report) = bucket
                .get("report")
                .and_then(|p| p.get("report"))
                .cloned()
                .and_then(|v| serde_json::from_value::<Report>(v).ok())
            {
                let input_text = bucket
                    .get("input_text")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let bound = bucket
                    .get("report")
                    .and_then(|p| p.get("record_id"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Some((report, input_text, bound));
            }
        }

        if let Ok(Some(payload)) = self.pipeline_state.get_phase_payload(session_id, Phase::Report)
        {
            if let Some(report) = payload
                .get("report")
                .cloned()
                .and_then(|v| serde_json::from_value::<Report>(v).ok())
            {
                let input_text = self
                    .pipeline_state
                    .load_task(session_id)
                    .ok()
                    .flatten()
                    .map(|(text, _)| text)
                    .unwrap_or_default();
                let bound = payload
                    .get("record_id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Some((report, input_text, bound));
            }
        }

        if !record_id.is_empty() {
            if let Ok(Some(record)) = self.history.get(record_id) {
                if let Ok(report) = serde_json::from_value::<Report>(record.report.clone()) {
                    return Some((report, record.input_text, Some(record.id)));
                }
            }
        }

        None
    }

    fn missing_report_message() -> ChatMessage {
        ChatMessage::assistant(
            "缺少 report 中间态：当前会话还没有可用的综合报告。\n\n\
             - 先执行 /report_only 生成报告，或\n\
             - 使用 /load_history <record_id> 绑定一条历史记录后重试。",
        )
        .with_actions(vec![
            ChatAction::command("仅生成报告", "/report_only"),
            ChatAction::command("列出最近记录", "/list"),
        ])
    }

    // ========================================================================
    // analyze: the full streamed pipeline
    // ========================================================================

    async fn run_analyze(&self, session_id: &str, args: &Map<String, Value>, tx: &EventSender) {
        let text = str_arg(args, "text");
        if text.trim().is_empty() {
            let msg = ChatMessage::assistant("用法：/analyze <待分析文本>。")
                .with_actions(vec![ChatAction::link("检测结果", "/result")]);
            self.finish_with_message(session_id, tx, msg);
            return;
        }

        let input_hash = hash_input_text(&text);
        let mut phases = idle_phases();
        tx.token("已收到文本，开始分析…\n");

        // Risk snapshot.
        tx.stage("risk", "running");
        tx.token("- 风险快照：计算中…\n");
        phases.insert(Phase::Detect, PhaseStatus::Running);
        self.upsert_phase(session_id, &text, &phases, Phase::Detect, PhaseStatus::Running, None, None);
        let started = Instant::now();
        let risk_result = {
            let _slot = acquire_slot().await;
            risk::detect_risk_snapshot(&text).await
        };
        tx.token(format!(
            "- 风险快照：完成（{}，score={}）\n",
            risk_result.label, risk_result.score
        ));
        tx.stage("risk", "done");
        phases.insert(Phase::Detect, PhaseStatus::Done);
        self.upsert_phase(
            session_id,
            &text,
            &phases,
            Phase::Detect,
            PhaseStatus::Done,
            Some(started.elapsed().as_millis() as i64),
            Some(&json!({"label": risk_result.label, "score": risk_result.score})),
        );

        // Claims.
        tx.stage("claims", "running");
        tx.token("- 主张抽取：进行中…\n");
        phases.insert(Phase::Claims, PhaseStatus::Running);
        self.upsert_phase(session_id, &text, &phases, Phase::Claims, PhaseStatus::Running, None, None);
        let started = Instant::now();
        let claims = {
            let _slot = acquire_slot().await;
            orchestrator::run_claims(&text, risk_result.strategy.as_ref()).await
        };
        tx.token(format!("- 主张抽取：完成（{} 条）\n", claims.len()));
        tx.stage("claims", "done");
        phases.insert(Phase::Claims, PhaseStatus::Done);
        let claims_payload = json!({"claims": &claims, "count": claims.len()});
        self.upsert_phase(
            session_id,
            &text,
            &phases,
            Phase::Claims,
            PhaseStatus::Done,
            Some(started.elapsed().as_millis() as i64),
            Some(&claims_payload),
        );
        self.store_bucket_payload(session_id, &input_hash, &text, "claims", claims_payload);

        // Evidence retrieval.
        tx.stage("evidence_search", "running");
        tx.token("- 联网检索证据：进行中…\n");
        phases.insert(Phase::Evidence, PhaseStatus::Running);
        self.upsert_phase(session_id, &text, &phases, Phase::Evidence, PhaseStatus::Running, None, None);
        let evidences =
            pipeline::retrieve_evidence(&claims, risk_result.strategy.as_ref()).await;
        tx.token(format!("- 联网检索证据：完成（候选 {} 条）\n", evidences.len()));
        tx.stage("evidence_search", "done");
        self.store_bucket_payload(
            session_id,
            &input_hash,
            &text,
            "evidence",
            json!({"evidences": &evidences, "count": evidences.len()}),
        );

        // Summarize + align.
        tx.stage("evidence_align", "running");
        tx.token("- 证据聚合与对齐：进行中…\n");
        let started = Instant::now();
        let aligned = {
            let _slot = acquire_slot().await;
            pipeline::align_evidences(&claims, &evidences, risk_result.strategy.as_ref()).await
        };
        tx.token(format!("- 证据聚合与对齐：完成（对齐 {} 条）\n", aligned.len()));
        tx.stage("evidence_align", "done");
        phases.insert(Phase::Evidence, PhaseStatus::Done);
        self.upsert_phase(
            session_id,
            &text,
            &phases,
            Phase::Evidence,
            PhaseStatus::Done,
            Some(started.elapsed().as_millis() as i64),
            Some(&json!({"aligned_count": aligned.len()})),
        );
        self.store_bucket_payload(
            session_id,
            &input_hash,
            &text,
            "align",
            json!({"evidences": &aligned, "count": aligned.len()}),
        );

        // Report.
        tx.stage("report", "running");
        tx.token("- 综合报告：生成中…\n");
        phases.insert(Phase::Report, PhaseStatus::Running);
        self.upsert_phase(session_id, &text, &phases, Phase::Report, PhaseStatus::Running, None, None);
        let started = Instant::now();
        let report = {
            let _slot = acquire_slot().await;
            report_stage::build_report(&claims, &aligned, &text).await
        };
        tx.token("- 综合报告：完成\n");
        tx.stage("report", "done");

        // PERSIST: history record + session binding + final snapshot.
        let record_id = self
            .history
            .save_report(
                &text,
                &serde_json::to_value(&report).unwrap_or(Value::Null),
                Some(&json!({
                    "label": risk_result.label,
                    "confidence": risk_result.confidence,
                    "score": risk_result.score,
                    "reasons": risk_result.reasons,
                })),
                None,
            )
            .map_err(|e| error!(error = %e, "failed to save history record"))
            .ok();

        if let Some(record_id) = &record_id {
            let updates = BTreeMap::from([
                ("record_id".to_string(), json!(record_id)),
                ("bound_record_id".to_string(), json!(record_id)),
            ]);
            let _ = self.sessions.update_meta_fields(session_id, updates);
        }

        phases.insert(Phase::Report, PhaseStatus::Done);
        let report_payload = json!({
            "report": &report,
            "record_id": &record_id,
            "risk_label": report.risk_label,
            "risk_score": report.risk_score,
        });
        self.upsert_phase(
            session_id,
            &text,
            &phases,
            Phase::Report,
            PhaseStatus::Done,
            Some(started.elapsed().as_millis() as i64),
            Some(&report_payload),
        );
        self.store_bucket_payload(session_id, &input_hash, &text, "report", report_payload);

        // Final message.
        let mut refs = Vec::new();
        if let Some(record_id) = &record_id {
            refs.push(ChatReference {
                title: format!("历史记录已保存：{record_id}"),
                href: "/history".to_string(),
                description: Some("可在历史记录页查看详情并回放。".to_string()),
            });
        }
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

        let mut actions = vec![
            ChatAction::link("打开检测结果", "/result"),
            ChatAction::link("打开历史记录", "/history"),
        ];
        if let Some(record_id) = &record_id {
            actions.push(ChatAction::command(
                "加载本次结果到前端",
                format!("/load_history {record_id}"),
            ));
            actions.push(ChatAction::command("为什么这样判定", format!("/why {record_id}")));
        }

        let msg = ChatMessage::assistant(format!(
            "已完成一次全链路分析，并写入历史记录。\n\n\
             - 风险快照: {}（score={}）\n\
             - 主张数: {}\n\
             - 对齐证据数: {}\n\
             - 报告风险: {}（{}）\n\
             - 场景: {}\n\n\
             提示：可使用下方命令把本次 record_id 加载到前端上下文进行追问。",
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
        .with_meta(json!({"record_id": record_id}));

        self.finish_with_message(session_id, tx, msg);
    }

    // ========================================================================
    // Single-skill tools
    // ========================================================================

    async fn run_claims_only(&self, session_id: &str, args: &Map<String, Value>, tx: &EventSender) {
        let text = str_arg(args, "text");
        let input_hash = hash_input_text(&text);

        tx.stage("claims", "running");
        tx.token("- 主张抽取：进行中…\n");
        let claims = {
            let _slot = acquire_slot().await;
            orchestrator::run_claims(&text, None).await
        };
        tx.stage("claims", "done");

        let payload = json!({"claims": &claims, "count": claims.len()});
        let mut phases = idle_phases();
        phases.insert(Phase::Claims, PhaseStatus::Done);
        self.upsert_phase(
            session_id,
            &text,
            &phases,
            Phase::Claims,
            PhaseStatus::Done,
            None,
            Some(&payload),
        );
        self.store_bucket_payload(session_id, &input_hash, &text, "claims", payload);

        let mut lines = vec![format!("主张抽取完成（{} 条）：", claims.len())];
        for claim in &claims {
            lines.push(format!("- {}：{}", claim.claim_id, claim.claim_text));
        }
        lines.push(String::new());
        lines.push("可继续执行 /evidence_only 复用这些主张检索证据。".to_string());

        let msg = ChatMessage::assistant(lines.join("\n"))
            .with_actions(vec![
                ChatAction::command("仅检索证据", format!("/evidence_only {text}")),
                ChatAction::command("仅生成报告", "/report_only"),
            ])
            .with_meta(json!({"input_text_hash": input_hash, "claims_count": claims.len()}));
        self.finish_with_message(session_id, tx, msg);
    }

    async fn run_evidence_only(&self, session_id: &str, args: &Map<String, Value>, tx: &EventSender) {
        let text = str_arg(args, "text");
        let input_hash = hash_input_text(&text);

        let claims = self.resolve_claims(session_id, &input_hash, &text, tx).await;

        tx.stage("evidence_search", "running");
        tx.token("- 联网检索证据：进行中…\n");
        let evidences = pipeline::retrieve_evidence(&claims, None).await;
        tx.stage("evidence_search", "done");

        let payload = json!({"evidences": &evidences, "count": evidences.len()});
        let mut phases = idle_phases();
        phases.insert(Phase::Evidence, PhaseStatus::Done);
        self.upsert_phase(
            session_id,
            &text,
            &phases,
            Phase::Evidence,
            PhaseStatus::Done,
            None,
            Some(&payload),
        );
        self.store_bucket_payload(session_id, &input_hash, &text, "evidence", payload);

        let msg = ChatMessage::assistant(format!(
            "证据检索完成（候选 {} 条）。\n\n\
             可继续执行 /align_only 做证据聚合与对齐，或 /report_only 直接生成报告。",
            evidences.len()
        ))
        .with_actions(vec![
            ChatAction::command("仅证据对齐", "/align_only"),
            ChatAction::command("仅生成报告", "/report_only"),
        ])
        .with_meta(json!({"input_text_hash": input_hash, "evidence_count": evidences.len()}));
        self.finish_with_message(session_id, tx, msg);
    }

    async fn run_align_only(&self, session_id: &str, args: &Map<String, Value>, tx: &EventSender) {
        let meta = self.sessions.get_meta(session_id);
        let mut text = str_arg(args, "text");
        let mut input_hash = hash_input_text(&text);
        if text.trim().is_empty() {
            // Fall back to the session's current input bucket.
            if let Some(hash) = meta.get("input_text_hash").and_then(Value::as_str) {
                input_hash = hash.to_string();
                text = self
                    .bucket(session_id, &input_hash)
                    .get("input_text")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
            }
        }
        if text.trim().is_empty() {
            let msg = ChatMessage::assistant(
                "缺少可对齐的中间态：请先执行 /claims_only 与 /evidence_only，或直接 /analyze。",
            )
            .with_actions(vec![ChatAction::command("查看帮助", "/help")]);
            self.finish_with_message(session_id, tx, msg);
            return;
        }

        let claims = self.resolve_claims(session_id, &input_hash, &text, tx).await;
        let evidences = self
            .resolve_evidence(session_id, &input_hash, &text, &claims, tx)
            .await;

        tx.stage("evidence_align", "running");
        tx.token("- 证据聚合与对齐：进行中…\n");
        let aligned = {
            let _slot = acquire_slot().await;
            pipeline::align_evidences(&claims, &evidences, None).await
        };
        tx.stage("evidence_align", "done");

        let payload = json!({"evidences": &aligned, "count": aligned.len()});
        let mut phases = idle_phases();
        phases.insert(Phase::Evidence, PhaseStatus::Done);
        self.upsert_phase(
            session_id,
            &text,
            &phases,
            Phase::Evidence,
            PhaseStatus::Done,
            None,
            Some(&payload),
        );
        self.store_bucket_payload(session_id, &input_hash, &text, "align", payload);

        let msg = ChatMessage::assistant(format!(
            "align_only 完成（对齐 {} 条）。\n\n可继续执行 /report_only 生成综合报告。",
            aligned.len()
        ))
        .with_actions(vec![ChatAction::command("仅生成报告", "/report_only")])
        .with_meta(json!({"input_text_hash": input_hash, "aligned_count": aligned.len()}));
        self.finish_with_message(session_id, tx, msg);
    }

    async fn run_report_only(&self, session_id: &str, args: &Map<String, Value>, tx: &EventSender) {
        let meta = self.sessions.get_meta(session_id);
        let persist = args.get("persist").and_then(Value::as_bool).unwrap_or(false);

        let mut text = str_arg(args, "text");
        let mut input_hash = hash_input_text(&text);
        if text.trim().is_empty() {
            if let Some(hash) = meta.get("input_text_hash").and_then(Value::as_str) {
                input_hash = hash.to_string();
                text = self
                    .bucket(session_id, &input_hash)
                    .get("input_text")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
            }
        }
        if text.trim().is_empty() {
            let msg = ChatMessage::assistant(
                "缺少可分析的文本：请先执行 /claims_only <文本>，或直接 /analyze <文本>。",
            )
            .with_actions(vec![ChatAction::command("查看帮助", "/help")]);
            self.finish_with_message(session_id, tx, msg);
            return;
        }

        // PLAN: report needs claims -> evidence -> align; run what's missing.
        let claims = self.resolve_claims(session_id, &input_hash, &text, tx).await;
        let aligned: Option<Vec<EvidenceItem>> = self
            .bucket(session_id, &input_hash)
            .get("align")
            .and_then(|p| p.get("evidences"))
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());
        let aligned = match aligned {
            Some(rows) if !rows.is_empty() => {
                tx.token(format!("复用 session 的对齐证据（{} 条）\n", rows.len()));
                rows
            }
            _ => {
                let evidences = self
                    .resolve_evidence(session_id, &input_hash, &text, &claims, tx)
                    .await;
                tx.stage("evidence_align", "running");
                let aligned = {
                    let _slot = acquire_slot().await;
                    pipeline::align_evidences(&claims, &evidences, None).await
                };
                tx.stage("evidence_align", "done");
                self.store_bucket_payload(
                    session_id,
                    &input_hash,
                    &text,
                    "align",
                    json!({"evidences": &aligned, "count": aligned.len()}),
                );
                aligned
            }
        };

        tx.stage("report", "running");
        tx.token("- 综合报告：生成中…\n");
        let report = {
            let _slot = acquire_slot().await;
            report_stage::build_report(&claims, &aligned, &text).await
        };
        tx.stage("report", "done");

        let record_id = if persist {
            self.history
                .save_report(
                    &text,
                    &serde_json::to_value(&report).unwrap_or(Value::Null),
                    None,
                    None,
                )
                .ok()
        } else {
            None
        };
        if let Some(record_id) = &record_id {
            let updates = BTreeMap::from([
                ("record_id".to_string(), json!(record_id)),
                ("bound_record_id".to_string(), json!(record_id)),
            ]);
            let _ = self.sessions.update_meta_fields(session_id, updates);
        }

        let mut phases = idle_phases();
        phases.insert(Phase::Report, PhaseStatus::Done);
        let payload = json!({"report": &report, "record_id": &record_id});
        self.upsert_phase(
            session_id,
            &text,
            &phases,
            Phase::Report,
            PhaseStatus::Done,
            None,
            Some(&payload),
        );
        self.store_bucket_payload(session_id, &input_hash, &text, "report", payload);

        // Detailed report block.
        tx.token(format!(
            "【报告详情】\n\
             [识别场景] {}\n\
             [证据覆盖域] {}\n\
             [风险评分] {}\n\
             [风险等级] {}\n\
             [风险标签] {}\n\
             [综合摘要] {}\n\
             [可疑点]\n- {}\n",
            report.detected_scenario,
            report.evidence_domains.join(", "),
            report.risk_score,
            report.risk_level,
            report.risk_label,
            report.summary,
            report.suspicious_points.join("\n- "),
        ));

        let content = match &record_id {
            Some(id) => format!(
                "report_only 完成，已写入历史记录：{id}。\n\n可继续 /simulate 或 /content_generate。"
            ),
            None => "report_only 完成。已生成报告详情（未写入历史记录）。\n\n\
                     如需落库请使用 /report_only persist=true。"
                .to_string(),
        };
        let msg = ChatMessage::assistant(content)
            .with_actions(vec![
                ChatAction::command("仅舆情预演", "/simulate"),
                ChatAction::command("仅应对内容", "/content_generate"),
            ])
            .with_meta(json!({"record_id": record_id, "risk_score": report.risk_score}));
        self.finish_with_message(session_id, tx, msg);
    }

    // ========================================================================
    // simulate
    // ========================================================================

    async fn run_simulate(&self, session_id: &str, args: &Map<String, Value>, tx: &EventSender) {
        let record_id = str_arg(args, "record_id");
        let Some((report, input_text, bound_record)) =
            self.resolve_report_context(session_id, &record_id)
        else {
            self.finish_with_message(session_id, tx, Self::missing_report_message());
            return;
        };

        // CACHE_LOOKUP.
        let cache_key = stable_hash_payload(&json!({
            "record_id": &record_id,
            "report": &report,
            "input_text": &input_text,
        }));
        let meta = self.sessions.get_meta(session_id);
        let cached_key = meta
            .get("session_cache_simulate")
            .and_then(|c| c.get("key"))
            .and_then(Value::as_str);
        if cached_key == Some(cache_key.as_str()) {
            if let Ok(Some(payload)) = self
                .pipeline_state
                .get_phase_payload(session_id, Phase::Simulation)
            {
                tx.token("命中会话缓存，复用最近一次舆情预演结果。\n");
                let flashpoints = payload
                    .get("simulation")
                    .and_then(|s| s.get("flashpoints"))
                    .and_then(Value::as_array)
                    .map(|a| a.len())
                    .unwrap_or(0);
                let msg = ChatMessage::assistant(format!(
                    "simulate 完成（命中会话缓存，引爆点 {flashpoints} 个）。"
                ))
                .with_meta(json!({"cache_hit": true}));
                self.finish_with_message(session_id, tx, msg);
                return;
            }
        }

        tx.stage("simulate", "running");
        let sim_input = simulate::SimulationInput {
            text: &input_text,
            claims: None,
            evidences: None,
            report: Some(&report),
            time_window_hours: 24,
            platform: "general",
            comments: &[],
        };
        let blocks = simulate::run_stream(&sim_input).await;
        let mut result = SimulateResponse {
            emotion_distribution: BTreeMap::new(),
            stance_distribution: BTreeMap::new(),
            narratives: Vec::new(),
            flashpoints: Vec::new(),
            suggestion: Default::default(),
            timeline: None,
            emotion_drivers: None,
            stance_drivers: None,
        };
        for block in &blocks {
            simulate::merge_block(&mut result, block);
            match block.stage {
                "emotion" => tx.token(format!(
                    "【舆情预演-情绪分布】\n{}\n",
                    render_distribution(&result.emotion_distribution)
                )),
                "narratives" => {
                    let titles: Vec<String> = result
                        .narratives
                        .iter()
                        .map(|n| format!("- {}（p={:.2}）", n.title, n.probability))
                        .collect();
                    tx.token(format!("【舆情预演-叙事分支】\n{}\n", titles.join("\n")));
                }
                "flashpoints" => {
                    tx.token(format!(
                        "【舆情预演-引爆点】\n- {}\n",
                        result.flashpoints.join("\n- ")
                    ));
                    if let Some(timeline) = &result.timeline {
                        let rows: Vec<String> = timeline
                            .iter()
                            .map(|t| format!("- {}h：{}（{}）", t.hour, t.event, t.expected_reach))
                            .collect();
                        tx.token(format!("【舆情预演-时间线】\n{}\n", rows.join("\n")));
                    }
                }
                "suggestion" => tx.token(format!(
                    "【舆情预演-应对建议】\n{}\n",
                    result.suggestion.summary
                )),
                _ => {}
            }
        }
        tx.stage("simulate", "done");

        // PERSIST: snapshot + history attachment + cache key.
        let simulation_value = serde_json::to_value(&result).unwrap_or(Value::Null);
        let mut phases = idle_phases();
        phases.insert(Phase::Simulation, PhaseStatus::Done);
        self.upsert_phase(
            session_id,
            &input_text,
            &phases,
            Phase::Simulation,
            PhaseStatus::Done,
            None,
            Some(&json!({"simulation": &simulation_value})),
        );
        if let Some(bound) = bound_record.as_deref().filter(|r| !r.is_empty()) {
            let _ = self.history.update_simulation(bound, &simulation_value);
        }
        let _ = self.sessions.update_meta(
            session_id,
            "session_cache_simulate",
            json!({"key": cache_key, "ts": now_ts()}),
        );

        let msg = ChatMessage::assistant(format!(
            "simulate 完成：叙事分支 {} 条、引爆点 {} 个。\n\n\
             可继续执行 /content_generate 生成应对内容。",
            result.narratives.len(),
            result.flashpoints.len()
        ))
        .with_actions(vec![ChatAction::command("仅应对内容", "/content_generate")])
        .with_meta(json!({"record_id": bound_record}));
        self.finish_with_message(session_id, tx, msg);
    }

    // ========================================================================
    // content_generate / content_show
    // ========================================================================

    async fn run_content(&self, session_id: &str, args: &Map<String, Value>, tx: &EventSender) {
        let operation = str_arg(args, "operation");
        if operation == "show" {
            self.run_content_show(session_id, args, tx);
            return;
        }

        let record_id = str_arg(args, "record_id");
        let style = {
            let s = str_arg(args, "style");
            if s.is_empty() {
                "formal".to_string()
            } else {
                s
            }
        };
        let reuse_only = args.get("reuse_only").and_then(Value::as_bool).unwrap_or(false);

        let meta = self.sessions.get_meta(session_id);
        let input_hash = meta
            .get("input_text_hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let existing_content = self
            .bucket(session_id, &input_hash)
            .get("content")
            .and_then(|p| p.get("content"))
            .cloned();

        if reuse_only {
            let msg = match existing_content {
                Some(content) => {
                    tx.token("reuse_only=true，复用已有应对内容。\n");
                    content_summary_message(&content, true)
                }
                None => ChatMessage::assistant(
                    "reuse_only=true，当前会话暂无可复用的应对内容，已跳过生成。",
                ),
            };
            self.finish_with_message(session_id, tx, msg);
            return;
        }

        let Some((report, input_text, bound_record)) =
            self.resolve_report_context(session_id, &record_id)
        else {
            self.finish_with_message(session_id, tx, Self::missing_report_message());
            return;
        };

        let simulation: Option<SimulateResponse> = self
            .pipeline_state
            .get_phase_payload(session_id, Phase::Simulation)
            .ok()
            .flatten()
            .and_then(|p| p.get("simulation").cloned())
            .and_then(|v| serde_json::from_value(v).ok());

        // CACHE_LOOKUP.
        let cache_key = stable_hash_payload(&json!({
            "record_id": &record_id,
            "report": &report,
            "simulation": &simulation,
            "input_text": &input_text,
            "style": &style,
        }));
        let cached_key = meta
            .get("session_cache_content_generate")
            .and_then(|c| c.get("key"))
            .and_then(Value::as_str);
        if cached_key == Some(cache_key.as_str()) {
            if let Some(content) = existing_content {
                tx.token("复用最近一次生成的应对内容（命中会话缓存）。\n");
                let msg = content_summary_message(&content, true);
                self.finish_with_message(session_id, tx, msg);
                return;
            }
        }

        tx.stage("content_generate", "running");
        let bundle = content_stage::generate_full_content(
            &input_text,
            &report,
            simulation.as_ref(),
            &style,
        )
        .await;
        tx.stage("content_generate", "done");

        let content_value = serde_json::to_value(&bundle).unwrap_or(Value::Null);
        tx.token(format!(
            "【应对内容生成结果】\n\
             [澄清稿] 3 个版本\n\
             [FAQ] {} 条\n\
             [平台话术] {} 条\n",
            bundle.faq.len(),
            bundle.platform_scripts.len()
        ));

        // PERSIST.
        let mut phases = idle_phases();
        phases.insert(Phase::Content, PhaseStatus::Done);
        self.upsert_phase(
            session_id,
            &input_text,
            &phases,
            Phase::Content,
            PhaseStatus::Done,
            None,
            Some(&json!({"content": &content_value})),
        );
        let bucket_hash = if input_hash.is_empty() {
            hash_input_text(&input_text)
        } else {
            input_hash
        };
        self.store_bucket_payload(
            session_id,
            &bucket_hash,
            &input_text,
            "content",
            json!({"content": &content_value}),
        );
        if let Some(bound) = bound_record.as_deref().filter(|r| !r.is_empty()) {
            let _ = self.history.update_content(bound, &content_value);
        }
        let _ = self.sessions.update_meta(
            session_id,
            "session_cache_content_generate",
            json!({"key": cache_key, "ts": now_ts()}),
        );

        let msg = content_summary_message(&content_value, false);
        self.finish_with_message(session_id, tx, msg);
    }

    fn run_content_show(&self, session_id: &str, args: &Map<String, Value>, tx: &EventSender) {
        let meta = self.sessions.get_meta(session_id);
        let input_hash = meta
            .get("input_text_hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let content = self
            .bucket(session_id, &input_hash)
            .get("content")
            .and_then(|p| p.get("content"))
            .cloned()
            .or_else(|| {
                let record_id = str_arg(args, "record_id");
                if record_id.is_empty() {
                    return None;
                }
                self.history.get(&record_id).ok().flatten().and_then(|r| r.content)
            });

        let Some(content) = content else {
            let msg = ChatMessage::assistant(
                "暂无可展示的应对内容：请先执行 /content_generate 生成一次。",
            )
            .with_actions(vec![ChatAction::command("生成应对内容", "/content_generate")]);
            self.finish_with_message(session_id, tx, msg);
            return;
        };

        let section = str_arg(args, "section");
        let variant = str_arg(args, "variant");
        let mut blocks = Vec::new();

        let clarification = content.get("clarification").cloned().unwrap_or(Value::Null);
        let push_clarification = |blocks: &mut Vec<String>, name: &str| {
            let text = clarification
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or("");
            let upper = name.to_uppercase();
            blocks.push(format!(
                "-----BEGIN CLARIFICATION_{upper}-----\n{text}\n-----END CLARIFICATION_{upper}-----"
            ));
        };

        match section.as_str() {
            "clarification" => {
                if matches!(variant.as_str(), "short" | "medium" | "long") {
                    push_clarification(&mut blocks, &variant);
                } else {
                    for name in ["short", "medium", "long"] {
                        push_clarification(&mut blocks, name);
                    }
                }
            }
            "faq" => {
                let faq = content
                    .get("faq")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let range = str_arg(args, "faq_range");
                let (start, end) = parse_range(&range, faq.len());
                let mut lines = vec!["-----BEGIN FAQ-----".to_string()];
                for (idx, item) in faq.iter().enumerate().take(end).skip(start) {
                    lines.push(format!(
                        "{}. Q: {}\n   A: {}",
                        idx + 1,
                        item.get("question").and_then(Value::as_str).unwrap_or(""),
                        item.get("answer").and_then(Value::as_str).unwrap_or("")
                    ));
                }
                lines.push("-----END FAQ-----".to_string());
                blocks.push(lines.join("\n"));
            }
            "scripts" => {
                let wanted: Vec<String> = str_arg(args, "platforms")
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                let scripts = content
                    .get("platform_scripts")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let mut lines = vec!["-----BEGIN SCRIPTS-----".to_string()];
                for script in &scripts {
                    let platform = script
                        .get("platform")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_lowercase();
                    if !wanted.is_empty() && !wanted.contains(&platform) {
                        continue;
                    }
                    lines.push(format!(
                        "[{platform}] {}",
                        script.get("content").and_then(Value::as_str).unwrap_or("")
                    ));
                }
                lines.push("-----END SCRIPTS-----".to_string());
                blocks.push(lines.join("\n"));
            }
            _ => {
                // Default: full bundle, clarification first.
                for name in ["short", "medium", "long"] {
                    push_clarification(&mut blocks, name);
                }
            }
        }

        for block in &blocks {
            tx.token(format!("{block}\n"));
        }
        let msg = ChatMessage::assistant(format!(
            "content_show 完成（{} 个区块）。",
            blocks.len()
        ));
        self.finish_with_message(session_id, tx, msg);
    }
}

fn render_distribution(distribution: &BTreeMap<String, f64>) -> String {
    distribution
        .iter()
        .map(|(k, v)| format!("- {k}: {v:.2}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn content_summary_message(content: &Value, reused: bool) -> ChatMessage {
    let faq_count = content
        .get("faq")
        .and_then(Value::as_array)
        .map(|a| a.len())
        .unwrap_or(0);
    let scripts_count = content
        .get("platform_scripts")
        .and_then(Value::as_array)
        .map(|a| a.len())
        .unwrap_or(0);
    let prefix = if reused {
        "content_generate 完成（复用已有内容）"
    } else {
        "content_generate 完成"
    };
    ChatMessage::assistant(format!(
        "{prefix}：\n\
         - 澄清稿：3 个版本\n\
         - FAQ：{faq_count} 条\n\
         - 多平台话术：{scripts_count} 条\n\n\
         使用 /content_show clarification short 查看指定版本。"
    ))
    .with_actions(vec![
        ChatAction::command("查看短版澄清稿", "/content_show clarification short"),
        ChatAction::command("查看FAQ", "/content_show faq 1-5"),
    ])
    .with_meta(json!({"cache_hit": reused}))
}

/// Parse an inclusive "1-5" style range into 0-based [start, end).
fn parse_range(raw: &str, len: usize) -> (usize, usize) {
    let raw = raw.trim();
    if raw.is_empty() {
        return (0, len);
    }
    if let Some((start, end)) = raw.split_once('-') {
        let start = start.trim().parse::<usize>().unwrap_or(1).max(1);
        let end = end.trim().parse::<usize>().unwrap_or(len).min(len.max(1));
        return (start - 1, end.min(len));
    }
    if let Ok(single) = raw.parse::<usize>() {
        if single >= 1 && single <= len {
            return (single - 1, single);
        }
    }
    (0, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_hash_is_order_sensitive_but_deterministic() {
        let a = stable_hash_payload(&json!({"record_id": "", "report": {"x": 1}, "input_text": "t"}));
        let b = stable_hash_payload(&json!({"record_id": "", "report": {"x": 1}, "input_text": "t"}));
        let c = stable_hash_payload(&json!({"record_id": "", "report": {"x": 2}, "input_text": "t"}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_input_text_trims() {
        assert_eq!(hash_input_text("文本"), hash_input_text("  文本  "));
        assert_ne!(hash_input_text("文本A"), hash_input_text("文本B"));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("", 5), (0, 5));
        assert_eq!(parse_range("1-3", 5), (0, 3));
        assert_eq!(parse_range("2", 5), (1, 2));
        assert_eq!(parse_range("4-9", 5), (3, 5));
        assert_eq!(parse_range("junk", 5), (0, 5));
    }
}
