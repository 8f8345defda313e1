//! Tool parsing: one user turn into a whitelisted `(tool, args)` pair.
//!
//! Decision order: explicit slash commands, the analyze heuristic, natural
//! language patterns, then the clarify fallback. A leading `//` escapes a
//! literal `/` and skips command parsing entirely. Session meta supplies
//! `record_id` defaults for tools that operate on the bound record.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use super::intent::{classify_intent, Intent};

/// Length at which bare text is assumed to be an analyze request.
const ANALYZE_LENGTH_HEURISTIC: usize = 180;

/// Minimum payload length for the more_evidence -> evidence_only override.
const EVIDENCE_PAYLOAD_MIN_LEN: usize = 30;

type ToolCall = (String, Map<String, Value>);

fn tool(name: &str, args: Value) -> ToolCall {
    (
        name.to_string(),
        args.as_object().cloned().unwrap_or_default(),
    )
}

fn bound_record_id(meta: &BTreeMap<String, Value>) -> String {
    ["record_id", "bound_record_id"]
        .iter()
        .filter_map(|k| meta.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Extract text after the first colon separator, or the whole text.
fn extract_payload_text(raw: &str) -> String {
    let text = raw.trim();
    for sep in ['：', ':'] {
        if let Some((_, right)) = text.split_once(sep) {
            let candidate = right.trim();
            if !candidate.is_empty() {
                return candidate.to_string();
            }
        }
    }
    text.to_string()
}

/// Like [`extract_payload_text`], but only when the payload is explicit
/// (colon-separated and long enough).
fn extract_payload_text_if_explicit(raw: &str, min_len: usize) -> String {
    let text = raw.trim();
    for sep in ['：', ':'] {
        if let Some((_, right)) = text.split_once(sep) {
            let candidate = right.trim();
            if candidate.chars().count() >= min_len {
                return candidate.to_string();
            }
            return String::new();
        }
    }
    String::new()
}

fn parse_bool_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_command_kv(tokens: &[&str]) -> BTreeMap<String, String> {
    let mut kv = BTreeMap::new();
    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            let key = key.trim().to_lowercase();
            if !key.is_empty() {
                kv.insert(key, value.trim().to_string());
            }
        }
    }
    kv
}

fn is_analyze_intent(text: &str) -> bool {
    let t = text.trim();
    t.starts_with("/analyze") || t.chars().count() >= ANALYZE_LENGTH_HEURISTIC
}

fn extract_analyze_text(text: &str) -> String {
    let t = text.trim();
    t.strip_prefix("/analyze").unwrap_or(t).trim().to_string()
}

/// Parse one user turn. Only whitelisted tools come out of here; anything
/// unresolvable becomes `help` (with a clarify flag for long free text).
pub fn parse_tool(text: &str, session_meta: &BTreeMap<String, Value>) -> ToolCall {
    let mut t = text.trim();
    if t.is_empty() {
        return tool("help", json!({}));
    }

    // Leading "//" escapes a literal slash: treat the rest as plain text.
    let escaped = t.starts_with("//");
    if escaped {
        t = &t[1..];
    }

    let bound_id = bound_record_id(session_meta);

    if !escaped {
        if let Some(call) = parse_slash_command(t, &bound_id) {
            return call;
        }
        if is_analyze_intent(t) {
            return tool("analyze", json!({"text": extract_analyze_text(t)}));
        }
    } else if t.chars().count() >= ANALYZE_LENGTH_HEURISTIC {
        // Escaped text keeps only the length heuristic.
        return tool("analyze", json!({"text": t.to_string()}));
    }

    let intent = classify_intent(t);

    // Route guard: "search evidence" phrasing carrying a long payload is an
    // evidence_only run, not a more_evidence suggestion.
    if intent == Intent::MoreEvidence {
        let payload = extract_payload_text(t);
        if payload != t && payload.chars().count() >= EVIDENCE_PAYLOAD_MIN_LEN {
            return tool(
                "evidence_only",
                json!({"text": payload, "record_id": bound_id}),
            );
        }
    }

    match intent {
        Intent::Why => tool("why", json!({"record_id": bound_id})),
        Intent::Compare => tool(
            "compare",
            json!({"record_id_1": bound_id, "record_id_2": ""}),
        ),
        Intent::DeepDive => tool(
            "deep_dive",
            json!({"record_id": bound_id, "focus": "general"}),
        ),
        Intent::Content => tool(
            "content_generate",
            json!({
                "record_id": bound_id,
                "style": "formal",
                "text": extract_payload_text_if_explicit(t, 20),
                "operation": "generate",
            }),
        ),
        Intent::MoreEvidence => tool("more_evidence", json!({"record_id": bound_id})),
        Intent::List => tool("list", json!({"limit": 10})),
        Intent::Analyze => tool("analyze", json!({"text": extract_payload_text(t)})),
        Intent::ClaimsOnly => tool("claims_only", json!({"text": extract_payload_text(t)})),
        Intent::EvidenceOnly => tool(
            "evidence_only",
            json!({"text": extract_payload_text(t), "record_id": bound_id}),
        ),
        Intent::Help => tool("help", json!({})),
        Intent::Unknown => tool("help", json!({"clarify": true, "text": t})),
    }
}

fn parse_slash_command(t: &str, bound_id: &str) -> Option<ToolCall> {
    if !t.starts_with('/') {
        return None;
    }
    let parts: Vec<&str> = t.split_whitespace().collect();
    let cmd = parts.first().copied().unwrap_or("").to_lowercase();
    let arg = |i: usize| parts.get(i).copied().unwrap_or("").to_string();

    let call = match cmd.as_str() {
        "/load_history" => tool("load_history", json!({"record_id": arg(1)})),
        "/why" | "/explain" => {
            let record_id = if arg(1).is_empty() { bound_id.to_string() } else { arg(1) };
            tool("why", json!({"record_id": record_id}))
        }
        "/list" | "/history" | "/records" => {
            let raw = arg(1);
            let raw = raw.strip_prefix("limit=").unwrap_or(&raw);
            let limit = raw.parse::<i64>().unwrap_or(10);
            tool("list", json!({"limit": limit}))
        }
        "/more_evidence" | "/more" => tool("more_evidence", json!({"record_id": bound_id})),
        "/rewrite" => {
            let style = arg(1);
            let style = style.strip_prefix("style=").unwrap_or(&style);
            let style = if style.is_empty() { "short" } else { style };
            tool("rewrite", json!({"record_id": bound_id, "style": style}))
        }
        "/compare" => {
            let record_id_1 = if arg(1).is_empty() { bound_id.to_string() } else { arg(1) };
            tool(
                "compare",
                json!({"record_id_1": record_id_1, "record_id_2": arg(2)}),
            )
        }
        "/deep_dive" | "/deepdive" => {
            let record_id = if arg(1).is_empty() { bound_id.to_string() } else { arg(1) };
            let focus = if arg(2).is_empty() { "general".to_string() } else { arg(2) };
            let mut args = json!({"record_id": record_id, "focus": focus});
            if let Ok(idx) = arg(3).parse::<i64>() {
                args["claim_index"] = json!(idx);
            }
            tool("deep_dive", args)
        }
        "/claims_only" | "/claims-only" => {
            let text = t.split_once(' ').map(|(_, rest)| rest.trim()).unwrap_or("");
            tool("claims_only", json!({"text": text}))
        }
        "/evidence_only" | "/evidence-only" => {
            let text = t.split_once(' ').map(|(_, rest)| rest.trim()).unwrap_or("");
            tool(
                "evidence_only",
                json!({"text": text, "record_id": bound_id}),
            )
        }
        "/align_only" | "/align-only" => {
            let record_id = if arg(1).is_empty() { bound_id.to_string() } else { arg(1) };
            tool("align_only", json!({"record_id": record_id}))
        }
        "/report_only" | "/report-only" => {
            let kv = parse_command_kv(&parts[1..]);
            let record_id = parts
                .get(1)
                .filter(|p| !p.contains('='))
                .map(|p| p.to_string())
                .unwrap_or_else(|| bound_id.to_string());
            tool(
                "report_only",
                json!({
                    "record_id": record_id,
                    "persist": parse_bool_flag(kv.get("persist").map(String::as_str).unwrap_or("")),
                }),
            )
        }
        "/simulate" => {
            let record_id = if arg(1).is_empty() { bound_id.to_string() } else { arg(1) };
            tool("simulate", json!({"record_id": record_id}))
        }
        "/content_show" | "/content-show" => {
            let kv = parse_command_kv(&parts[1..]);
            let section = arg(1).to_lowercase();
            let variant = if arg(2).contains('=') { String::new() } else { arg(2).to_lowercase() };
            let faq_range = kv
                .get("range")
                .cloned()
                .unwrap_or_else(|| if section == "faq" { variant.clone() } else { String::new() });
            let platforms = kv
                .get("platforms")
                .cloned()
                .unwrap_or_else(|| if section == "scripts" { variant.clone() } else { String::new() });
            tool(
                "content_generate",
                json!({
                    "operation": "show",
                    "section": section,
                    "variant": variant,
                    "faq_range": faq_range,
                    "platforms": platforms,
                    "detail": kv.get("detail").cloned().unwrap_or_else(|| "full".to_string()),
                    "style": kv.get("style").cloned().unwrap_or_else(|| "formal".to_string()),
                    "record_id": bound_id,
                }),
            )
        }
        "/content_generate" | "/content-generate" | "/content" => {
            let kv = parse_command_kv(&parts[1..]);
            let force = parse_bool_flag(kv.get("force").map(String::as_str).unwrap_or(""));
            // Bare /content shows the cached bundle unless forced.
            let operation = if cmd == "/content" && !force { "show" } else { "generate" };
            tool(
                "content_generate",
                json!({
                    "record_id": bound_id,
                    "style": kv.get("style").cloned().unwrap_or_else(|| "formal".to_string()),
                    "detail": kv.get("detail").cloned().unwrap_or_else(|| "full".to_string()),
                    "force": force,
                    "reuse_only": parse_bool_flag(kv.get("reuse_only").map(String::as_str).unwrap_or("")),
                    "text": kv.get("text").cloned().unwrap_or_default(),
                    "operation": operation,
                }),
            )
        }
        "/analyze" => tool("analyze", json!({"text": extract_analyze_text(t)})),
        "/help" => tool("help", json!({})),
        _ => return None,
    };
    Some(call)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_with(record_id: &str) -> BTreeMap<String, Value> {
        BTreeMap::from([("record_id".to_string(), json!(record_id))])
    }

    #[test]
    fn test_slash_analyze() {
        let (name, args) = parse_tool("/analyze 某待分析文本", &BTreeMap::new());
        assert_eq!(name, "analyze");
        assert_eq!(args["text"], json!("某待分析文本"));
    }

    #[test]
    fn test_long_text_is_analyze() {
        let long = "长".repeat(200);
        let (name, _) = parse_tool(&long, &BTreeMap::new());
        assert_eq!(name, "analyze");
    }

    #[test]
    fn test_why_falls_back_to_session_record() {
        let (name, args) = parse_tool("/why", &meta_with("rec_9"));
        assert_eq!(name, "why");
        assert_eq!(args["record_id"], json!("rec_9"));

        let (name, args) = parse_tool("/why rec_1", &meta_with("rec_9"));
        assert_eq!(name, "why");
        assert_eq!(args["record_id"], json!("rec_1"));
    }

    #[test]
    fn test_list_limit_parsing() {
        let (name, args) = parse_tool("/list limit=20", &BTreeMap::new());
        assert_eq!(name, "list");
        assert_eq!(args["limit"], json!(20));

        let (_, args) = parse_tool("/list abc", &BTreeMap::new());
        assert_eq!(args["limit"], json!(10));
    }

    #[test]
    fn test_more_evidence_payload_override() {
        let payload = "四川广元男子失联后被找到，救援队称已离世，家属正在处理后续事宜";
        let (name, args) = parse_tool(&format!("帮我搜索证据：{payload}"), &BTreeMap::new());
        assert_eq!(name, "evidence_only");
        assert_eq!(args["text"], json!(payload));
    }

    #[test]
    fn test_more_evidence_without_payload() {
        let (name, _) = parse_tool("补充更多证据", &meta_with("rec_1"));
        assert_eq!(name, "more_evidence");
    }

    #[test]
    fn test_natural_language_claims_only() {
        let (name, args) = parse_tool(
            "只帮我提取主张：某地一名工作人员在单位内不幸身亡，官方确认了该消息",
            &BTreeMap::new(),
        );
        assert_eq!(name, "claims_only");
        assert!(args["text"].as_str().unwrap().contains("不幸身亡"));
    }

    #[test]
    fn test_double_slash_escapes_commands() {
        let (name, args) = parse_tool("//list 不是命令", &BTreeMap::new());
        assert_eq!(name, "help");
        assert_eq!(args.get("clarify"), Some(&json!(true)));
    }

    #[test]
    fn test_unknown_text_clarifies() {
        let (name, args) = parse_tool("嗯？", &BTreeMap::new());
        assert_eq!(name, "help");
        assert_eq!(args["clarify"], json!(true));
    }

    #[test]
    fn test_report_only_persist_flag() {
        let (name, args) = parse_tool("/report_only persist=true", &meta_with("rec_1"));
        assert_eq!(name, "report_only");
        assert_eq!(args["persist"], json!(true));
        assert_eq!(args["record_id"], json!("rec_1"));
    }

    #[test]
    fn test_content_show_sections() {
        let (name, args) = parse_tool("/content_show clarification short", &BTreeMap::new());
        assert_eq!(name, "content_generate");
        assert_eq!(args["operation"], json!("show"));
        assert_eq!(args["section"], json!("clarification"));
        assert_eq!(args["variant"], json!("short"));

        let (_, args) = parse_tool("/content_show faq 1-5", &BTreeMap::new());
        assert_eq!(args["faq_range"], json!("1-5"));
    }

    #[test]
    fn test_bare_content_defaults_to_show() {
        let (name, args) = parse_tool("/content detail=full", &BTreeMap::new());
        assert_eq!(name, "content_generate");
        assert_eq!(args["operation"], json!("show"));

        let (_, args) = parse_tool("/content force=true", &BTreeMap::new());
        assert_eq!(args["operation"], json!("generate"));
    }

    #[test]
    fn test_simulate_uses_bound_record() {
        let (name, args) = parse_tool("/simulate", &meta_with("rec_7"));
        assert_eq!(name, "simulate");
        assert_eq!(args["record_id"], json!("rec_7"));
    }
}
