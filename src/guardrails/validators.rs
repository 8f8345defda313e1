//! Tool whitelist and per-tool argument validators.

use serde_json::{Map, Value};

use super::sanitize::{clamp_limit, sanitize_record_id, sanitize_style, sanitize_text};

/// The closed tool set. Anything else is rejected before dispatch.
pub const ALLOWED_TOOLS: [&str; 16] = [
    "analyze",
    "load_history",
    "why",
    "list",
    "more_evidence",
    "rewrite",
    "help",
    "compare",
    "deep_dive",
    "export",
    "claims_only",
    "evidence_only",
    "align_only",
    "report_only",
    "simulate",
    "content_generate",
];

/// Outcome of validating one tool call.
#[derive(Debug, Clone)]
pub struct ToolCallValidation {
    pub tool_name: String,
    pub args: Map<String, Value>,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

type ValidatorOutput = (Map<String, Value>, Vec<String>, Vec<String>);

fn str_arg(args: &Map<String, Value>, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn validate_text_required(args: &Map<String, Value>) -> ValidatorOutput {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut validated = Map::new();

    let text = str_arg(args, "text");
    if text.is_empty() {
        errors.push("缺少必需参数: text".to_string());
    } else {
        let result = sanitize_text(&text);
        validated.insert("text".to_string(), Value::String(result.sanitized));
        if result.was_modified {
            warnings.extend(result.warnings);
        }
    }

    (validated, errors, warnings)
}

fn validate_record_id_required(args: &Map<String, Value>) -> ValidatorOutput {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut validated = Map::new();

    let record_id = str_arg(args, "record_id");
    if record_id.is_empty() {
        errors.push("缺少必需参数: record_id".to_string());
    } else {
        let sanitized = sanitize_record_id(&record_id);
        if sanitized != record_id {
            warnings.push("record_id 已被清理".to_string());
        }
        validated.insert("record_id".to_string(), Value::String(sanitized));
    }

    (validated, errors, warnings)
}

fn validate_record_id_optional(args: &Map<String, Value>) -> ValidatorOutput {
    let mut warnings = Vec::new();
    let mut validated = Map::new();

    let record_id = str_arg(args, "record_id");
    let sanitized = sanitize_record_id(&record_id);
    if sanitized != record_id {
        warnings.push("record_id 已被清理".to_string());
    }
    validated.insert("record_id".to_string(), Value::String(sanitized));

    (validated, Vec::new(), warnings)
}

fn validate_list(args: &Map<String, Value>) -> ValidatorOutput {
    let mut warnings = Vec::new();
    let mut validated = Map::new();

    let limit = match args.get("limit") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => Some(10),
    };
    match limit {
        Some(raw) => {
            let clamped = clamp_limit(raw);
            if clamped != raw {
                warnings.push(format!("limit 已调整为 {clamped}"));
            }
            validated.insert("limit".to_string(), Value::from(clamped));
        }
        None => {
            validated.insert("limit".to_string(), Value::from(10));
            warnings.push("limit 参数无效，已使用默认值 10".to_string());
        }
    }

    (validated, Vec::new(), warnings)
}

fn validate_rewrite(args: &Map<String, Value>) -> ValidatorOutput {
    let (mut validated, errors, mut warnings) = validate_record_id_optional(args);

    let style = str_arg(args, "style");
    let normalized = sanitize_style(&style);
    if normalized != style {
        warnings.push(format!("style 已调整为 {normalized}"));
    }
    validated.insert("style".to_string(), Value::String(normalized));

    (validated, errors, warnings)
}

fn validate_compare(args: &Map<String, Value>) -> ValidatorOutput {
    let mut errors = Vec::new();
    let mut validated = Map::new();

    let record_id_1 = if str_arg(args, "record_id_1").is_empty() {
        str_arg(args, "record_id")
    } else {
        str_arg(args, "record_id_1")
    };
    let record_id_2 = if str_arg(args, "record_id_2").is_empty() {
        str_arg(args, "compare_with")
    } else {
        str_arg(args, "record_id_2")
    };

    if record_id_1.is_empty() {
        errors.push("缺少参数: record_id_1".to_string());
    } else {
        validated.insert(
            "record_id_1".to_string(),
            Value::String(sanitize_record_id(&record_id_1)),
        );
    }
    if record_id_2.is_empty() {
        errors.push("缺少参数: record_id_2".to_string());
    } else {
        validated.insert(
            "record_id_2".to_string(),
            Value::String(sanitize_record_id(&record_id_2)),
        );
    }

    (validated, errors, Vec::new())
}

fn validate_deep_dive(args: &Map<String, Value>) -> ValidatorOutput {
    let (mut validated, errors, mut warnings) = validate_record_id_required(args);
    if !errors.is_empty() {
        return (validated, errors, warnings);
    }

    let focus = str_arg(args, "focus");
    let allowed_focus = ["general", "evidence", "claims", "timeline", "sources"];
    let focus = if allowed_focus.contains(&focus.as_str()) {
        focus
    } else {
        "general".to_string()
    };
    validated.insert("focus".to_string(), Value::String(focus));

    if let Some(raw) = args.get("claim_index") {
        match raw.as_i64() {
            Some(idx) => {
                validated.insert("claim_index".to_string(), Value::from(idx.max(0)));
            }
            None if !raw.is_null() => {
                warnings.push("claim_index 参数无效，已忽略".to_string());
            }
            None => {}
        }
    }

    (validated, errors, warnings)
}

fn validate_text_with_optional_record(args: &Map<String, Value>) -> ValidatorOutput {
    let (mut validated, errors, mut warnings) = validate_text_required(args);
    let record_id = str_arg(args, "record_id");
    let sanitized = sanitize_record_id(&record_id);
    if sanitized != record_id {
        warnings.push("record_id 已被清理".to_string());
    }
    validated.insert("record_id".to_string(), Value::String(sanitized));
    (validated, errors, warnings)
}

fn validate_record_with_optional_text(args: &Map<String, Value>) -> ValidatorOutput {
    let (mut validated, _, mut warnings) = validate_record_id_optional(args);
    let text = str_arg(args, "text");
    if text.is_empty() {
        validated.insert("text".to_string(), Value::String(String::new()));
    } else {
        let result = sanitize_text(&text);
        if result.was_modified {
            warnings.extend(result.warnings.clone());
        }
        validated.insert("text".to_string(), Value::String(result.sanitized));
    }
    (validated, Vec::new(), warnings)
}

fn validate_report_only(args: &Map<String, Value>) -> ValidatorOutput {
    let (mut validated, errors, warnings) = validate_record_with_optional_text(args);
    let persist = args.get("persist").and_then(Value::as_bool).unwrap_or(false);
    validated.insert("persist".to_string(), Value::Bool(persist));
    (validated, errors, warnings)
}

fn validate_content_generate(args: &Map<String, Value>) -> ValidatorOutput {
    let (mut validated, _, mut warnings) = validate_record_with_optional_text(args);

    let raw_style = str_arg(args, "style");
    let style = sanitize_style(&raw_style);
    if !raw_style.is_empty() && style != raw_style {
        warnings.push(format!("style 已调整为 {style}"));
    }
    validated.insert("style".to_string(), Value::String(style));

    for key in ["detail", "operation", "section", "variant", "faq_range", "platforms"] {
        let value: String = str_arg(args, key).chars().take(128).collect();
        validated.insert(key.to_string(), Value::String(value));
    }
    for key in ["force", "reuse_only"] {
        let flag = args.get(key).and_then(Value::as_bool).unwrap_or(false);
        validated.insert(key.to_string(), Value::Bool(flag));
    }

    (validated, Vec::new(), warnings)
}

fn validate_passthrough(args: &Map<String, Value>) -> ValidatorOutput {
    (args.clone(), Vec::new(), Vec::new())
}

fn validator_for(tool_name: &str) -> Option<fn(&Map<String, Value>) -> ValidatorOutput> {
    match tool_name {
        "analyze" | "claims_only" => Some(validate_text_required),
        "load_history" | "why" => Some(validate_record_id_required),
        "list" => Some(validate_list),
        "more_evidence" => Some(validate_record_id_optional),
        "rewrite" => Some(validate_rewrite),
        "compare" => Some(validate_compare),
        "deep_dive" => Some(validate_deep_dive),
        "evidence_only" => Some(validate_text_with_optional_record),
        "align_only" | "simulate" => Some(validate_record_with_optional_text),
        "report_only" => Some(validate_report_only),
        "content_generate" => Some(validate_content_generate),
        "help" | "export" => Some(validate_passthrough),
        _ => None,
    }
}

/// Validate one tool call against the whitelist and its validator.
///
/// A tool outside the whitelist, or inside the whitelist without a
/// registered validator, is rejected.
pub fn validate_tool_call(tool_name: &str, args: &Map<String, Value>) -> ToolCallValidation {
    if !ALLOWED_TOOLS.contains(&tool_name) {
        return ToolCallValidation {
            tool_name: tool_name.to_string(),
            args: args.clone(),
            is_valid: false,
            errors: vec![format!("工具 '{tool_name}' 不在白名单中")],
            warnings: Vec::new(),
        };
    }

    let Some(validator) = validator_for(tool_name) else {
        return ToolCallValidation {
            tool_name: tool_name.to_string(),
            args: args.clone(),
            is_valid: false,
            errors: vec![format!("工具 '{tool_name}' 缺少参数校验器，拒绝执行")],
            warnings: Vec::new(),
        };
    };

    let (validated, errors, warnings) = validator(args);
    ToolCallValidation {
        tool_name: tool_name.to_string(),
        args: validated,
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_every_whitelisted_tool_has_validator() {
        for tool in ALLOWED_TOOLS {
            assert!(validator_for(tool).is_some(), "no validator for {tool}");
        }
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let result = validate_tool_call("rm_rf", &args(json!({})));
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("白名单"));
    }

    #[test]
    fn test_analyze_requires_text() {
        let result = validate_tool_call("analyze", &args(json!({})));
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("text"));

        let ok = validate_tool_call("analyze", &args(json!({"text": "待分析文本内容"})));
        assert!(ok.is_valid);
    }

    #[test]
    fn test_why_requires_record_id() {
        let result = validate_tool_call("why", &args(json!({})));
        assert!(!result.is_valid);
    }

    #[test]
    fn test_list_limit_clamped_with_warning() {
        let result = validate_tool_call("list", &args(json!({"limit": 500})));
        assert!(result.is_valid);
        assert_eq!(result.args["limit"], json!(50));
        assert!(result.warnings.iter().any(|w| w.contains("limit")));
    }

    #[test]
    fn test_rewrite_style_normalized() {
        let result =
            validate_tool_call("rewrite", &args(json!({"record_id": "r1", "style": "LOUD"})));
        assert!(result.is_valid);
        assert_eq!(result.args["style"], json!("short"));
    }

    #[test]
    fn test_record_id_sanitized_with_warning() {
        let result =
            validate_tool_call("load_history", &args(json!({"record_id": "abc def!"})));
        assert!(result.is_valid);
        assert_eq!(result.args["record_id"], json!("abcdef"));
        assert!(result.warnings.iter().any(|w| w.contains("record_id")));
    }

    #[test]
    fn test_compare_requires_both_ids() {
        let result = validate_tool_call("compare", &args(json!({"record_id_1": "a"})));
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("record_id_2"));
    }

    #[test]
    fn test_deep_dive_focus_defaults_to_general() {
        let result = validate_tool_call(
            "deep_dive",
            &args(json!({"record_id": "r1", "focus": "weird"})),
        );
        assert!(result.is_valid);
        assert_eq!(result.args["focus"], json!("general"));
    }
}
