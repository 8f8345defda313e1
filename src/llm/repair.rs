//! Strict-JSON parse ladder for LM output.
//!
//! Three tiers, tried in order: direct parse, automatic repair (trailing
//! commas, comments, CJK quotes), then a heuristic manual clean that also
//! extracts the first `{...}` block out of surrounding prose. Tier success
//! returns the parsed object; total failure returns `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap_or_else(|_| never()));
static LINE_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)//[^\n]*$").unwrap_or_else(|_| never()));
static BLOCK_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap_or_else(|_| never()));

fn never() -> Regex {
    // Literal patterns above are compile-time constants; this path is dead.
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b\B").unwrap()
}

/// Strip Markdown code fences the model may have wrapped its JSON in.
pub fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    if let Some(inner) = trimmed.split("```json").nth(1) {
        if let Some(body) = inner.split("```").next() {
            return body.trim().to_string();
        }
    }
    if trimmed.starts_with("```") {
        return trimmed
            .replace("```json", "")
            .replace("```", "")
            .trim()
            .to_string();
    }
    trimmed.to_string()
}

/// Parse LM content into a JSON object through the three-tier ladder.
pub fn safe_json_parse(content: &str, context: &str) -> Option<Value> {
    let content = content.trim();

    match serde_json::from_str::<Value>(content) {
        Ok(v) => return Some(v),
        Err(e) => debug!(context, error = %e, "direct JSON parse failed"),
    }

    let repaired = repair_common_issues(content);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(v) => {
            debug!(context, "JSON auto-repair succeeded");
            return Some(v);
        }
        Err(e) => debug!(context, error = %e, "JSON auto-repair failed"),
    }

    let cleaned = manual_clean(&repaired);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(v) => {
            debug!(context, "JSON manual clean succeeded");
            Some(v)
        }
        Err(e) => {
            warn!(context, error = %e, "all JSON parse attempts failed");
            None
        }
    }
}

/// Tier 2: mechanical fixes that keep the original structure.
fn repair_common_issues(content: &str) -> String {
    let mut result = LINE_COMMENT_RE.replace_all(content, "").into_owned();
    result = BLOCK_COMMENT_RE.replace_all(&result, "").into_owned();
    result = TRAILING_COMMA_RE.replace_all(&result, "$1").into_owned();
    // CJK quotation marks around keys/values.
    result = result
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'");
    result
}

/// Tier 3: drop stray control characters and extract the first object when
/// the model surrounded it with prose.
fn manual_clean(content: &str) -> String {
    let mut no_control = String::with_capacity(content.len());
    let mut in_string = false;
    let mut prev_escape = false;
    for ch in content.chars() {
        if ch == '"' && !prev_escape {
            in_string = !in_string;
        }
        prev_escape = ch == '\\' && !prev_escape;
        if ch.is_control() && ch != '\n' && ch != '\t' {
            continue;
        }
        if in_string && (ch == '\n' || ch == '\t') {
            // Raw newlines inside strings are what usually breaks tier 1.
            no_control.push(' ');
            continue;
        }
        no_control.push(ch);
    }

    extract_first_object(&no_control).unwrap_or(no_control)
}

/// First balanced `{...}` block, honoring string literals.
fn extract_first_object(content: &str) -> Option<String> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut prev_escape = false;
    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            if ch == '"' && !prev_escape {
                in_string = false;
            }
            prev_escape = ch == '\\' && !prev_escape;
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_parse() {
        let v = safe_json_parse(r#"{"a": 1}"#, "test").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_trailing_comma_repair() {
        let v = safe_json_parse(r#"{"claims": [1, 2,],}"#, "test").unwrap();
        assert_eq!(v["claims"][1], 2);
    }

    #[test]
    fn test_cjk_quotes_repair() {
        let v = safe_json_parse("{\u{201c}stance\u{201d}: \u{201c}support\u{201d}}", "test")
            .unwrap();
        assert_eq!(v["stance"], "support");
    }

    #[test]
    fn test_comment_removal() {
        let v = safe_json_parse("{\"a\": 1 // note\n}", "test").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_extracts_object_from_prose() {
        let v = safe_json_parse("Sure, here you go: {\"ok\": true} hope that helps", "test")
            .unwrap();
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn test_total_failure_returns_none() {
        assert!(safe_json_parse("not json at all", "test").is_none());
    }

    #[test]
    fn test_strip_code_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_newline_inside_string_cleaned() {
        let v = safe_json_parse("{\"summary\": \"line one\nline two\"}", "test").unwrap();
        assert_eq!(v["summary"], "line one line two");
    }
}
