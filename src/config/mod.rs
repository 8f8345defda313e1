//! Environment-driven configuration.
//!
//! All options carry the `VERISIFT_` prefix. Stage engines read a
//! [`Settings`] snapshot taken at call time so tests can flip variables
//! per-case; nothing caches env values at process start except the server
//! bind address.

mod defaults;

pub use defaults::*;

/// Read an env var with the `VERISIFT_` prefix, trimmed; `None` when unset
/// or empty.
pub fn var(name: &str) -> Option<String> {
    std::env::var(format!("VERISIFT_{name}"))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Boolean env option: `true` only for the literal `true` (case-insensitive).
pub fn bool_var(name: &str, default: bool) -> bool {
    match var(name) {
        Some(v) => v.eq_ignore_ascii_case("true"),
        None => default,
    }
}

/// Integer env option clamped to `[min, max]`; default on parse failure.
pub fn int_var(name: &str, default: i64, min: i64, max: i64) -> i64 {
    var(name)
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

/// Float env option clamped to `[min, max]`; default on parse failure.
pub fn float_var(name: &str, default: f64, min: f64, max: f64) -> f64 {
    var(name)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

/// Shared LM connection settings plus the per-stage toggles that gate LM
/// usage. Stage-specific model overrides fall back to `LLM_MODEL`.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: f64,
}

impl LlmSettings {
    /// Snapshot for a stage; `model_var` names the stage override
    /// (e.g. `RISK_LLM_MODEL`).
    pub fn for_stage(model_var: &str) -> Self {
        let model = var(model_var)
            .or_else(|| var("LLM_MODEL"))
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        Self {
            base_url: var("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            api_key: var("LLM_API_KEY").unwrap_or_default(),
            model,
            timeout_secs: float_var("LLM_TIMEOUT", DEFAULT_LLM_TIMEOUT_SECS, 1.0, 600.0),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Whether a stage-level LM toggle is on. A stage variable set to an
/// explicit `true`/`false` wins; otherwise the global `LLM_ENABLED` decides.
pub fn stage_llm_enabled(stage_var: &str) -> bool {
    if let Some(direct) = var(stage_var) {
        let lowered = direct.to_lowercase();
        if lowered == "true" || lowered == "false" {
            return lowered == "true";
        }
    }
    bool_var("LLM_ENABLED", false)
}

/// Maximum claims per extraction (`CLAIM_MAX_ITEMS`, 1..=20, default 8).
pub fn claim_max_items() -> usize {
    int_var("CLAIM_MAX_ITEMS", 8, 1, 20) as usize
}

/// Minimum claim check-worthiness score (`CLAIM_MIN_SCORE`, 0..=1).
pub fn claim_min_score() -> f64 {
    float_var("CLAIM_MIN_SCORE", 0.25, 0.0, 1.0)
}

/// Per-session ceilings; `None` means unlimited.
pub fn session_tool_max_calls() -> Option<i64> {
    var("SESSION_TOOL_MAX_CALLS").and_then(|v| v.parse().ok())
}

pub fn session_llm_max_calls() -> Option<i64> {
    var("SESSION_LLM_MAX_CALLS").and_then(|v| v.parse().ok())
}

/// Hard cap applied to `/detect` inputs before any stage runs.
pub fn max_input_chars() -> usize {
    int_var("MAX_INPUT_CHARS", DEFAULT_MAX_INPUT_CHARS as i64, 100, 200_000) as usize
}

/// Per-stage debug flag gating trace-file emission.
pub fn debug_enabled(stage_var: &str) -> bool {
    bool_var(stage_var, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_var_clamps_and_defaults() {
        std::env::set_var("VERISIFT_TEST_INT_A", "50");
        assert_eq!(int_var("TEST_INT_A", 8, 1, 20), 20);
        std::env::set_var("VERISIFT_TEST_INT_A", "not-a-number");
        assert_eq!(int_var("TEST_INT_A", 8, 1, 20), 8);
        std::env::remove_var("VERISIFT_TEST_INT_A");
        assert_eq!(int_var("TEST_INT_A", 8, 1, 20), 8);
    }

    #[test]
    fn test_stage_toggle_overrides_global() {
        std::env::set_var("VERISIFT_LLM_ENABLED", "true");
        std::env::set_var("VERISIFT_TEST_STAGE_ENABLED", "false");
        assert!(!stage_llm_enabled("TEST_STAGE_ENABLED"));
        std::env::remove_var("VERISIFT_TEST_STAGE_ENABLED");
        assert!(stage_llm_enabled("TEST_STAGE_ENABLED"));
        std::env::remove_var("VERISIFT_LLM_ENABLED");
    }
}
