//! Input sanitization, the tool whitelist, and per-tool argument validators.
//!
//! Every tool invocation passes through [`validate_tool_call`] before any
//! stage runs. Unknown tools are rejected; a whitelisted tool without a
//! registered validator is rejected too (fail-closed).

mod sanitize;
mod validators;

pub use sanitize::{
    clamp_limit, sanitize_record_id, sanitize_style, sanitize_text, SanitizedInput,
};
pub use validators::{validate_tool_call, ToolCallValidation, ALLOWED_TOOLS};

/// Prefix warnings into the advisory token shown before stage output.
pub fn build_warning_message(warnings: &[String]) -> String {
    if warnings.is_empty() {
        return String::new();
    }
    format!("安全护栏提示：\n- {}\n", warnings.join("\n- "))
}
