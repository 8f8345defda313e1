//! Per-stage JSONL trace files.
//!
//! When a stage's debug flag is on, every request/response envelope is
//! appended to `debug/<label>_trace.jsonl`. Authorization values are masked
//! before anything reaches the file.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::error;

use crate::config;

fn trace_dir() -> PathBuf {
    config::var("DEBUG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("debug"))
}

/// Append one trace entry for `label` if `debug_var` is enabled.
pub fn record(debug_var: &str, label: &str, stage: &str, payload: Value) {
    if !config::debug_enabled(debug_var) {
        return;
    }

    let entry = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "stage": stage,
        "payload": mask_secrets(payload),
    });

    let dir = trace_dir();
    if let Err(e) = fs::create_dir_all(&dir) {
        error!(error = %e, "failed to create trace directory");
        return;
    }
    let path = dir.join(format!("{label}_trace.jsonl"));
    let line = entry.to_string();
    let result = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut f| writeln!(f, "{line}"));
    if let Err(e) = result {
        error!(path = %path.display(), error = %e, "failed to write trace entry");
    }
}

/// Replace Authorization header values anywhere in the payload.
fn mask_secrets(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if k.eq_ignore_ascii_case("authorization") {
                        (k, Value::String("Bearer ***".to_string()))
                    } else {
                        (k, mask_secrets(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(mask_secrets).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secrets_nested() {
        let masked = mask_secrets(json!({
            "headers": {"Authorization": "Bearer sk-secret", "Content-Type": "application/json"},
            "nested": [{"authorization": "Basic abc"}],
        }));
        assert_eq!(masked["headers"]["Authorization"], "Bearer ***");
        assert_eq!(masked["nested"][0]["authorization"], "Bearer ***");
        assert_eq!(masked["headers"]["Content-Type"], "application/json");
    }
}
