//! The only path that originates outbound LM requests.
//!
//! [`call_json`] assembles an OpenAI-compatible chat completion request,
//! enforces the timeout and retry budget, and runs the response content
//! through the strict-JSON parse ladder. Callers get `Some(parsed)` or
//! `None`; the gateway never panics and never lets an error escape.

use std::sync::OnceLock;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::LlmSettings;

use super::repair::{safe_json_parse, strip_code_fences};
use super::trace;

/// Per-call knobs. `trace_label` identifies the request in trace files;
/// `debug_var` names the stage's debug flag.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub settings: LlmSettings,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub json_response_format: bool,
    pub max_retries: usize,
    pub retry_delay: Duration,
    pub trace_label: &'static str,
    pub debug_var: &'static str,
}

impl CallOptions {
    pub fn new(settings: LlmSettings, trace_label: &'static str, debug_var: &'static str) -> Self {
        Self {
            settings,
            temperature: 0.0,
            max_tokens: None,
            json_response_format: true,
            max_retries: 1,
            retry_delay: Duration::from_secs(2),
            trace_label,
            debug_var,
        }
    }

    pub fn temperature(mut self, value: f64) -> Self {
        self.temperature = value;
        self
    }

    pub fn max_tokens(mut self, value: u32) -> Self {
        self.max_tokens = Some(value);
        self
    }

    pub fn plain_response(mut self) -> Self {
        self.json_response_format = false;
        self
    }

    pub fn retries(mut self, max_retries: usize, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }
}

fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default()
    })
}

/// Issue one strict-JSON LM call.
///
/// Returns the parsed object, or `None` after `max_retries` attempts have
/// failed on transport, status, or all three parse tiers.
pub async fn call_json(system: &str, user: &str, opts: &CallOptions) -> Option<Value> {
    if opts.settings.api_key.is_empty() {
        warn!(label = opts.trace_label, "LLM API key empty, skipping call");
        return None;
    }

    let mut payload = json!({
        "model": opts.settings.model,
        "temperature": opts.temperature,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ],
    });
    if opts.json_response_format {
        payload["response_format"] = json!({"type": "json_object"});
    }
    if let Some(max_tokens) = opts.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }

    let endpoint = opts.settings.endpoint();
    let attempts = opts.max_retries.max(1);

    for attempt in 1..=attempts {
        trace::record(
            opts.debug_var,
            opts.trace_label,
            "llm_request",
            json!({
                "endpoint": endpoint,
                "timeout": opts.settings.timeout_secs,
                "attempt": attempt,
                "llm_payload": payload,
                "headers": {"Authorization": "masked"},
            }),
        );

        match send_once(&endpoint, &payload, opts).await {
            Ok(content_raw) => {
                let cleaned = strip_code_fences(&content_raw);
                if let Some(parsed) = safe_json_parse(&cleaned, opts.trace_label) {
                    if attempt > 1 {
                        info!(
                            label = opts.trace_label,
                            attempt, "LM call succeeded after retry"
                        );
                    }
                    trace::record(
                        opts.debug_var,
                        opts.trace_label,
                        "llm_response",
                        json!({
                            "attempt": attempt,
                            "content_raw": content_raw,
                            "content_cleaned": cleaned,
                            "parsed_json": parsed,
                        }),
                    );
                    return Some(parsed);
                }
                warn!(
                    label = opts.trace_label,
                    attempt, "LM response failed all JSON parse tiers"
                );
                trace::record(
                    opts.debug_var,
                    opts.trace_label,
                    "llm_parse_error",
                    json!({"attempt": attempt, "content_cleaned": cleaned}),
                );
            }
            Err(kind) => {
                warn!(
                    label = opts.trace_label,
                    attempt,
                    error = %kind,
                    "LM request failed"
                );
                trace::record(
                    opts.debug_var,
                    opts.trace_label,
                    "llm_error",
                    json!({"attempt": attempt, "error": kind}),
                );
            }
        }

        if attempt < attempts {
            debug!(
                label = opts.trace_label,
                delay_ms = opts.retry_delay.as_millis() as u64,
                "retrying LM call"
            );
            tokio::time::sleep(opts.retry_delay).await;
        }
    }

    warn!(
        label = opts.trace_label,
        attempts, "all LM attempts exhausted, caller decides fallback"
    );
    None
}

/// One HTTP round trip; returns the assistant message content.
async fn send_once(endpoint: &str, payload: &Value, opts: &CallOptions) -> Result<String, String> {
    let response = http_client()
        .post(endpoint)
        .bearer_auth(&opts.settings.api_key)
        .timeout(Duration::from_secs_f64(opts.settings.timeout_secs))
        .json(payload)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                format!("timeout after {}s", opts.settings.timeout_secs)
            } else {
                format!("transport: {e}")
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("status: {status}"));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| format!("body decode: {e}"))?;

    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| "missing choices[0].message.content".to_string())
}
