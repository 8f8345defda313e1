//! System-wide default constants, grouped by subsystem.

// ============================================================================
// LM Gateway
// ============================================================================

/// Default OpenAI-compatible endpoint base.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model when neither the stage override nor `LLM_MODEL` is set.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Connect + read budget for one LM request (seconds).
pub const DEFAULT_LLM_TIMEOUT_SECS: f64 = 60.0;

/// Process-wide concurrent LM call limit.
pub const DEFAULT_LLM_SLOT_COUNT: usize = 3;

// ============================================================================
// Guardrails
// ============================================================================

/// Hard sanitizer ceiling for free-text arguments (chars).
pub const MAX_TEXT_LENGTH: usize = 12_000;

/// Record-id length cap after charset filtering.
pub const MAX_RECORD_ID_LENGTH: usize = 128;

/// `/detect` input truncation default (chars).
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8_000;

/// `limit` argument clamp bounds.
pub const MIN_LIMIT_VALUE: i64 = 1;
pub const MAX_LIMIT_VALUE: i64 = 50;

// ============================================================================
// Pipeline fan-out
// ============================================================================

/// Per-claim summarize/align worker pool sizes.
pub const DEFAULT_CLAIM_PARALLEL_WORKERS: usize = 3;
pub const DEFAULT_ALIGN_PARALLEL_WORKERS: usize = 4;

/// Evidence rows fed to one summarization call at most.
pub const DEFAULT_SUMMARY_INPUT_LIMIT: usize = 10;

// ============================================================================
// Web retrieval
// ============================================================================

/// Candidates requested from a search provider per claim.
pub const DEFAULT_WEB_RETRIEVAL_TOPK: usize = 6;

/// One search request budget (seconds).
pub const DEFAULT_WEB_RETRIEVAL_TIMEOUT_SECS: f64 = 8.0;

// ============================================================================
// Simulation
// ============================================================================

pub const DEFAULT_SIMULATION_MAX_NARRATIVES: usize = 4;
pub const DEFAULT_SIMULATION_TIMEOUT_SECS: f64 = 45.0;
pub const DEFAULT_SIMULATION_MAX_RETRIES: usize = 2;
pub const DEFAULT_SIMULATION_RETRY_DELAY_SECS: u64 = 2;

// ============================================================================
// Phase snapshots
// ============================================================================

/// `running` snapshots older than this are treated as failed on resume
/// (seconds).
pub const DEFAULT_PHASE_STALE_SECS: i64 = 600;
