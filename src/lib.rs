//! Verisift: conversational fact-check orchestration.
//!
//! A multi-stage fact-checking pipeline (risk snapshot → claim extraction
//! → evidence retrieval → summarization/alignment → report → opinion
//! simulation → response content) driven either by synchronous REST calls
//! or by streamed chat turns that multiplex natural language and slash
//! commands.
//!
//! ## Architecture
//!
//! - **Stage engines**: each pipeline stage prefers its LM path and falls
//!   back to a deterministic rule path
//! - **LM gateway**: the single outbound LM call site, with a strict-JSON
//!   repair ladder and a process-wide slot semaphore
//! - **Dispatcher**: per-turn state machine enforcing guardrails, budgets,
//!   session caches and phase-snapshot persistence
//! - **Stores**: SQLite (sessions, history, pipeline state) with a shared
//!   tempdir fallback

pub mod api;
pub mod chat;
pub mod config;
pub mod guardrails;
pub mod llm;
pub mod orchestrator;
pub mod stages;
pub mod store;
pub mod types;

// Re-export the app entry points
pub use api::{create_app, AppState};

// Re-export commonly used types
pub use types::{
    ChatMessage, ChatStreamEvent, ClaimItem, DetectLabel, DetectResult, EvidenceItem, Phase,
    PhaseStatus, Report, RiskLabel, RiskLevel, Scenario, SimulateResponse, Stance,
    StrategyConfig,
};

// Re-export store handles
pub use store::{HistoryStore, PipelineStateStore, SessionStore, StoreError};
