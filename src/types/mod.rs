//! Core domain types shared across stages, stores and the HTTP API.
//!
//! Everything here is a plain serde type: stage engines produce them, the
//! dispatcher threads them through phase snapshots, and the API returns them
//! verbatim. Closed vocabularies (stance, risk labels, phases, SSE event
//! kinds) are enums rather than free strings.

pub mod chat;
pub mod claim;
pub mod content;
pub mod detect;
pub mod evidence;
pub mod history;
pub mod pipeline_state;
pub mod report;
pub mod simulation;
pub mod strategy;

pub use chat::{
    ActionKind, ChatAction, ChatMessage, ChatReference, ChatRequest, ChatResponse, ChatSession,
    ChatStreamEvent, StreamEventKind,
};
pub use claim::ClaimItem;
pub use content::{ClarificationContent, ContentBundle, FaqItem, PlatformScript};
pub use detect::{DetectLabel, DetectResult};
pub use evidence::{EvidenceItem, SourceType, Stance};
pub use history::{HistoryDetail, HistoryItem};
pub use pipeline_state::{idle_phases, Phase, PhaseSnapshot, PhaseStatus, PipelineTask};
pub use report::{score_band, ClaimReport, Report, RiskLabel, RiskLevel, Scenario};
pub use simulation::{
    ActionItem, NarrativeItem, SimulateResponse, SuggestionData, TimelineItem,
};
pub use strategy::{ComplexityLevel, StrategyConfig};
