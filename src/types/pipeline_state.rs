//! Pipeline task rows and phase snapshots used for resume and cross-tool
//! cache lookups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Pipeline phase identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Detect,
    Claims,
    Evidence,
    Report,
    Simulation,
    Content,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Detect,
        Phase::Claims,
        Phase::Evidence,
        Phase::Report,
        Phase::Simulation,
        Phase::Content,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Detect => "detect",
            Phase::Claims => "claims",
            Phase::Evidence => "evidence",
            Phase::Report => "report",
            Phase::Simulation => "simulation",
            Phase::Content => "content",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "detect" => Some(Phase::Detect),
            "claims" => Some(Phase::Claims),
            "evidence" => Some(Phase::Evidence),
            "report" => Some(Phase::Report),
            "simulation" => Some(Phase::Simulation),
            "content" => Some(Phase::Content),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Idle,
    Running,
    Done,
    Failed,
    Canceled,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Idle => "idle",
            PhaseStatus::Running => "running",
            PhaseStatus::Done => "done",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "idle" => Some(PhaseStatus::Idle),
            "running" => Some(PhaseStatus::Running),
            "done" => Some(PhaseStatus::Done),
            "failed" => Some(PhaseStatus::Failed),
            "canceled" => Some(PhaseStatus::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fresh phase map with every phase idle.
pub fn idle_phases() -> BTreeMap<Phase, PhaseStatus> {
    Phase::ALL.iter().map(|p| (*p, PhaseStatus::Idle)).collect()
}

/// One persisted `(task_id, phase)` snapshot row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Task row plus its snapshots, as returned by `load-latest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTask {
    pub task_id: String,
    pub input_text: String,
    pub phases: BTreeMap<Phase, PhaseStatus>,
    #[serde(default)]
    pub meta: serde_json::Value,
    pub updated_at: String,
    #[serde(default)]
    pub snapshots: Vec<PhaseSnapshot>,
}
