//! Pipeline state endpoints: save one phase snapshot, load the latest task.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::pipeline_state::PhaseUpsert;
use crate::types::{idle_phases, Phase, PhaseSnapshot, PhaseStatus, PipelineTask};

use super::error::ApiError;
use super::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct SavePhaseRequest {
    pub task_id: String,
    pub input_text: String,
    pub phases: BTreeMap<Phase, PhaseStatus>,
    pub phase: Phase,
    pub status: PhaseStatus,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub meta: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SavePhaseResponse {
    pub task_id: String,
    pub phase: Phase,
    pub status: PhaseStatus,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct LoadLatestResponse {
    pub task_id: String,
    pub input_text: String,
    pub phases: BTreeMap<Phase, PhaseStatus>,
    pub meta: Value,
    pub updated_at: String,
    pub snapshots: Vec<PhaseSnapshot>,
}

impl From<PipelineTask> for LoadLatestResponse {
    fn from(task: PipelineTask) -> Self {
        Self {
            task_id: task.task_id,
            input_text: task.input_text,
            phases: task.phases,
            meta: task.meta,
            updated_at: task.updated_at,
            snapshots: task.snapshots,
        }
    }
}

/// POST /pipeline/save-phase
pub async fn save_phase(
    State(state): State<AppState>,
    Json(payload): Json<SavePhaseRequest>,
) -> Result<Json<SavePhaseResponse>, ApiError> {
    if payload.task_id.trim().is_empty() {
        return Err(ApiError::unprocessable("task_id must not be empty"));
    }

    let updated_at = state
        .dispatcher
        .pipeline_state
        .upsert_phase_snapshot(&PhaseUpsert {
            task_id: &payload.task_id,
            input_text: &payload.input_text,
            phases: &payload.phases,
            phase: payload.phase,
            status: payload.status,
            duration_ms: payload.duration_ms,
            error_message: payload.error_message.as_deref(),
            payload: payload.payload.as_ref(),
            meta: payload.meta.as_ref(),
        })?;

    Ok(Json(SavePhaseResponse {
        task_id: payload.task_id,
        phase: payload.phase,
        status: payload.status,
        updated_at,
    }))
}

/// GET /pipeline/load-latest — empty skeleton when nothing was saved yet.
pub async fn load_latest(
    State(state): State<AppState>,
) -> Result<Json<LoadLatestResponse>, ApiError> {
    let latest = state.dispatcher.pipeline_state.load_latest_task()?;
    Ok(Json(match latest {
        Some(task) => task.into(),
        None => LoadLatestResponse {
            task_id: String::new(),
            input_text: String::new(),
            phases: idle_phases(),
            meta: Value::Object(Default::default()),
            updated_at: String::new(),
            snapshots: Vec::new(),
        },
    }))
}
