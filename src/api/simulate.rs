//! Opinion simulation endpoints: aggregate and streaming.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::chat::sse::{event_stream, sse_headers, EventSender};
use crate::stages::simulate::{run_stream, SimulationInput};
use crate::types::{
    ChatStreamEvent, ClaimItem, EvidenceItem, Report, SimulateResponse, StreamEventKind,
};

use super::error::ApiError;
use super::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub text: String,
    #[serde(default)]
    pub claims: Option<Vec<ClaimItem>>,
    #[serde(default)]
    pub evidences: Option<Vec<EvidenceItem>>,
    #[serde(default)]
    pub report: Option<Report>,
    #[serde(default = "default_time_window")]
    pub time_window_hours: i64,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub comments: Vec<String>,
}

fn default_time_window() -> i64 {
    24
}

fn default_platform() -> String {
    "general".to_string()
}

impl SimulateRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.text.trim().chars().count() < 5 {
            return Err(ApiError::unprocessable("text too short"));
        }
        if !(1..=168).contains(&self.time_window_hours) {
            return Err(ApiError::unprocessable(
                "time_window_hours must be within 1..=168",
            ));
        }
        Ok(())
    }
}

/// POST /simulate
pub async fn simulate(
    State(_state): State<AppState>,
    Json(payload): Json<SimulateRequest>,
) -> Result<Json<SimulateResponse>, ApiError> {
    payload.validate()?;
    let result = crate::orchestrator::run_simulation(
        &payload.text,
        payload.time_window_hours,
        &payload.platform,
        &payload.comments,
        payload.claims.as_deref(),
        payload.evidences.as_deref(),
        payload.report.as_ref(),
    )
    .await;
    Ok(Json(result))
}

/// POST /simulate/stream — one SSE block per completed sub-stage.
pub async fn simulate_stream(
    State(_state): State<AppState>,
    Json(payload): Json<SimulateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;

    let (tx, rx) = EventSender::channel("simulate");
    tokio::spawn(async move {
        let input = SimulationInput {
            text: &payload.text,
            claims: payload.claims.as_deref(),
            evidences: payload.evidences.as_deref(),
            report: payload.report.as_ref(),
            time_window_hours: payload.time_window_hours,
            platform: &payload.platform,
            comments: &payload.comments,
        };
        for block in run_stream(&input).await {
            // Sub-stage blocks ride in the stage channel of the envelope.
            let event = ChatStreamEvent {
                kind: StreamEventKind::Stage,
                data: json!({"stage": block.stage, "data": block.data}),
            };
            tx.send_raw(event);
        }
        tx.done();
    });

    Ok((sse_headers(), event_stream(rx)))
}
