//! History endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{HistoryDetail, HistoryItem};

use super::error::ApiError;
use super::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryFeedbackRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// GET /history?limit=N
pub async fn history_list(
    State(state): State<AppState>,
    Query(query): Query<HistoryListQuery>,
) -> Result<Json<HistoryListResponse>, ApiError> {
    let items = state
        .dispatcher
        .history
        .list(query.limit.clamp(1, 100))?;
    Ok(Json(HistoryListResponse { items }))
}

/// GET /history/{id}
pub async fn history_detail(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> Result<Json<HistoryDetail>, ApiError> {
    let record = state
        .dispatcher
        .history
        .get(&record_id)?
        .ok_or_else(|| ApiError::not_found("history not found"))?;
    Ok(Json(record))
}

/// POST /history/{id}/feedback
pub async fn history_feedback(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    Json(payload): Json<HistoryFeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    if !matches!(
        payload.status.as_str(),
        "accurate" | "inaccurate" | "evidence_irrelevant"
    ) {
        return Err(ApiError::unprocessable(
            "status must be one of accurate|inaccurate|evidence_irrelevant",
        ));
    }

    let ok = state.dispatcher.history.save_feedback(
        &record_id,
        &payload.status,
        payload.note.as_deref(),
    )?;
    if !ok {
        return Err(ApiError::not_found("history not found"));
    }
    Ok(Json(json!({"status": "ok"})))
}

/// POST /history/{id}/simulation — additive simulation attachment.
pub async fn history_update_simulation(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let ok = state
        .dispatcher
        .history
        .update_simulation(&record_id, &payload)?;
    if !ok {
        return Err(ApiError::not_found("history not found"));
    }
    Ok(Json(json!({"status": "ok"})))
}
