//! Synchronous per-stage detect endpoints. They share the stage engines
//! with the chat dispatcher; `/detect` and `/detect/claims` additionally
//! carry small response caches.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config;
use crate::llm::acquire_slot;
use crate::orchestrator;
use crate::stages::{pipeline as stage_pipeline, risk};
use crate::types::{ClaimItem, DetectResult, EvidenceItem, Report, StrategyConfig};

use super::crawl;
use super::error::ApiError;
use super::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ClaimsRequest {
    pub text: String,
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
}

#[derive(Debug, Serialize)]
pub struct ClaimsResponse {
    pub claims: Vec<ClaimItem>,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub claims: Option<Vec<ClaimItem>>,
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
}

#[derive(Debug, Serialize)]
pub struct EvidenceResponse {
    pub evidences: Vec<EvidenceItem>,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceAlignRequest {
    pub claims: Vec<ClaimItem>,
    pub evidences: Vec<EvidenceItem>,
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub claims: Option<Vec<ClaimItem>>,
    #[serde(default)]
    pub evidences: Option<Vec<EvidenceItem>>,
    #[serde(default)]
    pub detect_data: Option<Value>,
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
}

#[derive(Debug, Deserialize)]
pub struct UrlDetectRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct UrlDetectResponse {
    pub url: String,
    pub title: String,
    pub content: String,
    pub publish_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<DetectResult>,
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
}

fn truncate_input(text: &str) -> (String, bool) {
    let limit = config::max_input_chars();
    let count = text.chars().count();
    if count <= limit {
        return (text.to_string(), false);
    }
    warn!(limit, actual = count, "输入文本超过限制，已自动截断");
    (text.chars().take(limit).collect(), true)
}

/// POST /detect — risk snapshot with cache and truncation.
pub async fn detect(
    State(state): State<AppState>,
    Json(payload): Json<DetectRequest>,
) -> Result<Json<DetectResult>, ApiError> {
    if payload.text.trim().chars().count() < 5 {
        return Err(ApiError::unprocessable("text too short"));
    }
    let (text, truncated) = truncate_input(&payload.text);

    if let Some(cached) = state.detect_cache.get(&text) {
        if let Ok(mut result) = serde_json::from_value::<DetectResult>(cached) {
            info!("风险快照：缓存命中，跳过 LLM 调用");
            result.truncated = truncated;
            return Ok(Json(result));
        }
    }

    let mut result = {
        let _slot = acquire_slot().await;
        risk::detect_risk_snapshot(&text).await
    };
    result.truncated = truncated;

    if let Ok(value) = serde_json::to_value(&result) {
        state.detect_cache.set(&text, value);
    }
    Ok(Json(result))
}

/// POST /detect/claims — cached only for the default strategy.
pub async fn detect_claims(
    State(state): State<AppState>,
    Json(payload): Json<ClaimsRequest>,
) -> Result<Json<ClaimsResponse>, ApiError> {
    if payload.text.trim().chars().count() < 5 {
        return Err(ApiError::unprocessable("text too short"));
    }
    let (text, _) = truncate_input(&payload.text);

    if payload.strategy.is_none() {
        if let Some(cached) = state.claims_cache.get(&text) {
            if let Ok(claims) = serde_json::from_value::<Vec<ClaimItem>>(cached) {
                info!("主张抽取：缓存命中，跳过 LLM 调用");
                return Ok(Json(ClaimsResponse { claims }));
            }
        }
    }

    let claims = {
        let _slot = acquire_slot().await;
        orchestrator::run_claims(&text, payload.strategy.as_ref()).await
    };

    if payload.strategy.is_none() {
        if let Ok(value) = serde_json::to_value(&claims) {
            state.claims_cache.set(&text, value);
        }
    }
    Ok(Json(ClaimsResponse { claims }))
}

/// POST /detect/evidence
pub async fn detect_evidence(
    State(_state): State<AppState>,
    Json(payload): Json<EvidenceRequest>,
) -> Result<Json<EvidenceResponse>, ApiError> {
    let text = payload.text.map(|t| truncate_input(&t).0);
    let evidences = {
        let _slot = acquire_slot().await;
        orchestrator::run_evidence(text.as_deref(), payload.claims, payload.strategy.as_ref())
            .await
    };
    Ok(Json(EvidenceResponse { evidences }))
}

/// POST /detect/evidence/align — per-claim summarize + align.
pub async fn align_evidence(
    State(_state): State<AppState>,
    Json(payload): Json<EvidenceAlignRequest>,
) -> Result<Json<EvidenceResponse>, ApiError> {
    let aligned = {
        let _slot = acquire_slot().await;
        stage_pipeline::align_evidences(
            &payload.claims,
            &payload.evidences,
            payload.strategy.as_ref(),
        )
        .await
    };
    Ok(Json(EvidenceResponse { evidences: aligned }))
}

/// POST /detect/report — builds and persists the report.
pub async fn detect_report(
    State(state): State<AppState>,
    Json(payload): Json<ReportRequest>,
) -> Result<Json<Value>, ApiError> {
    let text = payload.text.map(|t| truncate_input(&t).0);
    let report: Report = {
        let _slot = acquire_slot().await;
        orchestrator::run_report(
            text.as_deref(),
            payload.claims.clone(),
            payload.evidences,
            payload.strategy.as_ref(),
        )
        .await
    };

    let input_text = text
        .filter(|t| !t.is_empty())
        .or_else(|| {
            payload.claims.as_ref().map(|claims| {
                claims
                    .iter()
                    .map(|c| c.claim_text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "[无原文]".to_string());

    let record_id = state.dispatcher.history.save_report(
        &input_text,
        &serde_json::to_value(&report).unwrap_or(Value::Null),
        payload.detect_data.as_ref(),
        None,
    )?;

    let mut body = serde_json::to_value(&report).unwrap_or(Value::Null);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("record_id".to_string(), json!(record_id));
    }
    Ok(Json(body))
}

/// POST /detect/url — crawl a news URL and run the risk snapshot on it.
pub async fn detect_url(
    State(_state): State<AppState>,
    Json(payload): Json<UrlDetectRequest>,
) -> Result<Json<UrlDetectResponse>, ApiError> {
    let crawled = crawl::crawl_news_url(&payload.url).await;
    if !crawled.success {
        return Ok(Json(UrlDetectResponse {
            url: payload.url,
            title: String::new(),
            content: String::new(),
            publish_date: String::new(),
            risk: None,
            success: false,
            error_msg: crawled.error_msg,
        }));
    }

    let risk_result = {
        let _slot = acquire_slot().await;
        risk::detect_risk_snapshot(&crawled.content).await
    };

    Ok(Json(UrlDetectResponse {
        url: payload.url,
        title: crawled.title,
        content: crawled.content,
        publish_date: crawled.publish_date,
        risk: Some(risk_result),
        success: true,
        error_msg: String::new(),
    }))
}
