//! Router assembly and shared application state.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::chat::dispatcher::Dispatcher;

use super::cache::TextCache;
use super::{chat, detect, history, pipeline, simulate};

/// Shared state: the dispatcher (which carries the store handles) plus the
/// detect-endpoint caches.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub detect_cache: Arc<TextCache>,
    pub claims_cache: Arc<TextCache>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            detect_cache: Arc::new(TextCache::new()),
            claims_cache: Arc::new(TextCache::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the full application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        // Chat
        .route("/chat", post(chat::chat))
        .route("/chat/stream", post(chat::chat_stream))
        .route("/chat/sessions", post(chat::create_session).get(chat::list_sessions))
        .route("/chat/sessions/:session_id", get(chat::session_detail))
        .route(
            "/chat/sessions/:session_id/messages/stream",
            post(chat::session_message_stream),
        )
        // Detect (synchronous per-stage endpoints)
        .route("/detect", post(detect::detect))
        .route("/detect/claims", post(detect::detect_claims))
        .route("/detect/evidence", post(detect::detect_evidence))
        .route("/detect/evidence/align", post(detect::align_evidence))
        .route("/detect/report", post(detect::detect_report))
        .route("/detect/url", post(detect::detect_url))
        // Simulation
        .route("/simulate", post(simulate::simulate))
        .route("/simulate/stream", post(simulate::simulate_stream))
        // History
        .route("/history", get(history::history_list))
        .route("/history/:record_id", get(history::history_detail))
        .route("/history/:record_id/feedback", post(history::history_feedback))
        .route(
            "/history/:record_id/simulation",
            post(history::history_update_simulation),
        )
        // Pipeline state
        .route("/pipeline/save-phase", post(pipeline::save_phase))
        .route("/pipeline/load-latest", get(pipeline::load_latest))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_healthz() {
        let app = create_app(AppState::new());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_404() {
        let app = create_app(AppState::new());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
