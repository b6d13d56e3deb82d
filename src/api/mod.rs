//! API Router
//! Mission: Wire the HTTP surface to the orchestrator and brief generator

pub mod auth_api;
pub mod briefs_api;
pub mod error;
pub mod sessions_api;

use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::auth::{auth_middleware, AuthLayer, JwtHandler};
use crate::brief::BriefGenerator;
use crate::config::Config;
use crate::orchestrator::Orchestrator;

/// Process-wide service container, built once at startup and handed to every
/// handler by reference.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub briefs: BriefGenerator,
    pub jwt: Arc<JwtHandler>,
    pub config: Config,
}

/// Standard response envelope.
pub(crate) fn ok(data: serde_json::Value) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

pub fn build_router(state: AppState) -> Router {
    let auth_layer = AuthLayer {
        jwt: state.jwt.clone(),
        store: state.orchestrator.store.clone(),
    };

    let protected = Router::new()
        .route("/api/v1/sessions", post(sessions_api::create_session))
        .route("/api/v1/sessions/:id", get(sessions_api::get_session))
        .route("/api/v1/sessions/:id/start", post(sessions_api::start_session))
        .route("/api/v1/sessions/:id/pause", post(sessions_api::pause_session))
        .route("/api/v1/sessions/:id/resume", post(sessions_api::resume_session))
        .route("/api/v1/sessions/:id/end", post(sessions_api::end_session))
        .route(
            "/api/v1/sessions/:id/agents/question",
            post(sessions_api::stream_question),
        )
        .route(
            "/api/v1/sessions/:id/agents/objection",
            post(sessions_api::check_objection),
        )
        .route(
            "/api/v1/sessions/:id/agents/inconsistency",
            post(sessions_api::check_inconsistency),
        )
        .route(
            "/api/v1/sessions/:id/answers/audio",
            post(sessions_api::upload_answer_audio),
        )
        .route(
            "/api/v1/sessions/:id/live-state",
            get(sessions_api::live_state),
        )
        .route(
            "/api/v1/briefs/generate/:session_id",
            post(briefs_api::trigger_generation),
        )
        .route("/api/v1/briefs/:id", get(briefs_api::get_brief))
        .route("/api/v1/briefs/:id/share", post(briefs_api::share_brief))
        .route("/api/v1/auth/me", get(auth_api::me))
        .route_layer(axum_mw::from_fn_with_state(auth_layer, auth_middleware))
        .with_state(state.clone());

    // Public surface: health, login, witness join, expiring share links.
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/login", post(auth_api::login))
        .route("/api/v1/sessions/join/:token", post(sessions_api::join_witness))
        .route(
            "/api/v1/briefs/share/:token",
            get(briefs_api::get_shared_brief),
        )
        .with_state(state);

    public
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(axum_mw::from_fn(
            crate::middleware::logging::request_logging,
        ))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
