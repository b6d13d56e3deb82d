//! Brief API Endpoints
//! Mission: Trigger, fetch, and share coaching briefs

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::models::AuthContext;
use crate::models::{Brief, SessionStatus};

use super::{ok, AppState};
use crate::api::error::ApiError;

const SHARE_TOKEN_LEN: usize = 24;
const SHARE_TOKEN_DAYS: i64 = 7;

/// POST /api/v1/briefs/generate/{session_id}
///
/// Validates the session, inserts the placeholder row, kicks off background
/// generation, and returns immediately with the brief id for polling. An
/// ACTIVE session is force-completed first.
pub async fn trigger_generation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.orchestrator.get_session(auth.firm_id, session_id)?;

    match session.status {
        SessionStatus::Complete | SessionStatus::Abandoned => {}
        SessionStatus::Active => {
            state
                .orchestrator
                .end_session(auth.firm_id, session_id)
                .await?;
        }
        other => return Err(ApiError::InvalidState(other.as_str().to_string())),
    }

    let (session, brief, created) = state
        .briefs
        .ensure_placeholder(session_id)
        .map_err(ApiError::Internal)?;

    if !created {
        return Ok(ok(json!({
            "briefId": brief.id.to_string(),
            "status": "ALREADY_EXISTS",
            "message": "Brief already generated for this session.",
        })));
    }

    let brief_id = brief.id;
    let generator = state.briefs.clone();
    tokio::spawn(async move {
        if let Err(e) = generator.fill(&session, &brief).await {
            tracing::error!(brief_id = %brief.id, error = %e, "brief fill failed");
        }
    });

    Ok(ok(json!({
        "briefId": brief_id.to_string(),
        "status": "GENERATING",
        "message": "Brief generation started. Poll GET /api/v1/briefs/{briefId} for status.",
    })))
}

/// GET /api/v1/briefs/{brief_id}: full attorney view.
pub async fn get_brief(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(brief_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let brief = state
        .orchestrator
        .store
        .get_brief(auth.firm_id, brief_id)?
        .ok_or(ApiError::NotFound)?;
    Ok(ok(brief_view(&brief)))
}

/// POST /api/v1/briefs/{brief_id}/share: mint a 7-day share token.
pub async fn share_brief(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(brief_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let brief = state
        .orchestrator
        .store
        .get_brief(auth.firm_id, brief_id)?
        .ok_or(ApiError::NotFound)?;

    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHARE_TOKEN_LEN)
        .map(char::from)
        .collect();
    let expires_at = Utc::now() + Duration::days(SHARE_TOKEN_DAYS);
    state
        .orchestrator
        .store
        .set_brief_share_token(brief.id, &token, expires_at)?;
    info!(brief_id = %brief.id, "🔗 Share token minted");

    Ok(ok(json!({
        "shareToken": token,
        "expiresAt": expires_at,
        "shareUrl": format!("/api/v1/briefs/share/{token}"),
    })))
}

/// GET /api/v1/briefs/share/{token}: unauthenticated, expiring,
/// witness-safe subset.
pub async fn get_shared_brief(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let brief = state
        .orchestrator
        .store
        .get_brief_by_share_token(&token)?
        .ok_or(ApiError::NotFound)?;

    if let Some(expires_at) = brief.share_token_expires_at {
        if expires_at < Utc::now() {
            return Err(ApiError::Gone("SHARE_LINK_EXPIRED"));
        }
    }

    Ok(ok(json!({
        "sessionScore": brief.session_score,
        "consistencyRate": brief.consistency_rate,
        "topRecommendations": brief.top_recommendations,
        "narrativeText": brief.narrative_text,
    })))
}

fn brief_view(brief: &Brief) -> serde_json::Value {
    json!({
        "id": brief.id.to_string(),
        "sessionId": brief.session_id.to_string(),
        "witnessId": brief.witness_id.to_string(),
        "sessionScore": brief.session_score,
        "consistencyRate": brief.consistency_rate,
        "deltaVsBaseline": brief.delta_vs_baseline,
        "confirmedFlags": brief.confirmed_flags,
        "objectionCount": brief.objection_count,
        "composureAlerts": brief.composure_alerts,
        "topRecommendations": brief.top_recommendations,
        "narrativeText": brief.narrative_text,
        "weaknessMapScores": brief.weakness_map,
        "pdfBlobKey": brief.pdf_blob_key,
        "shareToken": brief.share_token,
        "createdAt": brief.created_at,
    })
}
