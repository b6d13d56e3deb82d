//! Session API Endpoints
//! Mission: Expose the orchestrator's session lifecycle and agent surface

use std::convert::Infallible;

use axum::{
    extract::{Multipart, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::models::AuthContext;
use crate::models::Aggression;
use crate::orchestrator::{CreateSessionParams, QuestionInput};

use super::{ok, AppState};
use crate::api::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub case_id: Uuid,
    pub witness_id: Uuid,
    pub duration_minutes: i64,
    pub aggression: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default = "default_true")]
    pub objection_copilot_enabled: bool,
    #[serde(default)]
    pub sentinel_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let aggression = Aggression::parse(&body.aggression)
        .ok_or_else(|| ApiError::Validation(format!("unknown aggression: {}", body.aggression)))?;

    let session = state
        .orchestrator
        .create_session(
            auth.firm_id,
            auth.user_id,
            CreateSessionParams {
                case_id: body.case_id,
                witness_id: body.witness_id,
                duration_minutes: body.duration_minutes,
                aggression,
                focus_areas: body.focus_areas,
                objection_copilot_enabled: body.objection_copilot_enabled,
                sentinel_enabled: body.sentinel_enabled,
            },
        )
        .await?;

    Ok(ok(json!({
        "id": session.id.to_string(),
        "sessionNumber": session.session_number,
        "status": session.status,
        "witnessToken": session.witness_token,
        "durationMinutes": session.duration_minutes,
    })))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.orchestrator.get_session(auth.firm_id, session_id)?;
    Ok(ok(json!({
        "id": session.id.to_string(),
        "caseId": session.case_id.to_string(),
        "witnessId": session.witness_id.to_string(),
        "status": session.status,
        "sessionNumber": session.session_number,
        "durationMinutes": session.duration_minutes,
        "aggression": session.aggression,
        "focusAreas": session.focus_areas,
        "objectionCopilotEnabled": session.objection_copilot_enabled,
        "sentinelEnabled": session.sentinel_enabled,
        "questionCount": session.question_count,
        "startedAt": session.started_at,
        "pausedAt": session.paused_at,
        "endedAt": session.ended_at,
        "createdAt": session.created_at,
    })))
}

pub async fn start_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state
        .orchestrator
        .start_session(auth.firm_id, session_id)
        .await?;
    Ok(ok(json!({
        "sessionId": session.id.to_string(),
        "status": session.status,
        "startedAt": session.started_at,
    })))
}

pub async fn pause_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state
        .orchestrator
        .pause_session(auth.firm_id, session_id)
        .await?;
    Ok(ok(json!({
        "sessionId": session.id.to_string(),
        "status": session.status,
    })))
}

pub async fn resume_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state
        .orchestrator
        .resume_session(auth.firm_id, session_id)
        .await?;
    Ok(ok(json!({
        "sessionId": session.id.to_string(),
        "status": session.status,
        "totalPauseMs": session.total_pause_ms,
    })))
}

pub async fn end_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state
        .orchestrator
        .end_session(auth.firm_id, session_id)
        .await?;
    Ok(ok(json!({
        "sessionId": session.id.to_string(),
        "status": session.status,
        "endedAt": session.ended_at,
    })))
}

/// POST /api/v1/sessions/join/{token}: witness side, the token is the
/// credential.
pub async fn join_witness(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.orchestrator.join_witness(&token)?;
    Ok(ok(json!({
        "sessionId": session.id.to_string(),
        "status": session.status,
        "witnessConnected": session.witness_joined,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub question_number: i64,
    pub current_topic: String,
    #[serde(default)]
    pub prior_answer: Option<String>,
    #[serde(default)]
    pub hesitation_detected: bool,
    #[serde(default)]
    pub recent_inconsistency_flag: bool,
}

/// POST /api/v1/sessions/{id}/agents/question: server-sent event stream.
///
/// The handler returns immediately with the SSE response; the orchestrator
/// task feeds it. When the client closes the connection the stream (and its
/// channel) drop, which the orchestrator observes as a failed send and
/// treats as cancellation.
pub async fn stream_question(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<QuestionRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(32);
    let orchestrator = state.orchestrator.clone();

    tokio::spawn(async move {
        orchestrator
            .stream_next_question(
                auth.firm_id,
                session_id,
                QuestionInput {
                    question_number: body.question_number,
                    current_topic: body.current_topic,
                    prior_answer: body.prior_answer,
                    hesitation_detected: body.hesitation_detected,
                    recent_inconsistency_flag: body.recent_inconsistency_flag,
                },
                tx,
            )
            .await;
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(Event::default().data(event.to_json())), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectionRequestBody {
    pub question_number: i64,
    pub question_text: String,
}

/// POST /api/v1/sessions/{id}/agents/objection
pub async fn check_objection(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<ObjectionRequestBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .orchestrator
        .classify_question(auth.firm_id, session_id, body.question_number, body.question_text)
        .await?;
    Ok(ok(json!({
        "objectionable": result.objectionable,
        "category": result.category,
        "ruleId": result.rule_id,
        "explanation": result.explanation,
        "confidence": result.confidence,
        "processingMs": result.processing_ms,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InconsistencyRequestBody {
    pub question_number: i64,
    pub question_text: String,
    pub answer_text: String,
}

/// POST /api/v1/sessions/{id}/agents/inconsistency
pub async fn check_inconsistency(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<InconsistencyRequestBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .orchestrator
        .detect_inconsistency(
            auth.firm_id,
            session_id,
            body.question_number,
            body.question_text,
            body.answer_text,
        )
        .await?;
    Ok(ok(json!({
        "flagFound": result.flag_found,
        "liveFired": result.live_fired,
        "confidence": result.confidence,
        "priorQuote": result.prior_quote,
        "priorDocumentPage": result.prior_document_page,
        "priorDocumentLine": result.prior_document_line,
        "impeachmentRisk": result.impeachment_risk,
    })))
}

/// POST /api/v1/sessions/{id}/answers/audio: multipart upload with fields
/// `file`, `questionNumber`, `durationMs`.
pub async fn upload_answer_audio(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut audio: Vec<u8> = Vec::new();
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut question_number: i64 = 0;
    let mut duration_ms: Option<i64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                audio = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("failed to read audio: {e}")))?
                    .to_vec();
            }
            "questionNumber" => {
                let text = field.text().await.unwrap_or_default();
                question_number = text.trim().parse().unwrap_or(0);
            }
            "durationMs" => {
                let text = field.text().await.unwrap_or_default();
                duration_ms = text.trim().parse().ok();
            }
            _ => {}
        }
    }

    let ingest = state
        .orchestrator
        .ingest_answer(
            auth.firm_id,
            session_id,
            audio,
            filename,
            content_type,
            question_number,
            duration_ms,
        )
        .await?;

    Ok(ok(json!({
        "eventId": ingest.event_id.to_string(),
        "sessionId": session_id.to_string(),
        "questionNumber": ingest.question_number,
        "transcriptText": ingest.transcript_text,
        "audioBlobKey": ingest.audio_blob_key,
        "durationMs": ingest.duration_ms,
    })))
}

/// GET /api/v1/sessions/{id}/live-state
pub async fn live_state(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let live = state.orchestrator.live_state(auth.firm_id, session_id)?;
    Ok(ok(serde_json::to_value(live).map_err(|e| ApiError::Internal(e.into()))?))
}
