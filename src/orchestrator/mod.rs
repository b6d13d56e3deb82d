//! Session Orchestrator
//! Mission: Own the live session state machine and sequence the agents
//!
//! One orchestrator serves many sessions concurrently; within a session all
//! state-mutating work serializes behind a per-session lock, so the event
//! log order is deterministic and counters are race-free. Status changes
//! additionally compare-and-set in the store, which keeps two replicas from
//! driving the same session. Read paths go straight to the store.

pub mod locks;
pub mod stream;
pub mod sweeper;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{
    AgentRequest, AgentResult, Agents, CaseProfile, InconsistencyRequest, InconsistencyResult,
    InterrogatorRequest, ObjectionRequest, ObjectionResult,
};
use crate::blob::{answer_audio_key, BlobStore};
use crate::clients::VoiceClient;
use crate::models::{
    Alert, AlertType, Case, EventType, ImpeachmentRisk, ObjectionCategory, Session, SessionEvent,
    SessionStatus, SpeakerRole, Witness,
};
use crate::store::events::{NewAlert, NewEvent};
use crate::store::sessions::{NewSession, TransitionError};
use crate::store::Store;

pub use locks::SessionLocks;
pub use stream::QuestionStreamEvent;

const WITNESS_TOKEN_LEN: usize = 24;
const DEFAULT_TOPIC: &str = "PRIOR_STATEMENTS";

#[derive(Debug, Error)]
pub enum OpError {
    #[error("not found")]
    NotFound,
    #[error("invalid session state: {0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error("upstream unavailable: {0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<TransitionError> for OpError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotFound => OpError::NotFound,
            TransitionError::InvalidState { from } => OpError::InvalidState(from.to_string()),
            TransitionError::Storage(e) => OpError::Internal(e),
        }
    }
}

/// Post-session work item handed to the brief worker.
#[derive(Debug, Clone, Copy)]
pub struct BriefJob {
    pub session_id: Uuid,
}

pub struct CreateSessionParams {
    pub case_id: Uuid,
    pub witness_id: Uuid,
    pub duration_minutes: i64,
    pub aggression: crate::models::Aggression,
    pub focus_areas: Vec<String>,
    pub objection_copilot_enabled: bool,
    pub sentinel_enabled: bool,
}

pub struct QuestionInput {
    pub question_number: i64,
    pub current_topic: String,
    pub prior_answer: Option<String>,
    pub hesitation_detected: bool,
    pub recent_inconsistency_flag: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerIngest {
    pub event_id: Uuid,
    pub question_number: i64,
    pub transcript_text: String,
    pub audio_blob_key: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Clone)]
pub struct Orchestrator {
    pub store: Store,
    pub agents: Agents,
    pub voice: VoiceClient,
    pub blob: BlobStore,
    locks: SessionLocks,
    brief_tx: mpsc::UnboundedSender<BriefJob>,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        agents: Agents,
        voice: VoiceClient,
        blob: BlobStore,
        brief_tx: mpsc::UnboundedSender<BriefJob>,
    ) -> Self {
        Self {
            store,
            agents,
            voice,
            blob,
            locks: SessionLocks::new(),
            brief_tx,
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    pub async fn create_session(
        &self,
        firm_id: Uuid,
        attorney_id: Uuid,
        params: CreateSessionParams,
    ) -> Result<Session, OpError> {
        if !(5..=480).contains(&params.duration_minutes) {
            return Err(OpError::Validation(
                "duration_minutes must be between 5 and 480".to_string(),
            ));
        }

        let case = self
            .store
            .get_case(firm_id, params.case_id)?
            .ok_or(OpError::NotFound)?;
        let witness = self
            .store
            .get_witness(firm_id, params.witness_id)?
            .ok_or(OpError::NotFound)?;
        if witness.case_id != case.id {
            return Err(OpError::Validation(
                "witness does not belong to this case".to_string(),
            ));
        }

        let session_number = self.store.count_sessions_for_witness(witness.id)? + 1;
        let session = self.store.insert_session(NewSession {
            case_id: case.id,
            witness_id: witness.id,
            firm_id,
            attorney_id: Some(attorney_id),
            session_number,
            duration_minutes: params.duration_minutes,
            aggression: params.aggression,
            focus_areas: params.focus_areas,
            objection_copilot_enabled: params.objection_copilot_enabled,
            sentinel_enabled: params.sentinel_enabled,
            witness_token: generate_witness_token(),
        })?;
        self.store
            .set_witness_session_count(witness.id, session_number)?;

        info!(
            session_id = %session.id,
            session_number,
            "🎬 Session created in LOBBY"
        );
        Ok(session)
    }

    pub fn get_session(&self, firm_id: Uuid, session_id: Uuid) -> Result<Session, OpError> {
        self.store
            .get_session(firm_id, session_id)?
            .ok_or(OpError::NotFound)
    }

    pub async fn start_session(&self, firm_id: Uuid, session_id: Uuid) -> Result<Session, OpError> {
        let lock = self.locks.handle(session_id);
        let _guard = lock.lock().await;

        self.authorize(firm_id, session_id)?;
        let session = self.store.transition_start(session_id)?;
        self.record_state_change(&session, "ACTIVE")?;
        metrics::increment_counter!("sessions_started_total");
        Ok(session)
    }

    pub async fn pause_session(&self, firm_id: Uuid, session_id: Uuid) -> Result<Session, OpError> {
        let lock = self.locks.handle(session_id);
        let _guard = lock.lock().await;

        self.authorize(firm_id, session_id)?;
        let session = self.store.transition_pause(session_id)?;
        self.record_state_change(&session, "PAUSED")?;
        Ok(session)
    }

    pub async fn resume_session(
        &self,
        firm_id: Uuid,
        session_id: Uuid,
    ) -> Result<Session, OpError> {
        let lock = self.locks.handle(session_id);
        let _guard = lock.lock().await;

        self.authorize(firm_id, session_id)?;
        let session = self.store.transition_resume(session_id)?;
        self.record_state_change(&session, "ACTIVE")?;
        Ok(session)
    }

    /// End the session and enqueue the brief job.
    pub async fn end_session(&self, firm_id: Uuid, session_id: Uuid) -> Result<Session, OpError> {
        let session = {
            let lock = self.locks.handle(session_id);
            let _guard = lock.lock().await;

            self.authorize(firm_id, session_id)?;
            let session = self.store.transition_end(session_id)?;
            self.record_state_change(&session, "COMPLETE")?;
            session
        };
        self.locks.release(session_id);

        if self.brief_tx.send(BriefJob { session_id }).is_err() {
            warn!(session_id = %session_id, "brief worker gone — job dropped");
        }
        info!(session_id = %session_id, "🏁 Session complete, brief job enqueued");
        Ok(session)
    }

    /// Witness joins via the opaque session token.
    pub fn join_witness(&self, token: &str) -> Result<Session, OpError> {
        let session = self
            .store
            .get_session_by_witness_token(token)?
            .ok_or(OpError::NotFound)?;
        if session.status.is_terminal() {
            return Err(OpError::InvalidState(session.status.as_str().to_string()));
        }
        self.store.set_witness_joined(session.id, true)?;
        self.store
            .get_session_unscoped(session.id)?
            .ok_or(OpError::NotFound)
    }

    // ── agents ──────────────────────────────────────────────────────────────

    /// Drive one question stream, emitting typed events into `tx`.
    ///
    /// The consumer going away (send failure) cancels the upstream model
    /// stream; whatever text already arrived is still persisted as a
    /// QUESTION event with `truncated=true` before the counter bump. The
    /// QUESTION event is always written before QUESTION_END is emitted.
    pub async fn stream_next_question(
        &self,
        firm_id: Uuid,
        session_id: Uuid,
        input: QuestionInput,
        tx: mpsc::Sender<QuestionStreamEvent>,
    ) {
        if let Err(e) = self
            .run_question_stream(firm_id, session_id, input, &tx)
            .await
        {
            let (code, message) = error_frame(&e);
            let _ = tx
                .send(QuestionStreamEvent::Error {
                    code: code.to_string(),
                    message,
                })
                .await;
        }
    }

    async fn run_question_stream(
        &self,
        firm_id: Uuid,
        session_id: Uuid,
        input: QuestionInput,
        tx: &mpsc::Sender<QuestionStreamEvent>,
    ) -> Result<(), OpError> {
        let lock = self.locks.handle(session_id);
        let _guard = lock.lock().await;

        let session = self.authorize(firm_id, session_id)?;
        if session.status.is_terminal() {
            return Err(OpError::InvalidState(session.status.as_str().to_string()));
        }

        let (case, witness) = self.load_case_witness(&session)?;
        let profile = build_profile(&case, &witness, &session);
        let prior_weak_areas = self.prior_weak_areas(witness.id)?;

        let request = InterrogatorRequest {
            profile,
            question_number: input.question_number,
            current_topic: input.current_topic.clone(),
            prior_answer: input.prior_answer,
            hesitation_detected: input.hesitation_detected,
            recent_inconsistency_flag: input.recent_inconsistency_flag,
            prior_weak_areas,
        };

        let mut token_stream = match self
            .agents
            .dispatch(AgentRequest::Interrogator(request))
            .await
        {
            Ok(AgentResult::Question(stream)) => stream,
            Ok(_) => unreachable!("interrogator dispatch returns a question stream"),
            Err(e) => return Err(OpError::Upstream(e.to_string())),
        };

        let _ = tx
            .send(QuestionStreamEvent::Start {
                question_number: input.question_number,
            })
            .await;

        let mut full_text = String::new();
        let mut truncated = false;
        let mut upstream_error: Option<String> = None;

        use futures_util::StreamExt;
        while let Some(delta) = token_stream.next().await {
            match delta {
                Ok(text) => {
                    full_text.push_str(&text);
                    if tx
                        .send(QuestionStreamEvent::Chunk { text })
                        .await
                        .is_err()
                    {
                        // Client disconnected: stop consuming upstream.
                        truncated = true;
                        break;
                    }
                }
                Err(e) => {
                    truncated = true;
                    upstream_error = Some(e.to_string());
                    break;
                }
            }
        }
        drop(token_stream);

        // Persist the question (partial or complete) before any terminal
        // frame, then bump the counter.
        self.record_question(
            &session,
            input.question_number,
            &input.current_topic,
            &full_text,
            truncated,
        )?;
        metrics::increment_counter!("questions_streamed_total");

        if let Some(message) = upstream_error {
            let _ = tx
                .send(QuestionStreamEvent::Error {
                    code: "UPSTREAM_UNAVAILABLE".to_string(),
                    message,
                })
                .await;
            return Ok(());
        }

        if !truncated && self.voice.configured() && !full_text.is_empty() {
            let voice_id = self.voice.interrogator_voice_id.clone();
            if let Ok(audio) = self.voice.synthesize(&full_text, &voice_id).await {
                use base64::Engine;
                let _ = tx
                    .send(QuestionStreamEvent::Audio {
                        audio_base64: base64::engine::general_purpose::STANDARD.encode(audio),
                    })
                    .await;
            }
        }

        let _ = tx.send(QuestionStreamEvent::End { full_text }).await;
        Ok(())
    }

    /// Append the QUESTION event, extend the transcript, bump the counter.
    /// The counter moves only after the event write succeeded.
    pub fn record_question(
        &self,
        session: &Session,
        question_number: i64,
        topic: &str,
        full_text: &str,
        truncated: bool,
    ) -> Result<SessionEvent, OpError> {
        let event = self.store.append_event(NewEvent {
            session_id: session.id,
            firm_id: session.firm_id,
            event_type: EventType::Question,
            speaker_role: SpeakerRole::Interrogator,
            content: full_text.to_string(),
            question_number: Some(question_number),
            audio_blob_key: None,
            duration_ms: None,
            metadata: serde_json::json!({ "topic": topic, "truncated": truncated }),
        })?;
        self.store
            .append_transcript_line(session.id, "INTERROGATOR", full_text)?;
        self.store
            .bump_question_count(session.id, question_number)?;
        Ok(event)
    }

    /// Store witness audio (best-effort), transcribe it (fallback
    /// "(inaudible)"), and append the ANSWER event.
    pub async fn ingest_answer(
        &self,
        firm_id: Uuid,
        session_id: Uuid,
        audio: Vec<u8>,
        filename: Option<String>,
        content_type: Option<String>,
        question_number: i64,
        duration_ms: Option<i64>,
    ) -> Result<AnswerIngest, OpError> {
        if audio.is_empty() {
            return Err(OpError::Validation("empty audio upload".to_string()));
        }

        let lock = self.locks.handle(session_id);
        let _guard = lock.lock().await;

        let session = self.authorize(firm_id, session_id)?;
        if !matches!(session.status, SessionStatus::Active | SessionStatus::Paused) {
            return Err(OpError::InvalidState(session.status.as_str().to_string()));
        }

        let ext = filename
            .as_deref()
            .and_then(|f| f.rsplit('.').next())
            .unwrap_or("webm");
        let key = answer_audio_key(
            session.firm_id,
            session.id,
            Utc::now().timestamp_millis(),
            question_number,
            ext,
        );
        let audio_blob_key = self
            .blob
            .put(
                &key,
                audio.clone(),
                content_type.as_deref().unwrap_or("application/octet-stream"),
            )
            .await;

        let transcript_text = match self.voice.transcribe(audio).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) | Err(_) => "(inaudible)".to_string(),
        };

        let event = self.store.append_event(NewEvent {
            session_id: session.id,
            firm_id: session.firm_id,
            event_type: EventType::Answer,
            speaker_role: SpeakerRole::Witness,
            content: transcript_text.clone(),
            question_number: (question_number > 0).then_some(question_number),
            audio_blob_key: audio_blob_key.clone(),
            duration_ms,
            metadata: serde_json::json!({
                "filename": filename,
                "content_type": content_type,
            }),
        })?;
        self.store
            .append_transcript_line(session.id, "WITNESS", &transcript_text)?;

        Ok(AnswerIngest {
            event_id: event.id,
            question_number,
            transcript_text,
            audio_blob_key,
            duration_ms,
        })
    }

    /// Objection copilot: classify an outgoing question, append a PENDING
    /// OBJECTION alert when flagged.
    pub async fn classify_question(
        &self,
        firm_id: Uuid,
        session_id: Uuid,
        question_number: i64,
        question_text: String,
    ) -> Result<ObjectionResult, OpError> {
        let lock = self.locks.handle(session_id);
        let _guard = lock.lock().await;

        let session = self.mutating_agent_session(firm_id, session_id)?;

        let result = match self
            .agents
            .dispatch(AgentRequest::Objection(ObjectionRequest {
                question_number,
                question_text: question_text.clone(),
            }))
            .await
        {
            Ok(AgentResult::Objection(result)) => result,
            _ => unreachable!("objection dispatch returns an objection result"),
        };

        if result.objectionable {
            self.raise_alert(
                &session,
                NewAlert {
                    session_id: session.id,
                    firm_id: session.firm_id,
                    alert_type: AlertType::Objection,
                    confidence: result.confidence,
                    question_number: Some(question_number),
                    current_quote: Some(question_text),
                    rule_id: result.rule_id.clone(),
                    category: result.category,
                    explanation: result.explanation.clone(),
                    prior_quote: None,
                    prior_document_page: None,
                    prior_document_line: None,
                    impeachment_risk: None,
                },
            )?;
        }
        Ok(result)
    }

    /// Sentinel: score an answer against prior sworn statements, append an
    /// INCONSISTENCY alert when flagged.
    pub async fn detect_inconsistency(
        &self,
        firm_id: Uuid,
        session_id: Uuid,
        question_number: i64,
        question_text: String,
        answer_text: String,
    ) -> Result<InconsistencyResult, OpError> {
        let lock = self.locks.handle(session_id);
        let _guard = lock.lock().await;

        let session = self.mutating_agent_session(firm_id, session_id)?;
        let case = self
            .store
            .get_case(session.firm_id, session.case_id)?
            .ok_or(OpError::NotFound)?;

        let result = match self
            .agents
            .dispatch(AgentRequest::Inconsistency(InconsistencyRequest {
                case_id: case.id,
                case_type: case.case_type,
                question_number,
                question_text,
                answer_text: answer_text.clone(),
            }))
            .await
        {
            Ok(AgentResult::Inconsistency(result)) => result,
            _ => unreachable!("inconsistency dispatch returns a detection result"),
        };

        if result.flag_found {
            self.raise_alert(
                &session,
                NewAlert {
                    session_id: session.id,
                    firm_id: session.firm_id,
                    alert_type: AlertType::Inconsistency,
                    confidence: result.confidence,
                    question_number: Some(question_number),
                    current_quote: Some(answer_text),
                    rule_id: None,
                    category: None,
                    explanation: None,
                    prior_quote: result.prior_quote.clone(),
                    prior_document_page: result.prior_document_page,
                    prior_document_line: result.prior_document_line,
                    impeachment_risk: Some(result.impeachment_risk),
                },
            )?;
        }
        Ok(result)
    }

    /// Consolidated polling snapshot for the driving client.
    pub fn live_state(&self, firm_id: Uuid, session_id: Uuid) -> Result<LiveState, OpError> {
        let session = self.authorize(firm_id, session_id)?;
        let events = self.store.list_events_chronological(session_id)?;
        let alerts = self.store.list_alerts(session_id)?;

        let current_topic = events
            .iter()
            .rev()
            .filter(|e| e.event_type == EventType::Question)
            .find_map(|e| {
                e.metadata["topic"]
                    .as_str()
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

        let started = session.started_at;
        let transcript = events
            .iter()
            .filter(|e| !e.content.is_empty())
            .filter(|e| {
                matches!(e.event_type, EventType::Question | EventType::Answer)
            })
            .map(|e| live_entry(e, started))
            .collect();
        let alerts = alerts.iter().map(live_alert).collect();

        Ok(LiveState {
            status: session.status,
            elapsed_seconds: session.elapsed_seconds(Utc::now()),
            total_seconds: session.duration_minutes * 60,
            current_topic,
            question_count: session.question_count,
            transcript,
            alerts,
            witness_connected: session.witness_joined,
            service_status: ServiceStatus {
                voice: self.voice.configured(),
                classifier: self.agents.classifier.configured(),
                retrieval: self.agents.retrieval.configured(),
            },
        })
    }

    /// One-shot abandonment sweep: flip every overdue session to ABANDONED.
    pub fn sweep_abandoned(&self, grace_minutes: i64) -> Result<usize, OpError> {
        let overdue = self.store.list_overdue_sessions(grace_minutes)?;
        let mut swept = 0;
        for session in overdue {
            match self.store.transition_abandon(session.id) {
                Ok(abandoned) => {
                    self.record_state_change(&abandoned, "ABANDONED")?;
                    self.locks.release(session.id);
                    swept += 1;
                    info!(session_id = %session.id, "🧹 Session abandoned by sweeper");
                }
                // Lost the CAS to a concurrent end; that's fine.
                Err(TransitionError::InvalidState { .. }) => {}
                Err(TransitionError::NotFound) => {}
                Err(TransitionError::Storage(e)) => return Err(OpError::Internal(e)),
            }
        }
        if swept > 0 {
            metrics::counter!("sessions_abandoned_total", swept as u64);
        }
        Ok(swept)
    }

    // ── internals ───────────────────────────────────────────────────────────

    fn authorize(&self, firm_id: Uuid, session_id: Uuid) -> Result<Session, OpError> {
        self.store
            .get_session(firm_id, session_id)?
            .ok_or(OpError::NotFound)
    }

    /// Guard for mutating agent calls: rejected in LOBBY (only the
    /// next-question path may run there) and in terminal states.
    fn mutating_agent_session(
        &self,
        firm_id: Uuid,
        session_id: Uuid,
    ) -> Result<Session, OpError> {
        let session = self.authorize(firm_id, session_id)?;
        if session.status == SessionStatus::Lobby || session.status.is_terminal() {
            return Err(OpError::InvalidState(session.status.as_str().to_string()));
        }
        Ok(session)
    }

    fn load_case_witness(&self, session: &Session) -> Result<(Case, Witness), OpError> {
        let case = self
            .store
            .get_case(session.firm_id, session.case_id)?
            .ok_or(OpError::NotFound)?;
        let witness = self
            .store
            .get_witness(session.firm_id, session.witness_id)?
            .ok_or(OpError::NotFound)?;
        Ok((case, witness))
    }

    /// Weakness dimensions scoring under 65 in the witness's latest brief.
    fn prior_weak_areas(&self, witness_id: Uuid) -> Result<Vec<String>, OpError> {
        let Some(brief) = self.store.get_latest_brief_for_witness(witness_id)? else {
            return Ok(Vec::new());
        };
        let Some(map) = brief.weakness_map else {
            return Ok(Vec::new());
        };
        let mut areas = Vec::new();
        for (name, score) in [
            ("composure", map.composure),
            ("tactical discipline", map.tactical_discipline),
            ("professionalism", map.professionalism),
            ("directness", map.directness),
            ("consistency", map.consistency),
        ] {
            if score < 65 {
                areas.push(name.to_string());
            }
        }
        Ok(areas)
    }

    fn record_state_change(&self, session: &Session, label: &str) -> Result<(), OpError> {
        self.store.append_event(NewEvent {
            session_id: session.id,
            firm_id: session.firm_id,
            event_type: EventType::StateChange,
            speaker_role: SpeakerRole::System,
            content: label.to_string(),
            question_number: None,
            audio_blob_key: None,
            duration_ms: None,
            metadata: serde_json::Value::Null,
        })?;
        Ok(())
    }

    /// Insert the alert row and its ALERT_RAISED timeline event.
    fn raise_alert(&self, session: &Session, new: NewAlert) -> Result<Alert, OpError> {
        let question_number = new.question_number;
        let label = new.alert_type.as_str().to_string();
        let alert = self.store.insert_alert(new)?;
        self.store.append_event(NewEvent {
            session_id: session.id,
            firm_id: session.firm_id,
            event_type: EventType::AlertRaised,
            speaker_role: SpeakerRole::System,
            content: label.clone(),
            question_number,
            audio_blob_key: None,
            duration_ms: None,
            metadata: serde_json::json!({ "alert_id": alert.id.to_string() }),
        })?;
        metrics::increment_counter!("alerts_raised_total", "type" => label);
        Ok(alert)
    }
}

// ── live state view ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveState {
    pub status: SessionStatus,
    pub elapsed_seconds: i64,
    pub total_seconds: i64,
    pub current_topic: String,
    pub question_count: i64,
    pub transcript: Vec<LiveTranscriptEntry>,
    pub alerts: Vec<LiveAlert>,
    pub witness_connected: bool,
    pub service_status: ServiceStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTranscriptEntry {
    pub id: Uuid,
    pub speaker: SpeakerRole,
    pub text: String,
    pub timestamp: i64,
    pub question_number: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveAlert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub severity: &'static str,
    pub question_number: Option<i64>,
    pub confidence: f64,
    pub rule_id: Option<String>,
    pub category: Option<ObjectionCategory>,
    pub prior_quote: Option<String>,
    pub prior_page_line: Option<String>,
    pub status: crate::models::AlertStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub voice: bool,
    pub classifier: bool,
    pub retrieval: bool,
}

fn live_entry(
    event: &SessionEvent,
    started_at: Option<chrono::DateTime<Utc>>,
) -> LiveTranscriptEntry {
    let timestamp = started_at
        .map(|s| (event.created_at - s).num_seconds().max(0))
        .unwrap_or(0);
    LiveTranscriptEntry {
        id: event.id,
        speaker: event.speaker_role,
        text: event.content.clone(),
        timestamp,
        question_number: event.question_number,
    }
}

fn live_alert(alert: &Alert) -> LiveAlert {
    let severity = match alert.impeachment_risk {
        Some(ImpeachmentRisk::High) => "critical",
        Some(ImpeachmentRisk::Medium) => "warning",
        _ => "info",
    };
    let prior_page_line = match (alert.prior_document_page, alert.prior_document_line) {
        (Some(page), Some(line)) => Some(format!("p.{page} l.{line}")),
        _ => None,
    };
    LiveAlert {
        id: alert.id,
        alert_type: alert.alert_type,
        severity,
        question_number: alert.question_number,
        confidence: alert.confidence,
        rule_id: alert.rule_id.clone(),
        category: alert.category,
        prior_quote: alert.prior_quote.clone(),
        prior_page_line,
        status: alert.status,
    }
}

/// Assemble the prompt-facing case profile from the three rows. Session
/// focus areas override the case-level defaults when present.
fn build_profile(case: &Case, witness: &Witness, session: &Session) -> CaseProfile {
    CaseProfile {
        case_id: case.id,
        case_name: case.case_name.clone(),
        case_type: case.case_type,
        opposing_party: if case.opposing_party.is_empty() {
            "opposing party".to_string()
        } else {
            case.opposing_party.clone()
        },
        deposition_date: case
            .deposition_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "TBD".to_string()),
        witness_name: witness.name.clone(),
        witness_role: witness.role,
        extracted_facts: case.extracted_facts.clone(),
        prior_statements: case.prior_statements.clone(),
        exhibit_list: case.exhibit_list.clone(),
        focus_areas: if session.focus_areas.is_empty() {
            case.focus_areas.clone()
        } else {
            session.focus_areas.join(", ")
        },
        aggression: session.aggression,
    }
}

fn generate_witness_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(WITNESS_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn error_frame(err: &OpError) -> (&'static str, String) {
    match err {
        OpError::NotFound => ("NOT_FOUND", "session not found".to_string()),
        OpError::InvalidState(state) => ("INVALID_STATUS", format!("session is {state}")),
        OpError::Validation(msg) => ("VALIDATION", msg.clone()),
        OpError::Upstream(msg) => ("UPSTREAM_UNAVAILABLE", msg.clone()),
        OpError::Internal(_) => ("SERVER_ERROR", "internal error".to_string()),
    }
}
