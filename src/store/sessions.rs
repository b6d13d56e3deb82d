//! Session records and guarded status transitions.
//!
//! Every transition is a compare-and-set on `status` so two orchestrator
//! replicas can never drive the same session: the UPDATE names the expected
//! source states and loses cleanly when another writer got there first.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Aggression, Session, SessionStatus};

use super::{now_str, read_ts, read_ts_opt, read_uuid, read_uuid_opt, ts_str, Store};

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("session not found")]
    NotFound,
    #[error("invalid transition from {from}")]
    InvalidState { from: &'static str },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct NewSession {
    pub case_id: Uuid,
    pub witness_id: Uuid,
    pub firm_id: Uuid,
    pub attorney_id: Option<Uuid>,
    pub session_number: i64,
    pub duration_minutes: i64,
    pub aggression: Aggression,
    pub focus_areas: Vec<String>,
    pub objection_copilot_enabled: bool,
    pub sentinel_enabled: bool,
    pub witness_token: String,
}

impl Store {
    pub fn insert_session(&self, new: NewSession) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            case_id: new.case_id,
            witness_id: new.witness_id,
            firm_id: new.firm_id,
            attorney_id: new.attorney_id,
            session_number: new.session_number,
            status: SessionStatus::Lobby,
            duration_minutes: new.duration_minutes,
            aggression: new.aggression,
            focus_areas: new.focus_areas,
            objection_copilot_enabled: new.objection_copilot_enabled,
            sentinel_enabled: new.sentinel_enabled,
            witness_token: Some(new.witness_token),
            witness_joined: false,
            started_at: None,
            paused_at: None,
            ended_at: None,
            total_pause_ms: 0,
            question_count: 0,
            session_score: None,
            consistency_rate: None,
            transcript_raw: None,
            retrieval_namespace: None,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (id, case_id, witness_id, firm_id, attorney_id, session_number,
                 status, duration_minutes, aggression, focus_areas, objection_copilot_enabled,
                 sentinel_enabled, witness_token, witness_joined, total_pause_ms, question_count,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'LOBBY', ?7, ?8, ?9, ?10, ?11, ?12, 0, 0, 0, ?13, ?13)",
            params![
                session.id.to_string(),
                session.case_id.to_string(),
                session.witness_id.to_string(),
                session.firm_id.to_string(),
                session.attorney_id.map(|id| id.to_string()),
                session.session_number,
                session.duration_minutes,
                session.aggression.as_str(),
                serde_json::to_string(&session.focus_areas)?,
                session.objection_copilot_enabled as i64,
                session.sentinel_enabled as i64,
                session.witness_token,
                ts_str(now),
            ],
        )
        .context("Failed to insert session")?;
        Ok(session)
    }

    /// Tenant-filtered session lookup.
    pub fn get_session(&self, firm_id: Uuid, session_id: Uuid) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let session = conn
            .query_row(
                &format!("{SELECT_SESSION} WHERE id = ?1 AND firm_id = ?2"),
                params![session_id.to_string(), firm_id.to_string()],
                map_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Unscoped lookup for internal jobs (sweeper, brief generator).
    pub fn get_session_unscoped(&self, session_id: Uuid) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let session = conn
            .query_row(
                &format!("{SELECT_SESSION} WHERE id = ?1"),
                params![session_id.to_string()],
                map_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Witness-side lookup by join token (no firm scope: the token is the
    /// credential).
    pub fn get_session_by_witness_token(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let session = conn
            .query_row(
                &format!("{SELECT_SESSION} WHERE witness_token = ?1"),
                params![token],
                map_session,
            )
            .optional()?;
        Ok(session)
    }

    pub fn count_sessions_for_witness(&self, witness_id: Uuid) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE witness_id = ?1",
            params![witness_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// LOBBY → ACTIVE. Also stamps `started_at`, which must be unset.
    pub fn transition_start(&self, session_id: Uuid) -> Result<Session, TransitionError> {
        let now = now_str();
        self.cas_transition(
            session_id,
            "UPDATE sessions SET status = 'ACTIVE', started_at = ?2, updated_at = ?2
             WHERE id = ?1 AND status = 'LOBBY' AND started_at IS NULL",
            &now,
        )
    }

    /// ACTIVE → PAUSED.
    pub fn transition_pause(&self, session_id: Uuid) -> Result<Session, TransitionError> {
        let now = now_str();
        self.cas_transition(
            session_id,
            "UPDATE sessions SET status = 'PAUSED', paused_at = ?2, updated_at = ?2
             WHERE id = ?1 AND status = 'ACTIVE'",
            &now,
        )
    }

    /// PAUSED → ACTIVE, folding the pause interval into `total_pause_ms`.
    pub fn transition_resume(&self, session_id: Uuid) -> Result<Session, TransitionError> {
        let now = Utc::now();
        {
            let conn = self.conn.lock();
            let paused_at: Option<Option<String>> = conn
                .query_row(
                    "SELECT paused_at FROM sessions WHERE id = ?1 AND status = 'PAUSED'",
                    params![session_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| TransitionError::Storage(e.into()))?;
            let Some(paused_at) = paused_at else {
                drop(conn);
                return Err(self.classify_failed_transition(session_id));
            };

            let pause_ms = paused_at
                .as_deref()
                .and_then(super::parse_ts)
                .map(|p| (now - p).num_milliseconds().max(0))
                .unwrap_or(0);

            let updated = conn
                .execute(
                    "UPDATE sessions SET status = 'ACTIVE', paused_at = NULL,
                         total_pause_ms = total_pause_ms + ?2, updated_at = ?3
                     WHERE id = ?1 AND status = 'PAUSED'",
                    params![session_id.to_string(), pause_ms, ts_str(now)],
                )
                .map_err(|e| TransitionError::Storage(e.into()))?;
            if updated == 0 {
                drop(conn);
                return Err(self.classify_failed_transition(session_id));
            }
        }
        self.reload_after_transition(session_id)
    }

    /// ACTIVE ∨ PAUSED → COMPLETE. Stamps `ended_at`.
    pub fn transition_end(&self, session_id: Uuid) -> Result<Session, TransitionError> {
        let now = now_str();
        self.cas_transition(
            session_id,
            "UPDATE sessions SET status = 'COMPLETE', ended_at = ?2, updated_at = ?2
             WHERE id = ?1 AND status IN ('ACTIVE', 'PAUSED')",
            &now,
        )
    }

    /// Any non-terminal → ABANDONED. Used by the background sweeper.
    pub fn transition_abandon(&self, session_id: Uuid) -> Result<Session, TransitionError> {
        let now = now_str();
        self.cas_transition(
            session_id,
            "UPDATE sessions SET status = 'ABANDONED', ended_at = ?2, updated_at = ?2
             WHERE id = ?1 AND status IN ('LOBBY', 'ACTIVE', 'PAUSED')",
            &now,
        )
    }

    fn cas_transition(
        &self,
        session_id: Uuid,
        sql: &str,
        now: &str,
    ) -> Result<Session, TransitionError> {
        let updated = {
            let conn = self.conn.lock();
            conn.execute(sql, params![session_id.to_string(), now])
                .map_err(|e| TransitionError::Storage(e.into()))?
        };
        if updated == 0 {
            return Err(self.classify_failed_transition(session_id));
        }
        self.reload_after_transition(session_id)
    }

    fn classify_failed_transition(&self, session_id: Uuid) -> TransitionError {
        match self.get_session_unscoped(session_id) {
            Ok(Some(session)) => TransitionError::InvalidState {
                from: session.status.as_str(),
            },
            Ok(None) => TransitionError::NotFound,
            Err(e) => TransitionError::Storage(e),
        }
    }

    fn reload_after_transition(&self, session_id: Uuid) -> Result<Session, TransitionError> {
        self.get_session_unscoped(session_id)
            .map_err(TransitionError::Storage)?
            .ok_or(TransitionError::NotFound)
    }

    /// Monotonic bump: question_count only ever grows, and only from the
    /// next-question path after the question event write succeeded.
    pub fn bump_question_count(&self, session_id: Uuid, question_number: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions SET question_count = MAX(question_count, ?2), updated_at = ?3
             WHERE id = ?1",
            params![session_id.to_string(), question_number, now_str()],
        )?;
        let count: i64 = conn.query_row(
            "SELECT question_count FROM sessions WHERE id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Append one `[SPEAKER]: text` line to the running transcript cache.
    pub fn append_transcript_line(&self, session_id: Uuid, speaker: &str, content: &str) -> Result<()> {
        let line = format!("[{speaker}]: {content}");
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions
             SET transcript_raw = CASE
                     WHEN transcript_raw IS NULL OR transcript_raw = '' THEN ?2
                     ELSE transcript_raw || char(10) || ?2
                 END,
                 updated_at = ?3
             WHERE id = ?1",
            params![session_id.to_string(), line.trim(), now_str()],
        )?;
        Ok(())
    }

    pub fn set_witness_joined(&self, session_id: Uuid, joined: bool) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions SET witness_joined = ?2, updated_at = ?3 WHERE id = ?1",
            params![session_id.to_string(), joined as i64, now_str()],
        )?;
        Ok(())
    }

    pub fn set_session_scores(
        &self,
        session_id: Uuid,
        session_score: i64,
        consistency_rate: f64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions SET session_score = ?2, consistency_rate = ?3, updated_at = ?4
             WHERE id = ?1",
            params![
                session_id.to_string(),
                session_score,
                consistency_rate,
                now_str()
            ],
        )?;
        Ok(())
    }

    /// Sessions whose live budget (duration + grace, minus accumulated
    /// pause) is exhausted. LOBBY sessions idle past the grace window also
    /// qualify. Candidates for the abandonment sweep.
    pub fn list_overdue_sessions(&self, grace_minutes: i64) -> Result<Vec<Session>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_SESSION} WHERE status IN ('LOBBY', 'ACTIVE', 'PAUSED')"
        ))?;
        let sessions = stmt
            .query_map([], map_session)?
            .collect::<Result<Vec<_>, _>>()?;

        let now = Utc::now();
        Ok(sessions
            .into_iter()
            .filter(|s| match s.started_at {
                Some(_) => {
                    let budget_secs = (s.duration_minutes + grace_minutes) * 60;
                    s.elapsed_seconds(now) > budget_secs
                }
                // Never started: stale once creation is past budget + grace.
                None => (now - s.created_at).num_minutes() > s.duration_minutes + grace_minutes,
            })
            .collect())
    }
}

const SELECT_SESSION: &str = "SELECT id, case_id, witness_id, firm_id, attorney_id, session_number,
        status, duration_minutes, aggression, focus_areas, objection_copilot_enabled,
        sentinel_enabled, witness_token, witness_joined, started_at, paused_at, ended_at,
        total_pause_ms, question_count, session_score, consistency_rate, transcript_raw,
        retrieval_namespace, created_at, updated_at
 FROM sessions";

fn map_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(6)?;
    let aggression: String = row.get(8)?;
    let focus_areas: String = row.get(9)?;
    Ok(Session {
        id: read_uuid(row, 0)?,
        case_id: read_uuid(row, 1)?,
        witness_id: read_uuid(row, 2)?,
        firm_id: read_uuid(row, 3)?,
        attorney_id: read_uuid_opt(row, 4)?,
        session_number: row.get(5)?,
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Lobby),
        duration_minutes: row.get(7)?,
        aggression: Aggression::parse(&aggression).unwrap_or(Aggression::Standard),
        focus_areas: serde_json::from_str(&focus_areas).unwrap_or_default(),
        objection_copilot_enabled: row.get::<_, i64>(10)? != 0,
        sentinel_enabled: row.get::<_, i64>(11)? != 0,
        witness_token: row.get(12)?,
        witness_joined: row.get::<_, i64>(13)? != 0,
        started_at: read_ts_opt(row, 14)?,
        paused_at: read_ts_opt(row, 15)?,
        ended_at: read_ts_opt(row, 16)?,
        total_pause_ms: row.get(17)?,
        question_count: row.get(18)?,
        session_score: row.get(19)?,
        consistency_rate: row.get(20)?,
        transcript_raw: row.get(21)?,
        retrieval_namespace: row.get(22)?,
        created_at: read_ts(row, 23)?,
        updated_at: read_ts(row, 24)?,
    })
}
