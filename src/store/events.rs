//! Append-only session events and derived alerts.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::models::{
    Alert, AlertStatus, AlertType, EventType, ImpeachmentRisk, ObjectionCategory, SessionEvent,
    SpeakerRole,
};

use super::{read_ts, read_uuid, ts_str, Store};

pub struct NewEvent {
    pub session_id: Uuid,
    pub firm_id: Uuid,
    pub event_type: EventType,
    pub speaker_role: SpeakerRole,
    pub content: String,
    pub question_number: Option<i64>,
    pub audio_blob_key: Option<String>,
    pub duration_ms: Option<i64>,
    pub metadata: serde_json::Value,
}

pub struct NewAlert {
    pub session_id: Uuid,
    pub firm_id: Uuid,
    pub alert_type: AlertType,
    pub confidence: f64,
    pub question_number: Option<i64>,
    pub current_quote: Option<String>,
    pub rule_id: Option<String>,
    pub category: Option<ObjectionCategory>,
    pub explanation: Option<String>,
    pub prior_quote: Option<String>,
    pub prior_document_page: Option<i64>,
    pub prior_document_line: Option<i64>,
    pub impeachment_risk: Option<ImpeachmentRisk>,
}

impl Store {
    pub fn append_event(&self, new: NewEvent) -> Result<SessionEvent> {
        let event = SessionEvent {
            id: Uuid::new_v4(),
            session_id: new.session_id,
            firm_id: new.firm_id,
            event_type: new.event_type,
            speaker_role: new.speaker_role,
            content: new.content,
            question_number: new.question_number,
            audio_blob_key: new.audio_blob_key,
            duration_ms: new.duration_ms,
            metadata: new.metadata,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO session_events (id, session_id, firm_id, event_type, speaker_role,
                 content, question_number, audio_blob_key, duration_ms, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                event.id.to_string(),
                event.session_id.to_string(),
                event.firm_id.to_string(),
                event.event_type.as_str(),
                event.speaker_role.as_str(),
                event.content,
                event.question_number,
                event.audio_blob_key,
                event.duration_ms,
                serde_json::to_string(&event.metadata)?,
                ts_str(event.created_at),
            ],
        )
        .context("Failed to append session event")?;
        Ok(event)
    }

    /// Canonical total order: (question_number, created_at), with events
    /// that carry no question number sorting first. Insertion order breaks
    /// the remaining ties.
    pub fn list_events(&self, session_id: Uuid) -> Result<Vec<SessionEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_EVENT} WHERE session_id = ?1
             ORDER BY COALESCE(question_number, 0), created_at, rowid"
        ))?;
        let events = stmt
            .query_map(params![session_id.to_string()], map_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Observation order, for the live transcript.
    pub fn list_events_chronological(&self, session_id: Uuid) -> Result<Vec<SessionEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_EVENT} WHERE session_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let events = stmt
            .query_map(params![session_id.to_string()], map_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn count_events(&self, session_id: Uuid, event_type: EventType) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM session_events WHERE session_id = ?1 AND event_type = ?2",
            params![session_id.to_string(), event_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn insert_alert(&self, new: NewAlert) -> Result<Alert> {
        let alert = Alert {
            id: Uuid::new_v4(),
            session_id: new.session_id,
            firm_id: new.firm_id,
            alert_type: new.alert_type,
            status: AlertStatus::Pending,
            confidence: new.confidence,
            question_number: new.question_number,
            current_quote: new.current_quote,
            rule_id: new.rule_id,
            category: new.category,
            explanation: new.explanation,
            prior_quote: new.prior_quote,
            prior_document_page: new.prior_document_page,
            prior_document_line: new.prior_document_line,
            impeachment_risk: new.impeachment_risk,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO alerts (id, session_id, firm_id, alert_type, status, confidence,
                 question_number, current_quote, rule_id, category, explanation, prior_quote,
                 prior_document_page, prior_document_line, impeachment_risk, created_at)
             VALUES (?1, ?2, ?3, ?4, 'PENDING', ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                alert.id.to_string(),
                alert.session_id.to_string(),
                alert.firm_id.to_string(),
                alert.alert_type.as_str(),
                alert.confidence,
                alert.question_number,
                alert.current_quote,
                alert.rule_id,
                alert.category.map(|c| c.as_str()),
                alert.explanation,
                alert.prior_quote,
                alert.prior_document_page,
                alert.prior_document_line,
                alert.impeachment_risk.map(|r| r.as_str()),
                ts_str(alert.created_at),
            ],
        )
        .context("Failed to insert alert")?;
        Ok(alert)
    }

    pub fn list_alerts(&self, session_id: Uuid) -> Result<Vec<Alert>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, firm_id, alert_type, status, confidence, question_number,
                    current_quote, rule_id, category, explanation, prior_quote,
                    prior_document_page, prior_document_line, impeachment_risk, created_at
             FROM alerts WHERE session_id = ?1 ORDER BY created_at, rowid",
        )?;
        let alerts = stmt
            .query_map(params![session_id.to_string()], map_alert)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    pub fn count_alerts(&self, session_id: Uuid, alert_type: AlertType) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE session_id = ?1 AND alert_type = ?2",
            params![session_id.to_string(), alert_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

const SELECT_EVENT: &str = "SELECT id, session_id, firm_id, event_type, speaker_role, content,
        question_number, audio_blob_key, duration_ms, metadata, created_at
 FROM session_events";

fn map_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionEvent> {
    let event_type: String = row.get(3)?;
    let speaker: String = row.get(4)?;
    let metadata: String = row.get(9)?;
    Ok(SessionEvent {
        id: read_uuid(row, 0)?,
        session_id: read_uuid(row, 1)?,
        firm_id: read_uuid(row, 2)?,
        event_type: EventType::parse(&event_type).unwrap_or(EventType::StateChange),
        speaker_role: SpeakerRole::parse(&speaker).unwrap_or(SpeakerRole::System),
        content: row.get(5)?,
        question_number: row.get(6)?,
        audio_blob_key: row.get(7)?,
        duration_ms: row.get(8)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: read_ts(row, 10)?,
    })
}

fn map_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    let alert_type: String = row.get(3)?;
    let status: String = row.get(4)?;
    let category: Option<String> = row.get(9)?;
    let risk: Option<String> = row.get(14)?;
    Ok(Alert {
        id: read_uuid(row, 0)?,
        session_id: read_uuid(row, 1)?,
        firm_id: read_uuid(row, 2)?,
        alert_type: AlertType::parse(&alert_type).unwrap_or(AlertType::Composure),
        status: AlertStatus::parse(&status).unwrap_or(AlertStatus::Pending),
        confidence: row.get(5)?,
        question_number: row.get(6)?,
        current_quote: row.get(7)?,
        rule_id: row.get(8)?,
        category: category.as_deref().and_then(ObjectionCategory::parse),
        explanation: row.get(10)?,
        prior_quote: row.get(11)?,
        prior_document_page: row.get(12)?,
        prior_document_line: row.get(13)?,
        impeachment_risk: risk.as_deref().and_then(ImpeachmentRisk::parse),
        created_at: read_ts(row, 15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sessions::tests::seeded_session;

    fn question_event(session_id: Uuid, firm_id: Uuid, n: i64, text: &str) -> NewEvent {
        NewEvent {
            session_id,
            firm_id,
            event_type: EventType::Question,
            speaker_role: SpeakerRole::Interrogator,
            content: text.to_string(),
            question_number: Some(n),
            audio_blob_key: None,
            duration_ms: None,
            metadata: serde_json::json!({"topic": "revenue fraud"}),
        }
    }

    #[test]
    fn test_events_keep_append_order_within_question() {
        let store = Store::open_in_memory().unwrap();
        let session = seeded_session(&store);

        store
            .append_event(question_event(session.id, session.firm_id, 1, "Q1"))
            .unwrap();
        store
            .append_event(NewEvent {
                session_id: session.id,
                firm_id: session.firm_id,
                event_type: EventType::Answer,
                speaker_role: SpeakerRole::Witness,
                content: "A1".to_string(),
                question_number: Some(1),
                audio_blob_key: None,
                duration_ms: Some(2100),
                metadata: serde_json::Value::Null,
            })
            .unwrap();
        store
            .append_event(question_event(session.id, session.firm_id, 2, "Q2"))
            .unwrap();

        let events = store.list_events(session.id).unwrap();
        let contents: Vec<&str> = events.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["Q1", "A1", "Q2"]);

        // question_number values on QUESTION events form a contiguous prefix
        let numbers: Vec<i64> = events
            .iter()
            .filter(|e| e.event_type == EventType::Question)
            .filter_map(|e| e.question_number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_alert_round_trip_with_objection_fields() {
        let store = Store::open_in_memory().unwrap();
        let session = seeded_session(&store);

        store
            .insert_alert(NewAlert {
                session_id: session.id,
                firm_id: session.firm_id,
                alert_type: AlertType::Objection,
                confidence: 0.88,
                question_number: Some(1),
                current_quote: Some("Did you do X and also Y?".to_string()),
                rule_id: Some("FRE-611".to_string()),
                category: Some(ObjectionCategory::Compound),
                explanation: Some("two distinct facts in one question".to_string()),
                prior_quote: None,
                prior_document_page: None,
                prior_document_line: None,
                impeachment_risk: None,
            })
            .unwrap();

        let alerts = store.list_alerts(session.id).unwrap();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.alert_type, AlertType::Objection);
        assert_eq!(alert.status, AlertStatus::Pending);
        assert_eq!(alert.category, Some(ObjectionCategory::Compound));
        assert_eq!(alert.rule_id.as_deref(), Some("FRE-611"));
        assert_eq!(store.count_alerts(session.id, AlertType::Objection).unwrap(), 1);
    }

    #[test]
    fn test_inconsistency_alert_fields() {
        let store = Store::open_in_memory().unwrap();
        let session = seeded_session(&store);

        store
            .insert_alert(NewAlert {
                session_id: session.id,
                firm_id: session.firm_id,
                alert_type: AlertType::Inconsistency,
                confidence: 0.81,
                question_number: Some(3),
                current_quote: Some("I never reviewed the reports.".to_string()),
                rule_id: None,
                category: None,
                explanation: None,
                prior_quote: Some("I was fully involved in reviewing.".to_string()),
                prior_document_page: Some(14),
                prior_document_line: Some(3),
                impeachment_risk: Some(ImpeachmentRisk::High),
            })
            .unwrap();

        let alert = &store.list_alerts(session.id).unwrap()[0];
        assert_eq!(alert.impeachment_risk, Some(ImpeachmentRisk::High));
        assert_eq!(alert.prior_document_page, Some(14));
    }

    #[test]
    fn test_event_counts_by_type() {
        let store = Store::open_in_memory().unwrap();
        let session = seeded_session(&store);
        for n in 1..=3 {
            store
                .append_event(question_event(session.id, session.firm_id, n, "q"))
                .unwrap();
        }
        assert_eq!(store.count_events(session.id, EventType::Question).unwrap(), 3);
        assert_eq!(store.count_events(session.id, EventType::Answer).unwrap(), 0);
    }
}
