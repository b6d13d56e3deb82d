//! Coaching briefs: zero-or-one per session, soft-deleted for audit.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::models::{Brief, WeaknessMap};

use super::{now_str, read_ts, read_ts_opt, read_uuid, ts_str, Store};

impl Store {
    /// Insert the placeholder row the generation job fills in. Fails if the
    /// session already has a brief (UNIQUE on session_id).
    pub fn insert_brief_placeholder(
        &self,
        session_id: Uuid,
        firm_id: Uuid,
        witness_id: Uuid,
    ) -> Result<Brief> {
        let brief = Brief {
            id: Uuid::new_v4(),
            session_id,
            firm_id,
            witness_id,
            session_score: 0,
            consistency_rate: 0.0,
            delta_vs_baseline: None,
            confirmed_flags: 0,
            objection_count: 0,
            composure_alerts: 0,
            top_recommendations: Vec::new(),
            narrative_text: "Generating...".to_string(),
            weakness_map: None,
            pdf_blob_key: None,
            share_token: None,
            share_token_expires_at: None,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO briefs (id, session_id, firm_id, witness_id, narrative_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                brief.id.to_string(),
                brief.session_id.to_string(),
                brief.firm_id.to_string(),
                brief.witness_id.to_string(),
                brief.narrative_text,
                ts_str(brief.created_at),
            ],
        )
        .context("Failed to insert brief placeholder")?;
        Ok(brief)
    }

    pub fn get_brief(&self, firm_id: Uuid, brief_id: Uuid) -> Result<Option<Brief>> {
        let conn = self.conn.lock();
        let brief = conn
            .query_row(
                &format!("{SELECT_BRIEF} WHERE id = ?1 AND firm_id = ?2 AND deleted_at IS NULL"),
                params![brief_id.to_string(), firm_id.to_string()],
                map_brief,
            )
            .optional()?;
        Ok(brief)
    }

    pub fn get_brief_by_session(&self, session_id: Uuid) -> Result<Option<Brief>> {
        let conn = self.conn.lock();
        let brief = conn
            .query_row(
                &format!("{SELECT_BRIEF} WHERE session_id = ?1 AND deleted_at IS NULL"),
                params![session_id.to_string()],
                map_brief,
            )
            .optional()?;
        Ok(brief)
    }

    pub fn get_brief_by_share_token(&self, token: &str) -> Result<Option<Brief>> {
        let conn = self.conn.lock();
        let brief = conn
            .query_row(
                &format!("{SELECT_BRIEF} WHERE share_token = ?1 AND deleted_at IS NULL"),
                params![token],
                map_brief,
            )
            .optional()?;
        Ok(brief)
    }

    /// Most recent brief for a witness; feeds prior-weak-area hints into the
    /// next session's Interrogator prompt.
    pub fn get_latest_brief_for_witness(&self, witness_id: Uuid) -> Result<Option<Brief>> {
        let conn = self.conn.lock();
        let brief = conn
            .query_row(
                &format!(
                    "{SELECT_BRIEF} WHERE witness_id = ?1 AND deleted_at IS NULL
                     ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![witness_id.to_string()],
                map_brief,
            )
            .optional()?;
        Ok(brief)
    }

    /// Write the generation results over the placeholder.
    #[allow(clippy::too_many_arguments)]
    pub fn update_brief_results(
        &self,
        brief_id: Uuid,
        session_score: i64,
        consistency_rate: f64,
        delta_vs_baseline: Option<i64>,
        confirmed_flags: i64,
        objection_count: i64,
        composure_alerts: i64,
        top_recommendations: &[String],
        narrative_text: &str,
        weakness_map: Option<WeaknessMap>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE briefs SET session_score = ?2, consistency_rate = ?3, delta_vs_baseline = ?4,
                 confirmed_flags = ?5, objection_count = ?6, composure_alerts = ?7,
                 top_recommendations = ?8, narrative_text = ?9, weakness_map = ?10
             WHERE id = ?1",
            params![
                brief_id.to_string(),
                session_score,
                consistency_rate,
                delta_vs_baseline,
                confirmed_flags,
                objection_count,
                composure_alerts,
                serde_json::to_string(top_recommendations)?,
                narrative_text,
                weakness_map
                    .map(|m| serde_json::to_string(&m))
                    .transpose()?,
            ],
        )
        .context("Failed to update brief results")?;
        Ok(())
    }

    /// A failed generation leaves a definite outcome, never a deleted row.
    pub fn mark_brief_failed(&self, brief_id: Uuid, reason: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE briefs SET narrative_text = ?2 WHERE id = ?1",
            params![brief_id.to_string(), format!("Generation failed: {reason}")],
        )?;
        Ok(())
    }

    pub fn set_brief_pdf_key(&self, brief_id: Uuid, pdf_blob_key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE briefs SET pdf_blob_key = ?2 WHERE id = ?1",
            params![brief_id.to_string(), pdf_blob_key],
        )?;
        Ok(())
    }

    pub fn set_brief_share_token(
        &self,
        brief_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE briefs SET share_token = ?2, share_token_expires_at = ?3 WHERE id = ?1",
            params![brief_id.to_string(), token, ts_str(expires_at)],
        )?;
        Ok(())
    }

    /// Soft delete. The row survives for audit history.
    pub fn soft_delete_brief(&self, brief_id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE briefs SET deleted_at = ?2 WHERE id = ?1",
            params![brief_id.to_string(), now_str()],
        )?;
        Ok(())
    }
}

const SELECT_BRIEF: &str = "SELECT id, session_id, firm_id, witness_id, session_score,
        consistency_rate, delta_vs_baseline, confirmed_flags, objection_count, composure_alerts,
        top_recommendations, narrative_text, weakness_map, pdf_blob_key, share_token,
        share_token_expires_at, created_at
 FROM briefs";

fn map_brief(row: &rusqlite::Row<'_>) -> rusqlite::Result<Brief> {
    let recommendations: String = row.get(10)?;
    let weakness: Option<String> = row.get(12)?;
    Ok(Brief {
        id: read_uuid(row, 0)?,
        session_id: read_uuid(row, 1)?,
        firm_id: read_uuid(row, 2)?,
        witness_id: read_uuid(row, 3)?,
        session_score: row.get(4)?,
        consistency_rate: row.get(5)?,
        delta_vs_baseline: row.get(6)?,
        confirmed_flags: row.get(7)?,
        objection_count: row.get(8)?,
        composure_alerts: row.get(9)?,
        top_recommendations: serde_json::from_str(&recommendations).unwrap_or_default(),
        narrative_text: row.get(11)?,
        weakness_map: weakness.as_deref().and_then(|w| serde_json::from_str(w).ok()),
        pdf_blob_key: row.get(13)?,
        share_token: row.get(14)?,
        share_token_expires_at: read_ts_opt(row, 15)?,
        created_at: read_ts(row, 16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sessions::tests::seeded_session;

    #[test]
    fn test_one_brief_per_session() {
        let store = Store::open_in_memory().unwrap();
        let session = seeded_session(&store);

        store
            .insert_brief_placeholder(session.id, session.firm_id, session.witness_id)
            .unwrap();
        // UNIQUE(session_id) rejects a second placeholder
        assert!(store
            .insert_brief_placeholder(session.id, session.firm_id, session.witness_id)
            .is_err());
    }

    #[test]
    fn test_results_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let session = seeded_session(&store);
        let brief = store
            .insert_brief_placeholder(session.id, session.firm_id, session.witness_id)
            .unwrap();

        let map = WeaknessMap {
            composure: 72,
            tactical_discipline: 64,
            professionalism: 88,
            directness: 55,
            consistency: 70,
        };
        store
            .update_brief_results(
                brief.id,
                68,
                0.82,
                Some(6),
                2,
                1,
                0,
                &[
                    "Keep answers under ten words".to_string(),
                    "Stop hedging on timelines".to_string(),
                    "Review exhibit 4 before next session".to_string(),
                ],
                "Solid session with one recurring weakness.",
                Some(map),
            )
            .unwrap();

        let loaded = store.get_brief(session.firm_id, brief.id).unwrap().unwrap();
        assert_eq!(loaded.session_score, 68);
        assert_eq!(loaded.top_recommendations.len(), 3);
        assert_eq!(loaded.weakness_map.unwrap().professionalism, 88);
        assert_eq!(loaded.delta_vs_baseline, Some(6));
    }

    #[test]
    fn test_share_token_lookup_and_soft_delete() {
        let store = Store::open_in_memory().unwrap();
        let session = seeded_session(&store);
        let brief = store
            .insert_brief_placeholder(session.id, session.firm_id, session.witness_id)
            .unwrap();

        let expires = Utc::now() + chrono::Duration::days(7);
        store
            .set_brief_share_token(brief.id, "sharetoken1234567890abcd", expires)
            .unwrap();

        let found = store
            .get_brief_by_share_token("sharetoken1234567890abcd")
            .unwrap();
        assert!(found.is_some());

        store.soft_delete_brief(brief.id).unwrap();
        assert!(store
            .get_brief_by_share_token("sharetoken1234567890abcd")
            .unwrap()
            .is_none());
        assert!(store.get_brief(session.firm_id, brief.id).unwrap().is_none());
    }

    #[test]
    fn test_failed_generation_leaves_definite_outcome() {
        let store = Store::open_in_memory().unwrap();
        let session = seeded_session(&store);
        let brief = store
            .insert_brief_placeholder(session.id, session.firm_id, session.witness_id)
            .unwrap();

        store.mark_brief_failed(brief.id, "reviewer unavailable").unwrap();
        let loaded = store.get_brief(session.firm_id, brief.id).unwrap().unwrap();
        assert_eq!(loaded.narrative_text, "Generation failed: reviewer unavailable");
    }
}
