//! Brief Generator
//! Mission: Turn a finished session's event log into a stored coaching brief
//!
//! Runs asynchronously after `end_session` (or on explicit trigger). Reads
//! the full ordered event log, runs the Review agent (heuristic fallback
//! inside), updates witness progression, and renders narration audio and a
//! PDF best-effort. A failed run marks the brief row "Generation failed: …"
//! so the attorney always sees a definite outcome.

pub mod pdf;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::reviewer::{AlertSummary, TranscriptEntry};
use crate::agents::{AgentRequest, AgentResult, Agents, BriefOutcome, BriefRequest};
use crate::blob::{brief_audio_key, brief_pdf_key, BlobStore};
use crate::clients::VoiceClient;
use crate::models::{Brief, EventType, Session, SpeakerRole};
use crate::orchestrator::BriefJob;
use crate::store::Store;

#[derive(Clone)]
pub struct BriefGenerator {
    pub store: Store,
    pub agents: Agents,
    pub voice: VoiceClient,
    pub blob: BlobStore,
}

/// Consume brief jobs until the channel closes.
pub fn spawn_worker(
    generator: BriefGenerator,
    mut rx: mpsc::UnboundedReceiver<BriefJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("📝 Brief worker started");
        while let Some(job) = rx.recv().await {
            match generator.generate_for_session(job.session_id).await {
                Ok(brief) => info!(
                    session_id = %job.session_id,
                    brief_id = %brief.id,
                    score = brief.session_score,
                    "✅ Brief generated"
                ),
                Err(e) => error!(
                    session_id = %job.session_id,
                    error = %e,
                    "Brief generation failed"
                ),
            }
        }
        info!("📝 Brief worker stopped");
    })
}

impl BriefGenerator {
    /// Generate (or return the existing) brief for one session. Idempotent:
    /// at-least-once job delivery only ever yields one brief row.
    pub async fn generate_for_session(&self, session_id: Uuid) -> Result<Brief> {
        let (session, brief, created) = self.ensure_placeholder(session_id)?;
        if !created {
            return Ok(brief);
        }
        self.fill(&session, &brief).await
    }

    /// Return the session plus its brief row, inserting the placeholder when
    /// none exists yet. The flag tells the caller whether generation still
    /// has to run.
    pub fn ensure_placeholder(&self, session_id: Uuid) -> Result<(Session, Brief, bool)> {
        let session = self
            .store
            .get_session_unscoped(session_id)?
            .context("session not found")?;

        if let Some(existing) = self.store.get_brief_by_session(session_id)? {
            return Ok((session, existing, false));
        }
        let brief = self
            .store
            .insert_brief_placeholder(session.id, session.firm_id, session.witness_id)?;
        Ok((session, brief, true))
    }

    /// Run the pipeline over an existing placeholder, recording failure as a
    /// definite outcome on the row.
    pub async fn fill(&self, session: &Session, brief: &Brief) -> Result<Brief> {
        if let Err(e) = self.run_pipeline(session, brief).await {
            warn!(brief_id = %brief.id, error = %e, "marking brief as failed");
            self.store.mark_brief_failed(brief.id, &e.to_string())?;
        }
        self.store
            .get_brief_by_session(session.id)?
            .context("brief row disappeared")
    }

    async fn run_pipeline(&self, session: &Session, brief: &Brief) -> Result<()> {
        let (transcript, alerts) = self.load_review_inputs(session)?;
        let case = self
            .store
            .get_case(session.firm_id, session.case_id)?
            .context("case not found")?;
        let witness = self
            .store
            .get_witness(session.firm_id, session.witness_id)?
            .context("witness not found")?;

        let outcome = match self
            .agents
            .dispatch(AgentRequest::Brief(BriefRequest {
                transcript,
                alerts,
                case_type: case.case_type,
                witness_role: witness.role,
                aggression: session.aggression,
                duration_minutes: session.duration_minutes,
                question_count: session.question_count,
            }))
            .await
        {
            Ok(AgentResult::Brief(outcome)) => outcome,
            _ => unreachable!("brief dispatch returns a brief outcome"),
        };

        // Witness progression: baseline on first completed session, delta
        // afterwards.
        let delta = self
            .store
            .record_witness_score(witness.id, outcome.session_score)?;
        self.store
            .set_session_scores(session.id, outcome.session_score, outcome.consistency_rate)?;
        self.store.update_brief_results(
            brief.id,
            outcome.session_score,
            outcome.consistency_rate,
            delta,
            outcome.confirmed_flags,
            outcome.objection_count,
            outcome.composure_alerts,
            &outcome.top_recommendations,
            &outcome.narrative_text,
            Some(outcome.weakness_map),
        )?;

        // Narration and PDF are best-effort: their failure never fails the
        // brief.
        self.render_narration(session, brief, &outcome).await;
        self.render_pdf(session, brief, &outcome, &case.case_name, &witness.name)
            .await;

        Ok(())
    }

    /// Ordered transcript + alert summaries. Falls back to parsing the raw
    /// transcript cache when the event log is empty.
    fn load_review_inputs(
        &self,
        session: &Session,
    ) -> Result<(Vec<TranscriptEntry>, Vec<AlertSummary>)> {
        let events = self.store.list_events(session.id)?;
        let mut transcript: Vec<TranscriptEntry> = events
            .iter()
            .filter(|e| matches!(e.event_type, EventType::Question | EventType::Answer))
            .filter(|e| !e.content.is_empty())
            .map(|e| TranscriptEntry {
                speaker: e.speaker_role,
                content: e.content.clone(),
            })
            .collect();

        if transcript.is_empty() {
            if let Some(raw) = &session.transcript_raw {
                transcript = parse_raw_transcript(raw);
            }
        }

        let alerts = self
            .store
            .list_alerts(session.id)?
            .into_iter()
            .map(|a| AlertSummary {
                alert_type: a.alert_type,
                status: a.status,
                confidence: a.confidence,
                prior_quote: a.prior_quote,
            })
            .collect();

        Ok((transcript, alerts))
    }

    async fn render_narration(&self, session: &Session, brief: &Brief, outcome: &BriefOutcome) {
        if !self.voice.configured() {
            return;
        }
        let narration = format!(
            "Session complete. Your overall score is {} out of 100. {}",
            outcome.session_score, outcome.narrative_text
        );
        let voice_id = self.voice.coach_voice_id.clone();
        match self.voice.synthesize(&narration, &voice_id).await {
            Ok(audio) if !audio.is_empty() => {
                let key = brief_audio_key(session.firm_id, brief.id);
                self.blob.put(&key, audio, "audio/mpeg").await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "coach narration synthesis failed"),
        }
    }

    async fn render_pdf(
        &self,
        session: &Session,
        brief: &Brief,
        outcome: &BriefOutcome,
        case_name: &str,
        witness_name: &str,
    ) {
        let lines = brief_pdf_lines(outcome, case_name, witness_name, session.question_count);
        let bytes = pdf::render_pdf("Deposition Coaching Brief", &lines);
        let key = brief_pdf_key(session.firm_id, brief.id);
        if let Some(stored) = self.blob.put(&key, bytes, "application/pdf").await {
            if let Err(e) = self.store.set_brief_pdf_key(brief.id, &stored) {
                warn!(error = %e, "failed to record brief pdf key");
            }
        }
    }
}

/// Parse `[SPEAKER]: text` lines from the raw transcript cache.
fn parse_raw_transcript(raw: &str) -> Vec<TranscriptEntry> {
    let mut entries = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed = line
            .strip_prefix('[')
            .and_then(|rest| rest.split_once("]:"))
            .map(|(speaker, content)| (speaker.trim(), content.trim()));
        match parsed {
            Some((speaker, content)) => entries.push(TranscriptEntry {
                speaker: SpeakerRole::parse(speaker).unwrap_or(SpeakerRole::System),
                content: content.to_string(),
            }),
            // Continuation line: glue onto the previous entry.
            None => {
                if let Some(last) = entries.last_mut() {
                    last.content.push(' ');
                    last.content.push_str(line);
                }
            }
        }
    }
    entries
}

fn brief_pdf_lines(
    outcome: &BriefOutcome,
    case_name: &str,
    witness_name: &str,
    question_count: i64,
) -> Vec<String> {
    let map = outcome.weakness_map;
    let mut lines = vec![
        format!("Case: {case_name}"),
        format!("Witness: {witness_name}"),
        format!("Questions asked: {question_count}"),
        String::new(),
        format!("Session score: {}/100", outcome.session_score),
        format!("Consistency rate: {:.0}%", outcome.consistency_rate * 100.0),
        format!(
            "Alerts — objections: {}, confirmed flags: {}, composure: {}",
            outcome.objection_count, outcome.confirmed_flags, outcome.composure_alerts
        ),
        String::new(),
        "Weakness map:".to_string(),
        format!("  Composure: {}/100", map.composure),
        format!("  Tactical discipline: {}/100", map.tactical_discipline),
        format!("  Professionalism: {}/100", map.professionalism),
        format!("  Directness: {}/100", map.directness),
        format!("  Consistency: {}/100", map.consistency),
        String::new(),
        "Top recommendations:".to_string(),
    ];
    for (i, rec) in outcome.top_recommendations.iter().enumerate() {
        lines.push(format!("  {}. {rec}", i + 1));
    }
    lines.push(String::new());
    lines.push(outcome.narrative_text.clone());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, ImpeachmentRisk, SessionStatus};
    use crate::orchestrator::tests::{offline_orchestrator, seed};
    use crate::orchestrator::CreateSessionParams;
    use crate::store::events::NewAlert;

    fn generator(orch: &crate::orchestrator::Orchestrator) -> BriefGenerator {
        BriefGenerator {
            store: orch.store.clone(),
            agents: orch.agents.clone(),
            voice: orch.voice.clone(),
            blob: orch.blob.clone(),
        }
    }

    async fn completed_session(
        orch: &crate::orchestrator::Orchestrator,
        fixture: &crate::orchestrator::tests::Fixture,
    ) -> crate::models::Session {
        let session = orch
            .create_session(
                fixture.firm_id,
                fixture.attorney_id,
                CreateSessionParams {
                    case_id: fixture.case_id,
                    witness_id: fixture.witness_id,
                    duration_minutes: 30,
                    aggression: crate::models::Aggression::Elevated,
                    focus_areas: vec!["revenue fraud".to_string()],
                    objection_copilot_enabled: true,
                    sentinel_enabled: true,
                },
            )
            .await
            .unwrap();
        orch.start_session(fixture.firm_id, session.id).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_brief_shape_after_generation() {
        let (orch, _rx) = offline_orchestrator();
        let fixture = seed(&orch);
        let session = completed_session(&orch, &fixture).await;

        // 3 questions asked, 1 objection alert raised
        let reloaded = orch.get_session(fixture.firm_id, session.id).unwrap();
        for (n, text) in [
            (1, "Who approved the reports?"),
            (2, "Did you review them personally?"),
            (3, "When did the review happen?"),
        ] {
            orch.record_question(&reloaded, n, "revenue fraud", text, false)
                .unwrap();
        }
        orch.store
            .insert_alert(NewAlert {
                session_id: session.id,
                firm_id: session.firm_id,
                alert_type: AlertType::Objection,
                confidence: 0.9,
                question_number: Some(2),
                current_quote: Some("q".to_string()),
                rule_id: Some("FRE-611".to_string()),
                category: Some(crate::models::ObjectionCategory::Compound),
                explanation: None,
                prior_quote: None,
                prior_document_page: None,
                prior_document_line: None,
                impeachment_risk: None,
            })
            .unwrap();
        orch.end_session(fixture.firm_id, session.id).await.unwrap();

        let brief = generator(&orch)
            .generate_for_session(session.id)
            .await
            .unwrap();

        assert!((0..=100).contains(&brief.session_score));
        assert!((0.0..=1.0).contains(&brief.consistency_rate));
        assert_eq!(brief.top_recommendations.len(), 3);
        let map = brief.weakness_map.unwrap();
        for dim in [
            map.composure,
            map.tactical_discipline,
            map.professionalism,
            map.directness,
            map.consistency,
        ] {
            assert!((0..=100).contains(&dim));
        }
        assert_eq!(brief.objection_count, 1);
        assert_eq!(brief.confirmed_flags, 0);
        assert_eq!(brief.composure_alerts, 0);
        // offline → rule-based path filled the narrative
        assert!(brief.narrative_text.contains("Rule-based assessment"));
    }

    #[tokio::test]
    async fn test_generation_is_idempotent() {
        let (orch, _rx) = offline_orchestrator();
        let fixture = seed(&orch);
        let session = completed_session(&orch, &fixture).await;
        orch.end_session(fixture.firm_id, session.id).await.unwrap();

        let generator = generator(&orch);
        let first = generator.generate_for_session(session.id).await.unwrap();
        let second = generator.generate_for_session(session.id).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_witness_baseline_and_delta_across_sessions() {
        let (orch, _rx) = offline_orchestrator();
        let fixture = seed(&orch);
        let generator = generator(&orch);

        let first = completed_session(&orch, &fixture).await;
        orch.end_session(fixture.firm_id, first.id).await.unwrap();
        let brief_one = generator.generate_for_session(first.id).await.unwrap();
        assert_eq!(brief_one.delta_vs_baseline, None);

        let second = completed_session(&orch, &fixture).await;
        orch.end_session(fixture.firm_id, second.id).await.unwrap();
        let brief_two = generator.generate_for_session(second.id).await.unwrap();
        assert!(brief_two.delta_vs_baseline.is_some());

        let witness = orch
            .store
            .get_witness(fixture.firm_id, fixture.witness_id)
            .unwrap()
            .unwrap();
        assert_eq!(witness.baseline_score, Some(brief_one.session_score));
        assert_eq!(witness.latest_score, Some(brief_two.session_score));
    }

    #[tokio::test]
    async fn test_worker_drains_jobs() {
        let (orch, rx) = offline_orchestrator();
        let fixture = seed(&orch);
        let session = completed_session(&orch, &fixture).await;
        let handle = spawn_worker(generator(&orch), rx);

        orch.end_session(fixture.firm_id, session.id).await.unwrap();

        // The worker picks the job up and writes the brief.
        for _ in 0..50 {
            if orch
                .store
                .get_brief_by_session(session.id)
                .unwrap()
                .is_some()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let brief = orch.store.get_brief_by_session(session.id).unwrap();
        assert!(brief.is_some());

        let reloaded = orch.store.get_session_unscoped(session.id).unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Complete);
        handle.abort();
    }

    #[test]
    fn test_raw_transcript_parsing() {
        let raw = "[INTERROGATOR]: Who signed the order?\n[WITNESS]: I did.\n  It was late.\n";
        let entries = parse_raw_transcript(raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].speaker, SpeakerRole::Interrogator);
        assert_eq!(entries[1].content, "I did. It was late.");
    }

    #[test]
    fn test_pdf_lines_cover_scores() {
        let outcome = BriefOutcome {
            session_score: 71,
            consistency_rate: 0.8,
            top_recommendations: vec!["a".into(), "b".into(), "c".into()],
            narrative_text: "Narrative.".into(),
            weakness_map: crate::models::WeaknessMap {
                composure: 70,
                tactical_discipline: 60,
                professionalism: 90,
                directness: 55,
                consistency: 75,
            },
            confirmed_flags: 1,
            objection_count: 2,
            composure_alerts: 0,
            fallback_used: true,
        };
        let lines = brief_pdf_lines(&outcome, "Case", "Witness", 5);
        let joined = lines.join("\n");
        assert!(joined.contains("Session score: 71/100"));
        assert!(joined.contains("Tactical discipline: 60/100"));
        assert!(joined.contains("3. c"));
    }

    #[test]
    fn test_risk_ordering_is_total() {
        assert!(ImpeachmentRisk::High > ImpeachmentRisk::Medium);
        assert!(ImpeachmentRisk::Medium > ImpeachmentRisk::Low);
    }
}
