//! End-to-end session lifecycle against a real on-disk store.
//!
//! Upstream model/retrieval/voice services are left unconfigured, so every
//! agent path exercises its documented degraded behavior while the state
//! machine, event log, and brief pipeline run for real.

use tempfile::TempDir;
use tokio::sync::mpsc;

use veritas_backend::agents::Agents;
use veritas_backend::blob::BlobStore;
use veritas_backend::brief::BriefGenerator;
use veritas_backend::clients::{ChatClient, ClassifierClient, VoiceClient};
use veritas_backend::config::Config;
use veritas_backend::models::{
    Aggression, AlertType, CaseType, EventType, SessionStatus, WitnessRole,
};
use veritas_backend::orchestrator::{
    BriefJob, CreateSessionParams, OpError, Orchestrator, QuestionInput, QuestionStreamEvent,
};
use veritas_backend::retrieval::RetrievalClient;
use veritas_backend::store::Store;

struct Harness {
    orchestrator: Orchestrator,
    generator: BriefGenerator,
    _brief_rx: mpsc::UnboundedReceiver<BriefJob>,
    _dir: TempDir,
}

fn offline_config() -> Config {
    let mut config = Config::from_env();
    config.chat_api_key = String::new();
    config.classifier_api_key = String::new();
    config.voice_api_key = String::new();
    config.retrieval_base_url = String::new();
    config.blob_endpoint = String::new();
    config.blob_access_key = String::new();
    config
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("veritas-test.db");
    let config = offline_config();
    let http = reqwest::Client::new();

    let store = Store::open(db_path.to_str().unwrap()).unwrap();
    let agents = Agents::new(
        ChatClient::from_config(http.clone(), &config),
        ClassifierClient::from_config(http.clone(), &config),
        RetrievalClient::from_config(http.clone(), &config),
    );
    let voice = VoiceClient::from_config(http.clone(), &config);
    let blob = BlobStore::from_config(http, &config);
    let (brief_tx, brief_rx) = mpsc::unbounded_channel();

    Harness {
        orchestrator: Orchestrator::new(
            store.clone(),
            agents.clone(),
            voice.clone(),
            blob.clone(),
            brief_tx,
        ),
        generator: BriefGenerator {
            store,
            agents,
            voice,
            blob,
        },
        _brief_rx: brief_rx,
        _dir: dir,
    }
}

struct Tenant {
    firm_id: uuid::Uuid,
    attorney_id: uuid::Uuid,
    case_id: uuid::Uuid,
    witness_id: uuid::Uuid,
}

fn seed_tenant(store: &Store) -> Tenant {
    let firm = store.create_firm("Harness Firm", 365).unwrap();
    let attorney = store
        .create_user(firm.id, "partner@harness.law", "password-123456", "PARTNER")
        .unwrap();
    let case = store
        .create_case(
            firm.id,
            attorney.id,
            "Holloway v. Meridian",
            CaseType::MedicalMalpractice,
            "Meridian Capital",
            "facts",
            "I was fully involved in reviewing all quarterly financial reports and I approved them personally.",
            "exhibits",
            "revenue fraud",
            Aggression::Elevated,
        )
        .unwrap();
    let witness = store
        .create_witness(firm.id, case.id, "Jane Roe", WitnessRole::Defendant)
        .unwrap();
    Tenant {
        firm_id: firm.id,
        attorney_id: attorney.id,
        case_id: case.id,
        witness_id: witness.id,
    }
}

fn session_params(tenant: &Tenant) -> CreateSessionParams {
    CreateSessionParams {
        case_id: tenant.case_id,
        witness_id: tenant.witness_id,
        duration_minutes: 30,
        aggression: Aggression::Elevated,
        focus_areas: vec!["revenue fraud".to_string()],
        objection_copilot_enabled: true,
        sentinel_enabled: true,
    }
}

#[tokio::test]
async fn full_lifecycle_with_degraded_agents() {
    let h = harness();
    let tenant = seed_tenant(&h.orchestrator.store);

    // LOBBY → ACTIVE → PAUSED → ACTIVE → COMPLETE
    let session = h
        .orchestrator
        .create_session(tenant.firm_id, tenant.attorney_id, session_params(&tenant))
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Lobby);
    assert_eq!(session.witness_token.as_ref().unwrap().len(), 24);

    h.orchestrator
        .start_session(tenant.firm_id, session.id)
        .await
        .unwrap();
    h.orchestrator
        .pause_session(tenant.firm_id, session.id)
        .await
        .unwrap();
    h.orchestrator
        .resume_session(tenant.firm_id, session.id)
        .await
        .unwrap();

    // Answer ingestion with no voice service: transcript falls back.
    let ingest = h
        .orchestrator
        .ingest_answer(
            tenant.firm_id,
            session.id,
            vec![0u8; 64],
            Some("answer.webm".to_string()),
            Some("audio/webm".to_string()),
            1,
            Some(1800),
        )
        .await
        .unwrap();
    assert_eq!(ingest.transcript_text, "(inaudible)");

    // Degraded agent calls: definite results, no alerts.
    let objection = h
        .orchestrator
        .classify_question(
            tenant.firm_id,
            session.id,
            1,
            "Did you authorize the figures AND conceal them?".to_string(),
        )
        .await
        .unwrap();
    assert!(!objection.objectionable);

    let detection = h
        .orchestrator
        .detect_inconsistency(
            tenant.firm_id,
            session.id,
            1,
            "Who reviewed the reports?".to_string(),
            "I never reviewed the quarterly reports.".to_string(),
        )
        .await
        .unwrap();
    assert!(!detection.flag_found);

    let ended = h
        .orchestrator
        .end_session(tenant.firm_id, session.id)
        .await
        .unwrap();
    assert_eq!(ended.status, SessionStatus::Complete);
    assert!(ended.ended_at.is_some());

    // Terminal: everything mutating is now rejected.
    assert!(matches!(
        h.orchestrator
            .classify_question(tenant.firm_id, session.id, 2, "q".to_string())
            .await,
        Err(OpError::InvalidState(_))
    ));
    assert!(matches!(
        h.orchestrator
            .ingest_answer(tenant.firm_id, session.id, vec![1], None, None, 2, None)
            .await,
        Err(OpError::InvalidState(_))
    ));

    // Event log: ANSWER plus the three state changes, in order.
    let events = h.orchestrator.store.list_events(session.id).unwrap();
    let answers = events
        .iter()
        .filter(|e| e.event_type == EventType::Answer)
        .count();
    assert_eq!(answers, 1);
    let state_changes: Vec<&str> = events
        .iter()
        .filter(|e| e.event_type == EventType::StateChange)
        .map(|e| e.content.as_str())
        .collect();
    assert_eq!(state_changes, vec!["ACTIVE", "PAUSED", "ACTIVE", "COMPLETE"]);
}

#[tokio::test]
async fn question_count_matches_question_events_in_terminal_state() {
    let h = harness();
    let tenant = seed_tenant(&h.orchestrator.store);
    let session = h
        .orchestrator
        .create_session(tenant.firm_id, tenant.attorney_id, session_params(&tenant))
        .await
        .unwrap();
    h.orchestrator
        .start_session(tenant.firm_id, session.id)
        .await
        .unwrap();

    // The offline chat model cannot stream, so drive the persistence path
    // through the store directly the way a finished stream would.
    let reloaded = h
        .orchestrator
        .get_session(tenant.firm_id, session.id)
        .unwrap();
    for n in 1..=3 {
        h.orchestrator
            .record_question(&reloaded, n, "revenue fraud", &format!("Question {n}?"), false)
            .unwrap();
    }
    h.orchestrator
        .end_session(tenant.firm_id, session.id)
        .await
        .unwrap();

    let terminal = h
        .orchestrator
        .get_session(tenant.firm_id, session.id)
        .unwrap();
    let question_events = h
        .orchestrator
        .store
        .count_events(session.id, EventType::Question)
        .unwrap();
    assert_eq!(terminal.question_count, question_events);

    // question_number values form a contiguous prefix of the positives.
    let numbers: Vec<i64> = h
        .orchestrator
        .store
        .list_events(session.id)
        .unwrap()
        .iter()
        .filter(|e| e.event_type == EventType::Question)
        .filter_map(|e| e.question_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn brief_generation_shape_and_idempotence() {
    let h = harness();
    let tenant = seed_tenant(&h.orchestrator.store);
    let session = h
        .orchestrator
        .create_session(tenant.firm_id, tenant.attorney_id, session_params(&tenant))
        .await
        .unwrap();
    h.orchestrator
        .start_session(tenant.firm_id, session.id)
        .await
        .unwrap();

    let reloaded = h
        .orchestrator
        .get_session(tenant.firm_id, session.id)
        .unwrap();
    for (n, q) in [
        (1, "Who approved the quarterly reports?"),
        (2, "Did you review them personally?"),
        (3, "When did that review occur?"),
    ] {
        h.orchestrator
            .record_question(&reloaded, n, "revenue fraud", q, false)
            .unwrap();
    }
    h.orchestrator
        .end_session(tenant.firm_id, session.id)
        .await
        .unwrap();

    let brief = h.generator.generate_for_session(session.id).await.unwrap();
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
    assert_eq!(brief.objection_count, 0);
    assert_eq!(brief.confirmed_flags, 0);
    assert_eq!(brief.composure_alerts, 0);

    // Second trigger returns the same row.
    let again = h.generator.generate_for_session(session.id).await.unwrap();
    assert_eq!(again.id, brief.id);

    // No post-terminal writes happened during generation.
    let question_events = h
        .orchestrator
        .store
        .count_events(session.id, EventType::Question)
        .unwrap();
    assert_eq!(question_events, 3);
}

#[tokio::test]
async fn cross_tenant_access_is_invisible() {
    let h = harness();
    let tenant = seed_tenant(&h.orchestrator.store);
    let session = h
        .orchestrator
        .create_session(tenant.firm_id, tenant.attorney_id, session_params(&tenant))
        .await
        .unwrap();

    let rival = h.orchestrator.store.create_firm("Rival LLP", 365).unwrap();
    for result in [
        h.orchestrator.get_session(rival.id, session.id).err(),
        h.orchestrator
            .start_session(rival.id, session.id)
            .await
            .err(),
        h.orchestrator.live_state(rival.id, session.id).err(),
    ] {
        assert!(matches!(result, Some(OpError::NotFound)));
    }
}

#[tokio::test]
async fn degraded_question_stream_reports_error_without_side_effects() {
    let h = harness();
    let tenant = seed_tenant(&h.orchestrator.store);
    let session = h
        .orchestrator
        .create_session(tenant.firm_id, tenant.attorney_id, session_params(&tenant))
        .await
        .unwrap();
    h.orchestrator
        .start_session(tenant.firm_id, session.id)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    h.orchestrator
        .stream_next_question(
            tenant.firm_id,
            session.id,
            QuestionInput {
                question_number: 1,
                current_topic: "revenue fraud".to_string(),
                prior_answer: None,
                hesitation_detected: false,
                recent_inconsistency_flag: false,
            },
            tx,
        )
        .await;

    let frame = rx.recv().await.unwrap();
    assert!(matches!(frame, QuestionStreamEvent::Error { .. }));
    assert!(frame.is_terminal());

    let reloaded = h
        .orchestrator
        .get_session(tenant.firm_id, session.id)
        .unwrap();
    assert_eq!(reloaded.question_count, 0);
}

#[tokio::test]
async fn alerts_carry_matching_question_numbers() {
    let h = harness();
    let tenant = seed_tenant(&h.orchestrator.store);
    let session = h
        .orchestrator
        .create_session(tenant.firm_id, tenant.attorney_id, session_params(&tenant))
        .await
        .unwrap();
    h.orchestrator
        .start_session(tenant.firm_id, session.id)
        .await
        .unwrap();

    let reloaded = h
        .orchestrator
        .get_session(tenant.firm_id, session.id)
        .unwrap();
    h.orchestrator
        .record_question(&reloaded, 1, "topic", "Did you do X and Y?", false)
        .unwrap();

    // Simulate the alert write the objection path performs on a flag.
    h.orchestrator
        .store
        .insert_alert(veritas_backend::store::events::NewAlert {
            session_id: session.id,
            firm_id: session.firm_id,
            alert_type: AlertType::Objection,
            confidence: 0.88,
            question_number: Some(1),
            current_quote: Some("Did you do X and Y?".to_string()),
            rule_id: Some("FRE-611".to_string()),
            category: Some(veritas_backend::models::ObjectionCategory::Compound),
            explanation: None,
            prior_quote: None,
            prior_document_page: None,
            prior_document_line: None,
            impeachment_risk: None,
        })
        .unwrap();

    // Invariant: every alert's question number has a preceding QUESTION or
    // ANSWER event with the same number.
    let events = h.orchestrator.store.list_events(session.id).unwrap();
    for alert in h.orchestrator.store.list_alerts(session.id).unwrap() {
        let n = alert.question_number.unwrap();
        assert!(events.iter().any(|e| {
            e.question_number == Some(n)
                && matches!(e.event_type, EventType::Question | EventType::Answer)
        }));
    }

    // Live state surfaces both the transcript entry and the alert.
    let live = h.orchestrator.live_state(tenant.firm_id, session.id).unwrap();
    assert_eq!(live.transcript.len(), 1);
    assert_eq!(live.alerts.len(), 1);
    assert_eq!(live.question_count, 1);
}
