//! Review Orchestrator Agent
//! Mission: Turn a finished session into a coaching brief
//!
//! One large-model call over the full ordered transcript and alert set.
//! When the model is unavailable or violates the JSON contract, the
//! rule-based scorer in `heuristics` produces the same schema, so the
//! attorney always gets a definite brief.

use serde_json::Value;
use tracing::warn;

use crate::clients::json_extract::extract_json;
use crate::clients::ChatClient;
use crate::models::{
    Aggression, AlertStatus, AlertType, CaseType, SpeakerRole, WeaknessMap, WitnessRole,
};

use super::heuristics;

const MAX_BRIEF_TOKENS: u32 = 1500;

const REVIEW_SYSTEM: &str = r#"You are an elite litigation coach reviewing a completed deposition practice session.
Analyze the session transcript, alerts, and performance data to generate a comprehensive coaching brief.
Respond ONLY with valid JSON matching the exact format specified.
STRICT RULES:
- No preamble, no markdown, no code fences around the JSON
- All string values must be on a single line; use \n for paragraph breaks, never literal newlines inside string values
- No trailing commas
- No comments"#;

#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub speaker: SpeakerRole,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct AlertSummary {
    pub alert_type: AlertType,
    pub status: AlertStatus,
    pub confidence: f64,
    pub prior_quote: Option<String>,
}

pub struct BriefRequest {
    pub transcript: Vec<TranscriptEntry>,
    pub alerts: Vec<AlertSummary>,
    pub case_type: CaseType,
    pub witness_role: WitnessRole,
    pub aggression: Aggression,
    pub duration_minutes: i64,
    pub question_count: i64,
}

/// The full brief schema. `session_score` and every weakness dimension are
/// in [0,100]; `consistency_rate` in [0,1]; exactly three recommendations.
#[derive(Debug, Clone)]
pub struct BriefOutcome {
    pub session_score: i64,
    pub consistency_rate: f64,
    pub top_recommendations: Vec<String>,
    pub narrative_text: String,
    pub weakness_map: WeaknessMap,
    pub confirmed_flags: i64,
    pub objection_count: i64,
    pub composure_alerts: i64,
    pub fallback_used: bool,
}

/// Generate the brief, falling back to the heuristic scorer on any model
/// failure.
pub async fn generate(chat: &ChatClient, req: BriefRequest) -> BriefOutcome {
    let prompt = build_prompt(&req);

    match chat.chat(REVIEW_SYSTEM, &prompt, MAX_BRIEF_TOKENS).await {
        Ok(raw) => match parse_brief_response(&raw, &req) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "reviewer payload unparseable — using rule-based fallback");
                heuristics::fallback_brief(&req)
            }
        },
        Err(e) => {
            warn!(error = %e, "reviewer model call failed — using rule-based fallback");
            heuristics::fallback_brief(&req)
        }
    }
}

pub fn build_prompt(req: &BriefRequest) -> String {
    let transcript_text: String = req
        .transcript
        .iter()
        .map(|e| format!("[{}] {}\n", e.speaker.as_str(), e.content))
        .collect();

    let alerts_text = if req.alerts.is_empty() {
        "None".to_string()
    } else {
        req.alerts
            .iter()
            .map(|a| {
                format!(
                    "- {}: {} (confidence: {:.2})\n",
                    a.alert_type.as_str(),
                    a.prior_quote.as_deref().unwrap_or(""),
                    a.confidence
                )
            })
            .collect()
    };

    format!(
        r#"Session Summary:
- Case type: {}
- Witness role: {}
- Aggression level: {}
- Duration: {} minutes
- Questions asked: {}

Full Transcript:
{}
Alerts Fired:
{}
Generate a coaching brief as JSON (ALL strings must be single-line, use \n for paragraph breaks):
{{
  "session_score": <integer 0-100>,
  "consistency_rate": <float 0.0-1.0>,
  "top_recommendations": ["<rec 1>", "<rec 2>", "<rec 3>"],
  "narrative_text": "<coaching narrative using \n for paragraph breaks, no literal newlines>",
  "weakness_map_scores": {{
    "composure": <0-100>, "tactical_discipline": <0-100>, "professionalism": <0-100>,
    "directness": <0-100>, "consistency": <0-100>
  }},
  "confirmed_flags": <integer>,
  "objection_count": <integer>,
  "composure_alerts": <integer>
}}"#,
        req.case_type.as_str(),
        req.witness_role.as_str(),
        req.aggression.as_str(),
        req.duration_minutes,
        req.question_count,
        transcript_text,
        alerts_text,
    )
}

/// Parse and normalize the model's brief. Counter fields are recomputed
/// from the alert rows rather than trusted from the model.
pub fn parse_brief_response(raw: &str, req: &BriefRequest) -> Result<BriefOutcome, String> {
    let value: Value = extract_json(raw)?;

    let session_score = value["session_score"]
        .as_i64()
        .ok_or_else(|| "missing session_score".to_string())?
        .clamp(0, 100);
    let consistency_rate = value["consistency_rate"]
        .as_f64()
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    let mut recommendations: Vec<String> = value["top_recommendations"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    normalize_recommendations(&mut recommendations);

    let scores = &value["weakness_map_scores"];
    let weakness_map = WeaknessMap {
        composure: scores["composure"].as_i64().unwrap_or(50),
        tactical_discipline: scores["tactical_discipline"].as_i64().unwrap_or(50),
        professionalism: scores["professionalism"].as_i64().unwrap_or(50),
        directness: scores["directness"].as_i64().unwrap_or(50),
        consistency: scores["consistency"].as_i64().unwrap_or(50),
    }
    .clamped();

    let (confirmed_flags, objection_count, composure_alerts) = count_alerts(&req.alerts);

    Ok(BriefOutcome {
        session_score,
        consistency_rate,
        top_recommendations: recommendations,
        narrative_text: value["narrative_text"].as_str().unwrap_or("").to_string(),
        weakness_map,
        confirmed_flags,
        objection_count,
        composure_alerts,
        fallback_used: false,
    })
}

/// Exactly three recommendations, always.
pub(crate) fn normalize_recommendations(recommendations: &mut Vec<String>) {
    recommendations.retain(|r| !r.trim().is_empty());
    recommendations.truncate(3);
    let defaults = [
        "Keep answers short and factual; do not volunteer information.",
        "Pause briefly before answering to stay composed under pressure.",
        "Review your prior sworn statements before the next session.",
    ];
    for default in defaults {
        if recommendations.len() >= 3 {
            break;
        }
        if !recommendations.iter().any(|r| r == default) {
            recommendations.push(default.to_string());
        }
    }
}

pub(crate) fn count_alerts(alerts: &[AlertSummary]) -> (i64, i64, i64) {
    let confirmed = alerts
        .iter()
        .filter(|a| a.status == AlertStatus::Confirmed)
        .count() as i64;
    let objections = alerts
        .iter()
        .filter(|a| a.alert_type == AlertType::Objection)
        .count() as i64;
    let composure = alerts
        .iter()
        .filter(|a| a.alert_type == AlertType::Composure)
        .count() as i64;
    (confirmed, objections, composure)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn request() -> BriefRequest {
        BriefRequest {
            transcript: vec![
                TranscriptEntry {
                    speaker: SpeakerRole::Interrogator,
                    content: "Who approved the quarterly reports?".to_string(),
                },
                TranscriptEntry {
                    speaker: SpeakerRole::Witness,
                    content: "I think maybe the CFO handled that, I'm not sure.".to_string(),
                },
            ],
            alerts: vec![AlertSummary {
                alert_type: AlertType::Objection,
                status: AlertStatus::Pending,
                confidence: 0.88,
                prior_quote: None,
            }],
            case_type: CaseType::CommercialDispute,
            witness_role: WitnessRole::Defendant,
            aggression: Aggression::Elevated,
            duration_minutes: 30,
            question_count: 3,
        }
    }

    #[test]
    fn test_prompt_carries_transcript_and_alerts() {
        let prompt = build_prompt(&request());
        assert!(prompt.contains("[INTERROGATOR] Who approved the quarterly reports?"));
        assert!(prompt.contains("Case type: COMMERCIAL_DISPUTE"));
        assert!(prompt.contains("- OBJECTION:"));
        assert!(prompt.contains("Questions asked: 3"));
    }

    #[test]
    fn test_parse_valid_brief() {
        let raw = r#"{
            "session_score": 74,
            "consistency_rate": 0.83,
            "top_recommendations": ["Tighten timelines", "Stop hedging", "Practice exhibit review"],
            "narrative_text": "Respectable showing with one soft spot.",
            "weakness_map_scores": {"composure": 70, "tactical_discipline": 65,
                "professionalism": 90, "directness": 58, "consistency": 77},
            "confirmed_flags": 9, "objection_count": 9, "composure_alerts": 9
        }"#;
        let outcome = parse_brief_response(raw, &request()).unwrap();
        assert_eq!(outcome.session_score, 74);
        assert_eq!(outcome.top_recommendations.len(), 3);
        assert_eq!(outcome.weakness_map.directness, 58);
        // counters come from the alert rows, not the model
        assert_eq!(outcome.objection_count, 1);
        assert_eq!(outcome.confirmed_flags, 0);
        assert_eq!(outcome.composure_alerts, 0);
        assert!(!outcome.fallback_used);
    }

    #[test]
    fn test_parse_clamps_out_of_range_values() {
        let raw = r#"{
            "session_score": 140,
            "consistency_rate": 1.7,
            "top_recommendations": ["one"],
            "narrative_text": "n",
            "weakness_map_scores": {"composure": -5, "tactical_discipline": 200,
                "professionalism": 50, "directness": 50, "consistency": 50}
        }"#;
        let outcome = parse_brief_response(raw, &request()).unwrap();
        assert_eq!(outcome.session_score, 100);
        assert_eq!(outcome.consistency_rate, 1.0);
        assert_eq!(outcome.weakness_map.composure, 0);
        assert_eq!(outcome.weakness_map.tactical_discipline, 100);
        assert_eq!(outcome.top_recommendations.len(), 3);
    }

    #[test]
    fn test_parse_rejects_missing_score() {
        assert!(parse_brief_response(r#"{"consistency_rate": 0.5}"#, &request()).is_err());
        assert!(parse_brief_response("not json at all", &request()).is_err());
    }

    #[test]
    fn test_recommendation_padding_and_truncation() {
        let mut four = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];
        normalize_recommendations(&mut four);
        assert_eq!(four, vec!["a", "b", "c"]);

        let mut none: Vec<String> = vec![];
        normalize_recommendations(&mut none);
        assert_eq!(none.len(), 3);
    }
}
