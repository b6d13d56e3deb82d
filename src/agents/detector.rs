//! Inconsistency Detector Agent
//! Mission: Score witness answers against prior sworn statements
//!
//! Primary scorer is the fast classifier; when it is unavailable the
//! general chat model takes over with a stricter numeric contract and a
//! higher live-fire threshold, because it is empirically more permissive.
//! Raising the fallback's actionable bar preserves precision at the cost
//! of recall.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clients::json_extract::extract_json;
use crate::clients::{ChatClient, ClassifierClient};
use crate::models::{CaseType, ImpeachmentRisk};
use crate::retrieval::{PriorStatementHit, RetrievalClient};

const PRIOR_K: usize = 5;
const MAX_SCORE_TOKENS: u32 = 200;

/// Below this, nothing is reportable at all.
pub const THRESHOLD_SECONDARY: f64 = 0.50;
/// Live-fire bar for the primary scorer.
pub const THRESHOLD_LIVE_PRIMARY: f64 = 0.75;
/// Live-fire bar for the chat-model fallback.
pub const THRESHOLD_LIVE_FALLBACK: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    Primary,
    Fallback,
}

impl ScoreSource {
    pub fn live_threshold(&self) -> f64 {
        match self {
            ScoreSource::Primary => THRESHOLD_LIVE_PRIMARY,
            ScoreSource::Fallback => THRESHOLD_LIVE_FALLBACK,
        }
    }
}

pub struct InconsistencyRequest {
    pub case_id: Uuid,
    pub case_type: CaseType,
    pub question_number: i64,
    pub question_text: String,
    pub answer_text: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InconsistencyResult {
    pub flag_found: bool,
    pub live_fired: bool,
    pub confidence: f64,
    pub prior_quote: Option<String>,
    pub prior_document_page: Option<i64>,
    pub prior_document_line: Option<i64>,
    pub impeachment_risk: ImpeachmentRisk,
}

impl InconsistencyResult {
    pub fn empty(confidence: f64) -> Self {
        Self {
            flag_found: false,
            live_fired: false,
            confidence,
            prior_quote: None,
            prior_document_page: None,
            prior_document_line: None,
            impeachment_risk: ImpeachmentRisk::Low,
        }
    }
}

/// Scorer output: contradiction confidence plus the index of the most
/// contradicted prior statement (-1 when none stands out).
#[derive(Debug, Clone, Copy)]
pub struct ContradictionScore {
    pub confidence: f64,
    pub best_match_index: i64,
}

/// Run the full detection pipeline for one answer.
pub async fn detect(
    classifier: &ClassifierClient,
    chat: &ChatClient,
    retrieval: &RetrievalClient,
    req: InconsistencyRequest,
) -> InconsistencyResult {
    let priors = retrieval
        .search_prior_statements(req.case_id, &req.answer_text, PRIOR_K)
        .await;
    if priors.is_empty() {
        return InconsistencyResult::empty(0.0);
    }

    let case_context = format!("{} deposition", req.case_type.as_str());
    let prompt = score_prompt(&req.answer_text, &priors, &case_context);

    let (score, source) = match classifier.complete("", &prompt, MAX_SCORE_TOKENS).await {
        Ok(output) => match parse_score(&output.content) {
            Ok(score) => (score, ScoreSource::Primary),
            Err(e) => {
                warn!(error = %e, "primary scorer returned unparseable payload — no alert");
                return InconsistencyResult::empty(0.0);
            }
        },
        Err(e) if e.is_unavailable() => {
            debug!("primary scorer unavailable — falling back to chat model");
            match fallback_score(chat, &req.answer_text, &priors).await {
                Some(score) => (score, ScoreSource::Fallback),
                None => return InconsistencyResult::empty(0.0),
            }
        }
        Err(e) => {
            warn!(error = %e, "primary scorer rejected the request — no alert");
            return InconsistencyResult::empty(0.0);
        }
    };

    resolve_detection(&priors, score, source)
}

/// Pure threshold resolution, separated from the async calls so the ladder
/// is directly testable.
pub fn resolve_detection(
    priors: &[PriorStatementHit],
    score: ContradictionScore,
    source: ScoreSource,
) -> InconsistencyResult {
    let confidence = score.confidence.clamp(0.0, 1.0);
    if confidence < THRESHOLD_SECONDARY {
        return InconsistencyResult::empty(confidence);
    }

    let best_match = usize::try_from(score.best_match_index)
        .ok()
        .and_then(|idx| priors.get(idx));
    let live_fired = confidence >= source.live_threshold();

    InconsistencyResult {
        flag_found: true,
        live_fired,
        confidence,
        prior_quote: best_match.map(|hit| hit.content.clone()),
        prior_document_page: best_match.and_then(|hit| hit.page),
        prior_document_line: best_match.and_then(|hit| hit.line),
        impeachment_risk: if live_fired {
            ImpeachmentRisk::High
        } else {
            ImpeachmentRisk::Medium
        },
    }
}

fn score_prompt(answer_text: &str, priors: &[PriorStatementHit], case_context: &str) -> String {
    let mut listing = String::new();
    for (i, hit) in priors.iter().enumerate() {
        listing.push_str(&format!("[{i}] \"{}\"\n", hit.content));
    }
    format!(
        r#"You are analyzing a witness deposition for contradictions.

Case context: {case_context}

Witness answer just given:
"{answer_text}"

Prior sworn statements on record:
{listing}
Respond ONLY with JSON:
{{
  "contradiction_confidence": <float 0.0-1.0>,
  "best_match_index": <integer index of most contradicted statement, or -1>,
  "reasoning": "<one sentence>"
}}"#
    )
}

async fn fallback_score(
    chat: &ChatClient,
    answer_text: &str,
    priors: &[PriorStatementHit],
) -> Option<ContradictionScore> {
    let listing: String = priors
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[{i}] {}\n", hit.content))
        .collect();
    let system = r#"Score contradiction confidence 0-1. Return only JSON:
{"contradiction_confidence": number, "best_match_index": number}"#;
    let user = format!("Answer: \"{answer_text}\"\nPrior:\n{listing}");

    match chat.chat(system, &user, MAX_SCORE_TOKENS).await {
        Ok(raw) => match parse_score(&raw) {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(error = %e, "fallback scorer returned unparseable payload");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "fallback scorer failed");
            None
        }
    }
}

/// Parse the scorer JSON. Missing confidence is a contract violation;
/// a missing index degrades to -1.
pub fn parse_score(raw: &str) -> Result<ContradictionScore, String> {
    let value: Value = extract_json(raw)?;
    let confidence = value["contradiction_confidence"]
        .as_f64()
        .ok_or_else(|| "missing contradiction_confidence".to_string())?;
    let best_match_index = value["best_match_index"].as_i64().unwrap_or(-1);
    Ok(ContradictionScore {
        confidence,
        best_match_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priors() -> Vec<PriorStatementHit> {
        vec![
            PriorStatementHit {
                content: "I was fully involved in reviewing all quarterly financial reports and I approved them personally.".to_string(),
                case_id: "case-1".to_string(),
                page: Some(14),
                line: Some(3),
                doc_type: Some("PRIOR_DEPOSITION".to_string()),
                witness_name: Some("Jane Roe".to_string()),
                score: 0.93,
            },
            PriorStatementHit {
                content: "The CFO reported directly to me.".to_string(),
                case_id: "case-1".to_string(),
                page: Some(22),
                line: Some(11),
                doc_type: Some("AFFIDAVIT".to_string()),
                witness_name: Some("Jane Roe".to_string()),
                score: 0.74,
            },
        ]
    }

    fn score(confidence: f64, idx: i64) -> ContradictionScore {
        ContradictionScore {
            confidence,
            best_match_index: idx,
        }
    }

    #[test]
    fn test_below_secondary_reports_nothing() {
        let result = resolve_detection(&priors(), score(0.49, 0), ScoreSource::Primary);
        assert!(!result.flag_found);
        assert!(!result.live_fired);
        assert_eq!(result.impeachment_risk, ImpeachmentRisk::Low);
        assert_eq!(result.prior_quote, None);
    }

    #[test]
    fn test_secondary_band_is_medium_risk() {
        let result = resolve_detection(&priors(), score(0.6, 0), ScoreSource::Primary);
        assert!(result.flag_found);
        assert!(!result.live_fired);
        assert_eq!(result.impeachment_risk, ImpeachmentRisk::Medium);
        assert!(result.confidence >= THRESHOLD_SECONDARY);
    }

    #[test]
    fn test_primary_live_fire_at_075() {
        let result = resolve_detection(&priors(), score(0.75, 0), ScoreSource::Primary);
        assert!(result.live_fired);
        assert_eq!(result.impeachment_risk, ImpeachmentRisk::High);
        assert_eq!(
            result.prior_quote.as_deref(),
            Some("I was fully involved in reviewing all quarterly financial reports and I approved them personally.")
        );
        assert_eq!(result.prior_document_page, Some(14));
        assert_eq!(result.prior_document_line, Some(3));
    }

    #[test]
    fn test_fallback_raises_live_bar_to_085() {
        // 0.80 live-fires on primary but not on fallback
        let primary = resolve_detection(&priors(), score(0.80, 0), ScoreSource::Primary);
        assert!(primary.live_fired);

        let fallback = resolve_detection(&priors(), score(0.80, 0), ScoreSource::Fallback);
        assert!(fallback.flag_found);
        assert!(!fallback.live_fired);
        assert_eq!(fallback.impeachment_risk, ImpeachmentRisk::Medium);

        let fallback_hot = resolve_detection(&priors(), score(0.86, 0), ScoreSource::Fallback);
        assert!(fallback_hot.live_fired);
    }

    #[test]
    fn test_invalid_index_keeps_flag_without_quote() {
        let result = resolve_detection(&priors(), score(0.9, -1), ScoreSource::Primary);
        assert!(result.flag_found);
        assert_eq!(result.prior_quote, None);

        let out_of_range = resolve_detection(&priors(), score(0.9, 99), ScoreSource::Primary);
        assert!(out_of_range.flag_found);
        assert_eq!(out_of_range.prior_quote, None);
    }

    #[test]
    fn test_parse_score_contract() {
        let ok = parse_score(r#"{"contradiction_confidence": 0.82, "best_match_index": 1, "reasoning": "direct denial"}"#)
            .unwrap();
        assert_eq!(ok.confidence, 0.82);
        assert_eq!(ok.best_match_index, 1);

        let fenced = parse_score("```json\n{\"contradiction_confidence\": 0.4}\n```").unwrap();
        assert_eq!(fenced.best_match_index, -1);

        assert!(parse_score(r#"{"best_match_index": 1}"#).is_err());
        assert!(parse_score("nonsense").is_err());
    }

    #[test]
    fn test_flagged_results_meet_threshold_floor() {
        // Every flagged result carries confidence >= 0.50, and a live-fired
        // one clears the live threshold for its source.
        for source in [ScoreSource::Primary, ScoreSource::Fallback] {
            for c in [0.0, 0.3, 0.5, 0.6, 0.75, 0.8, 0.85, 0.99] {
                let result = resolve_detection(&priors(), score(c, 0), source);
                if result.flag_found {
                    assert!(result.confidence >= THRESHOLD_SECONDARY);
                }
                if result.live_fired {
                    assert!(result.confidence >= source.live_threshold());
                }
            }
        }
    }
}
