//! Rule-based brief scorer.
//!
//! Produces the same schema as the Review agent from plain text-pattern
//! counters over the transcript: hedging words, long-answer ratio,
//! inappropriate reactions, recall hedges, and contradiction markers.
//! No model calls, so it always completes.

use crate::models::{Aggression, SpeakerRole, WeaknessMap};

use super::reviewer::{count_alerts, normalize_recommendations, BriefOutcome, BriefRequest};

const HEDGE_PHRASES: &[&str] = &[
    "i think",
    "maybe",
    "perhaps",
    "possibly",
    "i'm not sure",
    "i believe",
];

const RECALL_PHRASES: &[&str] = &[
    "don't recall",
    "do not recall",
    "can't recall",
    "cannot recall",
];

const CONTRADICTION_SIGNALS: &[&str] = &[
    "denied",
    "denies",
    "claims",
    "maintains",
    "recant",
    "not involved",
    "never disclosed",
    "did not disclose",
    "no written record",
    "failed to",
    "did not file",
    "not investigated",
    "never been wrong",
];

const THREAT_SIGNALS: &[&str] = &[
    "threat", "regret", "pay for", "hostile", "shouting", "angry", "confrontation",
];

const REACTION_TAGS: &[&str] = &["[scoff]", "[laugh]", "[nervous laugh]", "[sigh]"];

const SARCASM_PHRASES: &[&str] = &["obviously", "clearly", "as i already said", "i told you"];

fn count_signals(text: &str, signals: &[&str]) -> usize {
    let lower = text.to_lowercase();
    signals
        .iter()
        .map(|s| lower.matches(s).count())
        .sum()
}

/// Compute the fallback brief from the transcript and alert rows.
pub fn fallback_brief(req: &BriefRequest) -> BriefOutcome {
    let witness_lines: Vec<&str> = req
        .transcript
        .iter()
        .filter(|e| e.speaker == SpeakerRole::Witness)
        .map(|e| e.content.as_str())
        .collect();
    let witness_text = witness_lines.join(" ");

    let hedges = count_signals(&witness_text, HEDGE_PHRASES);
    let recalls = count_signals(&witness_text, RECALL_PHRASES);
    let contradictions = count_signals(&witness_text, CONTRADICTION_SIGNALS);
    let threats = count_signals(&witness_text, THREAT_SIGNALS);
    let reactions = count_signals(&witness_text, REACTION_TAGS);
    let sarcasm = count_signals(&witness_text, SARCASM_PHRASES);

    let answer_count = witness_lines.len().max(1);
    let long_answers = witness_lines
        .iter()
        .filter(|l| l.split_whitespace().count() > 30)
        .count();
    let short_answers = witness_lines
        .iter()
        .filter(|l| l.split_whitespace().count() <= 5)
        .count();
    let avg_words: f64 = witness_lines
        .iter()
        .map(|l| l.split_whitespace().count())
        .sum::<usize>() as f64
        / answer_count as f64;

    let mut composure = 85i64;
    composure -= ((reactions * 6).min(35)) as i64;
    composure -= ((threats * 8).min(20)) as i64;
    if req.aggression == Aggression::HighStakes {
        composure -= 5;
    }

    let mut tactical = 85i64;
    tactical -= ((long_answers * 5).min(25)) as i64;
    tactical -= (((avg_words - 15.0).max(0.0) * 2.0) as usize).min(20) as i64;
    tactical += ((short_answers * 2).min(15)) as i64;

    let mut professionalism = 90i64;
    professionalism -= ((reactions * 10).min(25)) as i64;
    professionalism -= ((threats * 8).min(20)) as i64;
    professionalism -= ((sarcasm * 7).min(20)) as i64;

    let mut directness = 85i64;
    directness -= ((recalls * 8).min(25)) as i64;
    directness -= ((hedges * 5).min(20)) as i64;
    directness += ((short_answers * 2).min(10)) as i64;

    let inconsistency_flags = req
        .alerts
        .iter()
        .filter(|a| a.alert_type == crate::models::AlertType::Inconsistency)
        .count();
    let mut consistency = 85i64;
    consistency -= ((contradictions * 6).min(30)) as i64;
    consistency -= ((inconsistency_flags * 10).min(30)) as i64;

    let weakness_map = WeaknessMap {
        composure,
        tactical_discipline: tactical,
        professionalism,
        directness,
        consistency,
    }
    .clamped();

    let session_score = (weakness_map.composure
        + weakness_map.tactical_discipline
        + weakness_map.professionalism
        + weakness_map.directness
        + weakness_map.consistency)
        / 5;

    let consistency_rate =
        (1.0 - (inconsistency_flags as f64 / answer_count as f64)).clamp(0.0, 1.0);

    let mut recommendations = Vec::new();
    if weakness_map.tactical_discipline < 65 {
        recommendations.push(
            "Adopt the ten-word rule: no answer should exceed ten words unless the question demands a narrative.".to_string(),
        );
    }
    if weakness_map.directness < 65 {
        recommendations.push(
            "Replace recall hedges with bounded statements; never hedge twice on the same topic.".to_string(),
        );
    }
    if weakness_map.composure < 65 {
        recommendations.push(
            "Practice a three-count breath before answering to eliminate reactive stress signals.".to_string(),
        );
    }
    if weakness_map.professionalism < 65 {
        recommendations.push(
            "Treat every question as coming from the judge; drop all editorial commentary.".to_string(),
        );
    }
    if weakness_map.consistency < 65 {
        recommendations.push(
            "Write down your three core facts and trace every answer back to one of them.".to_string(),
        );
    }
    normalize_recommendations(&mut recommendations);

    let narrative_text = format!(
        "Rule-based assessment over {} exchanges. Average answer length {:.0} words; \
         {} hedging phrases and {} recall hedges detected; {} contradiction markers. \
         Overall score {} of 100.",
        req.transcript.len(),
        avg_words,
        hedges,
        recalls,
        contradictions,
        session_score,
    );

    let (confirmed_flags, objection_count, composure_alerts) = count_alerts(&req.alerts);

    BriefOutcome {
        session_score,
        consistency_rate,
        top_recommendations: recommendations,
        narrative_text,
        weakness_map,
        confirmed_flags,
        objection_count,
        composure_alerts,
        fallback_used: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::reviewer::{AlertSummary, TranscriptEntry};
    use crate::models::{AlertStatus, AlertType, CaseType, WitnessRole};

    fn request(witness_lines: &[&str]) -> BriefRequest {
        let mut transcript = Vec::new();
        for (i, line) in witness_lines.iter().enumerate() {
            transcript.push(TranscriptEntry {
                speaker: SpeakerRole::Interrogator,
                content: format!("Question {i}?"),
            });
            transcript.push(TranscriptEntry {
                speaker: SpeakerRole::Witness,
                content: line.to_string(),
            });
        }
        BriefRequest {
            transcript,
            alerts: vec![],
            case_type: CaseType::Other,
            witness_role: WitnessRole::Defendant,
            aggression: Aggression::Standard,
            duration_minutes: 30,
            question_count: witness_lines.len() as i64,
        }
    }

    #[test]
    fn test_schema_bounds_hold() {
        let outcome = fallback_brief(&request(&[
            "I think maybe it was the CFO, I'm not sure, perhaps in March, possibly later, \
             honestly there were so many meetings that quarter I cannot keep them apart at all",
            "I don't recall.",
            "[scoff] Obviously not.",
        ]));

        assert!((0..=100).contains(&outcome.session_score));
        assert!((0.0..=1.0).contains(&outcome.consistency_rate));
        assert_eq!(outcome.top_recommendations.len(), 3);
        let m = outcome.weakness_map;
        for dim in [
            m.composure,
            m.tactical_discipline,
            m.professionalism,
            m.directness,
            m.consistency,
        ] {
            assert!((0..=100).contains(&dim));
        }
        assert!(outcome.fallback_used);
    }

    #[test]
    fn test_hedging_drags_directness_down() {
        let clean = fallback_brief(&request(&["No.", "Yes.", "At the office."]));
        let hedgy = fallback_brief(&request(&[
            "I think maybe, perhaps, possibly, I'm not sure, I believe so",
            "I don't recall. I cannot recall that either.",
            "Maybe, I believe, perhaps.",
        ]));
        assert!(hedgy.weakness_map.directness < clean.weakness_map.directness);
    }

    #[test]
    fn test_counters_come_from_alerts() {
        let mut req = request(&["No."]);
        req.alerts = vec![
            AlertSummary {
                alert_type: AlertType::Objection,
                status: AlertStatus::Pending,
                confidence: 0.8,
                prior_quote: None,
            },
            AlertSummary {
                alert_type: AlertType::Inconsistency,
                status: AlertStatus::Confirmed,
                confidence: 0.9,
                prior_quote: Some("prior".to_string()),
            },
        ];
        let outcome = fallback_brief(&req);
        assert_eq!(outcome.objection_count, 1);
        assert_eq!(outcome.confirmed_flags, 1);
        assert_eq!(outcome.composure_alerts, 0);
    }

    #[test]
    fn test_empty_transcript_does_not_panic() {
        let outcome = fallback_brief(&request(&[]));
        assert!((0..=100).contains(&outcome.session_score));
        assert_eq!(outcome.top_recommendations.len(), 3);
    }
}
