//! Objection Classifier Agent
//! Mission: Flag objectionable outgoing questions before the witness answers
//!
//! Retrieval-augmented single call against the fast classifier. Any failure
//! (transport, timeout, or unparseable output) collapses to the documented
//! non-objectionable zero-confidence default. A parse error must never reach
//! the client.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::clients::json_extract::extract_json;
use crate::clients::ClassifierClient;
use crate::models::ObjectionCategory;
use crate::retrieval::RetrievalClient;

const MAX_RESPONSE_TOKENS: u32 = 256;
const RULE_CONTEXT_K: usize = 3;

const OBJECTION_SYSTEM: &str = r#"You are an expert attorney specializing in evidence law.
Analyze the given deposition question for objectionable content.
Categories and operational definitions:
- LEADING: suggests its own answer or puts words in the witness's mouth.
- HEARSAY: asks the witness to repeat an out-of-court statement for its truth.
- COMPOUND: contains "and", "or", "also", "as well as", or "both" while asking
  about two or more distinct facts. Flag these with high confidence.
- ASSUMES_FACTS: presupposes a fact not yet established in the record.
- SPECULATION: asks the witness to guess about matters outside their knowledge.
Respond ONLY with valid JSON. No preamble, no markdown.

JSON format:
{
  "is_objectionable": boolean,
  "category": "LEADING" | "HEARSAY" | "COMPOUND" | "ASSUMES_FACTS" | "SPECULATION" | null,
  "rule_id": string | null,
  "explanation": string | null,
  "confidence": number
}"#;

pub struct ObjectionRequest {
    pub question_number: i64,
    pub question_text: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ObjectionResult {
    pub objectionable: bool,
    pub category: Option<ObjectionCategory>,
    pub rule_id: Option<String>,
    pub explanation: Option<String>,
    pub confidence: f64,
    pub processing_ms: u64,
}

impl ObjectionResult {
    /// The documented degraded default: non-objectionable, zero confidence.
    pub fn default_clear(processing_ms: u64) -> Self {
        Self {
            objectionable: false,
            category: None,
            rule_id: None,
            explanation: None,
            confidence: 0.0,
            processing_ms,
        }
    }
}

/// Classify one question. Rule context is best-effort; the call itself is
/// never allowed to fail outward.
pub async fn classify(
    classifier: &ClassifierClient,
    retrieval: &RetrievalClient,
    req: ObjectionRequest,
) -> ObjectionResult {
    let start = Instant::now();

    let rules = retrieval
        .search_evidentiary_rules(&req.question_text, RULE_CONTEXT_K, true)
        .await;

    let mut prompt = format!(
        "Analyze this deposition question for objections:\n\n\"{}\"",
        req.question_text
    );
    if !rules.is_empty() {
        prompt.push_str("\n\nRelevant evidentiary rules:\n");
        for rule in &rules {
            prompt.push_str(&format!("[{}] {}\n", rule.rule_id, rule.content));
        }
    }

    let raw = match classifier
        .complete(OBJECTION_SYSTEM, &prompt, MAX_RESPONSE_TOKENS)
        .await
    {
        Ok(output) => output.content,
        Err(e) => {
            warn!(error = %e, "objection classifier call failed — returning clear default");
            return ObjectionResult::default_clear(start.elapsed().as_millis() as u64);
        }
    };

    let mut result = parse_objection_response(&raw);
    result.processing_ms = start.elapsed().as_millis() as u64;
    debug!(
        objectionable = result.objectionable,
        confidence = result.confidence,
        "objection classification done"
    );
    result
}

/// Pure parse of the classifier payload. Total parse failure yields the
/// zero-confidence default.
pub fn parse_objection_response(raw: &str) -> ObjectionResult {
    let Ok(value) = extract_json(raw) else {
        return ObjectionResult::default_clear(0);
    };
    parse_objection_value(&value)
}

fn parse_objection_value(value: &Value) -> ObjectionResult {
    let objectionable = value["is_objectionable"].as_bool().unwrap_or(false);
    let confidence = value["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0);

    let category = value["category"]
        .as_str()
        .and_then(ObjectionCategory::parse);

    // An objectionable verdict without a recognizable category is kept, but
    // carries no category rather than a guessed one.
    ObjectionResult {
        objectionable,
        category: if objectionable { category } else { None },
        rule_id: value["rule_id"].as_str().map(str::to_string),
        explanation: value["explanation"].as_str().map(str::to_string),
        confidence,
        processing_ms: 0,
    }
}
