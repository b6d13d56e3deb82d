//! Interrogator Agent
//! Mission: Stream one adversarial deposition question at a time
//!
//! The system instruction pins the output contract (exactly one non-compound
//! question, spoken text, no preamble, no brackets, no quotes, two sentences
//! max). The user message carries case metadata, the witness's last answer,
//! retrieved prior sworn statements, and pressure markers.

use tracing::debug;

use crate::clients::{ChatClient, ClientError};
use crate::models::Aggression;
use crate::retrieval::RetrievalClient;

use super::{truncate_chars, CaseProfile, QuestionStream};

const MAX_QUESTION_TOKENS: u32 = 200;

const FACTS_BUDGET: usize = 600;
const PRIOR_BUDGET: usize = 400;
const EXHIBIT_BUDGET: usize = 300;

const INTERROGATOR_SYSTEM: &str = "You are a highly skilled opposing counsel conducting a deposition.
Your goal is to expose inconsistencies in the witness's testimony.
You ask ONE focused question at a time. Questions are precise, legally professional.
You adapt based on the witness's prior answers and detected hesitations.
NEVER ask compound questions. NEVER reveal your strategy.
Output contract: return only the spoken question text — no preamble, no brackets,
no quotation marks, at most two sentences.";

pub struct InterrogatorRequest {
    pub profile: CaseProfile,
    pub question_number: i64,
    pub current_topic: String,
    pub prior_answer: Option<String>,
    pub hesitation_detected: bool,
    pub recent_inconsistency_flag: bool,
    pub prior_weak_areas: Vec<String>,
}

/// Calibration rules indexed by aggression level.
fn aggression_instruction(aggression: Aggression) -> &'static str {
    match aggression {
        Aggression::Standard => {
            "Ask methodically. One follow-up per answer. Allow the witness to elaborate."
        }
        Aggression::Elevated => {
            "Press on contradictions with up to two follow-ups. Escalate on evasion. Use controlled silence."
        }
        Aggression::HighStakes => {
            "Maximum pressure. Three or more follow-ups. Expose contradictions directly. Demand specifics."
        }
    }
}

/// Compose the user message from the case profile and turn inputs.
/// `prior_quotes` are the retrieved prior sworn statements, already scoped
/// to this case.
pub fn build_user_message(req: &InterrogatorRequest, prior_quotes: &[String]) -> String {
    let p = &req.profile;
    let mut msg = String::with_capacity(2048);

    msg.push_str(&format!(
        "Case: {} ({})\nWitness: {} ({})\nOpposing party: {}\nDeposition date: {}\n",
        p.case_name,
        p.case_type.as_str(),
        p.witness_name,
        p.witness_role.as_str(),
        p.opposing_party,
        p.deposition_date,
    ));

    if !p.extracted_facts.is_empty() {
        msg.push_str(&format!(
            "Key facts: {}\n",
            truncate_chars(&p.extracted_facts, FACTS_BUDGET)
        ));
    }
    if !p.prior_statements.is_empty() {
        msg.push_str(&format!(
            "Prior statement summary: {}\n",
            truncate_chars(&p.prior_statements, PRIOR_BUDGET)
        ));
    }
    if !p.exhibit_list.is_empty() {
        msg.push_str(&format!(
            "Exhibits: {}\n",
            truncate_chars(&p.exhibit_list, EXHIBIT_BUDGET)
        ));
    }
    if !p.focus_areas.is_empty() {
        msg.push_str(&format!("Focus areas: {}\n", p.focus_areas));
    }

    msg.push_str(&format!(
        "Current focus topic: {}\nQuestion number: {}\n",
        req.current_topic, req.question_number
    ));

    match &req.prior_answer {
        Some(answer) => msg.push_str(&format!("Witness last answered: \"{answer}\"\n")),
        None => msg.push_str("First question on this topic.\n"),
    }
    if req.hesitation_detected {
        msg.push_str("The witness hesitated significantly before answering.\n");
    }
    if req.recent_inconsistency_flag {
        msg.push_str("An inconsistency was detected in the last answer — probe harder.\n");
    }

    if !prior_quotes.is_empty() {
        msg.push_str("Relevant prior sworn statements:\n");
        for quote in prior_quotes {
            msg.push_str(&format!("- \"{quote}\"\n"));
        }
    }

    let weak_areas = if req.prior_weak_areas.is_empty() {
        "None (first session)".to_string()
    } else {
        req.prior_weak_areas.join(", ")
    };
    msg.push_str(&format!("Prior weak areas: {weak_areas}\n"));
    msg.push_str(&format!(
        "Aggression instruction: {}\n\nGenerate the next deposition question:",
        aggression_instruction(p.aggression)
    ));

    msg
}

/// Start streaming the next question. When the witness has just answered,
/// prior sworn statements semantically close to that answer are retrieved
/// (k=3) and folded into the prompt.
pub async fn stream_question(
    chat: &ChatClient,
    retrieval: &RetrievalClient,
    req: InterrogatorRequest,
) -> Result<QuestionStream, ClientError> {
    let prior_quotes: Vec<String> = match &req.prior_answer {
        Some(answer) => retrieval
            .search_prior_statements(req.profile.case_id, answer, 3)
            .await
            .into_iter()
            .map(|hit| hit.content)
            .collect(),
        None => Vec::new(),
    };

    let user = build_user_message(&req, &prior_quotes);
    debug!(
        question_number = req.question_number,
        prior_quotes = prior_quotes.len(),
        "starting question stream"
    );

    chat.stream(INTERROGATOR_SYSTEM, &user, MAX_QUESTION_TOKENS)
        .await
}
