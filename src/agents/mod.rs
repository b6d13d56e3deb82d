//! AI Agents
//! Mission: Four cooperating agents over the retrieval tier and model clients
//!
//! Interrogator (streaming), Objection Classifier, Inconsistency Detector,
//! and Review Orchestrator. Requests and results are tagged variants; the
//! session orchestrator dispatches by tag instead of passing loose maps
//! around. Read-path agents degrade internally and never surface upstream
//! failures to the caller.

pub mod detector;
pub mod heuristics;
pub mod interrogator;
pub mod objection;
pub mod reviewer;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clients::{ChatClient, ClassifierClient, ClientError};
use crate::models::{Aggression, CaseType, WitnessRole};
use crate::retrieval::RetrievalClient;

pub use detector::{InconsistencyRequest, InconsistencyResult};
pub use interrogator::InterrogatorRequest;
pub use objection::{ObjectionRequest, ObjectionResult};
pub use reviewer::{BriefOutcome, BriefRequest};

/// Everything the prompt builders need to know about the matter at hand.
/// Assembled by the orchestrator from the case, witness, and session rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseProfile {
    pub case_id: Uuid,
    pub case_name: String,
    pub case_type: CaseType,
    pub opposing_party: String,
    pub deposition_date: String,
    pub witness_name: String,
    pub witness_role: WitnessRole,
    pub extracted_facts: String,
    pub prior_statements: String,
    pub exhibit_list: String,
    pub focus_areas: String,
    pub aggression: Aggression,
}

/// Tagged agent request. One variant per agent.
pub enum AgentRequest {
    Interrogator(InterrogatorRequest),
    Objection(ObjectionRequest),
    Inconsistency(InconsistencyRequest),
    Brief(BriefRequest),
}

/// Tagged agent result, matching `AgentRequest` variant for variant.
pub enum AgentResult {
    /// Lazy token stream; dropping it cancels the upstream model call.
    Question(QuestionStream),
    Objection(ObjectionResult),
    Inconsistency(InconsistencyResult),
    Brief(BriefOutcome),
}

pub type QuestionStream = BoxStream<'static, Result<String, ClientError>>;

/// The agent tier: stateless functions over shared clients.
#[derive(Clone)]
pub struct Agents {
    pub chat: ChatClient,
    pub classifier: ClassifierClient,
    pub retrieval: RetrievalClient,
}

impl Agents {
    pub fn new(chat: ChatClient, classifier: ClassifierClient, retrieval: RetrievalClient) -> Self {
        Self {
            chat,
            classifier,
            retrieval,
        }
    }

    /// Dispatch one request by variant tag.
    ///
    /// Objection, Inconsistency, and Brief always produce a result (they
    /// degrade internally); only the Interrogator propagates `Unavailable`,
    /// because there is nothing useful to stream without the model.
    pub async fn dispatch(&self, request: AgentRequest) -> Result<AgentResult, ClientError> {
        match request {
            AgentRequest::Interrogator(req) => {
                let stream = interrogator::stream_question(&self.chat, &self.retrieval, req).await?;
                Ok(AgentResult::Question(stream))
            }
            AgentRequest::Objection(req) => Ok(AgentResult::Objection(
                objection::classify(&self.classifier, &self.retrieval, req).await,
            )),
            AgentRequest::Inconsistency(req) => Ok(AgentResult::Inconsistency(
                detector::detect(&self.classifier, &self.chat, &self.retrieval, req).await,
            )),
            AgentRequest::Brief(req) => {
                Ok(AgentResult::Brief(reviewer::generate(&self.chat, req).await))
            }
        }
    }
}

/// Char-boundary-safe prefix truncation for prompt assembly.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // multibyte safety
        assert_eq!(truncate_chars("dépôt légal", 4), "dépô");
    }
}
