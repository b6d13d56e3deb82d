//! Typed events for the question stream.
//!
//! The orchestrator emits these over an mpsc channel; the API layer turns
//! each into one SSE `data:` frame. Order contract: one QUESTION_START, any
//! number of QUESTION_CHUNKs, at most one QUESTION_AUDIO, and exactly one
//! terminal frame (QUESTION_END, or ERROR on failure).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum QuestionStreamEvent {
    #[serde(rename = "QUESTION_START")]
    Start { question_number: i64 },
    #[serde(rename = "QUESTION_CHUNK")]
    Chunk { text: String },
    #[serde(rename = "QUESTION_AUDIO")]
    Audio { audio_base64: String },
    #[serde(rename = "QUESTION_END")]
    End { full_text: String },
    #[serde(rename = "ERROR")]
    Error { code: String, message: String },
}

impl QuestionStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QuestionStreamEvent::End { .. } | QuestionStreamEvent::Error { .. }
        )
    }

    /// JSON payload for one SSE `data:` frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"ERROR\"}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags() {
        let start = QuestionStreamEvent::Start { question_number: 2 };
        assert_eq!(
            start.to_json(),
            r#"{"type":"QUESTION_START","question_number":2}"#
        );

        let chunk = QuestionStreamEvent::Chunk {
            text: "Did you".to_string(),
        };
        assert!(chunk.to_json().contains(r#""type":"QUESTION_CHUNK""#));

        let end = QuestionStreamEvent::End {
            full_text: "Did you sign it?".to_string(),
        };
        assert!(end.is_terminal());
        assert!(!chunk.is_terminal());
    }

    #[test]
    fn test_round_trip() {
        let event = QuestionStreamEvent::Error {
            code: "UPSTREAM_UNAVAILABLE".to_string(),
            message: "model timed out".to_string(),
        };
        let parsed: QuestionStreamEvent = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(parsed, event);
        assert!(parsed.is_terminal());
    }
}
