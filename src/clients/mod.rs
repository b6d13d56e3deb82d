//! Model Clients
//! Mission: Stateless adapters for the upstream AI services
//!
//! Three contracts: streaming chat (Interrogator, Reviewer), fast classifier
//! (contradiction scorer, objection analysis), and voice synthesis /
//! transcription. Every call carries its own timeout; `Unavailable` and
//! `BadResponse` are surfaced distinctly so callers can pick fallbacks.

pub mod chat;
pub mod classifier;
pub mod json_extract;
pub mod voice;

pub use chat::ChatClient;
pub use classifier::ClassifierClient;
pub use voice::VoiceClient;

use thiserror::Error;

/// Upstream client failure. The Inconsistency Detector switches confidence
/// thresholds on `Unavailable`, so the two variants must not be conflated.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure, timeout, missing credentials, or a 5xx: the
    /// upstream never produced a usable answer.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    /// The upstream answered but the payload violated its contract.
    #[error("bad upstream response: {0}")]
    BadResponse(String),
}

impl ClientError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClientError::Unavailable(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ClientError::Unavailable(err.to_string())
        } else if err.is_decode() {
            ClientError::BadResponse(err.to_string())
        } else {
            ClientError::Unavailable(err.to_string())
        }
    }
}
