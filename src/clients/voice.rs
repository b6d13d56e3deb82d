//! Voice Client
//! Mission: Text-to-speech and speech-to-text for the live session
//!
//! Voice is strictly best-effort: callers treat empty audio / empty text as
//! non-fatal and fall back to text-only operation.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::ClientError;
use crate::config::Config;

#[derive(Clone)]
pub struct VoiceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    pub interrogator_voice_id: String,
    pub coach_voice_id: String,
}

impl VoiceClient {
    pub fn from_config(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.voice_base_url.clone(),
            api_key: config.voice_api_key.clone(),
            timeout: Duration::from_secs(config.voice_timeout_secs),
            interrogator_voice_id: config.voice_interrogator_id.clone(),
            coach_voice_id: config.voice_coach_id.clone(),
        }
    }

    pub fn configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Synthesize speech for `text`. Returns raw audio bytes.
    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, ClientError> {
        if !self.configured() || voice_id.trim().is_empty() {
            return Err(ClientError::Unavailable("voice service not configured".into()));
        }

        let resp = self
            .http
            .post(format!("{}/text-to-speech/{}", self.base_url, voice_id))
            .timeout(self.timeout)
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": "eleven_turbo_v2_5",
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "TTS request failed");
            return Err(ClientError::Unavailable(format!(
                "tts {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let audio = resp.bytes().await?;
        debug!(bytes = audio.len(), "TTS audio synthesized");
        Ok(audio.to_vec())
    }

    /// Transcribe witness audio. Empty text is returned on success with no
    /// recognizable speech; the caller substitutes its own placeholder.
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String, ClientError> {
        if !self.configured() {
            return Err(ClientError::Unavailable("voice service not configured".into()));
        }

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("answer.webm")
            .mime_str("application/octet-stream")
            .map_err(|e| ClientError::BadResponse(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model_id", "scribe_v1")
            .part("file", part);

        let resp = self
            .http
            .post(format!("{}/speech-to-text", self.base_url))
            .timeout(self.timeout)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "STT request failed");
            return Err(ClientError::Unavailable(format!(
                "stt {}",
                status.as_u16()
            )));
        }

        let parsed: TranscriptResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::BadResponse(format!("stt json parse: {e}")))?;
        Ok(parsed.text.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    text: Option<String>,
}
