//! Fast Classifier Client
//! Mission: Single-shot completions against the low-latency scoring model
//!
//! OpenRouter-style chat completions endpoint. Used by the contradiction
//! scorer and the objection analysis; both expect small JSON payloads back.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ClientError;
use crate::config::Config;

#[derive(Clone)]
pub struct ClassifierClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    referer: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    pub content: String,
    pub latency_ms: u64,
}

impl ClassifierClient {
    pub fn from_config(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.classifier_base_url.clone(),
            api_key: config.classifier_api_key.clone(),
            model: config.classifier_model.clone(),
            timeout: Duration::from_millis(config.classifier_timeout_ms),
            referer: config.classifier_http_referer.clone(),
            title: config.classifier_x_title.clone(),
        }
    }

    pub fn configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// One completion call. `system` may be empty; the prompt contract lives
    /// with the caller.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<ClassifierOutput, ClientError> {
        if !self.configured() {
            return Err(ClientError::Unavailable(
                "classifier api key not configured".into(),
            ));
        }

        let start = Instant::now();
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user.to_string(),
        });

        let req = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.1),
            max_tokens: Some(max_tokens),
        };

        let mut http_req = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(r) = &self.referer {
            http_req = http_req.header("HTTP-Referer", r);
        }
        if let Some(t) = &self.title {
            http_req = http_req.header("X-Title", t);
        }

        let resp = http_req.json(&req).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ClientError::Unavailable(format!(
                "classifier {}: {}",
                status.as_u16(),
                snippet(&body)
            )));
        }
        if !status.is_success() {
            return Err(ClientError::BadResponse(format!(
                "classifier {}: {}",
                status.as_u16(),
                snippet(&body)
            )));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::BadResponse(format!("classifier json parse: {e}")))?;
        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.clone())
            .ok_or_else(|| ClientError::BadResponse("classifier returned no choices".into()))?;

        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(latency_ms, model = %self.model, "classifier completion");

        Ok(ClassifierOutput {
            content,
            latency_ms,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageOut>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageOut {
    content: String,
}

fn snippet(body: &str) -> String {
    body.chars().take(300).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(api_key: &str) -> ClassifierClient {
        ClassifierClient {
            http: reqwest::Client::new(),
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: api_key.to_string(),
            model: "test-model".to_string(),
            timeout: Duration::from_millis(200),
            referer: None,
            title: None,
        }
    }

    #[tokio::test]
    async fn test_unconfigured_is_unavailable() {
        let client = test_client("");
        let err = client.complete("sys", "user", 64).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        let client = test_client("key");
        let err = client.complete("sys", "user", 64).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{"choices":[{"message":{"content":"{\"x\":1}"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.as_ref().unwrap().content,
            "{\"x\":1}"
        );
    }
}
