//! Streaming Chat Client
//! Mission: Drive the large conversational model, one token at a time
//!
//! Messages-API shape: single system prompt plus one user message. The
//! streaming call returns a pull-stream of text deltas; dropping the stream
//! aborts the underlying connection, which is how caller cancellation
//! propagates upstream. Reassembling all deltas yields the full text.

use futures_util::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::ClientError;
use crate::config::Config;

const API_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn from_config(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.chat_base_url.clone(),
            api_key: config.chat_api_key.clone(),
            model: config.chat_model.clone(),
        }
    }

    pub fn configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn request_body(&self, system: &str, user: &str, max_tokens: u32, stream: bool) -> serde_json::Value {
        json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": user}],
            "stream": stream,
        })
    }

    /// Single-shot completion. Used by the Reviewer and as the detector's
    /// fallback scorer.
    pub async fn chat(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, ClientError> {
        if !self.configured() {
            return Err(ClientError::Unavailable("chat api key not configured".into()));
        }

        let resp = self
            .http
            .post(format!("{}/messages", self.base_url))
            .timeout(std::time::Duration::from_secs(60))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(system, user, max_tokens, false))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ClientError::Unavailable(format!(
                "chat {}: {}",
                status.as_u16(),
                body.chars().take(300).collect::<String>()
            )));
        }
        if !status.is_success() {
            return Err(ClientError::BadResponse(format!(
                "chat {}: {}",
                status.as_u16(),
                body.chars().take(300).collect::<String>()
            )));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::BadResponse(format!("chat json parse: {e}")))?;
        let text = parsed
            .content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.clone())
            .ok_or_else(|| ClientError::BadResponse("chat returned no text block".into()))?;

        debug!(chars = text.len(), model = %self.model, "chat completion");
        Ok(text)
    }

    /// Streaming completion. The returned stream yields text deltas until
    /// the model stops or `max_tokens` is hit. No overall timeout; the
    /// caller cancels by dropping the stream, which aborts the connection.
    pub async fn stream(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<BoxStream<'static, Result<String, ClientError>>, ClientError> {
        if !self.configured() {
            return Err(ClientError::Unavailable("chat api key not configured".into()));
        }

        let resp = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(system, user, max_tokens, true))
            .send()
            .await?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ClientError::Unavailable(format!(
                "chat stream {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::BadResponse(format!(
                "chat stream {}: {}",
                status.as_u16(),
                body.chars().take(300).collect::<String>()
            )));
        }

        let decoder = SseDecoder::new(resp.bytes_stream().boxed());
        Ok(futures_util::stream::unfold(decoder, |mut dec| async move {
            dec.next_delta().await.map(|d| (d, dec))
        })
        .boxed())
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

/// One parsed server-sent-event line.
#[derive(Debug, PartialEq)]
enum SseFrame {
    Delta(String),
    Stop,
    Ignore,
}

/// Decode a single `data:` line from the event stream.
fn parse_sse_line(line: &str) -> SseFrame {
    let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
        return SseFrame::Ignore;
    };
    if payload.is_empty() || payload == "[DONE]" {
        return if payload == "[DONE]" {
            SseFrame::Stop
        } else {
            SseFrame::Ignore
        };
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return SseFrame::Ignore;
    };
    match value["type"].as_str() {
        Some("content_block_delta") => value["delta"]["text"]
            .as_str()
            .map(|t| SseFrame::Delta(t.to_string()))
            .unwrap_or(SseFrame::Ignore),
        Some("message_stop") => SseFrame::Stop,
        _ => SseFrame::Ignore,
    }
}

/// Incremental line-oriented SSE decoder over the response byte stream.
struct SseDecoder {
    inner: BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>,
    buf: String,
    done: bool,
}

impl SseDecoder {
    fn new(inner: BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>) -> Self {
        Self {
            inner,
            buf: String::new(),
            done: false,
        }
    }

    async fn next_delta(&mut self) -> Option<Result<String, ClientError>> {
        loop {
            while let Some(pos) = self.buf.find('\n') {
                let line = self.buf[..pos].trim_end_matches('\r').to_string();
                self.buf.drain(..=pos);
                match parse_sse_line(&line) {
                    SseFrame::Delta(text) => return Some(Ok(text)),
                    SseFrame::Stop => {
                        self.done = true;
                        return None;
                    }
                    SseFrame::Ignore => {}
                }
            }
            if self.done {
                return None;
            }
            match self.inner.next().await {
                Some(Ok(chunk)) => self.buf.push_str(&String::from_utf8_lossy(&chunk)),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_parse_delta_line() {
        let line = r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"Did you"}}"#;
        assert_eq!(parse_sse_line(line), SseFrame::Delta("Did you".to_string()));
    }

    #[test]
    fn test_parse_stop_and_noise() {
        assert_eq!(
            parse_sse_line(r#"data: {"type":"message_stop"}"#),
            SseFrame::Stop
        );
        assert_eq!(parse_sse_line("event: message_delta"), SseFrame::Ignore);
        assert_eq!(parse_sse_line(""), SseFrame::Ignore);
        assert_eq!(parse_sse_line("data: [DONE]"), SseFrame::Stop);
        assert_eq!(parse_sse_line("data: not json"), SseFrame::Ignore);
    }

    #[tokio::test]
    async fn test_decoder_reassembles_split_chunks() {
        // One SSE line split across two transport chunks, followed by stop.
        let chunks: Vec<Result<bytes::Bytes, reqwest::Error>> = vec![
            Ok(bytes::Bytes::from_static(
                b"data: {\"type\":\"content_block_delta\",\"delta\":{\"te",
            )),
            Ok(bytes::Bytes::from_static(
                b"xt\":\"Hello\"}}\ndata: {\"type\":\"message_stop\"}\n",
            )),
        ];
        let mut dec = SseDecoder::new(stream::iter(chunks).boxed());

        let first = dec.next_delta().await.unwrap().unwrap();
        assert_eq!(first, "Hello");
        assert!(dec.next_delta().await.is_none());
    }

    #[tokio::test]
    async fn test_decoder_ends_on_transport_eof() {
        let chunks: Vec<Result<bytes::Bytes, reqwest::Error>> = vec![Ok(bytes::Bytes::from_static(
            b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"a\"}}\n",
        ))];
        let mut dec = SseDecoder::new(stream::iter(chunks).boxed());
        assert_eq!(dec.next_delta().await.unwrap().unwrap(), "a");
        assert!(dec.next_delta().await.is_none());
    }
}
