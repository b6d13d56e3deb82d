//! Blob Storage
//! Mission: Best-effort writes of audio and PDF artifacts to S3-compatible storage
//!
//! Keys follow `sessions/{firm}/{session}/answers/{ms}_q{n}.{ext}` and
//! `briefs/{firm}/{brief}.pdf`. Every write is signed with AWS SigV4; a
//! missing configuration or failed upload degrades to "no blob stored",
//! never to a failed session operation.

use anyhow::{Context, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct BlobStore {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    region: String,
    access_key: String,
    secret_key: String,
}

impl BlobStore {
    pub fn from_config(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            endpoint: config.blob_endpoint.trim_end_matches('/').to_string(),
            bucket: config.blob_bucket.clone(),
            region: config.blob_region.clone(),
            access_key: config.blob_access_key.clone(),
            secret_key: config.blob_secret_key.clone(),
        }
    }

    pub fn configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.access_key.is_empty()
    }

    /// Upload one object. Returns the key on success, None when storage is
    /// unconfigured or the upload failed (logged, not raised).
    pub async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Option<String> {
        if !self.configured() {
            debug!("blob storage not configured — skipping upload of {}", key);
            return None;
        }
        match self.put_signed(key, bytes, content_type).await {
            Ok(()) => Some(key.to_string()),
            Err(e) => {
                warn!(key, error = %e, "⚠️ blob upload failed — continuing without artifact");
                None
            }
        }
    }

    async fn put_signed(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let host = self
            .endpoint
            .strip_prefix("https://")
            .or_else(|| self.endpoint.strip_prefix("http://"))
            .unwrap_or(&self.endpoint)
            .to_string();
        let uri = format!("/{}/{}", self.bucket, key);
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(&bytes));

        let authorization = sign_v4(
            &SigningInput {
                method: "PUT",
                uri: &uri,
                host: &host,
                amz_date: &amz_date,
                date: &date,
                region: &self.region,
                payload_hash: &payload_hash,
            },
            &self.access_key,
            &self.secret_key,
        )?;

        let resp = self
            .http
            .put(format!("{}{}", self.endpoint, uri))
            .header("Host", &host)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", &payload_hash)
            .header("Authorization", authorization)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .context("blob PUT failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("blob PUT returned {}", resp.status());
        }
        Ok(())
    }
}

struct SigningInput<'a> {
    method: &'a str,
    uri: &'a str,
    host: &'a str,
    amz_date: &'a str,
    date: &'a str,
    region: &'a str,
    payload_hash: &'a str,
}

/// AWS Signature Version 4 over the three canonical headers we send.
fn sign_v4(input: &SigningInput<'_>, access_key: &str, secret_key: &str) -> Result<String> {
    let canonical_headers = format!(
        "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
        input.host, input.payload_hash, input.amz_date
    );
    let signed_headers = "host;x-amz-content-sha256;x-amz-date";
    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        input.method, input.uri, canonical_headers, signed_headers, input.payload_hash
    );

    let scope = format!("{}/{}/s3/aws4_request", input.date, input.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        input.amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), input.date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, input.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, b"s3")?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    Ok(format!(
        "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, SignedHeaders={signed_headers}, Signature={signature}"
    ))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| anyhow::anyhow!("HMAC key error: {e}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// `sessions/{firm_id}/{session_id}/answers/{ms_epoch}_q{n}.{ext}`
pub fn answer_audio_key(
    firm_id: Uuid,
    session_id: Uuid,
    ms_epoch: i64,
    question_number: i64,
    ext: &str,
) -> String {
    format!("sessions/{firm_id}/{session_id}/answers/{ms_epoch}_q{question_number}.{ext}")
}

/// `briefs/{firm_id}/{brief_id}.pdf`
pub fn brief_pdf_key(firm_id: Uuid, brief_id: Uuid) -> String {
    format!("briefs/{firm_id}/{brief_id}.pdf")
}

/// Companion narration audio next to the PDF.
pub fn brief_audio_key(firm_id: Uuid, brief_id: Uuid) -> String {
    format!("briefs/{firm_id}/{brief_id}_coach.mp3")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(payload_hash: &'a str) -> SigningInput<'a> {
        SigningInput {
            method: "PUT",
            uri: "/bucket/sessions/a/b/answers/1_q1.webm",
            host: "storage.example.com",
            amz_date: "20260301T120000Z",
            date: "20260301",
            region: "us-east-1",
            payload_hash,
        }
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = sign_v4(&input("abc123"), "AKID", "secret").unwrap();
        let b = sign_v4(&input("abc123"), "AKID", "secret").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_varies_with_secret_and_payload() {
        let base = sign_v4(&input("abc123"), "AKID", "secret").unwrap();
        assert_ne!(base, sign_v4(&input("abc123"), "AKID", "other").unwrap());
        assert_ne!(base, sign_v4(&input("def456"), "AKID", "secret").unwrap());
    }

    #[test]
    fn test_authorization_header_shape() {
        let auth = sign_v4(&input("abc123"), "AKID", "secret").unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKID/20260301/us-east-1/s3/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
        assert!(auth.contains("Signature="));
    }

    #[test]
    fn test_key_shapes() {
        let firm = Uuid::new_v4();
        let session = Uuid::new_v4();
        let key = answer_audio_key(firm, session, 1_700_000_000_123, 4, "webm");
        assert_eq!(
            key,
            format!("sessions/{firm}/{session}/answers/1700000000123_q4.webm")
        );

        let brief = Uuid::new_v4();
        assert_eq!(brief_pdf_key(firm, brief), format!("briefs/{firm}/{brief}.pdf"));
    }

    #[tokio::test]
    async fn test_unconfigured_put_returns_none() {
        let store = BlobStore {
            http: reqwest::Client::new(),
            endpoint: String::new(),
            bucket: "b".into(),
            region: "us-east-1".into(),
            access_key: String::new(),
            secret_key: String::new(),
        };
        assert!(store.put("k", vec![1], "audio/webm").await.is_none());
    }
}
