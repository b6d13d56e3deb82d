//! Retrieval Tier
//! Mission: Case-scoped and corpus-scoped semantic search over text chunks
//!
//! Two logical indexes behind one HTTP service: prior sworn statements
//! (filtered by case) and the global evidentiary-rule corpus. Reads degrade
//! to empty on any upstream failure (the agents are built for that), while
//! upserts surface a retryable error. Cross-tenant rows are dropped here
//! even if the upstream filter misbehaves; a leak past this point is a
//! fatal class of bug, not a recoverable one.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::Config;

/// One prior-statement chunk, ordered by descending similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorStatementHit {
    pub content: String,
    pub case_id: String,
    pub page: Option<i64>,
    pub line: Option<i64>,
    pub doc_type: Option<String>,
    pub witness_name: Option<String>,
    #[serde(default)]
    pub score: f64,
}

/// One evidentiary-rule chunk. Canonical key is `rule_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleHit {
    pub content: String,
    pub rule_id: String,
    pub article: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Error)]
pub enum UpsertError {
    #[error("retrieval tier not configured")]
    NotConfigured,
    /// Retryable: the chunk id is derived, so replaying the call is safe.
    #[error("retrieval upsert failed (retryable): {0}")]
    Retryable(String),
}

#[derive(Clone)]
pub struct RetrievalClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    prior_index: String,
    rules_index: String,
    timeout: Duration,
}

impl RetrievalClient {
    pub fn from_config(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.retrieval_base_url.clone(),
            api_key: config.retrieval_api_key.clone(),
            prior_index: config.retrieval_prior_index.clone(),
            rules_index: config.retrieval_rules_index.clone(),
            timeout: Duration::from_secs(config.retrieval_timeout_secs),
        }
    }

    pub fn configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    /// Nearest-neighbor search over a case's prior sworn statements.
    ///
    /// The `case_id` filter is sent server-side AND re-checked on every
    /// returned row; foreign rows are discarded and logged at error level.
    pub async fn search_prior_statements(
        &self,
        case_id: Uuid,
        query: &str,
        k: usize,
    ) -> Vec<PriorStatementHit> {
        if !self.configured() {
            warn!("retrieval tier not configured — prior statement search returning empty");
            return Vec::new();
        }

        let req = SearchRequest {
            index: self.prior_index.clone(),
            query: query.to_string(),
            top_k: k,
            filters: serde_json::json!({ "case_id": case_id.to_string() }),
        };

        let rows: Vec<PriorStatementHit> = match self.post_search(&req).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "prior statement search failed — returning empty");
                return Vec::new();
            }
        };

        let mut hits = retain_tenant_rows(rows, case_id);
        sort_prior_hits(&mut hits);
        hits.truncate(k);
        hits
    }

    /// Search the global evidentiary-rule corpus.
    pub async fn search_evidentiary_rules(
        &self,
        query: &str,
        k: usize,
        deposition_only: bool,
    ) -> Vec<RuleHit> {
        if !self.configured() {
            return Vec::new();
        }

        let filters = if deposition_only {
            serde_json::json!({ "is_deposition_relevant": true })
        } else {
            serde_json::json!({})
        };
        let req = SearchRequest {
            index: self.rules_index.clone(),
            query: query.to_string(),
            top_k: k,
            filters,
        };

        match self.post_search::<RuleHit>(&req).await {
            Ok(mut rows) => {
                rows.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                rows.truncate(k);
                rows
            }
            Err(e) => {
                warn!(error = %e, "evidentiary rule search failed — returning empty");
                Vec::new()
            }
        }
    }

    /// Upsert one prior-statement chunk. The chunk id is derived from
    /// (document_id, page, line), so re-ingesting the same chunk is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_prior_statement(
        &self,
        case_id: Uuid,
        document_id: Uuid,
        content: &str,
        page: i64,
        line: i64,
        doc_type: &str,
        witness_name: Option<&str>,
    ) -> Result<(), UpsertError> {
        if !self.configured() {
            return Err(UpsertError::NotConfigured);
        }

        let chunk_id = derive_chunk_id(document_id, page, line);
        let body = serde_json::json!({
            "index": self.prior_index,
            "id": chunk_id.to_string(),
            "content": content,
            "metadata": {
                "case_id": case_id.to_string(),
                "document_id": document_id.to_string(),
                "page": page,
                "line": line,
                "doc_type": doc_type,
                "witness_name": witness_name,
            },
        });

        let resp = self
            .http
            .post(format!("{}/upsert", self.base_url))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpsertError::Retryable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(UpsertError::Retryable(format!(
                "upsert {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }

    /// Upsert one evidentiary-rule chunk. `rule_id` is the canonical key:
    /// callers must reject source records that lack it before getting here.
    pub async fn upsert_evidentiary_rule(
        &self,
        rule_id: &str,
        article: &str,
        category: &str,
        is_deposition_relevant: bool,
        content: &str,
    ) -> Result<(), UpsertError> {
        if !self.configured() {
            return Err(UpsertError::NotConfigured);
        }

        let chunk_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, rule_id.as_bytes());
        let body = serde_json::json!({
            "index": self.rules_index,
            "id": chunk_id.to_string(),
            "content": content,
            "metadata": {
                "rule_id": rule_id,
                "article": article,
                "category": category,
                "is_deposition_relevant": is_deposition_relevant,
            },
        });

        let resp = self
            .http
            .post(format!("{}/upsert", self.base_url))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpsertError::Retryable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(UpsertError::Retryable(format!(
                "rule upsert {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn post_search<T: serde::de::DeserializeOwned>(
        &self,
        req: &SearchRequest,
    ) -> anyhow::Result<Vec<T>> {
        let resp = self
            .http
            .post(format!("{}/search", self.base_url))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("search returned {}", resp.status());
        }

        let parsed: SearchResponse<T> = resp.json().await?;
        Ok(parsed.results)
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    index: String,
    query: String,
    top_k: usize,
    filters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

/// Stable chunk id: uuid v5 over (document_id, page, line). Identical
/// arguments always map to the same id, making ingestion idempotent.
pub fn derive_chunk_id(document_id: Uuid, page: i64, line: i64) -> Uuid {
    let name = format!("{document_id}:{page}:{line}");
    Uuid::new_v5(&document_id, name.as_bytes())
}

/// Keep only rows whose stored case id matches the requested case. This is
/// the last line of defense against a misconfigured upstream filter.
fn retain_tenant_rows(rows: Vec<PriorStatementHit>, case_id: Uuid) -> Vec<PriorStatementHit> {
    let wanted = case_id.to_string();
    rows.into_iter()
        .filter(|hit| {
            if hit.case_id == wanted {
                true
            } else {
                error!(
                    got = %hit.case_id,
                    expected = %wanted,
                    "🚨 cross-tenant row returned by retrieval tier — dropped"
                );
                false
            }
        })
        .collect()
}

/// Similarity descending, ties broken by (page asc, line asc).
fn sort_prior_hits(hits: &mut [PriorStatementHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.page.unwrap_or(i64::MAX).cmp(&b.page.unwrap_or(i64::MAX)))
            .then_with(|| a.line.unwrap_or(i64::MAX).cmp(&b.line.unwrap_or(i64::MAX)))
    });
}
