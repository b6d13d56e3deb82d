//! Configuration
//! Mission: Collect all environment-driven settings once at startup
//!
//! Loaded after dotenv in main; handlers receive it through AppState rather
//! than reading ambient process state.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub metrics_port: u16,
    pub frontend_url: String,

    pub db_path: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,

    // Streaming chat model (Interrogator, Reviewer)
    pub chat_api_key: String,
    pub chat_base_url: String,
    pub chat_model: String,

    // Fast classifier model (Objection, contradiction scorer)
    pub classifier_api_key: String,
    pub classifier_base_url: String,
    pub classifier_model: String,
    pub classifier_timeout_ms: u64,
    pub classifier_http_referer: Option<String>,
    pub classifier_x_title: Option<String>,

    // Voice service (TTS / STT)
    pub voice_api_key: String,
    pub voice_base_url: String,
    pub voice_interrogator_id: String,
    pub voice_coach_id: String,
    pub voice_timeout_secs: u64,

    // Retrieval tier
    pub retrieval_base_url: String,
    pub retrieval_api_key: String,
    pub retrieval_prior_index: String,
    pub retrieval_rules_index: String,
    pub retrieval_timeout_secs: u64,

    // Blob storage (S3-compatible)
    pub blob_endpoint: String,
    pub blob_bucket: String,
    pub blob_region: String,
    pub blob_access_key: String,
    pub blob_secret_key: String,

    // Background sweeper
    pub sweep_interval_secs: u64,
    pub sweep_grace_minutes: i64,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn var_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: parse_or("PORT", 4000),
            metrics_port: parse_or("METRICS_PORT", 9464),
            frontend_url: var_or("FRONTEND_URL", "http://localhost:5173"),

            db_path: resolve_data_path(var_opt("DB_PATH"), "veritas.db"),
            jwt_secret: var_or(
                "JWT_SECRET",
                "dev-secret-change-in-production-minimum-32-characters",
            ),
            jwt_expiration_hours: parse_or("JWT_EXPIRATION_HOURS", 8),

            chat_api_key: var_or("CHAT_API_KEY", ""),
            chat_base_url: var_or("CHAT_BASE_URL", "https://api.anthropic.com/v1"),
            chat_model: var_or("CHAT_MODEL", "claude-sonnet-4-5"),

            classifier_api_key: var_or("CLASSIFIER_API_KEY", ""),
            classifier_base_url: var_or("CLASSIFIER_BASE_URL", "https://openrouter.ai/api/v1"),
            classifier_model: var_or(
                "CLASSIFIER_MODEL",
                "nvidia/llama-3.1-nemotron-ultra-253b-v1",
            ),
            classifier_timeout_ms: parse_or("CLASSIFIER_TIMEOUT_MS", 15_000),
            classifier_http_referer: var_opt("CLASSIFIER_HTTP_REFERER"),
            classifier_x_title: var_opt("CLASSIFIER_X_TITLE"),

            voice_api_key: var_or("VOICE_API_KEY", ""),
            voice_base_url: var_or("VOICE_BASE_URL", "https://api.elevenlabs.io/v1"),
            voice_interrogator_id: var_or("VOICE_INTERROGATOR_ID", ""),
            voice_coach_id: var_or("VOICE_COACH_ID", ""),
            voice_timeout_secs: parse_or("VOICE_TIMEOUT_SECS", 60),

            retrieval_base_url: var_or("RETRIEVAL_BASE_URL", ""),
            retrieval_api_key: var_or("RETRIEVAL_API_KEY", ""),
            retrieval_prior_index: var_or("RETRIEVAL_PRIOR_INDEX", "prior_statements"),
            retrieval_rules_index: var_or("RETRIEVAL_RULES_INDEX", "evidentiary_rules"),
            retrieval_timeout_secs: parse_or("RETRIEVAL_TIMEOUT_SECS", 10),

            blob_endpoint: var_or("BLOB_ENDPOINT", ""),
            blob_bucket: var_or("BLOB_BUCKET", "veritas-artifacts"),
            blob_region: var_or("BLOB_REGION", "us-east-1"),
            blob_access_key: var_or("BLOB_ACCESS_KEY", ""),
            blob_secret_key: var_or("BLOB_SECRET_KEY", ""),

            sweep_interval_secs: parse_or("SWEEP_INTERVAL_SECS", 60),
            sweep_grace_minutes: parse_or("SWEEP_GRACE_MINUTES", 10),
        }
    }

    pub fn chat_configured(&self) -> bool {
        !self.chat_api_key.trim().is_empty()
    }

    pub fn classifier_configured(&self) -> bool {
        !self.classifier_api_key.trim().is_empty()
    }

    pub fn voice_configured(&self) -> bool {
        !self.voice_api_key.trim().is_empty()
    }

    pub fn retrieval_configured(&self) -> bool {
        !self.retrieval_base_url.trim().is_empty()
    }

    pub fn blob_configured(&self) -> bool {
        !self.blob_endpoint.trim().is_empty() && !self.blob_access_key.trim().is_empty()
    }
}

/// Relative DB paths resolve against the crate directory, not the caller's
/// cwd, so running from elsewhere doesn't create a stray empty database.
fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return base.join(default_filename).to_string_lossy().to_string();
    };

    let p = PathBuf::from(raw);
    if p.is_absolute() {
        return p.to_string_lossy().to_string();
    }
    base.join(p).to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_env();
        assert_eq!(config.retrieval_timeout_secs, 10);
        assert_eq!(config.classifier_timeout_ms, 15_000);
        assert_eq!(config.voice_timeout_secs, 60);
        assert_eq!(config.sweep_interval_secs, 60);
    }

    #[test]
    fn test_resolve_data_path_absolute_passthrough() {
        let p = resolve_data_path(Some("/tmp/x.db".to_string()), "default.db");
        assert_eq!(p, "/tmp/x.db");
    }

    #[test]
    fn test_resolve_data_path_default_is_anchored() {
        let p = resolve_data_path(None, "default.db");
        assert!(p.ends_with("default.db"));
        assert!(PathBuf::from(p).is_absolute());
    }
}
