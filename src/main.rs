//! Veritas - AI Deposition Rehearsal Backend
//! Mission: Run live mock depositions with adversarial AI agents
//!
//! One binary, five subcommands: `serve` (the HTTP service), `migrate`,
//! `seed`, `ingest-rules`, and `sweep-abandoned`. Exit codes: 0 success,
//! 2 bad arguments, 10 upstream unavailable, 20 fatal internal.

mod agents;
mod api;
mod auth;
mod blob;
mod brief;
mod clients;
mod config;
mod middleware;
mod models;
mod orchestrator;
mod retrieval;
mod store;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::agents::Agents;
use crate::api::{build_router, AppState};
use crate::auth::JwtHandler;
use crate::blob::BlobStore;
use crate::brief::{spawn_worker, BriefGenerator};
use crate::clients::{ChatClient, ClassifierClient, VoiceClient};
use crate::config::Config;
use crate::models::{Aggression, CaseType, WitnessRole};
use crate::orchestrator::{sweeper::spawn_sweeper, Orchestrator};
use crate::retrieval::{RetrievalClient, UpsertError};
use crate::store::Store;

const EXIT_BAD_ARGS: u8 = 2;
const EXIT_UPSTREAM: u8 = 10;
const EXIT_FATAL: u8 = 20;

#[derive(Parser)]
#[command(name = "veritas", about = "AI deposition rehearsal backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve,
    /// Apply schema migrations and exit
    Migrate,
    /// Insert demo data for local development
    Seed,
    /// Populate the evidentiary-rule index from a JSON file
    IngestRules { file: PathBuf },
    /// Run one abandonment sweep and exit
    SweepAbandoned,
}

/// Command failure with its process exit code.
enum CliError {
    BadArgs(String),
    Upstream(String),
    Fatal(anyhow::Error),
}

impl CliError {
    fn report(self) -> ExitCode {
        match self {
            CliError::BadArgs(msg) => {
                error!("bad arguments: {msg}");
                ExitCode::from(EXIT_BAD_ARGS)
            }
            CliError::Upstream(msg) => {
                error!("upstream unavailable: {msg}");
                ExitCode::from(EXIT_UPSTREAM)
            }
            CliError::Fatal(e) => {
                error!("fatal: {e:#}");
                ExitCode::from(EXIT_FATAL)
            }
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Fatal(e)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env();

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => e.report(),
    }
}

async fn run(command: Command, config: Config) -> Result<(), CliError> {
    match command {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            let store = Store::open(&config.db_path)?;
            store.migrate()?;
            info!("✅ Migrations applied");
            Ok(())
        }
        Command::Seed => {
            let store = Store::open(&config.db_path)?;
            seed(&store)?;
            Ok(())
        }
        Command::IngestRules { file } => ingest_rules(&config, &file).await,
        Command::SweepAbandoned => {
            let swept = build_offline_orchestrator(&config)?.sweep_abandoned(config.sweep_grace_minutes);
            match swept {
                Ok(count) => {
                    info!("🧹 Swept {count} abandoned session(s)");
                    Ok(())
                }
                Err(e) => Err(CliError::Fatal(anyhow::anyhow!(e))),
            }
        }
    }
}

async fn serve(config: Config) -> Result<(), CliError> {
    info!("🚀 Veritas backend starting");

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")
        .map_err(CliError::Fatal)?;

    let store = Store::open(&config.db_path)?;
    let agents = Agents::new(
        ChatClient::from_config(http.clone(), &config),
        ClassifierClient::from_config(http.clone(), &config),
        RetrievalClient::from_config(http.clone(), &config),
    );
    let voice = VoiceClient::from_config(http.clone(), &config);
    let blob = BlobStore::from_config(http, &config);

    report_service_status(&config);

    let (brief_tx, brief_rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(
        store.clone(),
        agents.clone(),
        voice.clone(),
        blob.clone(),
        brief_tx,
    );
    let generator = BriefGenerator {
        store,
        agents,
        voice,
        blob,
    };

    spawn_worker(generator.clone(), brief_rx);
    spawn_sweeper(
        orchestrator.clone(),
        config.sweep_interval_secs,
        config.sweep_grace_minutes,
    );

    if let Err(e) = PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()
    {
        warn!(error = %e, "metrics exporter failed to start — continuing without");
    } else {
        info!("📈 Metrics exporter on :{}", config.metrics_port);
    }

    let jwt = Arc::new(JwtHandler::new(
        config.jwt_secret.clone(),
        config.jwt_expiration_hours,
    ));
    let state = AppState {
        orchestrator,
        briefs: generator,
        jwt,
        config: config.clone(),
    };
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))
        .map_err(CliError::Fatal)?;
    info!("🎯 API server listening on {addr}");

    axum::serve(listener, app)
        .await
        .context("Server error")
        .map_err(CliError::Fatal)
}

/// Minimal orchestrator for offline commands (no live channels needed).
fn build_offline_orchestrator(config: &Config) -> Result<Orchestrator, CliError> {
    let http = reqwest::Client::new();
    let store = Store::open(&config.db_path)?;
    let agents = Agents::new(
        ChatClient::from_config(http.clone(), config),
        ClassifierClient::from_config(http.clone(), config),
        RetrievalClient::from_config(http.clone(), config),
    );
    let voice = VoiceClient::from_config(http.clone(), config);
    let blob = BlobStore::from_config(http, config);
    let (brief_tx, _brief_rx) = mpsc::unbounded_channel();
    Ok(Orchestrator::new(store, agents, voice, blob, brief_tx))
}

/// Demo tenant: one firm, one attorney, one case seeded with a prior sworn
/// statement, one witness.
fn seed(store: &Store) -> Result<(), CliError> {
    let firm = store.create_firm("Demo Firm LLP", 365).map_err(CliError::Fatal)?;
    let attorney = store
        .create_user(firm.id, "demo@veritas.law", "veritas-demo", "PARTNER")
        .map_err(CliError::Fatal)?;
    let case = store
        .create_case(
            firm.id,
            attorney.id,
            "Holloway v. Meridian Capital",
            CaseType::MedicalMalpractice,
            "Meridian Capital Group",
            "Quarterly revenue figures were restated twice in 2024. The CFO resigned in March.",
            "I was fully involved in reviewing all quarterly financial reports and I approved them personally.",
            "Exhibit 4: Q3 revenue memo. Exhibit 7: board minutes.",
            "revenue fraud, document retention",
            Aggression::Elevated,
        )
        .map_err(CliError::Fatal)?;
    let witness = store
        .create_witness(firm.id, case.id, "Jane Roe", WitnessRole::Defendant)
        .map_err(CliError::Fatal)?;

    info!("🌱 Seeded demo data");
    info!("   firm:    {}", firm.id);
    info!("   user:    demo@veritas.law / veritas-demo");
    info!("   case:    {}", case.id);
    info!("   witness: {}", witness.id);
    Ok(())
}

/// One evidentiary rule from the ingestion file. `rule_id` is the canonical
/// key; records carrying only the legacy `rule_number` are rejected.
#[derive(Debug, Deserialize)]
struct RuleRecord {
    rule_id: Option<String>,
    #[serde(default)]
    rule_number: Option<String>,
    #[serde(default)]
    article: String,
    #[serde(default)]
    category: String,
    #[serde(default = "default_relevant")]
    is_deposition_relevant: bool,
    content: String,
}

fn default_relevant() -> bool {
    true
}

async fn ingest_rules(config: &Config, file: &Path) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| CliError::BadArgs(format!("cannot read {}: {e}", file.display())))?;
    let records: Vec<RuleRecord> = serde_json::from_str(&raw)
        .map_err(|e| CliError::BadArgs(format!("invalid rules JSON: {e}")))?;

    let http = reqwest::Client::new();
    let retrieval = RetrievalClient::from_config(http, config);

    let mut ingested = 0usize;
    let mut rejected = 0usize;
    for record in records {
        let Some(rule_id) = record.rule_id.as_deref().filter(|s| !s.trim().is_empty()) else {
            rejected += 1;
            warn!(
                rule_number = record.rule_number.as_deref().unwrap_or("?"),
                "record rejected: missing canonical rule_id"
            );
            continue;
        };

        match retrieval
            .upsert_evidentiary_rule(
                rule_id,
                &record.article,
                &record.category,
                record.is_deposition_relevant,
                &record.content,
            )
            .await
        {
            Ok(()) => ingested += 1,
            Err(UpsertError::NotConfigured) => {
                return Err(CliError::Upstream(
                    "retrieval tier not configured (RETRIEVAL_BASE_URL)".to_string(),
                ));
            }
            Err(UpsertError::Retryable(msg)) => {
                return Err(CliError::Upstream(format!("rule upsert failed: {msg}")));
            }
        }
    }

    info!("📚 Ingested {ingested} rule chunk(s), rejected {rejected}");
    Ok(())
}

fn report_service_status(config: &Config) {
    if !config.chat_configured() {
        warn!("⚠️  CHAT_API_KEY not set — interrogator and reviewer degraded");
    }
    if !config.classifier_configured() {
        warn!("⚠️  CLASSIFIER_API_KEY not set — objection/contradiction scoring degraded");
    }
    if !config.voice_configured() {
        warn!("⚠️  VOICE_API_KEY not set — sessions run text-only");
    }
    if !config.retrieval_configured() {
        warn!("⚠️  RETRIEVAL_BASE_URL not set — prior-statement search disabled");
    }
    if !config.blob_configured() {
        warn!("⚠️  blob storage not configured — audio/PDF artifacts skipped");
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "veritas_backend=debug,veritas=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate directory for
    // runs with --manifest-path from elsewhere.
    let _ = dotenv();
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
