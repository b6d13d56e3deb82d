//! Relational schema and versioned migrations.
//!
//! WAL mode for concurrent reads during writes. Foreign keys cascade on
//! parent delete, except briefs: those soft-delete (`deleted_at`) so audit
//! history outlives the parent row lifecycle.

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA cache_size = -16000;
PRAGMA temp_store = MEMORY;
"#;

/// Ordered migration steps. Never edit an applied step; append a new one.
pub const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS firms (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    retention_days INTEGER NOT NULL DEFAULT 365,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    firm_id TEXT NOT NULL REFERENCES firms(id) ON DELETE CASCADE,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cases (
    id TEXT PRIMARY KEY,
    firm_id TEXT NOT NULL REFERENCES firms(id) ON DELETE CASCADE,
    owner_id TEXT NOT NULL,
    case_name TEXT NOT NULL,
    case_type TEXT NOT NULL,
    opposing_party TEXT NOT NULL DEFAULT '',
    deposition_date TEXT,
    extracted_facts TEXT NOT NULL DEFAULT '',
    prior_statements TEXT NOT NULL DEFAULT '',
    exhibit_list TEXT NOT NULL DEFAULT '',
    focus_areas TEXT NOT NULL DEFAULT '',
    default_aggression TEXT NOT NULL DEFAULT 'STANDARD',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS witnesses (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    firm_id TEXT NOT NULL,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    session_count INTEGER NOT NULL DEFAULT 0,
    latest_score INTEGER,
    baseline_score INTEGER,
    plateau INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    witness_id TEXT NOT NULL REFERENCES witnesses(id) ON DELETE CASCADE,
    firm_id TEXT NOT NULL,
    attorney_id TEXT,
    session_number INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'LOBBY',
    duration_minutes INTEGER NOT NULL,
    aggression TEXT NOT NULL DEFAULT 'STANDARD',
    focus_areas TEXT NOT NULL DEFAULT '[]',
    objection_copilot_enabled INTEGER NOT NULL DEFAULT 1,
    sentinel_enabled INTEGER NOT NULL DEFAULT 0,
    witness_token TEXT UNIQUE,
    witness_joined INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    paused_at TEXT,
    ended_at TEXT,
    total_pause_ms INTEGER NOT NULL DEFAULT 0,
    question_count INTEGER NOT NULL DEFAULT 0,
    session_score INTEGER,
    consistency_rate REAL,
    transcript_raw TEXT,
    retrieval_namespace TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_firm ON sessions(firm_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

CREATE TABLE IF NOT EXISTS session_events (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    firm_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    speaker_role TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    question_number INTEGER,
    audio_blob_key TEXT,
    duration_ms INTEGER,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_session
    ON session_events(session_id, question_number, created_at);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    firm_id TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    confidence REAL NOT NULL DEFAULT 0,
    question_number INTEGER,
    current_quote TEXT,
    rule_id TEXT,
    category TEXT,
    explanation TEXT,
    prior_quote TEXT,
    prior_document_page INTEGER,
    prior_document_line INTEGER,
    impeachment_risk TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_session ON alerts(session_id, created_at);

CREATE TABLE IF NOT EXISTS briefs (
    id TEXT PRIMARY KEY,
    session_id TEXT UNIQUE NOT NULL,
    firm_id TEXT NOT NULL,
    witness_id TEXT NOT NULL,
    session_score INTEGER NOT NULL DEFAULT 0,
    consistency_rate REAL NOT NULL DEFAULT 0,
    delta_vs_baseline INTEGER,
    confirmed_flags INTEGER NOT NULL DEFAULT 0,
    objection_count INTEGER NOT NULL DEFAULT 0,
    composure_alerts INTEGER NOT NULL DEFAULT 0,
    top_recommendations TEXT NOT NULL DEFAULT '[]',
    narrative_text TEXT NOT NULL DEFAULT '',
    weakness_map TEXT,
    pdf_blob_key TEXT,
    share_token TEXT UNIQUE,
    share_token_expires_at TEXT,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);
"#,
)];

/// Apply pragmas plus any migration steps newer than the stored version.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(PRAGMAS)
        .context("Failed to apply pragmas")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .context("Failed to read schema version")?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("Migration {version} failed"))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
        )?;
        info!("📦 Applied schema migration v{}", version);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_and_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().0);

        // All tables present
        for table in [
            "firms",
            "users",
            "cases",
            "witnesses",
            "sessions",
            "session_events",
            "alerts",
            "briefs",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
