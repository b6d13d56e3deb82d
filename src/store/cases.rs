//! Firms, users, cases, and witnesses.

use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::models::{Aggression, Case, CaseType, Firm, Witness, WitnessRole};

use super::{now_str, read_ts, read_ts_opt, read_uuid, Store};

/// An authenticated account row. `password_hash` never serializes out.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
}

impl Store {
    pub fn create_firm(&self, name: &str, retention_days: i64) -> Result<Firm> {
        let firm = Firm {
            id: Uuid::new_v4(),
            name: name.to_string(),
            retention_days,
            created_at: Utc::now(),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO firms (id, name, retention_days, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                firm.id.to_string(),
                firm.name,
                firm.retention_days,
                super::ts_str(firm.created_at),
            ],
        )
        .context("Failed to insert firm")?;
        Ok(firm)
    }

    pub fn create_user(
        &self,
        firm_id: Uuid,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<UserRecord> {
        let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;
        let user = UserRecord {
            id: Uuid::new_v4(),
            firm_id,
            email: email.to_string(),
            password_hash,
            role: role.to_string(),
            is_active: true,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, firm_id, email, password_hash, role, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![
                user.id.to_string(),
                user.firm_id.to_string(),
                user.email,
                user.password_hash,
                user.role,
                now_str(),
            ],
        )
        .context("Failed to insert user")?;

        info!("✅ Created user: {} ({})", user.email, user.role);
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, firm_id, email, password_hash, role, is_active
                 FROM users WHERE email = ?1",
                params![email],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, firm_id, email, password_hash, role, is_active
                 FROM users WHERE id = ?1",
                params![user_id.to_string()],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn verify_password(&self, email: &str, password: &str) -> Result<Option<UserRecord>> {
        let Some(user) = self.get_user_by_email(email)? else {
            return Ok(None);
        };
        let ok = verify(password, &user.password_hash).context("Failed to verify password")?;
        Ok(ok.then_some(user))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_case(
        &self,
        firm_id: Uuid,
        owner_id: Uuid,
        case_name: &str,
        case_type: CaseType,
        opposing_party: &str,
        extracted_facts: &str,
        prior_statements: &str,
        exhibit_list: &str,
        focus_areas: &str,
        default_aggression: Aggression,
    ) -> Result<Case> {
        let case = Case {
            id: Uuid::new_v4(),
            firm_id,
            owner_id,
            case_name: case_name.to_string(),
            case_type,
            opposing_party: opposing_party.to_string(),
            deposition_date: None,
            extracted_facts: extracted_facts.to_string(),
            prior_statements: prior_statements.to_string(),
            exhibit_list: exhibit_list.to_string(),
            focus_areas: focus_areas.to_string(),
            default_aggression,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cases (id, firm_id, owner_id, case_name, case_type, opposing_party,
                 deposition_date, extracted_facts, prior_statements, exhibit_list, focus_areas,
                 default_aggression, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                case.id.to_string(),
                case.firm_id.to_string(),
                case.owner_id.to_string(),
                case.case_name,
                case.case_type.as_str(),
                case.opposing_party,
                case.extracted_facts,
                case.prior_statements,
                case.exhibit_list,
                case.focus_areas,
                case.default_aggression.as_str(),
                super::ts_str(case.created_at),
            ],
        )
        .context("Failed to insert case")?;
        Ok(case)
    }

    /// Tenant-filtered case lookup.
    pub fn get_case(&self, firm_id: Uuid, case_id: Uuid) -> Result<Option<Case>> {
        let conn = self.conn.lock();
        let case = conn
            .query_row(
                "SELECT id, firm_id, owner_id, case_name, case_type, opposing_party,
                        deposition_date, extracted_facts, prior_statements, exhibit_list,
                        focus_areas, default_aggression, created_at
                 FROM cases WHERE id = ?1 AND firm_id = ?2",
                params![case_id.to_string(), firm_id.to_string()],
                map_case,
            )
            .optional()?;
        Ok(case)
    }

    pub fn create_witness(
        &self,
        firm_id: Uuid,
        case_id: Uuid,
        name: &str,
        role: WitnessRole,
    ) -> Result<Witness> {
        let witness = Witness {
            id: Uuid::new_v4(),
            case_id,
            firm_id,
            name: name.to_string(),
            role,
            session_count: 0,
            latest_score: None,
            baseline_score: None,
            plateau: false,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO witnesses (id, case_id, firm_id, name, role, session_count,
                 latest_score, baseline_score, plateau, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, NULL, 0, ?6)",
            params![
                witness.id.to_string(),
                witness.case_id.to_string(),
                witness.firm_id.to_string(),
                witness.name,
                witness.role.as_str(),
                super::ts_str(witness.created_at),
            ],
        )
        .context("Failed to insert witness")?;
        Ok(witness)
    }

    pub fn get_witness(&self, firm_id: Uuid, witness_id: Uuid) -> Result<Option<Witness>> {
        let conn = self.conn.lock();
        let witness = conn
            .query_row(
                "SELECT id, case_id, firm_id, name, role, session_count, latest_score,
                        baseline_score, plateau, created_at
                 FROM witnesses WHERE id = ?1 AND firm_id = ?2",
                params![witness_id.to_string(), firm_id.to_string()],
                map_witness,
            )
            .optional()?;
        Ok(witness)
    }

    pub fn set_witness_session_count(&self, witness_id: Uuid, count: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE witnesses SET session_count = ?2 WHERE id = ?1",
            params![witness_id.to_string(), count],
        )?;
        Ok(())
    }

    /// First completed session sets the baseline; later ones only move
    /// `latest_score`. Returns the delta vs baseline (None on first run).
    pub fn record_witness_score(&self, witness_id: Uuid, score: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let baseline: Option<i64> = conn
            .query_row(
                "SELECT baseline_score FROM witnesses WHERE id = ?1",
                params![witness_id.to_string()],
                |row| row.get(0),
            )
            .context("Witness not found while recording score")?;

        match baseline {
            None => {
                conn.execute(
                    "UPDATE witnesses SET baseline_score = ?2, latest_score = ?2 WHERE id = ?1",
                    params![witness_id.to_string(), score],
                )?;
                Ok(None)
            }
            Some(base) => {
                conn.execute(
                    "UPDATE witnesses SET latest_score = ?2 WHERE id = ?1",
                    params![witness_id.to_string(), score],
                )?;
                Ok(Some(score - base))
            }
        }
    }
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: read_uuid(row, 0)?,
        firm_id: read_uuid(row, 1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
    })
}

fn map_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<Case> {
    let case_type: String = row.get(4)?;
    let aggression: String = row.get(11)?;
    Ok(Case {
        id: read_uuid(row, 0)?,
        firm_id: read_uuid(row, 1)?,
        owner_id: read_uuid(row, 2)?,
        case_name: row.get(3)?,
        case_type: CaseType::parse(&case_type).unwrap_or(CaseType::Other),
        opposing_party: row.get(5)?,
        deposition_date: read_ts_opt(row, 6)?,
        extracted_facts: row.get(7)?,
        prior_statements: row.get(8)?,
        exhibit_list: row.get(9)?,
        focus_areas: row.get(10)?,
        default_aggression: Aggression::parse(&aggression).unwrap_or(Aggression::Standard),
        created_at: read_ts(row, 12)?,
    })
}

fn map_witness(row: &rusqlite::Row<'_>) -> rusqlite::Result<Witness> {
    let role: String = row.get(4)?;
    Ok(Witness {
        id: read_uuid(row, 0)?,
        case_id: read_uuid(row, 1)?,
        firm_id: read_uuid(row, 2)?,
        name: row.get(3)?,
        role: WitnessRole::parse(&role).unwrap_or(WitnessRole::Other),
        session_count: row.get(5)?,
        latest_score: row.get(6)?,
        baseline_score: row.get(7)?,
        plateau: row.get::<_, i64>(8)? != 0,
        created_at: read_ts(row, 9)?,
    })
}
