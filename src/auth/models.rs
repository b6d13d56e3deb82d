//! Authentication Models
//! Mission: Define tenant-scoped user and token data structures

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::cases::UserRecord;

/// User roles within a firm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserRole {
    #[serde(rename = "PARTNER")]
    Partner,
    #[serde(rename = "ASSOCIATE")]
    Associate,
    #[serde(rename = "PARALEGAL")]
    Paralegal,
    #[serde(rename = "ADMIN")]
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Partner => "PARTNER",
            UserRole::Associate => "ASSOCIATE",
            UserRole::Paralegal => "PARALEGAL",
            UserRole::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PARTNER" => Some(UserRole::Partner),
            "ASSOCIATE" => Some(UserRole::Associate),
            "PARALEGAL" => Some(UserRole::Paralegal),
            "ADMIN" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// JWT claims payload. `firm_id` rides in the token so every handler can
/// tenant-filter without an extra lookup, but the middleware still verifies
/// the account is active on each request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub firm_id: String,
    pub email: String,
    pub role: UserRole,
    pub exp: usize,
}

/// The authenticated caller, attached to request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub firm_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthContext {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            user_id: record.id,
            firm_id: record.firm_id,
            email: record.email.clone(),
            role: UserRole::parse(&record.role).unwrap_or(UserRole::Paralegal),
        }
    }
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: usize,
    pub user: UserView,
}

/// Sanitized user payload. Never carries the password digest.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub firm_id: String,
    pub email: String,
    pub role: UserRole,
}

impl UserView {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            id: record.id.to_string(),
            firm_id: record.firm_id.to_string(),
            email: record.email.clone(),
            role: UserRole::parse(&record.role).unwrap_or(UserRole::Paralegal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&UserRole::Partner).unwrap();
        assert_eq!(json, r#""PARTNER""#);
        let parsed: UserRole = serde_json::from_str(r#""PARALEGAL""#).unwrap();
        assert_eq!(parsed, UserRole::Paralegal);
    }

    #[test]
    fn test_role_parse_round_trip() {
        for role in ["PARTNER", "ASSOCIATE", "PARALEGAL", "ADMIN"] {
            assert_eq!(UserRole::parse(role).unwrap().as_str(), role);
        }
        assert_eq!(UserRole::parse("trader"), None);
    }
}
