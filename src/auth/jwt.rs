//! JWT Token Handler
//! Mission: Generate and validate HS256 access tokens

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

use crate::auth::models::{AuthContext, Claims};
use crate::store::cases::UserRecord;

pub struct JwtHandler {
    secret: String,
    expiration_hours: i64,
}

impl JwtHandler {
    pub fn new(secret: String, expiration_hours: i64) -> Self {
        Self {
            secret,
            expiration_hours,
        }
    }

    /// Generate an access token for a user. Returns (token, expires_in
    /// seconds).
    pub fn generate_token(&self, user: &UserRecord) -> Result<(String, usize)> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(chrono::Duration::hours(self.expiration_hours))
            .context("Invalid timestamp")?
            .timestamp() as usize;
        let expires_in = (self.expiration_hours * 3600) as usize;

        let context = AuthContext::from_record(user);
        let claims = Claims {
            sub: user.id.to_string(),
            firm_id: user.firm_id.to_string(),
            email: user.email.clone(),
            role: context.role,
            exp: expiration,
        };

        debug!(
            "Generating JWT for user {} ({}), expires in {}h",
            user.email, user.id, self.expiration_hours
        );

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to generate JWT")?;

        Ok((token, expires_in))
    }

    /// Validate a token and extract claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .context("Invalid or expired token")?;
        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_user() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            firm_id: Uuid::new_v4(),
            email: "partner@firm.law".to_string(),
            password_hash: "hash".to_string(),
            role: "PARTNER".to_string(),
            is_active: true,
        }
    }

    #[test]
    fn test_generation_and_validation() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string(), 8);
        let user = test_user();

        let (token, expires_in) = handler.generate_token(&user).unwrap();
        assert!(!token.is_empty());
        assert_eq!(expires_in, 8 * 3600);

        let claims = handler.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.firm_id, user.firm_id.to_string());
        assert_eq!(claims.email, user.email);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string(), 8);
        assert!(handler.validate_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_different_secrets_reject() {
        let a = JwtHandler::new("secret1".to_string(), 8);
        let b = JwtHandler::new("secret2".to_string(), 8);
        let (token, _) = a.generate_token(&test_user()).unwrap();
        assert!(b.validate_token(&token).is_err());
    }
}
