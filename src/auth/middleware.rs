//! Authentication Middleware
//! Mission: Protect API endpoints with JWT validation and tenant scoping
//!
//! Token sources, in precedence order: the `access_token` cookie (browser
//! clients), then `Authorization: Bearer` (curl, mobile). The middleware
//! re-checks the account's active flag on every request, so a revoked user
//! is locked out even while holding an unexpired token.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde_json::json;
use uuid::Uuid;

use crate::auth::jwt::JwtHandler;
use crate::auth::models::AuthContext;
use crate::store::Store;

#[derive(Clone)]
pub struct AuthLayer {
    pub jwt: Arc<JwtHandler>,
    pub store: Store,
}

pub async fn auth_middleware(
    State(layer): State<AuthLayer>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let jar = CookieJar::from_headers(req.headers());
    let token = extract_token(&jar, &req).ok_or(AuthError::TokenMissing)?;

    let claims = layer
        .jwt
        .validate_token(&token)
        .map_err(|_| AuthError::TokenInvalid)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::TokenInvalid)?;

    let user = layer
        .store
        .get_user_by_id(user_id)
        .map_err(|_| AuthError::TokenInvalid)?
        .ok_or(AuthError::AccountInactive)?;
    if !user.is_active {
        return Err(AuthError::AccountInactive);
    }

    req.extensions_mut().insert(AuthContext::from_record(&user));
    Ok(next.run(req).await)
}

/// Cookie first, bearer header second.
fn extract_token(jar: &CookieJar, req: &Request) -> Option<String> {
    if let Some(cookie) = jar.get("access_token") {
        let value = cookie.value().trim_start_matches("Bearer ").trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[derive(Debug)]
pub enum AuthError {
    TokenMissing,
    TokenInvalid,
    AccountInactive,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::TokenMissing => (StatusCode::UNAUTHORIZED, "TOKEN_MISSING"),
            AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID"),
            AuthError::AccountInactive => (StatusCode::FORBIDDEN, "ACCOUNT_INACTIVE"),
        };
        (status, Json(json!({ "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request_with_header(value: &str) -> Request {
        HttpRequest::builder()
            .header("Authorization", value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_bearer_header_extraction() {
        let req = request_with_header("Bearer tok123");
        let jar = CookieJar::from_headers(req.headers());
        assert_eq!(extract_token(&jar, &req), Some("tok123".to_string()));
    }

    #[test]
    fn test_cookie_takes_precedence() {
        let req = HttpRequest::builder()
            .header("Cookie", "access_token=cookie-tok")
            .header("Authorization", "Bearer header-tok")
            .body(Body::empty())
            .unwrap();
        let jar = CookieJar::from_headers(req.headers());
        assert_eq!(extract_token(&jar, &req), Some("cookie-tok".to_string()));
    }

    #[test]
    fn test_missing_token_is_none() {
        let req = HttpRequest::new(Body::empty());
        let jar = CookieJar::from_headers(req.headers());
        assert_eq!(extract_token(&jar, &req), None);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AuthError::TokenMissing.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AccountInactive.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}
