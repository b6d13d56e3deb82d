//! Authentication API Endpoints
//! Mission: Issue access tokens and expose the current caller

use axum::{extract::State, response::IntoResponse, Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::models::{AuthContext, LoginRequest, LoginResponse, UserView};

use super::{ok, AppState};
use crate::api::error::ApiError;

/// POST /api/v1/auth/login. Verifies credentials, mints a token, sets the
/// httpOnly cookie and return the same token in the body for header-based
/// clients.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(user) = state
        .orchestrator
        .store
        .verify_password(&payload.email, &payload.password)?
    else {
        warn!("❌ Failed login attempt: {}", payload.email);
        return Err(ApiError::Validation("invalid email or password".to_string()));
    };
    if !user.is_active {
        return Err(ApiError::Validation("account is inactive".to_string()));
    }

    let (token, expires_in) = state
        .jwt
        .generate_token(&user)
        .map_err(ApiError::Internal)?;
    info!("🔐 Login: {}", user.email);

    // Expiry is enforced by the JWT itself; the cookie just carries it.
    let cookie = Cookie::build(("access_token", token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((
        jar.add(cookie),
        Json(json!({
            "success": true,
            "data": LoginResponse {
                token,
                expires_in,
                user: UserView::from_record(&user),
            },
        })),
    ))
}

/// GET /api/v1/auth/me
pub async fn me(Extension(auth): Extension<AuthContext>) -> Json<serde_json::Value> {
    ok(json!({
        "id": auth.user_id.to_string(),
        "firmId": auth.firm_id.to_string(),
        "email": auth.email,
        "role": auth.role,
    }))
}
