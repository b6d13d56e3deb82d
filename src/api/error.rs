//! API error taxonomy.
//!
//! One response shape for every failure: `{code, message?}` with the HTTP
//! status the code implies. Internal errors log with a correlation id and
//! never leak details to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::orchestrator::OpError;

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Gone(&'static str),
    Validation(String),
    InvalidState(String),
    Upstream(String),
    Internal(anyhow::Error),
}

impl From<OpError> for ApiError {
    fn from(err: OpError) -> Self {
        match err {
            OpError::NotFound => ApiError::NotFound,
            OpError::InvalidState(state) => ApiError::InvalidState(state),
            OpError::Validation(msg) => ApiError::Validation(msg),
            OpError::Upstream(msg) => ApiError::Upstream(msg),
            OpError::Internal(e) => ApiError::Internal(e),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "code": "NOT_FOUND" }),
            ),
            ApiError::Gone(code) => (StatusCode::GONE, json!({ "code": code })),
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "code": "VALIDATION", "message": message }),
            ),
            ApiError::InvalidState(state) => (
                StatusCode::CONFLICT,
                json!({
                    "code": "INVALID_STATUS",
                    "message": format!("operation not allowed while session is {state}"),
                }),
            ),
            ApiError::Upstream(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "code": "UPSTREAM_UNAVAILABLE", "message": message }),
            ),
            ApiError::Internal(e) => {
                let correlation_id = Uuid::new_v4();
                error!(%correlation_id, error = %e, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "code": "SERVER_ERROR", "correlationId": correlation_id.to_string() }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Gone("SHARE_LINK_EXPIRED").into_response().status(),
            StatusCode::GONE
        );
        assert_eq!(
            ApiError::Validation("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidState("LOBBY".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Upstream("down".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_op_error_conversion() {
        assert!(matches!(ApiError::from(OpError::NotFound), ApiError::NotFound));
        assert!(matches!(
            ApiError::from(OpError::InvalidState("COMPLETE".into())),
            ApiError::InvalidState(_)
        ));
    }
}
