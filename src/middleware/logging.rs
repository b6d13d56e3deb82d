//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, latency, and a
//! per-request correlation id that also flows back to the client in the
//! `x-correlation-id` header.

use std::time::Instant;

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};
use uuid::Uuid;

pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let correlation_id = Uuid::new_v4();
    let start = Instant::now();

    let mut response = next.run(req).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_millis();
    if status.is_server_error() {
        warn!(%method, path, %status, latency_ms, %correlation_id, "request failed");
    } else {
        info!(%method, path, %status, latency_ms, %correlation_id, "request");
    }

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}
