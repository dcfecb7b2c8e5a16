// CORS and request logging middleware

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::Instrument;

/// Create CORS middleware layer
///
/// Only the application's own origin may call the gateway, with credentials,
/// so the browser attaches the session cookie.
pub fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin).context("NEXT_PUBLIC_URL is not a valid origin")?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

/// Request logging middleware
///
/// Tags every request with a short id and logs status and latency.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let span = tracing::info_span!("request", id = %request_id, method = %method, path = %path);
    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    if status.is_server_error() {
        tracing::warn!(
            parent: &span,
            status = status.as_u16(),
            latency_ms = latency_ms,
            "[{}] {} {} failed",
            request_id,
            method,
            path
        );
    } else {
        tracing::debug!(
            parent: &span,
            status = status.as_u16(),
            latency_ms = latency_ms,
            "[{}] {} {}",
            request_id,
            method,
            path
        );
    }

    response
}
