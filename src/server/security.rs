//! Browser security headers, server-header stripping, and request
//! logging. Oversized bodies are rejected by the body-limit layer before
//! any handler runs.

use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;
use uuid::Uuid;

pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;

    let headers = res.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );

    // Never advertise what we run.
    headers.remove(header::SERVER);

    res
}

pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let trace_id = Uuid::new_v4();
    let start = Instant::now();

    let res = next.run(req).await;

    info!(
        target: "http",
        %method,
        path = %path,
        status = res.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        trace_id = %trace_id,
        "request handled"
    );
    res
}
