use std::time::Instant;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::http::session_header::MCP_SESSION_ID;

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let session_id = request
        .headers()
        .get(&MCP_SESSION_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();
    let session_id = session_id
        .as_deref()
        .or_else(|| {
            response
                .headers()
                .get(&MCP_SESSION_ID)
                .and_then(|value| value.to_str().ok())
        })
        .unwrap_or("-");

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        session_id = %session_id,
        "request summary"
    );

    if status == StatusCode::BAD_REQUEST {
        warn!(method = %method, path = %path, session_id = %session_id, "request rejected");
    }

    response
}
