use std::sync::Arc;

use axum::{http::Method, middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod session;

use domain::registry::ToolRegistry;
use http::{handlers::MCP_ENDPOINT, session_header::MCP_SESSION_ID};
use session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub tools: Arc<ToolRegistry>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(tools: Arc<ToolRegistry>, sessions: Arc<SessionManager>) -> Self {
        Self { tools, sessions }
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([MCP_SESSION_ID.clone()])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route(
            MCP_ENDPOINT,
            get(http::handlers::mcp_stream)
                .post(http::handlers::mcp_post)
                .delete(http::handlers::mcp_close),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .layer(cors_layer())
        .with_state(state)
}
