use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::rpc::{INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR};

/// JSON-RPC code for requests that lack a usable session.
pub const SESSION_ERROR: i32 = -32000;

/// Failures raised while executing an MCP method on an active session.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid params: {message}")]
    InvalidParams { code: &'static str, message: String },
    #[error("tool not found: {name}")]
    ToolNotFound { name: String },
    #[error("internal error: {message}")]
    Internal { code: &'static str, message: String },
}

impl AppError {
    pub fn invalid_params(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            code,
            message: message.into(),
        }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

/// Rejections produced before a request reaches a session handle, or after
/// dispatch failed without writing a response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no valid session id provided")]
    NoValidSession,
    #[error("invalid or missing session id")]
    InvalidOrMissingSession,
    #[error("session already initialized")]
    AlreadyInitialized,
    #[error("request body is not valid json")]
    ParseError,
    #[error("client must accept text/event-stream")]
    NotAcceptable,
    #[error("internal error: {0}")]
    Internal(String),
}

impl TransportError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

fn null_id_error(code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message
        },
        "id": null
    })
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        match self {
            Self::NoValidSession => (
                StatusCode::BAD_REQUEST,
                Json(null_id_error(
                    SESSION_ERROR,
                    "Bad Request: No valid session ID provided",
                )),
            )
                .into_response(),
            Self::AlreadyInitialized => (
                StatusCode::BAD_REQUEST,
                Json(null_id_error(
                    INVALID_REQUEST,
                    "Invalid Request: Server already initialized",
                )),
            )
                .into_response(),
            Self::ParseError => (
                StatusCode::BAD_REQUEST,
                Json(null_id_error(PARSE_ERROR, "Parse error")),
            )
                .into_response(),
            Self::InvalidOrMissingSession => {
                (StatusCode::BAD_REQUEST, "Invalid or missing session ID").into_response()
            }
            Self::NotAcceptable => (
                StatusCode::NOT_ACCEPTABLE,
                "Not Acceptable: Client must accept text/event-stream",
            )
                .into_response(),
            Self::Internal(message) => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(null_id_error(INTERNAL_ERROR, "Internal server error")),
                )
                    .into_response()
            }
        }
    }
}
