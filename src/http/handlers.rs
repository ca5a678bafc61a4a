//! Axum HTTP handlers for the web server
//!
//! Provides the streamable `/mcp` endpoint (POST messages, GET event stream,
//! DELETE session) and general metadata endpoints.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use axum_extra::{typed_header::TypedHeaderRejection, TypedHeader};
use serde::Serialize;
use serde_json::Value;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::errors::TransportError;
use crate::http::session_header::{McpSessionId, MCP_SESSION_ID};
use crate::mcp::server::{handle_payload, is_initialize_request, parse_initialize};
use crate::session::{CloseReason, SessionHandle};
use crate::AppState;

pub const MCP_ENDPOINT: &str = "/mcp";
const STREAM_KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
    pub transport: &'static str,
    pub session_header: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: MCP_ENDPOINT,
        transport: "streamable-http",
        session_header: MCP_SESSION_ID.as_str(),
    })
}

type SessionIdHeader = Result<TypedHeader<McpSessionId>, TypedHeaderRejection>;

/// `Ok(None)` when the header is absent, `Err(())` when it is present but
/// blank or not valid text.
fn session_id_from(header: SessionIdHeader) -> Result<Option<McpSessionId>, ()> {
    match header {
        Ok(TypedHeader(id)) => Ok(Some(id)),
        Err(rejection) if rejection.is_missing() => Ok(None),
        Err(rejection) => {
            debug!(error = %rejection, "unusable session header");
            Err(())
        }
    }
}

async fn resolve_session(state: &AppState, header: SessionIdHeader) -> Option<Arc<SessionHandle>> {
    let id = session_id_from(header).ok()??;
    state.sessions.resolve(id.as_str()).await
}

pub async fn mcp_post(
    State(state): State<AppState>,
    session_id: SessionIdHeader,
    body: Bytes,
) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return TransportError::ParseError.into_response(),
    };

    let Ok(session_id) = session_id_from(session_id) else {
        return TransportError::NoValidSession.into_response();
    };

    let (session, opened) = match session_id {
        Some(id) => {
            let Some(session) = state.sessions.resolve(id.as_str()).await else {
                return TransportError::NoValidSession.into_response();
            };
            if is_initialize_request(&payload) {
                return TransportError::AlreadyInitialized.into_response();
            }
            (session, false)
        }
        None => {
            let Some(offer) = parse_initialize(&payload) else {
                return TransportError::NoValidSession.into_response();
            };
            match state
                .sessions
                .open(offer.protocol_version, offer.client_name)
                .await
            {
                Ok(session) => (session, true),
                Err(err) => return TransportError::internal(err.to_string()).into_response(),
            }
        }
    };

    // A panic during dispatch surfaces as a JoinError; nothing has been written yet.
    let dispatch = tokio::spawn({
        let state = state.clone();
        let session = Arc::clone(&session);
        async move { handle_payload(&state, &session, payload).await }
    });

    let response = match dispatch.await {
        Ok(Some(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(err) => return dispatch_failed(&state, &session, opened, err).await,
    };

    if opened {
        return (TypedHeader(McpSessionId::new(session.id())), response).into_response();
    }
    response
}

/// Answers a dispatch that panicked. A session opened by the same request is
/// terminated.
async fn dispatch_failed(
    state: &AppState,
    session: &SessionHandle,
    opened: bool,
    err: JoinError,
) -> Response {
    if opened {
        state
            .sessions
            .terminate(session.id(), CloseReason::Aborted)
            .await;
    }
    TransportError::internal(format!("mcp dispatch failed: {err}")).into_response()
}

pub async fn mcp_stream(
    State(state): State<AppState>,
    session_id: SessionIdHeader,
    headers: HeaderMap,
) -> Response {
    let Some(session) = resolve_session(&state, session_id).await else {
        return TransportError::InvalidOrMissingSession.into_response();
    };

    let accepts_event_stream = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));
    if !accepts_event_stream {
        return TransportError::NotAcceptable.into_response();
    }

    let session_id = session.id().to_string();
    info!(session_id = %session_id, "event stream opened");

    let stream = BroadcastStream::new(session.subscribe()).filter_map(move |message| match message {
        Ok(payload) => Some(Ok::<_, Infallible>(
            Event::default().event("message").data(payload),
        )),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            // Response is already streaming, so a lag is only logged.
            warn!(session_id = %session_id, skipped, "event stream lagged, notifications dropped");
            None
        }
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(STREAM_KEEP_ALIVE))
        .into_response()
}

pub async fn mcp_close(
    State(state): State<AppState>,
    session_id: SessionIdHeader,
) -> Response {
    let Some(session) = resolve_session(&state, session_id).await else {
        return TransportError::InvalidOrMissingSession.into_response();
    };

    if !state
        .sessions
        .terminate(session.id(), CloseReason::ClientRequest)
        .await
    {
        warn!(session_id = %session.id(), "session closed concurrently");
        return TransportError::InvalidOrMissingSession.into_response();
    }

    (StatusCode::OK, "Session closed").into_response()
}
