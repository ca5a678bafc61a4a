//! The central Model Context Protocol engine
//!
//! Decodes JSON-RPC messages arriving on an active session, negotiates the
//! protocol version for `initialize`, and routes tool listing and tool calls
//! to the registry.

use rust_mcp_sdk::schema::{
    CallToolRequest, CallToolRequestParams, Implementation, InitializeRequest, InitializeResult,
    JsonrpcMessage, JsonrpcRequest, ListToolsRequest, ListToolsResult, PingRequest,
    ServerCapabilities, ServerCapabilitiesTools,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_result,
    request_id_to_value, typed_result, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};
use crate::session::SessionHandle;
use crate::AppState;

pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

const SERVER_INSTRUCTIONS: &str =
    "Call how-was-day for a daily summary or getLastMonthSale for a monthly sales figure.";

/// What a client offered in a well-formed `initialize` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeOffer {
    pub protocol_version: &'static str,
    pub client_name: Option<String>,
}

/// Recognizes a single JSON-RPC `initialize` request. Batches and malformed
/// initialize messages are not session openers.
pub fn parse_initialize(payload: &Value) -> Option<InitializeOffer> {
    if !payload.is_object() {
        return None;
    }

    let JsonrpcMessage::Request(request) =
        serde_json::from_value::<JsonrpcMessage>(payload.clone()).ok()?
    else {
        return None;
    };
    if request.method != "initialize" || validate_request_shape(&request).is_err() {
        return None;
    }

    let params = request.params.map(Value::Object);
    let client_name = params
        .as_ref()
        .and_then(|params| params.pointer("/clientInfo/name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(InitializeOffer {
        protocol_version: negotiate_protocol_version(params.as_ref()),
        client_name,
    })
}

pub fn is_initialize_request(payload: &Value) -> bool {
    parse_initialize(payload).is_some()
}

/// Echoes a supported offered version, otherwise answers with the latest one.
pub fn negotiate_protocol_version(params: Option<&Value>) -> &'static str {
    let offered = params
        .and_then(|params| params.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim);

    SUPPORTED_PROTOCOL_VERSIONS
        .into_iter()
        .find(|supported| Some(*supported) == offered)
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

/// Handles a POST body that may be a single message or a batch. `None`
/// means nothing needs to be written back (notifications only).
pub async fn handle_payload(
    state: &AppState,
    session: &SessionHandle,
    payload: Value,
) -> Option<Value> {
    let Value::Array(batch) = payload else {
        return handle_json_rpc_value(state, session, payload).await;
    };

    if batch.is_empty() {
        return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
    }

    let mut responses = Vec::new();
    for item in batch {
        if let Some(response) = handle_json_rpc_value(state, session, item).await {
            responses.push(response);
        }
    }

    (!responses.is_empty()).then_some(Value::Array(responses))
}

pub async fn handle_json_rpc_value(
    state: &AppState,
    session: &SessionHandle,
    payload: Value,
) -> Option<Value> {
    if !payload.is_object() {
        return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
    }

    let request_id = payload.get("id").cloned();
    let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
        Ok(message) => message,
        Err(_) => return Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request")),
    };

    match parsed {
        JsonrpcMessage::Request(request) => {
            if let Err(error_response) = validate_request_shape(&request) {
                return Some(error_response);
            }

            let request_id = request_id_to_value(request.id);
            if request.method.trim().is_empty() {
                return Some(json_rpc_error(
                    Some(request_id),
                    INVALID_REQUEST,
                    "Invalid Request",
                ));
            }

            Some(
                handle_json_rpc_request(
                    state,
                    session,
                    Some(request_id),
                    &request.method,
                    request.params.map(Value::Object),
                )
                .await,
            )
        }
        JsonrpcMessage::Notification(notification) => {
            match notification.method.as_str() {
                "" => {}
                "notifications/initialized" => {
                    debug!(session_id = %session.id(), "client reported initialized");
                }
                method => {
                    debug!(session_id = %session.id(), method = %method, "ignoring notification");
                }
            }
            None
        }
        JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
            Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"))
        }
    }
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let request_id = Some(request_id_to_value(request.id.clone()));
    let Ok(payload) = serde_json::to_value(request) else {
        return Err(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"));
    };

    let valid = match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, INVALID_PARAMS, "Invalid params"))
    }
}

pub async fn handle_json_rpc_request(
    state: &AppState,
    session: &SessionHandle,
    id: Option<Value>,
    method: &str,
    params: Option<Value>,
) -> Value {
    let tool_name = params
        .as_ref()
        .and_then(|params| params.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let response = match method {
        "initialize" => {
            if session.begin_initialize() {
                typed_result(id, &initialize_result(session))
            } else {
                json_rpc_error(
                    id,
                    INVALID_REQUEST,
                    "Invalid Request: Server already initialized",
                )
            }
        }
        "ping" => json_rpc_result(id, json!({})),
        "tools/list" => typed_result(
            id,
            &ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: state.tools.list(),
            },
        ),
        "tools/call" => handle_tools_call(state, session, id, params),
        _ => json_rpc_error(id, METHOD_NOT_FOUND, "Method not found"),
    };

    info!(
        session_id = %session.id(),
        method = %method,
        tool = tool_name.as_deref().unwrap_or("-"),
        outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
        "mcp action audited"
    );

    response
}

fn initialize_result(session: &SessionHandle) -> InitializeResult {
    InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            logging: Some(Map::new()),
            ..Default::default()
        },
        protocol_version: session.protocol_version().to_string(),
        instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        meta: None,
    }
}

fn handle_tools_call(
    state: &AppState,
    session: &SessionHandle,
    id: Option<Value>,
    params: Option<Value>,
) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
    };

    match state.tools.call(&tool_call.name, tool_call.arguments) {
        Ok(result) => {
            session.notify(&json!({
                "jsonrpc": "2.0",
                "method": "notifications/message",
                "params": {
                    "level": "info",
                    "logger": "tools",
                    "data": {
                        "tool": tool_call.name,
                        "session_id": session.id(),
                    },
                },
            }));
            typed_result(id, &result)
        }
        Err(err) => app_error_to_json_rpc(id, err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{domain::registry::ToolRegistry, session::SessionManager};

    fn state() -> AppState {
        AppState::new(
            Arc::new(ToolRegistry::with_builtin_tools()),
            Arc::new(SessionManager::in_memory(None)),
        )
    }

    fn initialize_payload(version: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": version,
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }
        })
    }

    #[test]
    fn negotiate_echoes_supported_version() {
        let params = json!({"protocolVersion": "2024-11-05"});
        assert_eq!(negotiate_protocol_version(Some(&params)), "2024-11-05");
    }

    #[test]
    fn negotiate_falls_back_to_latest() {
        let params = json!({"protocolVersion": "1999-01-01"});
        assert_eq!(
            negotiate_protocol_version(Some(&params)),
            LATEST_PROTOCOL_VERSION
        );
        assert_eq!(negotiate_protocol_version(None), LATEST_PROTOCOL_VERSION);
    }

    #[test]
    fn parse_initialize_reads_client_offer() {
        let offer = parse_initialize(&initialize_payload("2025-03-26")).expect("initialize");
        assert_eq!(offer.protocol_version, "2025-03-26");
        assert_eq!(offer.client_name.as_deref(), Some("test-client"));
    }

    #[test]
    fn non_initialize_messages_are_not_session_openers() {
        assert!(!is_initialize_request(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {}
        })));
        assert!(!is_initialize_request(&json!([initialize_payload("2025-06-18")])));
        assert!(!is_initialize_request(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize"
        })));
    }

    #[tokio::test]
    async fn second_initialize_on_session_is_rejected() {
        let state = state();
        let session = state
            .sessions
            .open("2025-06-18", None)
            .await
            .expect("session");

        let first = handle_payload(&state, &session, initialize_payload("2025-06-18"))
            .await
            .expect("response");
        assert_eq!(first["result"]["protocolVersion"], "2025-06-18");

        let second = handle_payload(&state, &session, initialize_payload("2025-06-18"))
            .await
            .expect("response");
        assert_eq!(second["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn tool_call_publishes_session_notification() {
        let state = state();
        let session = state
            .sessions
            .open("2025-06-18", None)
            .await
            .expect("session");
        let mut stream = session.subscribe();

        let response = handle_payload(
            &state,
            &session,
            json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": {"name": "getLastMonthSale", "arguments": {"month": "June"}}
            }),
        )
        .await
        .expect("response");
        assert_eq!(response["result"]["content"][0]["text"], "Sales for June: 500");

        let message = stream.recv().await.expect("notification");
        let message: Value = serde_json::from_str(&message).expect("json notification");
        assert_eq!(message["method"], "notifications/message");
        assert_eq!(message["params"]["data"]["tool"], "getLastMonthSale");
    }

    #[tokio::test]
    async fn unhandled_notifications_have_no_effect() {
        let state = state();
        let session = state
            .sessions
            .open("2025-06-18", None)
            .await
            .expect("session");
        let mut stream = session.subscribe();

        let tool_call = json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {"name": "getLastMonthSale", "arguments": {"month": "June"}}
        });
        let initialize = json!({
            "jsonrpc": "2.0",
            "method": "initialize",
            "params": {"protocolVersion": "2025-06-18", "capabilities": {}}
        });
        assert!(handle_payload(&state, &session, tool_call).await.is_none());
        assert!(handle_payload(&state, &session, initialize).await.is_none());

        assert!(stream.try_recv().is_err());
        let response = handle_payload(&state, &session, initialize_payload("2025-06-18"))
            .await
            .expect("response");
        assert_eq!(response["result"]["protocolVersion"], "2025-06-18");
    }

    #[tokio::test]
    async fn empty_batch_is_invalid_request() {
        let state = state();
        let session = state
            .sessions
            .open("2025-06-18", None)
            .await
            .expect("session");

        let response = handle_payload(&state, &session, json!([]))
            .await
            .expect("response");
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let state = state();
        let session = state
            .sessions
            .open("2025-06-18", None)
            .await
            .expect("session");

        let response = handle_payload(
            &state,
            &session,
            json!({"jsonrpc": "2.0", "id": 9, "method": "resources/list", "params": {}}),
        )
        .await
        .expect("response");
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }
}
