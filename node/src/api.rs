//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the hub over HTTP. Handlers share
//! [`AppState`] through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                          |
//! |--------|-----------------------|--------------------------------------|
//! | GET    | `/health`             | Liveness probe                       |
//! | GET    | `/status`             | Hub summary                          |
//! | POST   | `/rpc`                | JSON-RPC 2.0 gateway                 |
//! | GET    | `/ws`                 | WebSocket feed of committed events   |
//! | GET    | `/relays/:address`    | Relay registry entry                 |
//! | GET    | `/accounts/:address`  | Ledger account, deposit, nonces      |
//! | GET    | `/events?since=N`     | Persisted event log                  |
//!
//! ## JSON-RPC methods
//!
//! `hub_sendRawTransaction`, `hub_getRelay`, `hub_getNonce`,
//! `hub_balanceOf`, `hub_verifyRelayRequest`, `hub_chainId`. Parameters are
//! positional.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use relayhub_contracts::{execute_raw_transaction, DispatchOutcome, HubError, RelayHub};
use relayhub_protocol::transaction::{recover_request_signer, RelayRequest, RelayRequestInput};

use crate::metrics::SharedMetrics;

/// Default and maximum page size for `GET /events`.
const DEFAULT_EVENT_PAGE: usize = 100;
const MAX_EVENT_PAGE: usize = 1000;

// JSON-RPC 2.0 error codes.
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
/// The hub refused the operation.
const HUB_REJECTED: i32 = -32000;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub hub: Arc<RelayHub>,
    pub metrics: SharedMetrics,
}

/// Current ledger time in seconds.
pub fn ledger_time() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/relays/:address", get(relay_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/events", get(events_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    /// Echoed back in the response.
    pub id: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {err}"))
    }
}

impl From<HubError> for JsonRpcError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Storage(_) | HubError::Config(_) => Self::internal(err),
            other => Self::new(HUB_REJECTED, other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub chain_id: u64,
    pub hub_address: Address,
    pub relay_count: usize,
    pub registered_relays: usize,
    pub total_burned: U256,
    pub event_count: u64,
    /// RFC 3339 time of the response.
    pub timestamp: String,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    pub balance: U256,
    /// Next raw-transaction nonce.
    pub nonce: u64,
    /// Sponsor deposit held by the hub.
    pub deposit: U256,
    /// Next relay-request `senderNonce`.
    pub sender_nonce: U256,
}

/// Result of `hub_verifyRelayRequest`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    /// Recovered signer, when the signature is well-formed.
    pub signer: Option<Address>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

fn parse_address(raw: &str) -> Result<Address, Response> {
    raw.parse::<Address>().map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("invalid address {raw:?}: {e}"))
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.hub.snapshot();
    let config = state.hub.config();
    Json(StatusResponse {
        version: state.version.clone(),
        chain_id: config.chain_id,
        hub_address: config.hub_address,
        relay_count: snapshot.relays.len(),
        registered_relays: snapshot.registered_relay_count(),
        total_burned: snapshot.total_burned,
        event_count: snapshot.event_count,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /relays/:address`
async fn relay_handler(Path(address): Path<String>, State(state): State<AppState>) -> Response {
    let address = match parse_address(&address) {
        Ok(address) => address,
        Err(response) => return response,
    };
    match state.hub.relay(&address) {
        Some(relay) => (StatusCode::OK, Json(relay)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("relay {address} not found")),
    }
}

/// `GET /accounts/:address`
///
/// Unknown addresses report zeroed state rather than 404.
async fn account_handler(Path(address): Path<String>, State(state): State<AppState>) -> Response {
    let address = match parse_address(&address) {
        Ok(address) => address,
        Err(response) => return response,
    };
    let account = state.hub.account(&address);
    Json(AccountResponse {
        address,
        balance: account.balance,
        nonce: account.nonce,
        deposit: state.hub.balance_of(&address),
        sender_nonce: state.hub.get_nonce(&address),
    })
    .into_response()
}

/// `GET /events?since=N&limit=M`
async fn events_handler(Query(query): Query<EventsQuery>, State(state): State<AppState>) -> Response {
    let since = query.since.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_PAGE).min(MAX_EVENT_PAGE);
    match state.hub.events_since(since, limit) {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `POST /rpc`
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let outcome = if req.jsonrpc != "2.0" {
        Err(JsonRpcError::new(
            INVALID_REQUEST,
            "Invalid Request: jsonrpc must be \"2.0\"",
        ))
    } else {
        dispatch_rpc(&state, &req.method, req.params.as_ref()).await
    };

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(error) => (None, Some(error)),
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

async fn dispatch_rpc(
    state: &AppState,
    method: &str,
    params: Option<&Value>,
) -> Result<Value, JsonRpcError> {
    match method {
        "hub_chainId" => Ok(json!(state.hub.config().chain_id)),
        "hub_getRelay" => {
            let address: Address = param(params, 0, "address")?;
            to_value(state.hub.relay(&address))
        }
        "hub_getNonce" => {
            let sender: Address = param(params, 0, "sender")?;
            to_value(state.hub.get_nonce(&sender))
        }
        "hub_balanceOf" => {
            let target: Address = param(params, 0, "target")?;
            to_value(state.hub.balance_of(&target))
        }
        "hub_verifyRelayRequest" => {
            let input: RelayRequestInput = param(params, 0, "request")?;
            let signature = hex_param(params, 1, "signature")?;
            let request = RelayRequest::try_from(input)
                .map_err(|e| JsonRpcError::new(INVALID_PARAMS, e.to_string()))?;
            let response = match recover_request_signer(&request, &signature, state.hub.domain()) {
                Ok(signer) => VerifyResponse {
                    valid: signer == request.relayData.senderAccount,
                    signer: Some(signer),
                },
                Err(_) => VerifyResponse {
                    valid: false,
                    signer: None,
                },
            };
            to_value(response)
        }
        "hub_sendRawTransaction" => {
            let raw = hex_param(params, 0, "raw")?;
            let outcome = submit_raw_transaction(state, raw).await?;
            to_value(outcome)
        }
        _ => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )),
    }
}

/// Execute a raw transaction off the async runtime and record its metrics.
async fn submit_raw_transaction(
    state: &AppState,
    raw: Vec<u8>,
) -> Result<DispatchOutcome, JsonRpcError> {
    let metrics = &state.metrics;
    metrics.transactions_submitted_total.inc();
    let timer = metrics.transaction_latency_seconds.start_timer();

    let hub = Arc::clone(&state.hub);
    let result =
        tokio::task::spawn_blocking(move || execute_raw_transaction(&hub, &raw, ledger_time()))
            .await
            .map_err(JsonRpcError::internal)?;
    timer.observe_duration();

    match result {
        Ok(outcome) => {
            if outcome.receipt.contains("Penalized") {
                metrics.penalizations_total.inc();
            }
            let registered = state.hub.snapshot().registered_relay_count();
            metrics.registered_relays.set(registered as i64);
            Ok(outcome)
        }
        Err(err) => {
            metrics.operations_rejected_total.inc();
            tracing::debug!(error = %err, "raw transaction rejected");
            Err(err.into())
        }
    }
}

fn to_value(value: impl Serialize) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}

/// Positional parameter `index`, deserialized as `T`.
fn param<T: DeserializeOwned>(
    params: Option<&Value>,
    index: usize,
    name: &str,
) -> Result<T, JsonRpcError> {
    let value = params
        .and_then(Value::as_array)
        .and_then(|arr| arr.get(index))
        .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: missing {name}")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {name}: {e}")))
}

/// Positional hex-string parameter, `0x` prefix optional.
fn hex_param(params: Option<&Value>, index: usize, name: &str) -> Result<Vec<u8>, JsonRpcError> {
    let text: String = param(params, index, name)?;
    let digits = text.strip_prefix("0x").unwrap_or(&text);
    hex::decode(digits)
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {name}: {e}")))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws`: push-only feed of committed [`EventRecord`]s as JSON.
///
/// [`EventRecord`]: relayhub_protocol::storage::EventRecord
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.hub.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(record) => {
                    let payload = match serde_json::to_string(&record) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize ws event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // The client can backfill from GET /events.
                    tracing::warn!(skipped = n, "ws subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
