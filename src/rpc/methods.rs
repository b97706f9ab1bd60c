//! REST handlers
//!
//! Thin wrappers over `Node`. Failures come back as
//! `{ "errorMessage": ... }` with 404 for lookup misses and 400 otherwise.

use crate::crypto::Hash;
use crate::node::{Node, NodeError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Handler state
#[derive(Clone)]
pub struct RestState {
    pub node: Node,
    /// HTTP port, used to render absolute URLs in the documentation
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_message: String,
}

/// Error returned by a handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<NodeError> for ApiError {
    fn from(e: NodeError) -> Self {
        let status = if e.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::BAD_REQUEST
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error_message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct UrlDescription {
    pub url: String,
    pub method: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<&'static str>,
}

const ENDPOINTS: &[(&str, &str, &str, Option<&str>)] = &[
    ("/", "GET", "See documentation", None),
    ("/status", "GET", "See the status of the blockchain", None),
    ("/blocks", "GET", "See all blocks", None),
    ("/blocks", "POST", "Mine a block from the mempool", None),
    ("/blocks/{hash}", "GET", "See a block", None),
    ("/balance/{address}", "GET", "Get unspent outputs for an address (?total=true for the sum)", None),
    ("/mempool", "GET", "See pending transactions", None),
    ("/wallet", "GET", "See the node wallet address", None),
    ("/transactions", "POST", "Send from the node wallet", Some("to:string, amount:int")),
    ("/peers", "GET", "See connected peers", None),
    ("/peers", "POST", "Connect to a peer", Some("address:string, port:int")),
];

pub async fn documentation(State(state): State<RestState>) -> Json<Vec<UrlDescription>> {
    let docs = ENDPOINTS
        .iter()
        .map(|&(path, method, description, payload)| UrlDescription {
            url: format!("http://localhost:{}{}", state.port, path),
            method,
            description,
            payload,
        })
        .collect();
    Json(docs)
}

pub async fn status(State(state): State<RestState>) -> impl IntoResponse {
    Json(state.node.chain_status())
}

pub async fn get_blocks(State(state): State<RestState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.node.get_blocks()?))
}

pub async fn add_block(State(state): State<RestState>) -> ApiResult<impl IntoResponse> {
    let block = state.node.add_local_block().await?;
    Ok((StatusCode::CREATED, Json(block)))
}

pub async fn get_block(
    State(state): State<RestState>,
    Path(hash): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let hash = Hash::from_hex(&hash)
        .map_err(|e| ApiError::bad_request(format!("Invalid block hash: {e}")))?;
    Ok(Json(state.node.get_block(&hash)?))
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    total: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

pub async fn balance(
    State(state): State<RestState>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult<Response> {
    if query.total.as_deref() == Some("true") {
        let balance = state.node.balance(&address)?;
        Ok(Json(BalanceResponse { address, balance }).into_response())
    } else {
        Ok(Json(state.node.unspent_outputs(&address)?).into_response())
    }
}

pub async fn mempool(State(state): State<RestState>) -> impl IntoResponse {
    Json(state.node.mempool())
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletResponse {
    pub address: String,
}

pub async fn wallet(State(state): State<RestState>) -> Json<WalletResponse> {
    Json(WalletResponse {
        address: state.node.wallet_address(),
    })
}

#[derive(Debug, Deserialize)]
pub struct AddTxPayload {
    pub to: String,
    pub amount: u64,
}

pub async fn transactions(
    State(state): State<RestState>,
    Json(payload): Json<AddTxPayload>,
) -> ApiResult<impl IntoResponse> {
    let tx = state.node.submit_transaction(&payload.to, payload.amount)?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// Accepts the port as a number or a numeric string
fn port_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }
    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddPeerPayload {
    pub address: String,
    #[serde(deserialize_with = "port_from_any")]
    pub port: u16,
}

pub async fn get_peers(State(state): State<RestState>) -> Json<Vec<String>> {
    Json(state.node.list_peers())
}

pub async fn add_peer(
    State(state): State<RestState>,
    Json(payload): Json<AddPeerPayload>,
) -> ApiResult<StatusCode> {
    state
        .node
        .connect_to_peer(&payload.address, payload.port)
        .await
        .map_err(|e| {
            warn!(address = %payload.address, port = payload.port, error = %e, "Peer connection failed");
            ApiError::from(e)
        })?;
    Ok(StatusCode::OK)
}
