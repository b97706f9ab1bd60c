//! REST HTTP Server
//!
//! Axum router over the node's public operations.

use crate::node::Node;
use crate::rpc::methods::{self, RestState};
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the REST router
pub fn router(node: Node, port: u16) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(methods::documentation))
        .route("/status", get(methods::status))
        .route("/blocks", get(methods::get_blocks).post(methods::add_block))
        .route("/blocks/:hash", get(methods::get_block))
        .route("/balance/:address", get(methods::balance))
        .route("/mempool", get(methods::mempool))
        .route("/wallet", get(methods::wallet))
        .route("/transactions", axum::routing::post(methods::transactions))
        .route("/peers", get(methods::get_peers).post(methods::add_peer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(RestState { node, port })
}

/// Start the REST server on the specified port
pub async fn start_rest_server(node: Node, port: u16) -> std::io::Result<()> {
    let app = router(node, port);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "REST server listening");
    axum::serve(listener, app).await
}
