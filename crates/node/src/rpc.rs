//! HTTP RPC surface.
//!
//! Deliberately small: transaction submission and read-only status. All
//! reads go through the engine-published snapshot; nothing here touches
//! consensus state directly.

use crate::metrics;
use crate::runner::NodeHandle;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tessera_types::keccak256;
use tracing::info;

/// Request body for `POST /transactions`.
#[derive(Debug, Deserialize)]
pub struct SubmitTransactionRequest {
    /// Hex-encoded raw transaction.
    pub raw: String,
}

/// Response body for `POST /transactions`.
#[derive(Debug, Serialize)]
pub struct SubmitTransactionResponse {
    /// keccak-256 hash of the submitted payload.
    pub hash: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Build the RPC router around a node handle.
pub fn router(handle: NodeHandle) -> Router {
    Router::new()
        .route("/transactions", post(submit_transaction))
        .route("/status", get(status))
        .route("/metrics", get(render_metrics))
        .with_state(handle)
}

/// Serve the router on `addr` until the process exits.
pub async fn serve(handle: NodeHandle, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "RPC listening");
    axum::serve(listener, router(handle)).await
}

async fn submit_transaction(
    State(handle): State<NodeHandle>,
    Json(request): Json<SubmitTransactionRequest>,
) -> Result<Json<SubmitTransactionResponse>, (StatusCode, Json<ErrorBody>)> {
    let raw = hex::decode(request.raw.trim_start_matches("0x")).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: format!("invalid hex: {e}"),
            }),
        )
    })?;
    if raw.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "empty transaction".to_string(),
            }),
        ));
    }

    let hash = keccak256(&raw);
    if !handle.submit_transaction(raw) {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "node is overloaded, retry later".to_string(),
            }),
        ));
    }
    Ok(Json(SubmitTransactionResponse {
        hash: format!("{hash}"),
    }))
}

async fn status(State(handle): State<NodeHandle>) -> Json<tessera_consensus::ChainSnapshot> {
    Json(handle.snapshot())
}

async fn render_metrics() -> String {
    metrics::render()
}
