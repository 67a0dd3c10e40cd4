//! HTTP API for the `serve` command
//!
//! - GET /health - liveness plus store availability
//! - GET /metrics - Prometheus metrics
//! - GET /transfers/{request_id} - persisted bridge transfer record
//! - GET /transfers/{request_id}/mint - confirmation status of the mint leg

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::info;

use crate::cancel::CancelToken;
use crate::error::BridgeError;
use crate::orchestrator::BridgeOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BridgeOrchestrator>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: String,
}

fn error_response(err: BridgeError) -> Response {
    let status = match &err {
        BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
        BridgeError::InvalidInput(_) | BridgeError::UnknownNetwork(_) => StatusCode::BAD_REQUEST,
        BridgeError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::NetworkUnavailable { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        store: state.orchestrator.has_store(),
    })
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

async fn transfer(State(state): State<AppState>, Path(request_id): Path<String>) -> Response {
    match state.orchestrator.get_status(&request_id).await {
        Ok(transfer) => Json(transfer).into_response(),
        Err(e) => error_response(e),
    }
}

async fn mint_status(State(state): State<AppState>, Path(request_id): Path<String>) -> Response {
    match state.orchestrator.mint_status(&request_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/transfers/{request_id}", get(transfer))
        .route("/transfers/{request_id}/mint", get(mint_status))
        .with_state(state)
}

/// Serve until `shutdown` fires
pub async fn start_server(
    bind_address: &str,
    port: u16,
    orchestrator: Arc<BridgeOrchestrator>,
    shutdown: CancelToken,
) -> eyre::Result<()> {
    let app = router(AppState { orchestrator });

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryTransferStore, TransferStore};
    use crate::orchestrator::BridgeTransfer;
    use crate::testing::{orchestrator_with, sample_intent, FakeLedgerFactory, ScriptedAttestationApi};

    fn state(store: Arc<MemoryTransferStore>) -> AppState {
        AppState {
            orchestrator: Arc::new(orchestrator_with(
                Arc::new(FakeLedgerFactory::new()),
                Arc::new(ScriptedAttestationApi::complete_after(1)),
                store,
            )),
        }
    }

    #[tokio::test]
    async fn test_transfer_endpoint() {
        let store = Arc::new(MemoryTransferStore::new());
        store
            .save(&BridgeTransfer::initiate("req-api", sample_intent()))
            .await
            .unwrap();
        let state = state(store);

        let found = transfer(State(state.clone()), Path("req-api".to_string())).await;
        assert_eq!(found.status(), StatusCode::OK);

        let missing = transfer(State(state), Path("nope".to_string())).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mint_status_pending_before_mint() {
        let store = Arc::new(MemoryTransferStore::new());
        store
            .save(&BridgeTransfer::initiate("req-mint", sample_intent()))
            .await
            .unwrap();
        let response = mint_status(State(state(store)), Path("req-mint".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        crate::metrics::record_command("balance", true, 0.01);
        let response = prometheus_metrics().await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_error_status_mapping() {
        let response = error_response(BridgeError::InvalidInput("bad".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = error_response(BridgeError::Storage("down".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
