use crate::{
    api::{error::ApiError, response::ApiResponse},
    state::AppState,
    validation::{validate_chain_id, validate_evm_address, validate_tx_hash},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

// POST /api/addresses body
#[derive(Debug, Deserialize)]
pub struct RegisterAddressRequest {
    pub wallet_address: String,
    pub chain_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisteredAddress {
    pub wallet_address: String,
    pub chain_id: i64,
    pub created: bool,
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/addresses", post(register_address))
        .route("/api/orders/{tx_hash}", get(get_order))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

// POST /api/addresses handler. Idempotent: 201 on first registration, 200 afterwards.
async fn register_address(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterAddressRequest>,
) -> Result<Response, ApiError> {
    let wallet_address = validate_evm_address(&body.wallet_address)?;
    let chain_id = validate_chain_id(body.chain_id.unwrap_or(state.config.chain_id))?;

    let created = state.addresses.register_address(&wallet_address, chain_id).await?;
    if created {
        info!("Registered monitored address {} on chain {}", wallet_address, chain_id);
    }

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(ApiResponse::new(RegisteredAddress {
        wallet_address,
        chain_id,
        created,
    })
    .with_status(status))
}

// GET /api/orders/{tx_hash} handler. Matches request and fulfillment hashes.
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(tx_hash): Path<String>,
) -> Result<Response, ApiError> {
    let tx_hash = validate_tx_hash(&tx_hash)?;

    match state.orders.order_by_tx_hash(&tx_hash).await? {
        Some(order) => Ok(ApiResponse::new(order).into_response()),
        None => Err(ApiError::OrderNotFound),
    }
}
