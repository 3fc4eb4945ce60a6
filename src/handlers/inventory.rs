use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::entities::stock_movement::{self, MovementType};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::movements::{MovementFilter, RecordMovementRequest, TransferStockRequest};

#[derive(Debug, Deserialize)]
pub struct MovementListQuery {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Serialize)]
pub struct MovementListResponse {
    pub movements: Vec<stock_movement::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Deserialize)]
pub struct BalanceListQuery {
    pub warehouse_id: Option<Uuid>,
    #[serde(default)]
    pub low_stock: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/movements", get(list_movements).post(create_movement))
        .route("/transfers", post(transfer_stock))
        .route("/balances", get(list_balances))
        .route("/balances/:product_id/:warehouse_id", get(get_balance))
        .route(
            "/balances/:product_id/:warehouse_id/rebuild",
            post(rebuild_balance),
        )
        .route("/ledger/:product_id/:warehouse_id", get(get_ledger))
}

/// Record a manual stock movement (adjustment, correction, etc.)
pub async fn create_movement(
    State(state): State<AppState>,
    Json(payload): Json<RecordMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let movement = state.services.movements.record_movement(payload).await?;
    Ok(created_response(movement))
}

/// List ledger entries, newest first
pub async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<MovementListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filter = MovementFilter {
        product_id: query.product_id,
        warehouse_id: query.warehouse_id,
        movement_type: query.movement_type,
    };
    let (movements, total) = state
        .services
        .movements
        .list_movements(filter, query.page, query.per_page)
        .await?;
    Ok(success_response(MovementListResponse {
        movements,
        total,
        page: query.page,
        per_page: query.per_page,
    }))
}

/// Move stock between two warehouses
pub async fn transfer_stock(
    State(state): State<AppState>,
    Json(payload): Json<TransferStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state.services.movements.transfer(payload).await?;
    Ok(created_response(result))
}

/// List balances joined with product data
pub async fn list_balances(
    State(state): State<AppState>,
    Query(query): Query<BalanceListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let balances = state
        .services
        .movements
        .list_balances(query.warehouse_id, query.low_stock)
        .await?;
    Ok(success_response(
        serde_json::json!({ "inventory_balances": balances }),
    ))
}

/// Read one (product, warehouse) balance
pub async fn get_balance(
    State(state): State<AppState>,
    Path((product_id, warehouse_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let balance = state
        .services
        .movements
        .get_balance(product_id, warehouse_id)
        .await?;
    Ok(success_response(balance))
}

/// Recompute one balance from the ledger fold
pub async fn rebuild_balance(
    State(state): State<AppState>,
    Path((product_id, warehouse_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let balance = state
        .services
        .movements
        .rebuild_balance(product_id, warehouse_id)
        .await?;
    Ok(success_response(balance))
}

/// The replayable per-key movement log, in commit order
pub async fn get_ledger(
    State(state): State<AppState>,
    Path((product_id, warehouse_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let movements = state
        .services
        .movements
        .movements_for(product_id, warehouse_id)
        .await?;
    Ok(success_response(serde_json::json!({ "movements": movements })))
}
