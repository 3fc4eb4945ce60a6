use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::entities::purchase_order::PurchaseOrderStatus;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::purchase_orders::{CreatePurchaseOrderRequest, ReceiveLineRequest};

#[derive(Debug, Deserialize)]
pub struct PurchaseOrderListQuery {
    pub status: Option<PurchaseOrderStatus>,
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

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_purchase_orders).post(create_purchase_order))
        .route("/:id", get(get_purchase_order))
        .route("/:id/approve", post(approve_purchase_order))
        .route("/:id/receive", post(receive_purchase_order_line))
}

/// Create a new draft purchase order with its lines
pub async fn create_purchase_order(
    State(state): State<AppState>,
    Json(payload): Json<CreatePurchaseOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.purchase_orders.create_order(payload).await?;
    Ok(created_response(order))
}

/// List purchase orders, optionally filtered by status
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    Query(query): Query<PurchaseOrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state
        .services
        .purchase_orders
        .list_orders(query.status, query.page, query.per_page)
        .await?;
    Ok(success_response(orders))
}

/// Fetch a purchase order with its lines
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.purchase_orders.get_order(order_id).await?;
    Ok(success_response(order))
}

/// DRAFT → APPROVED
pub async fn approve_purchase_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.purchase_orders.approve_order(order_id).await?;
    Ok(success_response(order))
}

/// Receive goods against one order line into a warehouse
pub async fn receive_purchase_order_line(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ReceiveLineRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .purchase_orders
        .receive_line(order_id, payload)
        .await?;
    Ok(success_response(order))
}
