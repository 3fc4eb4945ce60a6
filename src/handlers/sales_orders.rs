use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::entities::sales_order::SalesOrderStatus;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::sales_orders::{CreateSalesOrderRequest, ShipOrderRequest};

#[derive(Debug, Deserialize)]
pub struct SalesOrderListQuery {
    pub status: Option<SalesOrderStatus>,
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
        .route("/", get(list_sales_orders).post(create_sales_order))
        .route("/:id", get(get_sales_order))
        .route("/:id/approve", post(approve_sales_order))
        .route("/:id/ship", post(ship_sales_order))
}

/// Create a new draft sales order with its lines
pub async fn create_sales_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateSalesOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.sales_orders.create_order(payload).await?;
    Ok(created_response(order))
}

/// List sales orders, optionally filtered by status
pub async fn list_sales_orders(
    State(state): State<AppState>,
    Query(query): Query<SalesOrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state
        .services
        .sales_orders
        .list_orders(query.status, query.page, query.per_page)
        .await?;
    Ok(success_response(orders))
}

/// Fetch a sales order with its lines
pub async fn get_sales_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.sales_orders.get_order(order_id).await?;
    Ok(success_response(order))
}

/// DRAFT → APPROVED
pub async fn approve_sales_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.sales_orders.approve_order(order_id).await?;
    Ok(success_response(order))
}

/// Ship every open line from one warehouse and close the order
pub async fn ship_sales_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ShipOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .sales_orders
        .ship_order(order_id, payload)
        .await?;
    Ok(success_response(order))
}
