use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use uuid::Uuid;

use super::common::{created_response, success_response, PaginationParams};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::warehouses::{CreateWarehouseRequest, UpdateWarehouseRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_warehouses).post(create_warehouse))
        .route("/:id", get(get_warehouse))
        .route("/:id", put(update_warehouse))
}

pub async fn create_warehouse(
    State(state): State<AppState>,
    Json(payload): Json<CreateWarehouseRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let warehouse = state.services.warehouses.create(payload).await?;
    Ok(created_response(warehouse))
}

pub async fn list_warehouses(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (warehouses, total) = state
        .services
        .warehouses
        .list(pagination.page, pagination.per_page)
        .await?;
    Ok(success_response(serde_json::json!({
        "warehouses": warehouses,
        "total": total,
        "page": pagination.page,
        "per_page": pagination.per_page,
    })))
}

pub async fn get_warehouse(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let warehouse = state.services.warehouses.get(warehouse_id).await?;
    Ok(success_response(warehouse))
}

pub async fn update_warehouse(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
    Json(payload): Json<UpdateWarehouseRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let warehouse = state
        .services
        .warehouses
        .update(warehouse_id, payload)
        .await?;
    Ok(success_response(warehouse))
}
