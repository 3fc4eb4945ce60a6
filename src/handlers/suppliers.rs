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
use crate::services::suppliers::{CreateSupplierRequest, UpdateSupplierRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route("/:id", get(get_supplier))
        .route("/:id", put(update_supplier))
}

pub async fn create_supplier(
    State(state): State<AppState>,
    Json(payload): Json<CreateSupplierRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let supplier = state.services.suppliers.create(payload).await?;
    Ok(created_response(supplier))
}

pub async fn list_suppliers(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (suppliers, total) = state
        .services
        .suppliers
        .list(pagination.page, pagination.per_page)
        .await?;
    Ok(success_response(serde_json::json!({
        "suppliers": suppliers,
        "total": total,
        "page": pagination.page,
        "per_page": pagination.per_page,
    })))
}

pub async fn get_supplier(
    State(state): State<AppState>,
    Path(supplier_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let supplier = state.services.suppliers.get(supplier_id).await?;
    Ok(success_response(supplier))
}

pub async fn update_supplier(
    State(state): State<AppState>,
    Path(supplier_id): Path<Uuid>,
    Json(payload): Json<UpdateSupplierRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let supplier = state
        .services
        .suppliers
        .update(supplier_id, payload)
        .await?;
    Ok(success_response(supplier))
}
