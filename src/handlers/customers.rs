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
use crate::services::customers::{CreateCustomerRequest, UpdateCustomerRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route("/:id", get(get_customer))
        .route("/:id", put(update_customer))
}

pub async fn create_customer(
    State(state): State<AppState>,
    Json(payload): Json<CreateCustomerRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state.services.customers.create(payload).await?;
    Ok(created_response(customer))
}

pub async fn list_customers(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (customers, total) = state
        .services
        .customers
        .list(pagination.page, pagination.per_page)
        .await?;
    Ok(success_response(serde_json::json!({
        "customers": customers,
        "total": total,
        "page": pagination.page,
        "per_page": pagination.per_page,
    })))
}

pub async fn get_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state.services.customers.get(customer_id).await?;
    Ok(success_response(customer))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state
        .services
        .customers
        .update(customer_id, payload)
        .await?;
    Ok(success_response(customer))
}
