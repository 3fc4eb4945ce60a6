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
use crate::services::products::{CreateProductRequest, UpdateProductRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product))
        .route("/:id", put(update_product))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.create(payload).await?;
    Ok(created_response(product))
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (products, total) = state
        .services
        .products
        .list(pagination.page, pagination.per_page)
        .await?;
    Ok(success_response(serde_json::json!({
        "products": products,
        "total": total,
        "page": pagination.page,
        "per_page": pagination.per_page,
    })))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.get(product_id).await?;
    Ok(success_response(product))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.update(product_id, payload).await?;
    Ok(success_response(product))
}
