//! StockLedger API Library
//!
//! Core of the inventory system: an append-only stock movement ledger,
//! materialized per-(product, warehouse) balances derived from it, and the
//! purchase/sales order fulfillment state machines that feed it.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod migrator;
pub mod services;

use axum::{routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// The full v1 API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/stock", handlers::inventory::routes())
        .nest("/purchase-orders", handlers::purchase_orders::routes())
        .nest("/sales-orders", handlers::sales_orders::routes())
        .nest("/products", handlers::products::routes())
        .nest("/warehouses", handlers::warehouses::routes())
        .nest("/suppliers", handlers::suppliers::routes())
        .nest("/customers", handlers::customers::routes())
}

/// Builds the application router over a prepared state.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "stockledger-api up" }))
        .route("/health", get(handlers::health::health))
        .route(
            "/metrics",
            get(|| async {
                match metrics::render() {
                    Ok(body) => (axum::http::StatusCode::OK, body),
                    Err(_) => (
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                        String::from("metrics error"),
                    ),
                }
            }),
        )
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}
