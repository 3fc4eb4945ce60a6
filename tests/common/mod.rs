#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;

use stockledger_api::{
    db::{self, DbConfig, DbPool},
    entities::stock_movement::{MovementDirection, MovementType},
    entities::{customer, product, supplier, warehouse},
    events::{self, EventSender},
    handlers::AppServices,
    services::customers::CreateCustomerRequest,
    services::movements::RecordMovementRequest,
    services::products::CreateProductRequest,
    services::purchase_orders::{CreatePurchaseOrderRequest, PurchaseOrderLineRequest},
    services::sales_orders::{CreateSalesOrderRequest, SalesOrderLineRequest},
    services::suppliers::CreateSupplierRequest,
    services::warehouses::CreateWarehouseRequest,
};

/// Test harness backed by an in-memory SQLite database. The pool is capped
/// at a single connection so every task sees the same database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("migrations should run on a fresh database");

        let (tx, rx) = mpsc::channel(1024);
        let sender = EventSender::new(tx);
        let event_task = tokio::spawn(events::process_events(rx));

        let db = Arc::new(pool);
        let services = AppServices::new(db.clone(), Some(Arc::new(sender)));
        Self {
            db,
            services,
            _event_task: event_task,
        }
    }

    pub async fn create_product(&self, sku: &str) -> product::Model {
        self.services
            .products
            .create(CreateProductRequest {
                sku: sku.to_string(),
                name: format!("{} test product", sku),
                category: None,
                unit: "pcs".to_string(),
                barcode: None,
                reorder_point: 0,
                safety_stock: 0,
            })
            .await
            .expect("product should be created")
    }

    pub async fn create_warehouse(&self, code: &str) -> warehouse::Model {
        self.services
            .warehouses
            .create(CreateWarehouseRequest {
                code: code.to_string(),
                name: format!("{} warehouse", code),
                address: None,
            })
            .await
            .expect("warehouse should be created")
    }

    pub async fn create_supplier(&self, name: &str) -> supplier::Model {
        self.services
            .suppliers
            .create(CreateSupplierRequest {
                name: name.to_string(),
                contact_name: None,
                email: None,
                phone: None,
                address: None,
                tax_no: None,
            })
            .await
            .expect("supplier should be created")
    }

    pub async fn create_customer(&self, name: &str) -> customer::Model {
        self.services
            .customers
            .create(CreateCustomerRequest {
                name: name.to_string(),
                contact_name: None,
                email: None,
                phone: None,
                address: None,
                tax_no: None,
            })
            .await
            .expect("customer should be created")
    }

    /// Seeds on-hand stock through the movement engine itself.
    pub async fn seed_stock(&self, product_id: Uuid, warehouse_id: Uuid, quantity: i32) {
        self.services
            .movements
            .record_movement(RecordMovementRequest {
                product_id,
                warehouse_id,
                direction: MovementDirection::In,
                quantity,
                movement_type: MovementType::Adjustment,
                ref_document_no: None,
                ref_line_id: None,
                note: Some("seed".to_string()),
                created_by: None,
            })
            .await
            .expect("seed movement should be accepted");
    }

    pub async fn on_hand(&self, product_id: Uuid, warehouse_id: Uuid) -> i32 {
        self.services
            .movements
            .get_balance(product_id, warehouse_id)
            .await
            .expect("balance read should succeed")
            .on_hand_qty
    }

    pub async fn purchase_order_request(
        &self,
        supplier_id: Uuid,
        order_no: &str,
        lines: Vec<(Uuid, i32)>,
    ) -> CreatePurchaseOrderRequest {
        CreatePurchaseOrderRequest {
            supplier_id,
            order_no: order_no.to_string(),
            order_date: order_date(),
            expected_date: None,
            note: None,
            lines: lines
                .into_iter()
                .map(|(product_id, qty)| PurchaseOrderLineRequest {
                    product_id,
                    qty,
                    unit_price: dec!(9.99),
                })
                .collect(),
        }
    }

    pub async fn sales_order_request(
        &self,
        customer_id: Uuid,
        order_no: &str,
        lines: Vec<(Uuid, i32)>,
    ) -> CreateSalesOrderRequest {
        CreateSalesOrderRequest {
            customer_id,
            order_no: order_no.to_string(),
            order_date: order_date(),
            expected_ship_date: None,
            note: None,
            lines: lines
                .into_iter()
                .map(|(product_id, qty)| SalesOrderLineRequest {
                    product_id,
                    qty,
                    unit_price: dec!(19.99),
                })
                .collect(),
        }
    }
}

pub fn order_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
}
