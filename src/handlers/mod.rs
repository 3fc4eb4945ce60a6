pub mod common;
pub mod customers;
pub mod health;
pub mod inventory;
pub mod products;
pub mod purchase_orders;
pub mod sales_orders;
pub mod suppliers;
pub mod warehouses;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::customers::CustomerService;
use crate::services::movements::MovementService;
use crate::services::products::ProductService;
use crate::services::purchase_orders::PurchaseOrderService;
use crate::services::sales_orders::SalesOrderService;
use crate::services::stock_locks::{OrderLocks, StockLocks};
use crate::services::suppliers::SupplierService;
use crate::services::warehouses::WarehouseService;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
///
/// All movement-emitting services share one pair of lock registries, so
/// manual adjustments, transfers, receipts, and shipments all serialize on
/// the same per-key locks.
#[derive(Clone)]
pub struct AppServices {
    pub movements: Arc<MovementService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub sales_orders: Arc<SalesOrderService>,
    pub products: Arc<ProductService>,
    pub warehouses: Arc<WarehouseService>,
    pub suppliers: Arc<SupplierService>,
    pub customers: Arc<CustomerService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        let stock_locks = Arc::new(StockLocks::new());
        let order_locks = Arc::new(OrderLocks::new());

        let movements = Arc::new(MovementService::new(
            db.clone(),
            event_sender.clone(),
            stock_locks.clone(),
        ));
        let purchase_orders = Arc::new(PurchaseOrderService::new(
            db.clone(),
            event_sender.clone(),
            stock_locks.clone(),
            order_locks.clone(),
        ));
        let sales_orders = Arc::new(SalesOrderService::new(
            db.clone(),
            event_sender,
            stock_locks,
            order_locks,
        ));

        Self {
            movements,
            purchase_orders,
            sales_orders,
            products: Arc::new(ProductService::new(db.clone())),
            warehouses: Arc::new(WarehouseService::new(db.clone())),
            suppliers: Arc::new(SupplierService::new(db.clone())),
            customers: Arc::new(CustomerService::new(db)),
        }
    }
}
