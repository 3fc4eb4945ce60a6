use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::sales_order::SalesOrderStatus;
use crate::entities::sales_order_line::SalesLineStatus;
use crate::entities::stock_movement::{MovementDirection, MovementType};
use crate::entities::{customer, sales_order, sales_order_line};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::balances;
use crate::services::movements::{
    apply_movement, ensure_active_product, ensure_active_warehouse, RecordMovementRequest,
};
use crate::services::stock_locks::{OrderLocks, StockLocks};

lazy_static! {
    static ref SO_SHIPMENTS: IntCounter = register_int_counter!(
        "sales_order_shipments_total",
        "Total number of completed sales order shipments"
    )
    .expect("metric can be created");
    static ref SO_SHIPMENT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "sales_order_shipment_failures_total",
        "Total number of rejected sales order shipments",
        &["error_type"]
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSalesOrderRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Order number is required"))]
    pub order_no: String,
    pub order_date: NaiveDate,
    pub expected_ship_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
    pub lines: Vec<SalesOrderLineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SalesOrderLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub qty: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipOrderRequest {
    pub warehouse_id: Uuid,
    pub shipped_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrderResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_no: String,
    pub status: SalesOrderStatus,
    pub order_date: NaiveDate,
    pub expected_ship_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<SalesOrderLineResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrderLineResponse {
    pub id: Uuid,
    pub line_no: i32,
    pub product_id: Uuid,
    pub qty: i32,
    pub unit_price: Decimal,
    pub shipped_qty: i32,
    pub status: SalesLineStatus,
}

#[derive(Debug, Serialize)]
pub struct SalesOrderListResponse {
    pub orders: Vec<SalesOrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Drives sales orders through DRAFT → APPROVED → CLOSED. Shipment is
/// all-or-nothing: every open line ships completely from one warehouse in a
/// single operation, or nothing ships at all.
#[derive(Clone)]
pub struct SalesOrderService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    stock_locks: Arc<StockLocks>,
    order_locks: Arc<OrderLocks>,
}

impl SalesOrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        stock_locks: Arc<StockLocks>,
        order_locks: Arc<OrderLocks>,
    ) -> Self {
        Self {
            db,
            event_sender,
            stock_locks,
            order_locks,
        }
    }

    /// Creates a draft order with its full, immutable line set.
    #[instrument(skip(self, request), fields(order_no = %request.order_no, customer_id = %request.customer_id))]
    pub async fn create_order(
        &self,
        request: CreateSalesOrderRequest,
    ) -> Result<SalesOrderResponse, ServiceError> {
        request.validate()?;
        if request.lines.is_empty() {
            return Err(ServiceError::InvalidInput(
                "A sales order requires at least one line".to_string(),
            ));
        }
        for line in &request.lines {
            line.validate()?;
            if line.unit_price < Decimal::ZERO {
                return Err(ServiceError::InvalidInput(
                    "Unit price cannot be negative".to_string(),
                ));
            }
        }

        let db = &*self.db;
        let customer = customer::Entity::find_by_id(request.customer_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", request.customer_id))
            })?;
        if !customer.is_active {
            return Err(ServiceError::InvalidInput(format!(
                "Customer {} is inactive",
                customer.name
            )));
        }

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;
        ensure_unique_order_no(&txn, &request.order_no).await?;

        let now = Utc::now();
        let order = sales_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(request.customer_id),
            order_no: Set(request.order_no.clone()),
            status: Set(SalesOrderStatus::Draft),
            order_date: Set(request.order_date),
            expected_ship_date: Set(request.expected_ship_date),
            note: Set(request.note.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        let mut lines = Vec::with_capacity(request.lines.len());
        for (index, line) in request.lines.iter().enumerate() {
            ensure_active_product(&txn, line.product_id).await?;
            let inserted = sales_order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                sales_order_id: Set(order.id),
                line_no: Set(index as i32 + 1),
                product_id: Set(line.product_id),
                qty: Set(line.qty),
                unit_price: Set(line.unit_price),
                shipped_qty: Set(0),
                status: Set(SalesLineStatus::Pending),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
            lines.push(inserted);
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order.id, order_no = %order.order_no, line_count = %lines.len(), "Sales order created");
        self.notify(Event::SalesOrderCreated(order.id)).await;

        Ok(to_response(order, lines))
    }

    /// DRAFT → APPROVED. Any other starting state is an invalid transition.
    #[instrument(skip(self))]
    pub async fn approve_order(&self, order_id: Uuid) -> Result<SalesOrderResponse, ServiceError> {
        let _order_guard = self.order_locks.acquire(order_id).await;
        let db = &*self.db;

        let order = find_order(db, order_id).await?;
        if order.status != SalesOrderStatus::Draft {
            return Err(ServiceError::InvalidTransition(format!(
                "Only draft sales orders can be approved; order {} is {:?}",
                order.order_no, order.status
            )));
        }

        let mut active: sales_order::ActiveModel = order.into();
        active.status = Set(SalesOrderStatus::Approved);
        active.updated_at = Set(Utc::now());
        let updated = active
            .update(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        info!(order_id = %updated.id, order_no = %updated.order_no, "Sales order approved");
        self.notify(Event::SalesOrderApproved(updated.id)).await;

        self.load_response(updated).await
    }

    /// Ships every open line from the chosen warehouse and closes the order.
    ///
    /// Availability of every line is verified before any movement is
    /// emitted; the first line that cannot be covered aborts the whole
    /// shipment and no line's shipped quantity changes.
    #[instrument(skip(self, request), fields(order_id = %order_id, warehouse_id = %request.warehouse_id))]
    pub async fn ship_order(
        &self,
        order_id: Uuid,
        request: ShipOrderRequest,
    ) -> Result<SalesOrderResponse, ServiceError> {
        let result = self.ship_order_inner(order_id, &request).await;
        match &result {
            Ok(_) => SO_SHIPMENTS.inc(),
            Err(e) => {
                SO_SHIPMENT_FAILURES
                    .with_label_values(&[shipment_error_label(e)])
                    .inc();
            }
        }
        result
    }

    async fn ship_order_inner(
        &self,
        order_id: Uuid,
        request: &ShipOrderRequest,
    ) -> Result<SalesOrderResponse, ServiceError> {
        let _order_guard = self.order_locks.acquire(order_id).await;
        let db = &*self.db;

        let order = find_order(db, order_id).await?;
        if order.status != SalesOrderStatus::Approved {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} must be approved to ship goods",
                order.order_no
            )));
        }

        let warehouse = ensure_active_warehouse(db, request.warehouse_id).await?;

        let lines = order_lines(db, order_id).await?;
        let open_lines: Vec<_> = lines
            .iter()
            .filter(|line| line.shipped_qty < line.qty)
            .cloned()
            .collect();

        let keys: Vec<(Uuid, Uuid)> = open_lines
            .iter()
            .map(|line| (line.product_id, request.warehouse_id))
            .collect();
        let _stock_guards = self.stock_locks.acquire_many(&keys).await;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        // First verify every line can be covered; no movement is emitted
        // until the whole order is known to be shippable.
        for line in &open_lines {
            let remaining = line.qty - line.shipped_qty;
            let balance =
                balances::get_or_create(&txn, line.product_id, request.warehouse_id).await?;
            if balance.available_qty < remaining {
                return Err(ServiceError::InsufficientStock(format!(
                    "Available quantity {} at warehouse {} is less than {} required by line {}",
                    balance.available_qty, warehouse.code, remaining, line.id
                )));
            }
        }

        for line in &open_lines {
            let remaining = line.qty - line.shipped_qty;
            apply_movement(
                &txn,
                &RecordMovementRequest {
                    product_id: line.product_id,
                    warehouse_id: request.warehouse_id,
                    direction: MovementDirection::Out,
                    quantity: remaining,
                    movement_type: MovementType::Sales,
                    ref_document_no: Some(order.order_no.clone()),
                    ref_line_id: Some(line.id),
                    note: Some(format!("Sales shipment - {}", order.order_no)),
                    created_by: request.shipped_by,
                },
            )
            .await?;

            let line_qty = line.qty;
            let mut line_active: sales_order_line::ActiveModel = line.clone().into();
            line_active.shipped_qty = Set(line_qty);
            line_active.status = Set(SalesLineStatus::Shipped);
            line_active
                .update(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }

        let order_no = order.order_no.clone();
        let mut order_active: sales_order::ActiveModel = order.into();
        order_active.status = Set(SalesOrderStatus::Closed);
        order_active.updated_at = Set(Utc::now());
        let updated_order = order_active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            order_id = %order_id,
            order_no = %order_no,
            warehouse = %warehouse.code,
            line_count = %open_lines.len(),
            "Sales order shipped"
        );

        self.notify(Event::SalesOrderShipped {
            order_id,
            warehouse_id: request.warehouse_id,
        })
        .await;

        self.load_response(updated_order).await
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<SalesOrderResponse, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        self.load_response(order).await
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<SalesOrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<SalesOrderListResponse, ServiceError> {
        let db = &*self.db;
        let mut query = sales_order::Entity::find();
        if let Some(status) = status {
            query = query.filter(sales_order::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(sales_order::Column::CreatedAt)
            .paginate(db, per_page.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let orders = paginator
            .fetch_page(page.max(1) - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let all_lines = sales_order_line::Entity::find()
            .filter(sales_order_line::Column::SalesOrderId.is_in(order_ids))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let responses = orders
            .into_iter()
            .map(|order| {
                let lines: Vec<_> = all_lines
                    .iter()
                    .filter(|l| l.sales_order_id == order.id)
                    .cloned()
                    .collect();
                to_response(order, lines)
            })
            .collect();

        Ok(SalesOrderListResponse {
            orders: responses,
            total,
            page: page.max(1),
            per_page: per_page.max(1),
        })
    }

    async fn load_response(
        &self,
        order: sales_order::Model,
    ) -> Result<SalesOrderResponse, ServiceError> {
        let lines = order_lines(&*self.db, order.id).await?;
        Ok(to_response(order, lines))
    }

    /// Events are emitted after commit; a failed send is logged but never
    /// reported as an operation failure, because the write already happened.
    async fn notify(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send event");
            }
        }
    }
}

async fn find_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<sales_order::Model, ServiceError> {
    sales_order::Entity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Sales order {} not found", order_id)))
}

async fn order_lines<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<sales_order_line::Model>, ServiceError> {
    sales_order_line::Entity::find()
        .filter(sales_order_line::Column::SalesOrderId.eq(order_id))
        .order_by_asc(sales_order_line::Column::LineNo)
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

async fn ensure_unique_order_no<C: ConnectionTrait>(
    conn: &C,
    order_no: &str,
) -> Result<(), ServiceError> {
    let existing = sales_order::Entity::find()
        .filter(sales_order::Column::OrderNo.eq(order_no))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;
    if existing.is_some() {
        return Err(ServiceError::DuplicateOrderNumber(format!(
            "Sales order number {} already exists",
            order_no
        )));
    }
    Ok(())
}

fn to_response(order: sales_order::Model, lines: Vec<sales_order_line::Model>) -> SalesOrderResponse {
    SalesOrderResponse {
        id: order.id,
        customer_id: order.customer_id,
        order_no: order.order_no,
        status: order.status,
        order_date: order.order_date,
        expected_ship_date: order.expected_ship_date,
        note: order.note,
        created_at: order.created_at,
        updated_at: order.updated_at,
        lines: lines
            .into_iter()
            .map(|line| SalesOrderLineResponse {
                id: line.id,
                line_no: line.line_no,
                product_id: line.product_id,
                qty: line.qty,
                unit_price: line.unit_price,
                shipped_qty: line.shipped_qty,
                status: line.status,
            })
            .collect(),
    }
}

fn shipment_error_label(error: &ServiceError) -> &'static str {
    match error {
        ServiceError::InsufficientStock(_) => "insufficient_stock",
        ServiceError::InvalidTransition(_) => "invalid_transition",
        ServiceError::NotFound(_) => "not_found",
        ServiceError::ValidationError(_) | ServiceError::InvalidInput(_) => "invalid_input",
        ServiceError::DatabaseError(_) => "database",
        _ => "other",
    }
}
