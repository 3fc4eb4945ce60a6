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
use crate::entities::purchase_order::PurchaseOrderStatus;
use crate::entities::purchase_order_line::PurchaseLineStatus;
use crate::entities::stock_movement::{MovementDirection, MovementType};
use crate::entities::{purchase_order, purchase_order_line, supplier};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::movements::{
    apply_movement, ensure_active_product, ensure_active_warehouse, RecordMovementRequest,
};
use crate::services::stock_locks::{OrderLocks, StockLocks};

lazy_static! {
    static ref PO_RECEIPTS: IntCounter = register_int_counter!(
        "purchase_order_receipts_total",
        "Total number of purchase order line receipts"
    )
    .expect("metric can be created");
    static ref PO_RECEIPT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "purchase_order_receipt_failures_total",
        "Total number of rejected purchase order line receipts",
        &["error_type"]
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Order number is required"))]
    pub order_no: String,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
    pub lines: Vec<PurchaseOrderLineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub qty: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveLineRequest {
    pub line_id: Uuid,
    pub warehouse_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub received_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderResponse {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub order_no: String,
    pub status: PurchaseOrderStatus,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<PurchaseOrderLineResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderLineResponse {
    pub id: Uuid,
    pub line_no: i32,
    pub product_id: Uuid,
    pub qty: i32,
    pub unit_price: Decimal,
    pub received_qty: i32,
    pub status: PurchaseLineStatus,
}

#[derive(Debug, Serialize)]
pub struct PurchaseOrderListResponse {
    pub orders: Vec<PurchaseOrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Status an order takes after a receipt, given each line's
/// (ordered, received) quantities. Receipts are capped at the ordered
/// quantity, so "every line full" is exactly "all received == qty".
pub fn status_after_receipt(line_quantities: &[(i32, i32)]) -> PurchaseOrderStatus {
    if line_quantities
        .iter()
        .all(|(qty, received)| received >= qty)
    {
        PurchaseOrderStatus::Closed
    } else {
        PurchaseOrderStatus::PartiallyReceived
    }
}

/// Drives purchase orders through DRAFT → APPROVED → PARTIALLY_RECEIVED →
/// CLOSED, emitting IN movements through the movement engine as goods arrive.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    stock_locks: Arc<StockLocks>,
    order_locks: Arc<OrderLocks>,
}

impl PurchaseOrderService {
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
    #[instrument(skip(self, request), fields(order_no = %request.order_no, supplier_id = %request.supplier_id))]
    pub async fn create_order(
        &self,
        request: CreatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        request.validate()?;
        if request.lines.is_empty() {
            return Err(ServiceError::InvalidInput(
                "A purchase order requires at least one line".to_string(),
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
        let supplier = supplier::Entity::find_by_id(request.supplier_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Supplier {} not found", request.supplier_id))
            })?;
        if !supplier.is_active {
            return Err(ServiceError::InvalidInput(format!(
                "Supplier {} is inactive",
                supplier.name
            )));
        }

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;
        ensure_unique_order_no(&txn, &request.order_no).await?;

        let now = Utc::now();
        let order = purchase_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            supplier_id: Set(request.supplier_id),
            order_no: Set(request.order_no.clone()),
            status: Set(PurchaseOrderStatus::Draft),
            order_date: Set(request.order_date),
            expected_date: Set(request.expected_date),
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
            let inserted = purchase_order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(order.id),
                line_no: Set(index as i32 + 1),
                product_id: Set(line.product_id),
                qty: Set(line.qty),
                unit_price: Set(line.unit_price),
                received_qty: Set(0),
                status: Set(PurchaseLineStatus::Pending),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
            lines.push(inserted);
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order.id, order_no = %order.order_no, line_count = %lines.len(), "Purchase order created");
        self.notify(Event::PurchaseOrderCreated(order.id)).await;

        Ok(to_response(order, lines))
    }

    /// DRAFT → APPROVED. Any other starting state is an invalid transition.
    #[instrument(skip(self))]
    pub async fn approve_order(&self, order_id: Uuid) -> Result<PurchaseOrderResponse, ServiceError> {
        let _order_guard = self.order_locks.acquire(order_id).await;
        let db = &*self.db;

        let order = find_order(db, order_id).await?;
        if order.status != PurchaseOrderStatus::Draft {
            return Err(ServiceError::InvalidTransition(format!(
                "Only draft purchase orders can be approved; order {} is {:?}",
                order.order_no, order.status
            )));
        }

        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Approved);
        active.updated_at = Set(Utc::now());
        let updated = active
            .update(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        info!(order_id = %updated.id, order_no = %updated.order_no, "Purchase order approved");
        self.notify(Event::PurchaseOrderApproved(updated.id)).await;

        self.load_response(updated).await
    }

    /// Receives goods against one line: emits an IN/PURCHASE movement,
    /// advances the line's received quantity, and recomputes order status.
    /// Movement, line, and order commit as one unit.
    #[instrument(skip(self, request), fields(order_id = %order_id, line_id = %request.line_id, quantity = %request.quantity))]
    pub async fn receive_line(
        &self,
        order_id: Uuid,
        request: ReceiveLineRequest,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        let result = self.receive_line_inner(order_id, &request).await;
        match &result {
            Ok(_) => PO_RECEIPTS.inc(),
            Err(e) => {
                PO_RECEIPT_FAILURES
                    .with_label_values(&[receipt_error_label(e)])
                    .inc();
            }
        }
        result
    }

    async fn receive_line_inner(
        &self,
        order_id: Uuid,
        request: &ReceiveLineRequest,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        request.validate()?;

        let _order_guard = self.order_locks.acquire(order_id).await;
        let db = &*self.db;

        let order = find_order(db, order_id).await?;
        if !matches!(
            order.status,
            PurchaseOrderStatus::Approved | PurchaseOrderStatus::PartiallyReceived
        ) {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} must be approved to receive goods",
                order.order_no
            )));
        }

        let line = purchase_order_line::Entity::find_by_id(request.line_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .filter(|line| line.purchase_order_id == order_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Line {} not found on purchase order {}",
                    request.line_id, order.order_no
                ))
            })?;

        let remaining = line.qty - line.received_qty;
        if request.quantity > remaining {
            return Err(ServiceError::OverReceipt(format!(
                "Received quantity {} exceeds remaining {} on line {}",
                request.quantity, remaining, line.id
            )));
        }

        ensure_active_warehouse(db, request.warehouse_id).await?;

        let _stock_guard = self
            .stock_locks
            .acquire(line.product_id, request.warehouse_id)
            .await;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        apply_movement(
            &txn,
            &RecordMovementRequest {
                product_id: line.product_id,
                warehouse_id: request.warehouse_id,
                direction: MovementDirection::In,
                quantity: request.quantity,
                movement_type: MovementType::Purchase,
                ref_document_no: Some(order.order_no.clone()),
                ref_line_id: Some(line.id),
                note: Some(format!("Purchase receipt - {}", order.order_no)),
                created_by: request.received_by,
            },
        )
        .await?;

        let line_qty = line.qty;
        let new_received = line.received_qty + request.quantity;
        let mut line_active: purchase_order_line::ActiveModel = line.into();
        line_active.received_qty = Set(new_received);
        if new_received >= line_qty {
            line_active.status = Set(PurchaseLineStatus::Received);
        }
        line_active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let lines = order_lines(&txn, order_id).await?;
        let new_status = status_after_receipt(
            &lines
                .iter()
                .map(|l| (l.qty, l.received_qty))
                .collect::<Vec<_>>(),
        );

        let order_no = order.order_no.clone();
        let mut order_active: purchase_order::ActiveModel = order.into();
        order_active.status = Set(new_status);
        order_active.updated_at = Set(Utc::now());
        let updated_order = order_active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            order_id = %order_id,
            order_no = %order_no,
            line_id = %request.line_id,
            quantity = %request.quantity,
            status = ?updated_order.status,
            "Purchase order line received"
        );

        self.notify(Event::PurchaseOrderLineReceived {
            order_id,
            line_id: request.line_id,
            warehouse_id: request.warehouse_id,
            quantity: request.quantity,
        })
        .await;
        if updated_order.status == PurchaseOrderStatus::Closed {
            self.notify(Event::PurchaseOrderClosed(order_id)).await;
        }

        Ok(to_response(updated_order, lines))
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<PurchaseOrderResponse, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        self.load_response(order).await
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<PurchaseOrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<PurchaseOrderListResponse, ServiceError> {
        let db = &*self.db;
        let mut query = purchase_order::Entity::find();
        if let Some(status) = status {
            query = query.filter(purchase_order::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(purchase_order::Column::CreatedAt)
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
        let all_lines = purchase_order_line::Entity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.is_in(order_ids))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let responses = orders
            .into_iter()
            .map(|order| {
                let lines: Vec<_> = all_lines
                    .iter()
                    .filter(|l| l.purchase_order_id == order.id)
                    .cloned()
                    .collect();
                to_response(order, lines)
            })
            .collect();

        Ok(PurchaseOrderListResponse {
            orders: responses,
            total,
            page: page.max(1),
            per_page: per_page.max(1),
        })
    }

    async fn load_response(
        &self,
        order: purchase_order::Model,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
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
) -> Result<purchase_order::Model, ServiceError> {
    purchase_order::Entity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", order_id)))
}

async fn order_lines<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<purchase_order_line::Model>, ServiceError> {
    purchase_order_line::Entity::find()
        .filter(purchase_order_line::Column::PurchaseOrderId.eq(order_id))
        .order_by_asc(purchase_order_line::Column::LineNo)
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

async fn ensure_unique_order_no<C: ConnectionTrait>(
    conn: &C,
    order_no: &str,
) -> Result<(), ServiceError> {
    let existing = purchase_order::Entity::find()
        .filter(purchase_order::Column::OrderNo.eq(order_no))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;
    if existing.is_some() {
        return Err(ServiceError::DuplicateOrderNumber(format!(
            "Purchase order number {} already exists",
            order_no
        )));
    }
    Ok(())
}

fn to_response(
    order: purchase_order::Model,
    lines: Vec<purchase_order_line::Model>,
) -> PurchaseOrderResponse {
    PurchaseOrderResponse {
        id: order.id,
        supplier_id: order.supplier_id,
        order_no: order.order_no,
        status: order.status,
        order_date: order.order_date,
        expected_date: order.expected_date,
        note: order.note,
        created_at: order.created_at,
        updated_at: order.updated_at,
        lines: lines
            .into_iter()
            .map(|line| PurchaseOrderLineResponse {
                id: line.id,
                line_no: line.line_no,
                product_id: line.product_id,
                qty: line.qty,
                unit_price: line.unit_price,
                received_qty: line.received_qty,
                status: line.status,
            })
            .collect(),
    }
}

fn receipt_error_label(error: &ServiceError) -> &'static str {
    match error {
        ServiceError::OverReceipt(_) => "over_receipt",
        ServiceError::InvalidTransition(_) => "invalid_transition",
        ServiceError::NotFound(_) => "not_found",
        ServiceError::ValidationError(_) | ServiceError::InvalidInput(_) => "invalid_input",
        ServiceError::DatabaseError(_) => "database",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_closes_only_when_every_line_is_full() {
        assert_eq!(
            status_after_receipt(&[(10, 10), (5, 5)]),
            PurchaseOrderStatus::Closed
        );
        assert_eq!(
            status_after_receipt(&[(10, 10), (5, 4)]),
            PurchaseOrderStatus::PartiallyReceived
        );
        assert_eq!(
            status_after_receipt(&[(10, 0)]),
            PurchaseOrderStatus::PartiallyReceived
        );
    }
}
