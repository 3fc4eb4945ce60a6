use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::stock_movement::{MovementDirection, MovementType};
use crate::entities::{inventory_balance, product, stock_movement, warehouse};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::balances;
use crate::services::stock_locks::StockLocks;

lazy_static! {
    static ref MOVEMENTS_RECORDED: IntCounter = register_int_counter!(
        "stock_movements_recorded_total",
        "Total number of stock movements appended to the ledger"
    )
    .expect("metric can be created");
    static ref MOVEMENT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "stock_movement_failures_total",
        "Total number of rejected stock movements",
        &["error_type"]
    )
    .expect("metric can be created");
    static ref STOCK_TRANSFERS: IntCounter = register_int_counter!(
        "stock_transfers_total",
        "Total number of completed warehouse transfers"
    )
    .expect("metric can be created");
    static ref TRANSFER_FAILURES: IntCounterVec = register_int_counter_vec!(
        "stock_transfer_failures_total",
        "Total number of rejected warehouse transfers",
        &["error_type"]
    )
    .expect("metric can be created");
}

/// Request to append one movement to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordMovementRequest {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub direction: MovementDirection,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub movement_type: MovementType,
    #[validate(length(max = 100))]
    pub ref_document_no: Option<String>,
    pub ref_line_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
}

/// Request to move stock between two warehouses.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransferStockRequest {
    pub product_id: Uuid,
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
}

/// The two linked ledger entries produced by a transfer.
#[derive(Debug, Serialize)]
pub struct TransferResult {
    pub ref_document_no: String,
    pub out_movement: stock_movement::Model,
    pub in_movement: stock_movement::Model,
}

/// Read view of one (product, warehouse) balance; zeroed when no movement
/// has ever touched the pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceView {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub on_hand_qty: i32,
    pub reserved_qty: i32,
    pub available_qty: i32,
}

/// Balance row joined with its product, for inventory listings.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSummary {
    pub product_id: Uuid,
    pub sku: String,
    pub product_name: String,
    pub unit: String,
    pub reorder_point: i32,
    pub safety_stock: i32,
    pub warehouse_id: Uuid,
    pub on_hand_qty: i32,
    pub reserved_qty: i32,
    pub available_qty: i32,
    pub is_low_stock: bool,
}

/// Filters for the movement listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
}

/// The movement engine: sole writer of the stock-movement ledger and the
/// inventory balances derived from it.
#[derive(Clone)]
pub struct MovementService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    locks: Arc<StockLocks>,
}

impl MovementService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        locks: Arc<StockLocks>,
    ) -> Self {
        Self {
            db,
            event_sender,
            locks,
        }
    }

    /// Validates and appends a single movement, updating the pair's balance
    /// in the same transaction.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, warehouse_id = %request.warehouse_id, quantity = %request.quantity))]
    pub async fn record_movement(
        &self,
        request: RecordMovementRequest,
    ) -> Result<stock_movement::Model, ServiceError> {
        let result = self.record_movement_inner(&request).await;
        match &result {
            Ok(_) => MOVEMENTS_RECORDED.inc(),
            Err(e) => {
                MOVEMENT_FAILURES.with_label_values(&[error_label(e)]).inc();
            }
        }
        result
    }

    async fn record_movement_inner(
        &self,
        request: &RecordMovementRequest,
    ) -> Result<stock_movement::Model, ServiceError> {
        request.validate()?;

        let db = &*self.db;
        let product = ensure_active_product(db, request.product_id).await?;
        ensure_active_warehouse(db, request.warehouse_id).await?;

        let _guard = self
            .locks
            .acquire(request.product_id, request.warehouse_id)
            .await;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;
        let (movement, balance) = apply_movement(&txn, request).await?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            movement_id = %movement.id,
            sku = %product.sku,
            direction = ?movement.direction,
            movement_type = ?movement.movement_type,
            quantity = %movement.quantity,
            on_hand_qty = %balance.on_hand_qty,
            "Stock movement recorded"
        );

        self.notify(Event::MovementRecorded {
            movement_id: movement.id,
            product_id: movement.product_id,
            warehouse_id: movement.warehouse_id,
            direction: movement.direction,
            movement_type: movement.movement_type,
            quantity: movement.quantity,
        })
        .await;
        self.notify_if_low_stock(&product, &balance).await;

        Ok(movement)
    }

    /// Moves stock between warehouses: one OUT and one IN movement sharing a
    /// generated reference number, both sides committed atomically.
    ///
    /// The sufficiency check is against `available_qty`, not raw on-hand, so
    /// a transfer can never cannibalize reserved stock.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, from = %request.from_warehouse_id, to = %request.to_warehouse_id, quantity = %request.quantity))]
    pub async fn transfer(
        &self,
        request: TransferStockRequest,
    ) -> Result<TransferResult, ServiceError> {
        let result = self.transfer_inner(&request).await;
        match &result {
            Ok(_) => STOCK_TRANSFERS.inc(),
            Err(e) => {
                TRANSFER_FAILURES.with_label_values(&[error_label(e)]).inc();
            }
        }
        result
    }

    async fn transfer_inner(
        &self,
        request: &TransferStockRequest,
    ) -> Result<TransferResult, ServiceError> {
        request.validate()?;
        if request.from_warehouse_id == request.to_warehouse_id {
            return Err(ServiceError::InvalidInput(
                "Source and destination warehouses cannot be the same".to_string(),
            ));
        }

        let db = &*self.db;
        let product = ensure_active_product(db, request.product_id).await?;
        let from_warehouse = ensure_active_warehouse(db, request.from_warehouse_id).await?;
        let to_warehouse = ensure_active_warehouse(db, request.to_warehouse_id).await?;

        let _guards = self
            .locks
            .acquire_many(&[
                (request.product_id, request.from_warehouse_id),
                (request.product_id, request.to_warehouse_id),
            ])
            .await;

        let ref_document_no = transfer_reference();
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let source =
            balances::get_or_create(&txn, request.product_id, request.from_warehouse_id).await?;
        if source.available_qty < request.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Available quantity {} at warehouse {} is less than requested {}",
                source.available_qty, from_warehouse.code, request.quantity
            )));
        }

        let out_movement = stock_movement::ActiveModel {
            id: NotSet,
            product_id: Set(request.product_id),
            warehouse_id: Set(request.from_warehouse_id),
            direction: Set(MovementDirection::Out),
            quantity: Set(request.quantity),
            movement_type: Set(MovementType::Transfer),
            ref_document_no: Set(Some(ref_document_no.clone())),
            ref_line_id: Set(None),
            note: Set(Some(transfer_note("to", &to_warehouse.name, &request.note))),
            created_by: Set(request.created_by),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        let in_movement = stock_movement::ActiveModel {
            id: NotSet,
            product_id: Set(request.product_id),
            warehouse_id: Set(request.to_warehouse_id),
            direction: Set(MovementDirection::In),
            quantity: Set(request.quantity),
            movement_type: Set(MovementType::Transfer),
            ref_document_no: Set(Some(ref_document_no.clone())),
            ref_line_id: Set(None),
            note: Set(Some(transfer_note(
                "from",
                &from_warehouse.name,
                &request.note,
            ))),
            created_by: Set(request.created_by),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        let source_balance = balances::apply_delta(
            &txn,
            request.product_id,
            request.from_warehouse_id,
            -request.quantity,
            0,
        )
        .await?;
        balances::apply_delta(
            &txn,
            request.product_id,
            request.to_warehouse_id,
            request.quantity,
            0,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            sku = %product.sku,
            from = %from_warehouse.code,
            to = %to_warehouse.code,
            quantity = %request.quantity,
            ref_document_no = %ref_document_no,
            "Stock transferred"
        );

        self.notify(Event::StockTransferred {
            product_id: request.product_id,
            from_warehouse_id: request.from_warehouse_id,
            to_warehouse_id: request.to_warehouse_id,
            quantity: request.quantity,
            ref_document_no: ref_document_no.clone(),
        })
        .await;
        self.notify_if_low_stock(&product, &source_balance).await;

        Ok(TransferResult {
            ref_document_no,
            out_movement,
            in_movement,
        })
    }

    /// Lists ledger entries newest-first, optionally filtered.
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        filter: MovementFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let db = &*self.db;
        let mut query = stock_movement::Entity::find();
        if let Some(product_id) = filter.product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(stock_movement::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(movement_type) = filter.movement_type {
            query = query.filter(stock_movement::Column::MovementType.eq(movement_type));
        }

        let paginator = query
            .order_by_desc(stock_movement::Column::Id)
            .paginate(db, limit.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let movements = paginator
            .fetch_page(page.max(1) - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((movements, total))
    }

    /// The replayable per-key log, in commit order.
    pub async fn movements_for(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        stock_movement::Entity::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .filter(stock_movement::Column::WarehouseId.eq(warehouse_id))
            .order_by_asc(stock_movement::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Reads the balance for a pair. Pairs never touched by a movement
    /// report zeroes; reading does not materialize a row.
    #[instrument(skip(self))]
    pub async fn get_balance(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<BalanceView, ServiceError> {
        let found = balances::find(&*self.db, product_id, warehouse_id).await?;
        Ok(match found {
            Some(row) => BalanceView {
                product_id: row.product_id,
                warehouse_id: row.warehouse_id,
                on_hand_qty: row.on_hand_qty,
                reserved_qty: row.reserved_qty,
                available_qty: row.available_qty,
            },
            None => BalanceView {
                product_id,
                warehouse_id,
                on_hand_qty: 0,
                reserved_qty: 0,
                available_qty: 0,
            },
        })
    }

    /// Lists balances joined with product data, optionally restricted to a
    /// warehouse or to pairs at/below their reorder point.
    #[instrument(skip(self))]
    pub async fn list_balances(
        &self,
        warehouse_id: Option<Uuid>,
        low_stock_only: bool,
    ) -> Result<Vec<BalanceSummary>, ServiceError> {
        let db = &*self.db;
        let mut query = inventory_balance::Entity::find().find_also_related(product::Entity);
        if let Some(warehouse_id) = warehouse_id {
            query = query.filter(inventory_balance::Column::WarehouseId.eq(warehouse_id));
        }

        let rows = query.all(db).await.map_err(ServiceError::DatabaseError)?;

        let mut summaries = Vec::with_capacity(rows.len());
        for (balance, maybe_product) in rows {
            let product = maybe_product.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Balance {} references missing product {}",
                    balance.id, balance.product_id
                ))
            })?;
            let is_low_stock = balance.available_qty <= product.reorder_point;
            if low_stock_only && !is_low_stock {
                continue;
            }
            summaries.push(BalanceSummary {
                product_id: product.id,
                sku: product.sku,
                product_name: product.name,
                unit: product.unit,
                reorder_point: product.reorder_point,
                safety_stock: product.safety_stock,
                warehouse_id: balance.warehouse_id,
                on_hand_qty: balance.on_hand_qty,
                reserved_qty: balance.reserved_qty,
                available_qty: balance.available_qty,
                is_low_stock,
            });
        }
        Ok(summaries)
    }

    /// Recomputes one balance row from the ledger fold, overwriting the
    /// cached value. The fold is the authority; a divergence means the cache
    /// was corrupted and is logged as such.
    #[instrument(skip(self))]
    pub async fn rebuild_balance(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<inventory_balance::Model, ServiceError> {
        let db = &*self.db;
        let _guard = self.locks.acquire(product_id, warehouse_id).await;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;
        let folded = balances::fold_ledger(&txn, product_id, warehouse_id).await?;
        let current = balances::get_or_create(&txn, product_id, warehouse_id).await?;

        if current.on_hand_qty != folded {
            warn!(
                product_id = %product_id,
                warehouse_id = %warehouse_id,
                cached = %current.on_hand_qty,
                folded = %folded,
                "Balance diverged from ledger fold; rebuilding"
            );
        }

        let reserved_qty = current.reserved_qty;
        let mut active: inventory_balance::ActiveModel = current.into();
        active.on_hand_qty = Set(folded);
        active.available_qty = Set(balances::recompute_available(folded, reserved_qty));
        active.updated_at = Set(Utc::now());
        let rebuilt = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        self.notify(Event::BalanceRebuilt {
            product_id,
            warehouse_id,
            on_hand_qty: rebuilt.on_hand_qty,
        })
        .await;

        Ok(rebuilt)
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

    async fn notify_if_low_stock(
        &self,
        product: &product::Model,
        balance: &inventory_balance::Model,
    ) {
        if product.reorder_point > 0 && balance.available_qty <= product.reorder_point {
            self.notify(Event::LowStockDetected {
                product_id: product.id,
                warehouse_id: balance.warehouse_id,
                available_qty: balance.available_qty,
                reorder_point: product.reorder_point,
            })
            .await;
        }
    }
}

/// Appends one validated movement and applies its balance delta. Runs inside
/// the caller's transaction; the caller must already hold the pair's stock
/// lock. Shared by the movement engine and the order fulfillment services so
/// the ledger/balance math exists in exactly one place.
pub(crate) async fn apply_movement<C: ConnectionTrait>(
    conn: &C,
    request: &RecordMovementRequest,
) -> Result<(stock_movement::Model, inventory_balance::Model), ServiceError> {
    let balance = balances::get_or_create(conn, request.product_id, request.warehouse_id).await?;

    let on_hand_delta = match request.direction {
        MovementDirection::In => request.quantity,
        MovementDirection::Out => {
            if balance.on_hand_qty < request.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "On-hand quantity {} is less than requested {} for product {} at warehouse {}",
                    balance.on_hand_qty, request.quantity, request.product_id, request.warehouse_id
                )));
            }
            -request.quantity
        }
    };

    let movement = stock_movement::ActiveModel {
        id: NotSet,
        product_id: Set(request.product_id),
        warehouse_id: Set(request.warehouse_id),
        direction: Set(request.direction),
        quantity: Set(request.quantity),
        movement_type: Set(request.movement_type),
        ref_document_no: Set(request.ref_document_no.clone()),
        ref_line_id: Set(request.ref_line_id),
        note: Set(request.note.clone()),
        created_by: Set(request.created_by),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::DatabaseError)?;

    let balance = balances::apply_delta(
        conn,
        request.product_id,
        request.warehouse_id,
        on_hand_delta,
        0,
    )
    .await?;

    Ok((movement, balance))
}

/// Looks up a product and requires it to be active.
pub(crate) async fn ensure_active_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    let found = product::Entity::find_by_id(product_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
    if !found.is_active {
        return Err(ServiceError::InvalidInput(format!(
            "Product {} is inactive",
            found.sku
        )));
    }
    Ok(found)
}

/// Looks up a warehouse and requires it to be active.
pub(crate) async fn ensure_active_warehouse<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: Uuid,
) -> Result<warehouse::Model, ServiceError> {
    let found = warehouse::Entity::find_by_id(warehouse_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Warehouse {} not found", warehouse_id)))?;
    if !found.is_active {
        return Err(ServiceError::InvalidInput(format!(
            "Warehouse {} is inactive",
            found.code
        )));
    }
    Ok(found)
}

fn transfer_reference() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "TRF-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &suffix[..6]
    )
}

fn transfer_note(side: &str, warehouse_name: &str, note: &Option<String>) -> String {
    match note {
        Some(text) if !text.is_empty() => {
            format!("Transfer {} {}. {}", side, warehouse_name, text)
        }
        _ => format!("Transfer {} {}", side, warehouse_name),
    }
}

fn error_label(error: &ServiceError) -> &'static str {
    match error {
        ServiceError::ValidationError(_) | ServiceError::InvalidInput(_) => "invalid_input",
        ServiceError::NotFound(_) => "not_found",
        ServiceError::InsufficientStock(_) => "insufficient_stock",
        ServiceError::DatabaseError(_) => "database",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_reference_carries_prefix_and_suffix() {
        let reference = transfer_reference();
        assert!(reference.starts_with("TRF-"));
        // TRF- + 14 digit timestamp + dash + 6 char suffix
        assert_eq!(reference.len(), 4 + 14 + 1 + 6);
    }

    #[test]
    fn transfer_notes_mention_the_other_side() {
        assert_eq!(
            transfer_note("to", "Main", &Some("urgent".to_string())),
            "Transfer to Main. urgent"
        );
        assert_eq!(transfer_note("from", "Main", &None), "Transfer from Main");
    }
}
