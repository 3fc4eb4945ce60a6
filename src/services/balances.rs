//! Balance projector: maintains the materialized (product, warehouse)
//! balance rows from ledger deltas.
//!
//! Everything here takes `&impl ConnectionTrait` so it composes into the
//! caller's transaction; the movement engine is the only caller that
//! mutates. The ledger fold is the authority — the balance row is a cache
//! of it, and `fold_ledger` exists so divergence can always be detected and
//! repaired.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::stock_movement::MovementDirection;
use crate::entities::{inventory_balance, stock_movement};
use crate::errors::ServiceError;

/// `available = max(0, on_hand - reserved)`, recomputed after every mutation.
pub fn recompute_available(on_hand_qty: i32, reserved_qty: i32) -> i32 {
    (on_hand_qty - reserved_qty).max(0)
}

/// Fetches the balance row for a pair, or `None` if no movement has ever
/// touched it.
pub async fn find<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
) -> Result<Option<inventory_balance::Model>, ServiceError> {
    inventory_balance::Entity::find()
        .filter(inventory_balance::Column::ProductId.eq(product_id))
        .filter(inventory_balance::Column::WarehouseId.eq(warehouse_id))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Fetches the balance row for a pair, materializing a zeroed row on first
/// use.
pub async fn get_or_create<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
) -> Result<inventory_balance::Model, ServiceError> {
    if let Some(existing) = find(conn, product_id, warehouse_id).await? {
        return Ok(existing);
    }

    let row = inventory_balance::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        warehouse_id: Set(warehouse_id),
        on_hand_qty: Set(0),
        reserved_qty: Set(0),
        available_qty: Set(0),
        updated_at: Set(Utc::now()),
    };
    row.insert(conn).await.map_err(ServiceError::DatabaseError)
}

/// Applies a delta to the pair's balance and recomputes `available_qty`.
/// Sufficiency checks belong to the movement engine; this only projects.
pub async fn apply_delta<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    on_hand_delta: i32,
    reserved_delta: i32,
) -> Result<inventory_balance::Model, ServiceError> {
    let current = get_or_create(conn, product_id, warehouse_id).await?;
    let on_hand_qty = current.on_hand_qty + on_hand_delta;
    let reserved_qty = current.reserved_qty + reserved_delta;

    let mut active: inventory_balance::ActiveModel = current.into();
    active.on_hand_qty = Set(on_hand_qty);
    active.reserved_qty = Set(reserved_qty);
    active.available_qty = Set(recompute_available(on_hand_qty, reserved_qty));
    active.updated_at = Set(Utc::now());
    active.update(conn).await.map_err(ServiceError::DatabaseError)
}

/// Replays the ledger for a pair in commit order and returns the on-hand
/// quantity it implies: `Σ IN − Σ OUT`.
pub async fn fold_ledger<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
) -> Result<i32, ServiceError> {
    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .filter(stock_movement::Column::WarehouseId.eq(warehouse_id))
        .order_by_asc(stock_movement::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(movements.iter().fold(0i32, |acc, movement| {
        match movement.direction {
            MovementDirection::In => acc + movement.quantity,
            MovementDirection::Out => acc - movement.quantity,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_is_on_hand_minus_reserved() {
        assert_eq!(recompute_available(10, 3), 7);
        assert_eq!(recompute_available(10, 0), 10);
    }

    #[test]
    fn available_is_clamped_at_zero() {
        assert_eq!(recompute_available(2, 5), 0);
        assert_eq!(recompute_available(0, 0), 0);
    }
}
