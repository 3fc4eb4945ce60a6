use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::stock_movement::{MovementDirection, MovementType};

/// Events emitted by the core after a write has committed. Consumers are
/// notified best-effort; a lost event never un-commits a write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Ledger events
    MovementRecorded {
        movement_id: i64,
        product_id: Uuid,
        warehouse_id: Uuid,
        direction: MovementDirection,
        movement_type: MovementType,
        quantity: i32,
    },
    StockTransferred {
        product_id: Uuid,
        from_warehouse_id: Uuid,
        to_warehouse_id: Uuid,
        quantity: i32,
        ref_document_no: String,
    },
    BalanceRebuilt {
        product_id: Uuid,
        warehouse_id: Uuid,
        on_hand_qty: i32,
    },
    LowStockDetected {
        product_id: Uuid,
        warehouse_id: Uuid,
        available_qty: i32,
        reorder_point: i32,
    },

    // Purchase order events
    PurchaseOrderCreated(Uuid),
    PurchaseOrderApproved(Uuid),
    PurchaseOrderLineReceived {
        order_id: Uuid,
        line_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
    },
    PurchaseOrderClosed(Uuid),

    // Sales order events
    SalesOrderCreated(Uuid),
    SalesOrderApproved(Uuid),
    SalesOrderShipped {
        order_id: Uuid,
        warehouse_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer for the event channel. Today this logs; anything that
/// needs to react to core writes (webhooks, notifications, replenishment)
/// hangs off this loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStockDetected {
                product_id,
                warehouse_id,
                available_qty,
                reorder_point,
            } => {
                warn!(
                    product_id = %product_id,
                    warehouse_id = %warehouse_id,
                    available_qty = %available_qty,
                    reorder_point = %reorder_point,
                    "Available stock at or below reorder point"
                );
            }
            other => {
                info!(event = ?other, "Processed event");
            }
        }
    }

    info!("Event channel closed; stopping event processing loop");
}
