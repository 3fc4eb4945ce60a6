mod common;

use assert_matches::assert_matches;

use common::TestApp;
use stockledger_api::entities::stock_movement::{MovementDirection, MovementType};
use stockledger_api::errors::ServiceError;
use stockledger_api::services::movements::TransferStockRequest;

fn transfer(
    product_id: uuid::Uuid,
    from: uuid::Uuid,
    to: uuid::Uuid,
    quantity: i32,
) -> TransferStockRequest {
    TransferStockRequest {
        product_id,
        from_warehouse_id: from,
        to_warehouse_id: to,
        quantity,
        note: None,
        created_by: None,
    }
}

#[tokio::test]
async fn transfer_moves_stock_and_links_both_movements() {
    let app = TestApp::new().await;
    let product = app.create_product("SKU-100").await;
    let source = app.create_warehouse("WH-SRC").await;
    let dest = app.create_warehouse("WH-DST").await;
    app.seed_stock(product.id, source.id, 40).await;

    let result = app
        .services
        .movements
        .transfer(transfer(product.id, source.id, dest.id, 15))
        .await
        .expect("transfer should succeed");

    assert!(result.ref_document_no.starts_with("TRF-"));
    assert_eq!(
        result.out_movement.ref_document_no,
        result.in_movement.ref_document_no
    );
    assert_eq!(result.out_movement.direction, MovementDirection::Out);
    assert_eq!(result.in_movement.direction, MovementDirection::In);
    assert_eq!(result.out_movement.movement_type, MovementType::Transfer);
    assert_eq!(result.in_movement.movement_type, MovementType::Transfer);
    assert_eq!(result.out_movement.warehouse_id, source.id);
    assert_eq!(result.in_movement.warehouse_id, dest.id);

    assert_eq!(app.on_hand(product.id, source.id).await, 25);
    assert_eq!(app.on_hand(product.id, dest.id).await, 15);

    // Exactly two new ledger entries, one per side.
    let source_ledger = app
        .services
        .movements
        .movements_for(product.id, source.id)
        .await
        .unwrap();
    assert_eq!(source_ledger.len(), 2); // seed + transfer out
    let dest_ledger = app
        .services
        .movements
        .movements_for(product.id, dest.id)
        .await
        .unwrap();
    assert_eq!(dest_ledger.len(), 1);
}

#[tokio::test]
async fn transfer_of_entire_available_quantity_succeeds() {
    let app = TestApp::new().await;
    let product = app.create_product("SKU-101").await;
    let source = app.create_warehouse("WH-SRC").await;
    let dest = app.create_warehouse("WH-DST").await;
    app.seed_stock(product.id, source.id, 12).await;

    app.services
        .movements
        .transfer(transfer(product.id, source.id, dest.id, 12))
        .await
        .expect("transferring exactly the available quantity is allowed");

    assert_eq!(app.on_hand(product.id, source.id).await, 0);
    assert_eq!(app.on_hand(product.id, dest.id).await, 12);
}

#[tokio::test]
async fn transfer_to_same_warehouse_is_rejected() {
    let app = TestApp::new().await;
    let product = app.create_product("SKU-102").await;
    let warehouse = app.create_warehouse("WH-SRC").await;
    app.seed_stock(product.id, warehouse.id, 10).await;

    let result = app
        .services
        .movements
        .transfer(transfer(product.id, warehouse.id, warehouse.id, 5))
        .await;
    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 10);
}

#[tokio::test]
async fn transfer_exceeding_available_writes_nothing() {
    let app = TestApp::new().await;
    let product = app.create_product("SKU-103").await;
    let source = app.create_warehouse("WH-SRC").await;
    let dest = app.create_warehouse("WH-DST").await;
    app.seed_stock(product.id, source.id, 8).await;

    let result = app
        .services
        .movements
        .transfer(transfer(product.id, source.id, dest.id, 9))
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    assert_eq!(app.on_hand(product.id, source.id).await, 8);
    assert_eq!(app.on_hand(product.id, dest.id).await, 0);
    let dest_ledger = app
        .services
        .movements
        .movements_for(product.id, dest.id)
        .await
        .unwrap();
    assert!(dest_ledger.is_empty());
}

#[tokio::test]
async fn transfer_preserves_total_on_hand_across_the_system() {
    let app = TestApp::new().await;
    let product = app.create_product("SKU-104").await;
    let a = app.create_warehouse("WH-A").await;
    let b = app.create_warehouse("WH-B").await;
    let c = app.create_warehouse("WH-C").await;
    app.seed_stock(product.id, a.id, 30).await;

    app.services
        .movements
        .transfer(transfer(product.id, a.id, b.id, 10))
        .await
        .unwrap();
    app.services
        .movements
        .transfer(transfer(product.id, b.id, c.id, 4))
        .await
        .unwrap();

    let total = app.on_hand(product.id, a.id).await
        + app.on_hand(product.id, b.id).await
        + app.on_hand(product.id, c.id).await;
    assert_eq!(total, 30);
}
