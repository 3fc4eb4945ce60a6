mod common;

use assert_matches::assert_matches;

use common::TestApp;
use stockledger_api::entities::purchase_order::PurchaseOrderStatus;
use stockledger_api::entities::purchase_order_line::PurchaseLineStatus;
use stockledger_api::entities::stock_movement::{MovementDirection, MovementType};
use stockledger_api::errors::ServiceError;
use stockledger_api::services::purchase_orders::ReceiveLineRequest;

fn receive(line_id: uuid::Uuid, warehouse_id: uuid::Uuid, quantity: i32) -> ReceiveLineRequest {
    ReceiveLineRequest {
        line_id,
        warehouse_id,
        quantity,
        received_by: None,
    }
}

#[tokio::test]
async fn create_starts_in_draft_with_pending_lines() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product = app.create_product("SKU-200").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1001", vec![(product.id, 10)])
        .await;
    let order = app
        .services
        .purchase_orders
        .create_order(request)
        .await
        .expect("order should be created");

    assert_eq!(order.status, PurchaseOrderStatus::Draft);
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].received_qty, 0);
    assert_eq!(order.lines[0].status, PurchaseLineStatus::Pending);
}

#[tokio::test]
async fn duplicate_order_number_is_rejected() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product = app.create_product("SKU-201").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1002", vec![(product.id, 5)])
        .await;
    app.services
        .purchase_orders
        .create_order(request)
        .await
        .unwrap();

    let duplicate = app
        .purchase_order_request(supplier.id, "PO-1002", vec![(product.id, 3)])
        .await;
    let result = app.services.purchase_orders.create_order(duplicate).await;
    assert_matches!(result, Err(ServiceError::DuplicateOrderNumber(_)));
}

#[tokio::test]
async fn order_without_lines_is_rejected() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1003", vec![])
        .await;
    let result = app.services.purchase_orders.create_order(request).await;
    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn approve_is_legal_only_from_draft() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product = app.create_product("SKU-202").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1004", vec![(product.id, 5)])
        .await;
    let order = app
        .services
        .purchase_orders
        .create_order(request)
        .await
        .unwrap();

    let approved = app
        .services
        .purchase_orders
        .approve_order(order.id)
        .await
        .unwrap();
    assert_eq!(approved.status, PurchaseOrderStatus::Approved);

    let again = app.services.purchase_orders.approve_order(order.id).await;
    assert_matches!(again, Err(ServiceError::InvalidTransition(_)));
}

#[tokio::test]
async fn receiving_against_a_draft_order_is_rejected() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product = app.create_product("SKU-203").await;
    let warehouse = app.create_warehouse("WH-A").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1005", vec![(product.id, 5)])
        .await;
    let order = app
        .services
        .purchase_orders
        .create_order(request)
        .await
        .unwrap();
    let line_id = order.lines[0].id;

    let result = app
        .services
        .purchase_orders
        .receive_line(order.id, receive(line_id, warehouse.id, 5))
        .await;
    assert_matches!(result, Err(ServiceError::InvalidTransition(_)));
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 0);
}

#[tokio::test]
async fn partial_receipt_marks_order_partially_received() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product = app.create_product("SKU-204").await;
    let warehouse = app.create_warehouse("WH-A").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1006", vec![(product.id, 10)])
        .await;
    let order = app
        .services
        .purchase_orders
        .create_order(request)
        .await
        .unwrap();
    app.services
        .purchase_orders
        .approve_order(order.id)
        .await
        .unwrap();
    let line_id = order.lines[0].id;

    let updated = app
        .services
        .purchase_orders
        .receive_line(order.id, receive(line_id, warehouse.id, 4))
        .await
        .expect("partial receipt should succeed");

    assert_eq!(updated.status, PurchaseOrderStatus::PartiallyReceived);
    assert_eq!(updated.lines[0].received_qty, 4);
    assert_eq!(updated.lines[0].status, PurchaseLineStatus::Pending);
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 4);

    // The receipt movement carries the order's document references.
    let ledger = app
        .services
        .movements
        .movements_for(product.id, warehouse.id)
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].direction, MovementDirection::In);
    assert_eq!(ledger[0].movement_type, MovementType::Purchase);
    assert_eq!(ledger[0].ref_document_no.as_deref(), Some("PO-1006"));
    assert_eq!(ledger[0].ref_line_id, Some(line_id));
}

#[tokio::test]
async fn receiving_the_remainder_closes_line_and_order() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product = app.create_product("SKU-205").await;
    let warehouse = app.create_warehouse("WH-A").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1007", vec![(product.id, 10)])
        .await;
    let order = app
        .services
        .purchase_orders
        .create_order(request)
        .await
        .unwrap();
    app.services
        .purchase_orders
        .approve_order(order.id)
        .await
        .unwrap();
    let line_id = order.lines[0].id;

    app.services
        .purchase_orders
        .receive_line(order.id, receive(line_id, warehouse.id, 4))
        .await
        .unwrap();
    let closed = app
        .services
        .purchase_orders
        .receive_line(order.id, receive(line_id, warehouse.id, 6))
        .await
        .unwrap();

    assert_eq!(closed.lines[0].received_qty, 10);
    assert_eq!(closed.lines[0].status, PurchaseLineStatus::Received);
    assert_eq!(closed.status, PurchaseOrderStatus::Closed);
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 10);
}

#[tokio::test]
async fn over_receipt_is_rejected_and_leaves_line_unchanged() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product = app.create_product("SKU-206").await;
    let warehouse = app.create_warehouse("WH-A").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1008", vec![(product.id, 10)])
        .await;
    let order = app
        .services
        .purchase_orders
        .create_order(request)
        .await
        .unwrap();
    app.services
        .purchase_orders
        .approve_order(order.id)
        .await
        .unwrap();
    let line_id = order.lines[0].id;

    app.services
        .purchase_orders
        .receive_line(order.id, receive(line_id, warehouse.id, 4))
        .await
        .unwrap();

    // remaining = 6; 7 exceeds it
    let result = app
        .services
        .purchase_orders
        .receive_line(order.id, receive(line_id, warehouse.id, 7))
        .await;
    assert_matches!(result, Err(ServiceError::OverReceipt(_)));

    let current = app
        .services
        .purchase_orders
        .get_order(order.id)
        .await
        .unwrap();
    assert_eq!(current.lines[0].received_qty, 4);
    assert_eq!(current.status, PurchaseOrderStatus::PartiallyReceived);
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 4);
}

#[tokio::test]
async fn single_receipt_can_close_a_multi_line_order() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product_a = app.create_product("SKU-207A").await;
    let product_b = app.create_product("SKU-207B").await;
    let warehouse = app.create_warehouse("WH-A").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1009", vec![(product_a.id, 3), (product_b.id, 2)])
        .await;
    let order = app
        .services
        .purchase_orders
        .create_order(request)
        .await
        .unwrap();
    app.services
        .purchase_orders
        .approve_order(order.id)
        .await
        .unwrap();

    let first = app
        .services
        .purchase_orders
        .receive_line(order.id, receive(order.lines[0].id, warehouse.id, 3))
        .await
        .unwrap();
    assert_eq!(first.status, PurchaseOrderStatus::PartiallyReceived);

    let second = app
        .services
        .purchase_orders
        .receive_line(order.id, receive(order.lines[1].id, warehouse.id, 2))
        .await
        .unwrap();
    assert_eq!(second.status, PurchaseOrderStatus::Closed);
}

#[tokio::test]
async fn receiving_an_unknown_line_is_not_found() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product = app.create_product("SKU-208").await;
    let warehouse = app.create_warehouse("WH-A").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-1010", vec![(product.id, 5)])
        .await;
    let order = app
        .services
        .purchase_orders
        .create_order(request)
        .await
        .unwrap();
    app.services
        .purchase_orders
        .approve_order(order.id)
        .await
        .unwrap();

    let result = app
        .services
        .purchase_orders
        .receive_line(order.id, receive(uuid::Uuid::new_v4(), warehouse.id, 1))
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}
