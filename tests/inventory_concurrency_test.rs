mod common;

use common::TestApp;
use stockledger_api::entities::stock_movement::{MovementDirection, MovementType};
use stockledger_api::errors::ServiceError;
use stockledger_api::services::balances;
use stockledger_api::services::movements::RecordMovementRequest;
use stockledger_api::services::purchase_orders::ReceiveLineRequest;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_outs_never_overdraw_the_balance() {
    let app = TestApp::new().await;
    let product = app.create_product("SKU-400").await;
    let warehouse = app.create_warehouse("WH-A").await;
    app.seed_stock(product.id, warehouse.id, 50).await;

    // 100 concurrent OUT(1) attempts against 50 on hand: exactly 50 may win.
    let mut tasks = Vec::new();
    for _ in 0..100 {
        let movements = app.services.movements.clone();
        let product_id = product.id;
        let warehouse_id = warehouse.id;
        tasks.push(tokio::spawn(async move {
            movements
                .record_movement(RecordMovementRequest {
                    product_id,
                    warehouse_id,
                    direction: MovementDirection::Out,
                    quantity: 1,
                    movement_type: MovementType::Adjustment,
                    ref_document_no: None,
                    ref_line_id: None,
                    note: None,
                    created_by: None,
                })
                .await
        }));
    }

    let mut successes = 0;
    let mut insufficient = 0;
    for task in tasks {
        match task.await.expect("task should not panic") {
            Ok(_) => successes += 1,
            Err(ServiceError::InsufficientStock(_)) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 50, "exactly the on-hand quantity may be drawn");
    assert_eq!(insufficient, 50);
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 0);

    // The ledger agrees with the final balance.
    let folded = balances::fold_ledger(&*app.db, product.id, warehouse.id)
        .await
        .unwrap();
    assert_eq!(folded, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transfers_preserve_total_stock() {
    let app = TestApp::new().await;
    let product = app.create_product("SKU-401").await;
    let a = app.create_warehouse("WH-A").await;
    let b = app.create_warehouse("WH-B").await;
    app.seed_stock(product.id, a.id, 30).await;
    app.seed_stock(product.id, b.id, 30).await;

    // Opposing transfers on the same pair of keys: sorted acquisition order
    // means they serialize instead of deadlocking.
    let mut tasks = Vec::new();
    for i in 0..20 {
        let movements = app.services.movements.clone();
        let product_id = product.id;
        let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
        tasks.push(tokio::spawn(async move {
            movements
                .transfer(stockledger_api::services::movements::TransferStockRequest {
                    product_id,
                    from_warehouse_id: from,
                    to_warehouse_id: to,
                    quantity: 3,
                    note: None,
                    created_by: None,
                })
                .await
        }));
    }
    for task in tasks {
        match task.await.expect("task should not panic") {
            Ok(_) | Err(ServiceError::InsufficientStock(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let total = app.on_hand(product.id, a.id).await + app.on_hand(product.id, b.id).await;
    assert_eq!(total, 60, "transfers must never create or destroy stock");
    assert!(app.on_hand(product.id, a.id).await >= 0);
    assert!(app.on_hand(product.id, b.id).await >= 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_receipts_cannot_exceed_the_ordered_quantity() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Acme Supply").await;
    let product = app.create_product("SKU-402").await;
    let warehouse = app.create_warehouse("WH-A").await;

    let request = app
        .purchase_order_request(supplier.id, "PO-4001", vec![(product.id, 10)])
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

    // Two racing receipts of 6 against a line of 10: only one can fit.
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let purchase_orders = app.services.purchase_orders.clone();
        let order_id = order.id;
        let warehouse_id = warehouse.id;
        tasks.push(tokio::spawn(async move {
            purchase_orders
                .receive_line(
                    order_id,
                    ReceiveLineRequest {
                        line_id,
                        warehouse_id,
                        quantity: 6,
                        received_by: None,
                    },
                )
                .await
        }));
    }

    let mut successes = 0;
    let mut over_receipts = 0;
    for task in tasks {
        match task.await.expect("task should not panic") {
            Ok(_) => successes += 1,
            Err(ServiceError::OverReceipt(_)) => over_receipts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(over_receipts, 1);

    let current = app
        .services
        .purchase_orders
        .get_order(order.id)
        .await
        .unwrap();
    assert_eq!(current.lines[0].received_qty, 6);
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 6);
}
