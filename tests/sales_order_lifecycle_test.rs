mod common;

use assert_matches::assert_matches;

use common::TestApp;
use stockledger_api::entities::sales_order::SalesOrderStatus;
use stockledger_api::entities::sales_order_line::SalesLineStatus;
use stockledger_api::entities::stock_movement::{MovementDirection, MovementType};
use stockledger_api::errors::ServiceError;
use stockledger_api::services::sales_orders::ShipOrderRequest;

fn ship(warehouse_id: uuid::Uuid) -> ShipOrderRequest {
    ShipOrderRequest {
        warehouse_id,
        shipped_by: None,
    }
}

#[tokio::test]
async fn duplicate_order_number_is_rejected() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Globex").await;
    let product = app.create_product("SKU-300").await;

    let request = app
        .sales_order_request(customer.id, "SO-2001", vec![(product.id, 5)])
        .await;
    app.services.sales_orders.create_order(request).await.unwrap();

    let duplicate = app
        .sales_order_request(customer.id, "SO-2001", vec![(product.id, 2)])
        .await;
    let result = app.services.sales_orders.create_order(duplicate).await;
    assert_matches!(result, Err(ServiceError::DuplicateOrderNumber(_)));
}

#[tokio::test]
async fn shipping_an_unapproved_order_is_rejected() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Globex").await;
    let product = app.create_product("SKU-301").await;
    let warehouse = app.create_warehouse("WH-A").await;
    app.seed_stock(product.id, warehouse.id, 50).await;

    let request = app
        .sales_order_request(customer.id, "SO-2002", vec![(product.id, 5)])
        .await;
    let order = app.services.sales_orders.create_order(request).await.unwrap();

    let result = app
        .services
        .sales_orders
        .ship_order(order.id, ship(warehouse.id))
        .await;
    assert_matches!(result, Err(ServiceError::InvalidTransition(_)));
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 50);
}

#[tokio::test]
async fn shipping_closes_order_and_empties_lines() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Globex").await;
    let product_a = app.create_product("SKU-302A").await;
    let product_b = app.create_product("SKU-302B").await;
    let warehouse = app.create_warehouse("WH-A").await;
    app.seed_stock(product_a.id, warehouse.id, 20).await;
    app.seed_stock(product_b.id, warehouse.id, 8).await;

    let request = app
        .sales_order_request(
            customer.id,
            "SO-2003",
            vec![(product_a.id, 12), (product_b.id, 8)],
        )
        .await;
    let order = app.services.sales_orders.create_order(request).await.unwrap();
    app.services
        .sales_orders
        .approve_order(order.id)
        .await
        .unwrap();

    let shipped = app
        .services
        .sales_orders
        .ship_order(order.id, ship(warehouse.id))
        .await
        .expect("shipment should succeed");

    assert_eq!(shipped.status, SalesOrderStatus::Closed);
    for line in &shipped.lines {
        assert_eq!(line.shipped_qty, line.qty);
        assert_eq!(line.status, SalesLineStatus::Shipped);
    }
    assert_eq!(app.on_hand(product_a.id, warehouse.id).await, 8);
    assert_eq!(app.on_hand(product_b.id, warehouse.id).await, 0);

    // One OUT/SALES movement per line, referencing the order.
    let ledger = app
        .services
        .movements
        .movements_for(product_a.id, warehouse.id)
        .await
        .unwrap();
    let sales_movements: Vec<_> = ledger
        .iter()
        .filter(|m| m.movement_type == MovementType::Sales)
        .collect();
    assert_eq!(sales_movements.len(), 1);
    assert_eq!(sales_movements[0].direction, MovementDirection::Out);
    assert_eq!(sales_movements[0].ref_document_no.as_deref(), Some("SO-2003"));
    assert_eq!(sales_movements[0].quantity, 12);
}

#[tokio::test]
async fn one_short_line_aborts_the_whole_shipment() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Globex").await;
    let product_a = app.create_product("SKU-303A").await;
    let product_b = app.create_product("SKU-303B").await;
    let warehouse = app.create_warehouse("WH-A").await;
    app.seed_stock(product_a.id, warehouse.id, 50).await;
    app.seed_stock(product_b.id, warehouse.id, 3).await;

    let request = app
        .sales_order_request(
            customer.id,
            "SO-2004",
            vec![(product_a.id, 10), (product_b.id, 4)],
        )
        .await;
    let order = app.services.sales_orders.create_order(request).await.unwrap();
    app.services
        .sales_orders
        .approve_order(order.id)
        .await
        .unwrap();

    let result = app
        .services
        .sales_orders
        .ship_order(order.id, ship(warehouse.id))
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    // All-or-nothing: the fully available line did not ship either.
    let current = app.services.sales_orders.get_order(order.id).await.unwrap();
    assert_eq!(current.status, SalesOrderStatus::Approved);
    for line in &current.lines {
        assert_eq!(line.shipped_qty, 0);
        assert_eq!(line.status, SalesLineStatus::Pending);
    }
    assert_eq!(app.on_hand(product_a.id, warehouse.id).await, 50);
    assert_eq!(app.on_hand(product_b.id, warehouse.id).await, 3);
}

#[tokio::test]
async fn shipping_exactly_available_stock_succeeds() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Globex").await;
    let product = app.create_product("SKU-304").await;
    let warehouse = app.create_warehouse("WH-A").await;
    app.seed_stock(product.id, warehouse.id, 6).await;

    let request = app
        .sales_order_request(customer.id, "SO-2005", vec![(product.id, 6)])
        .await;
    let order = app.services.sales_orders.create_order(request).await.unwrap();
    app.services
        .sales_orders
        .approve_order(order.id)
        .await
        .unwrap();

    let shipped = app
        .services
        .sales_orders
        .ship_order(order.id, ship(warehouse.id))
        .await
        .unwrap();
    assert_eq!(shipped.status, SalesOrderStatus::Closed);
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 0);
}

#[tokio::test]
async fn shipping_a_closed_order_is_rejected() {
    let app = TestApp::new().await;
    let customer = app.create_customer("Globex").await;
    let product = app.create_product("SKU-305").await;
    let warehouse = app.create_warehouse("WH-A").await;
    app.seed_stock(product.id, warehouse.id, 10).await;

    let request = app
        .sales_order_request(customer.id, "SO-2006", vec![(product.id, 5)])
        .await;
    let order = app.services.sales_orders.create_order(request).await.unwrap();
    app.services
        .sales_orders
        .approve_order(order.id)
        .await
        .unwrap();
    app.services
        .sales_orders
        .ship_order(order.id, ship(warehouse.id))
        .await
        .unwrap();

    let again = app
        .services
        .sales_orders
        .ship_order(order.id, ship(warehouse.id))
        .await;
    assert_matches!(again, Err(ServiceError::InvalidTransition(_)));
    assert_eq!(app.on_hand(product.id, warehouse.id).await, 5);
}
