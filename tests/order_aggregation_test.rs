//! Order-fulfillment aggregation: lines collect from the source ledger, the
//! order closes only when every line is collected.

mod common;

use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};

use common::TestApp;
use wareflow_api::{
    domain::CollectKind,
    entities::{operation, pallet_product},
    services::pallets::{
        check_and_collect_orders, remove_boxes_from_pallet, WithdrawalRequest,
    },
};

async fn source_boxes(app: &TestApp, pallet_code: &str, count: i32, product_key: &str) {
    let txn = app.db().begin().await.unwrap();
    remove_boxes_from_pallet(
        &txn,
        &WithdrawalRequest {
            pallet_code: pallet_code.to_string(),
            count,
            weight: dec!(0),
            collect_kind: CollectKind::Selection,
            product_key: Some(product_key.to_string()),
            dest_pallet_id: None,
            related_task_id: None,
            user_id: None,
        },
    )
    .await
    .unwrap();
    check_and_collect_orders(&txn, &[product_key.to_string()])
        .await
        .unwrap();
    txn.commit().await.unwrap();
}

#[tokio::test]
async fn order_closes_only_when_all_lines_are_collected() {
    let app = TestApp::new().await;
    let tasks = &app.state.services.tasks;

    // an order expecting two product lines of ten each
    let order = tasks
        .create_task(
            "order",
            serde_json::json!({
                "external_key": "ORD-1",
                "name": "order",
                "pallets": [{
                    "code": "ORD-PAL-1",
                    "content_count": 0,
                    "products": [
                        { "external_key": "LINE-A", "count": 10 },
                        { "external_key": "LINE-B", "count": 10 },
                    ],
                }],
            }),
            None,
        )
        .await
        .unwrap()[0];

    // a stock pallet to source from
    app.state
        .services
        .pallets
        .create_pallets(
            vec![serde_json::from_value(serde_json::json!({
                "code": "STOCK-1",
                "content_count": 100,
            }))
            .unwrap()],
            None,
        )
        .await
        .unwrap();

    // ten boxes for line A: line A collects, the order stays open
    source_boxes(&app, "STOCK-1", 10, "LINE-A").await;

    let line_a = pallet_product::Entity::find()
        .filter(pallet_product::Column::ExternalKey.eq("LINE-A"))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert!(line_a.is_collected);

    let order_row = operation::Entity::find_by_id(order)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert!(!order_row.closed, "half-collected order must stay open");

    // ten boxes for line B: the order closes
    source_boxes(&app, "STOCK-1", 10, "LINE-B").await;

    let order_row = operation::Entity::find_by_id(order)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert!(order_row.closed);
    assert_eq!(order_row.status, "CLOSE");
}

#[tokio::test]
async fn partial_line_quantity_does_not_collect() {
    let app = TestApp::new().await;
    let tasks = &app.state.services.tasks;

    tasks
        .create_task(
            "order",
            serde_json::json!({
                "external_key": "ORD-2",
                "name": "order",
                "pallets": [{
                    "code": "ORD-PAL-2",
                    "content_count": 0,
                    "products": [{ "external_key": "LINE-C", "count": 10 }],
                }],
            }),
            None,
        )
        .await
        .unwrap();

    app.state
        .services
        .pallets
        .create_pallets(
            vec![serde_json::from_value(serde_json::json!({
                "code": "STOCK-2",
                "content_count": 100,
            }))
            .unwrap()],
            None,
        )
        .await
        .unwrap();

    // seven of ten: not collected
    source_boxes(&app, "STOCK-2", 7, "LINE-C").await;
    let line = pallet_product::Entity::find()
        .filter(pallet_product::Column::ExternalKey.eq("LINE-C"))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert!(!line.is_collected);

    // three more reach the threshold across multiple ledger rows
    source_boxes(&app, "STOCK-2", 3, "LINE-C").await;
    let line = pallet_product::Entity::find()
        .filter(pallet_product::Column::ExternalKey.eq("LINE-C"))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert!(line.is_collected);
}

#[tokio::test]
async fn ledger_sum_drives_collection_through_content_changes() {
    let app = TestApp::new().await;
    let tasks = &app.state.services.tasks;

    let order = tasks
        .create_task(
            "order",
            serde_json::json!({
                "external_key": "ORD-3",
                "name": "order",
                "pallets": [{
                    "code": "ORD-PAL-3",
                    "content_count": 0,
                    "products": [{ "external_key": "LINE-D", "count": 5 }],
                }],
            }),
            None,
        )
        .await
        .unwrap()[0];

    app.state
        .services
        .pallets
        .create_pallets(
            vec![serde_json::from_value(serde_json::json!({
                "code": "STOCK-3",
                "content_count": 20,
            }))
            .unwrap()],
            None,
        )
        .await
        .unwrap();

    // the same flow through a shipment's content change
    let shipment = tasks
        .create_task(
            "shipment",
            serde_json::json!({ "external_key": "SHIP-ORD-3", "name": "shipment" }),
            None,
        )
        .await
        .unwrap()[0];

    let result = tasks
        .change_task_content(
            "shipment",
            shipment,
            serde_json::json!({
                "sources": [{ "pallet": "STOCK-3", "count": 5, "product_key": "LINE-D" }],
            }),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result["withdrawn"], 1);
    let closed: Vec<String> = result["orders_closed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(closed, vec![order.to_string()]);
}
