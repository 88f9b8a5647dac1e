//! Pallet and source accounting tests: upsert semantics, conservation of
//! quantity against the ledger, archival, and pallet division.

mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait};

use common::{acceptance_payload, TestApp};
use wareflow_api::{
    domain::{CollectKind, OperationKind},
    entities::{aggregation_code, operation, operation_pallet, pallet, pallet_source},
    errors::ServiceError,
    router::payload::PalletItem,
    services::pallets::{
        remove_boxes_from_pallet, DividePalletSpec, WithdrawalRequest,
    },
};

fn pallet_item(code: &str, count: i32) -> PalletItem {
    serde_json::from_value(serde_json::json!({
        "code": code,
        "content_count": count,
        "weight": "40.0",
        "batch_number": "B-7",
        "series": "S-1",
    }))
    .unwrap()
}

#[tokio::test]
async fn create_pallets_upserts_by_code_and_preserves_order() {
    let app = TestApp::new().await;
    let pallets = &app.state.services.pallets;

    let first = pallets
        .create_pallets(vec![pallet_item("A-1", 10), pallet_item("A-2", 20)], None)
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].code, "A-1");
    assert_eq!(first[1].code, "A-2");

    // resubmitting one known and one new code creates only the new pallet
    let second = pallets
        .create_pallets(vec![pallet_item("A-2", 99), pallet_item("A-3", 30)], None)
        .await
        .unwrap();
    assert_eq!(second[0].id, first[1].id);
    assert_eq!(second[0].content_count, 20, "existing pallet is not rewritten");
    assert_eq!(second[1].code, "A-3");

    let total = pallet::Entity::find().count(app.db()).await.unwrap();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn aggregation_codes_attach_once() {
    let app = TestApp::new().await;
    let pallets = &app.state.services.pallets;

    let mut item = pallet_item("AGG-1", 10);
    item.aggregation_codes = vec!["CODE-1".to_string(), "CODE-2".to_string()];
    pallets.create_pallets(vec![item], None).await.unwrap();

    // same code on another pallet is skipped
    let mut item = pallet_item("AGG-2", 10);
    item.aggregation_codes = vec!["CODE-2".to_string(), "CODE-3".to_string()];
    pallets.create_pallets(vec![item], None).await.unwrap();

    let codes = aggregation_code::Entity::find().all(app.db()).await.unwrap();
    assert_eq!(codes.len(), 3);

    let code2 = codes.iter().find(|c| c.code == "CODE-2").unwrap();
    let agg1 = pallet::Entity::find()
        .filter(pallet::Column::Code.eq("AGG-1"))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code2.pallet_id, agg1.id, "CODE-2 stays with its first pallet");
}

#[tokio::test]
async fn withdrawal_decrements_and_writes_exactly_one_ledger_row() {
    let app = TestApp::new().await;
    app.state
        .services
        .pallets
        .create_pallets(vec![pallet_item("W-1", 30)], None)
        .await
        .unwrap();

    let txn = app.db().begin().await.unwrap();
    let updated = remove_boxes_from_pallet(
        &txn,
        &WithdrawalRequest {
            pallet_code: "W-1".to_string(),
            count: 12,
            weight: dec!(10.0),
            collect_kind: CollectKind::Shipment,
            product_key: Some("LINE-K".to_string()),
            dest_pallet_id: None,
            related_task_id: None,
            user_id: None,
        },
    )
    .await
    .unwrap();
    txn.commit().await.unwrap();

    assert_eq!(updated.content_count, 18);
    assert_eq!(updated.weight, dec!(30.0));

    let ledger = pallet_source::Entity::find()
        .filter(pallet_source::Column::PalletId.eq(updated.id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].count, 12);
    assert_eq!(ledger[0].collect_kind, "SHIPMENT");
    assert_eq!(ledger[0].product_key.as_deref(), Some("LINE-K"));
}

#[tokio::test]
async fn insufficient_quantity_aborts_without_partial_writes() {
    let app = TestApp::new().await;
    app.state
        .services
        .pallets
        .create_pallets(vec![pallet_item("W-2", 5)], None)
        .await
        .unwrap();

    let txn = app.db().begin().await.unwrap();
    let err = remove_boxes_from_pallet(
        &txn,
        &WithdrawalRequest {
            pallet_code: "W-2".to_string(),
            count: 100,
            weight: dec!(0),
            collect_kind: CollectKind::WriteOff,
            product_key: None,
            dest_pallet_id: None,
            related_task_id: None,
            user_id: None,
        },
    )
    .await
    .unwrap_err();
    txn.rollback().await.unwrap();

    assert_matches!(
        err,
        ServiceError::InsufficientQuantity {
            requested: 100,
            available: 5,
            ..
        }
    );

    let source = pallet::Entity::find()
        .filter(pallet::Column::Code.eq("W-2"))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source.content_count, 5);

    let ledger_count = pallet_source::Entity::find().count(app.db()).await.unwrap();
    assert_eq!(ledger_count, 0);
}

#[tokio::test]
async fn exhausting_a_pallet_archives_it_with_clamped_quantities() {
    let app = TestApp::new().await;
    app.state
        .services
        .pallets
        .create_pallets(vec![pallet_item("W-3", 8)], None)
        .await
        .unwrap();

    let txn = app.db().begin().await.unwrap();
    let updated = remove_boxes_from_pallet(
        &txn,
        &WithdrawalRequest {
            pallet_code: "W-3".to_string(),
            count: 8,
            weight: dec!(40.0),
            collect_kind: CollectKind::Inventory,
            product_key: None,
            dest_pallet_id: None,
            related_task_id: None,
            user_id: None,
        },
    )
    .await
    .unwrap();
    txn.commit().await.unwrap();

    assert_eq!(updated.status, "ARCHIVED");
    assert_eq!(updated.content_count, 0);
    assert_eq!(updated.weight, dec!(0));
}

#[tokio::test]
async fn divide_for_acceptance_wraps_split_in_divided_collect_task() {
    let app = TestApp::new().await;
    let tasks = &app.state.services.tasks;
    let pallets = &app.state.services.pallets;

    // the source pallet arrives through an acceptance task, so it carries a
    // collect task reference
    let acceptance_guid = tasks
        .create_task("acceptance", acceptance_payload("DIV-DOC", "WH1", &["DIV-1"]), None)
        .await
        .unwrap()[0];

    let result = pallets
        .divide_pallet(
            "DIV-1",
            DividePalletSpec {
                code: Some("DIV-1-NEW".to_string()),
                count: 4,
                weight: Some(dec!(20.0)),
                pallet_type: None,
            },
            None,
            OperationKind::Acceptance,
        )
        .await
        .unwrap();

    let [source, fresh] = &result[..] else {
        panic!("expected source and new pallet");
    };
    assert_eq!(source.content_count, 6);
    assert_eq!(source.weight, dec!(30.0));
    assert_eq!(fresh.content_count, 4);
    assert_eq!(fresh.batch_number.as_deref(), Some("B-100"));
    assert_eq!(fresh.product_id, source.product_id);

    // the split produced a DIVIDED pallet-collect task parented to the
    // source's collect task
    let collect_ops = operation::Entity::find()
        .filter(operation::Column::Kind.eq("pallet_collect"))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(collect_ops.len(), 1);
    assert_eq!(collect_ops[0].collect_kind.as_deref(), Some("DIVIDED"));
    assert_eq!(collect_ops[0].parent_task_id, Some(acceptance_guid));

    // and one DIVIDED ledger row into the new pallet
    let ledger = pallet_source::Entity::find()
        .filter(pallet_source::Column::PalletId.eq(source.id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].collect_kind, "DIVIDED");
    assert_eq!(ledger[0].dest_pallet_id, Some(fresh.id));
}

#[tokio::test]
async fn divide_for_movement_shipment_rewires_dependent_pallet() {
    let app = TestApp::new().await;
    let tasks = &app.state.services.tasks;
    let pallets = &app.state.services.pallets;

    let payload = serde_json::json!({
        "external_key": "MS-DOC",
        "name": "movement with shipment",
        "pallets": [{ "code": "MS-1", "content_count": 10, "weight": "50.0" }],
    });
    tasks
        .create_task("movement_shipment", payload, None)
        .await
        .unwrap();

    let result = pallets
        .divide_pallet(
            "MS-1",
            DividePalletSpec {
                code: None,
                count: 3,
                weight: None,
                pallet_type: None,
            },
            None,
            OperationKind::MovementShipment,
        )
        .await
        .unwrap();
    let fresh = &result[1];

    let row = operation_pallet::Entity::find()
        .filter(operation_pallet::Column::OpKind.eq("movement_shipment"))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.dependent_pallet_id, Some(fresh.id));

    // no extra operation was created for the rewire
    let op_count = operation::Entity::find().count(app.db()).await.unwrap();
    assert_eq!(op_count, 1);
}

#[tokio::test]
async fn divide_exhausting_the_source_archives_it() {
    let app = TestApp::new().await;
    let pallets = &app.state.services.pallets;

    pallets
        .create_pallets(vec![pallet_item("FULL-1", 6)], None)
        .await
        .unwrap();

    let result = pallets
        .divide_pallet(
            "FULL-1",
            DividePalletSpec {
                code: None,
                count: 6,
                weight: Some(dec!(40.0)),
                pallet_type: None,
            },
            None,
            OperationKind::Acceptance,
        )
        .await
        .unwrap();

    let source = &result[0];
    assert_eq!(source.status, "ARCHIVED");
    assert_eq!(source.content_count, 0);
    assert_eq!(source.weight, dec!(0));
}

#[tokio::test]
async fn failed_movement_shipment_divide_rolls_back_entirely() {
    let app = TestApp::new().await;
    let pallets = &app.state.services.pallets;

    pallets
        .create_pallets(vec![pallet_item("LONE-1", 6)], None)
        .await
        .unwrap();

    // the pallet is not part of any movement-with-shipment task, so the
    // rewire branch has nothing to rewire
    let result = pallets
        .divide_pallet(
            "LONE-1",
            DividePalletSpec {
                code: None,
                count: 3,
                weight: None,
                pallet_type: None,
            },
            None,
            OperationKind::MovementShipment,
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationFailed { .. }));

    let source = pallet::Entity::find()
        .filter(pallet::Column::Code.eq("LONE-1"))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source.content_count, 6, "decrement rolled back");
    assert_eq!(source.status, "NEW");

    let ledger_count = pallet_source::Entity::find().count(app.db()).await.unwrap();
    assert_eq!(ledger_count, 0, "ledger row rolled back");
}
