//! Exchange batch gate tests: all-or-nothing group grants and unload
//! confirmation.

mod common;

use assert_matches::assert_matches;
use sea_orm::EntityTrait;
use uuid::Uuid;

use common::{acceptance_payload, TestApp};
use wareflow_api::{
    domain::ExchangeGrouping,
    entities::operation,
    errors::ServiceError,
    router::payload::PropertiesPatch,
};

fn close_patch() -> PropertiesPatch {
    PropertiesPatch {
        status: Some("CLOSE".to_string()),
        ..Default::default()
    }
}

async fn fetch(app: &TestApp, guid: Uuid) -> operation::Model {
    operation::Entity::find_by_id(guid)
        .one(app.db())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn group_becomes_ready_only_when_every_member_is_closed() {
    let app = TestApp::new().await;
    let tasks = &app.state.services.tasks;

    // three same-line acceptance operations created today
    let mut guids = Vec::new();
    for key in ["EXC-1", "EXC-2", "EXC-3"] {
        guids.push(
            tasks
                .create_task("acceptance", acceptance_payload(key, "WH1", &[]), None)
                .await
                .unwrap()[0],
        );
    }

    // closing two of three leaves the whole group not ready
    tasks
        .change_task_properties("acceptance", guids[0], close_patch())
        .await
        .unwrap();
    tasks
        .change_task_properties("acceptance", guids[1], close_patch())
        .await
        .unwrap();
    for guid in &guids {
        let op = fetch(&app, *guid).await;
        assert!(!op.ready_to_unload, "partial group must not be granted");
    }

    // the third close flips the whole group at once
    tasks
        .change_task_properties("acceptance", guids[2], close_patch())
        .await
        .unwrap();
    for guid in &guids {
        let op = fetch(&app, *guid).await;
        assert!(op.ready_to_unload);
        assert!(op.closed);
    }
}

#[tokio::test]
async fn grouping_by_line_keeps_other_lines_independent() {
    let app = TestApp::new().await;
    let tasks = &app.state.services.tasks;

    let mut payload_a = acceptance_payload("LINE-A-1", "WH1", &[]);
    payload_a["line"] = serde_json::json!("LINE-A");
    let mut payload_b = acceptance_payload("LINE-B-1", "WH1", &[]);
    payload_b["line"] = serde_json::json!("LINE-B");

    let a = tasks.create_task("acceptance", payload_a, None).await.unwrap()[0];
    let b = tasks.create_task("acceptance", payload_b, None).await.unwrap()[0];

    // line A closes fully; line B stays open
    tasks
        .change_task_properties("acceptance", a, close_patch())
        .await
        .unwrap();

    assert!(fetch(&app, a).await.ready_to_unload);
    assert!(!fetch(&app, b).await.ready_to_unload);
}

#[tokio::test]
async fn grouping_by_batch_number_spans_lines() {
    let app = TestApp::with_grouping(ExchangeGrouping::Batch).await;
    let tasks = &app.state.services.tasks;

    // same batch, different lines: one group under the batch policy
    let mut payload_a = acceptance_payload("BATCH-A", "WH1", &[]);
    payload_a["line"] = serde_json::json!("LINE-A");
    let mut payload_b = acceptance_payload("BATCH-B", "WH1", &[]);
    payload_b["line"] = serde_json::json!("LINE-B");

    let a = tasks.create_task("acceptance", payload_a, None).await.unwrap()[0];
    let b = tasks.create_task("acceptance", payload_b, None).await.unwrap()[0];

    tasks
        .change_task_properties("acceptance", a, close_patch())
        .await
        .unwrap();
    assert!(
        !fetch(&app, a).await.ready_to_unload,
        "same-batch sibling is still open"
    );

    tasks
        .change_task_properties("acceptance", b, close_patch())
        .await
        .unwrap();
    assert!(fetch(&app, a).await.ready_to_unload);
    assert!(fetch(&app, b).await.ready_to_unload);
}

#[tokio::test]
async fn confirm_unloading_is_idempotent_and_strict_on_unknown_guids() {
    let app = TestApp::new().await;
    let tasks = &app.state.services.tasks;
    let exchange = &app.state.services.exchange;

    let guid = tasks
        .create_task("acceptance", acceptance_payload("CONF-1", "WH1", &[]), None)
        .await
        .unwrap()[0];

    // not ready yet: confirmation is a validation failure
    let err = exchange.confirm_unloading(&[guid]).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed { .. });

    tasks
        .change_task_properties("acceptance", guid, close_patch())
        .await
        .unwrap();
    assert!(fetch(&app, guid).await.ready_to_unload);

    exchange.confirm_unloading(&[guid]).await.unwrap();
    assert!(fetch(&app, guid).await.unloaded);

    // re-confirming is a no-op
    exchange.confirm_unloading(&[guid]).await.unwrap();
    assert!(fetch(&app, guid).await.unloaded);

    // unknown guids are a lookup failure, never silently ignored
    let missing = Uuid::new_v4();
    let err = exchange.confirm_unloading(&[missing]).await.unwrap_err();
    assert_matches!(err, ServiceError::TaskNotFound(id) if id == missing);
}

#[tokio::test]
async fn unloaded_operations_leave_the_candidate_pool() {
    let app = TestApp::new().await;
    let tasks = &app.state.services.tasks;
    let exchange = &app.state.services.exchange;

    let first = tasks
        .create_task("acceptance", acceptance_payload("POOL-1", "WH1", &[]), None)
        .await
        .unwrap()[0];
    tasks
        .change_task_properties("acceptance", first, close_patch())
        .await
        .unwrap();
    exchange.confirm_unloading(&[first]).await.unwrap();

    // a new same-line operation forms a fresh group; the unloaded one does
    // not hold it back
    let second = tasks
        .create_task("acceptance", acceptance_payload("POOL-2", "WH1", &[]), None)
        .await
        .unwrap()[0];
    tasks
        .change_task_properties("acceptance", second, close_patch())
        .await
        .unwrap();
    assert!(fetch(&app, second).await.ready_to_unload);
}
