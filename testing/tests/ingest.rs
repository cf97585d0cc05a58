//! Behavioral tests for the ingestion coordinator: batch validation, audit
//! append, in-order projection, and cursor advancement.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use std::sync::Arc;
use taskchain_core::event::names;
use taskchain_core::projector::MissingEntityPolicy;
use taskchain_core::{FoldRegistry, IngestCursorStore, IngestionCoordinator, Projector, RawEvent};
use taskchain_testing::fixtures::{self, NAMESPACE};
use taskchain_testing::{InMemoryCursorStore, InMemoryEventStore, InMemoryStateStore};

struct Harness {
    events: InMemoryEventStore,
    state: InMemoryStateStore,
    cursors: InMemoryCursorStore,
    coordinator: IngestionCoordinator,
}

fn harness() -> Harness {
    harness_with_policy(MissingEntityPolicy::default())
}

fn harness_with_policy(policy: MissingEntityPolicy) -> Harness {
    let events = InMemoryEventStore::new();
    let state = InMemoryStateStore::new();
    let cursors = InMemoryCursorStore::new();
    let projector = Projector::new(Arc::new(state.clone()), FoldRegistry::task_module())
        .with_missing_entity_policy(policy);
    let coordinator = IngestionCoordinator::new(
        Arc::new(events.clone()),
        projector,
        Arc::new(cursors.clone()),
        "test-consumer",
    );
    Harness {
        events,
        state,
        cursors,
        coordinator,
    }
}

#[tokio::test]
async fn mixed_batch_is_appended_and_projected() {
    let h = harness();
    let batch = vec![
        fixtures::project_created("p1"),
        fixtures::member_added("p1", "0xA"),
        fixtures::member_added("p1", "0xB"),
        fixtures::task_added("p1", "t1"),
    ];

    let report = h
        .coordinator
        .ingest(&batch, NAMESPACE)
        .await
        .expect("well-formed batch ingests");

    assert_eq!(report.appended, 4);
    assert_eq!(report.applied, 4);
    assert_eq!(report.skipped_unknown, 0);
    assert_eq!(report.skipped_missing, 0);

    assert_eq!(h.events.count(names::PROJECT_CREATED), 1);
    assert_eq!(h.events.count(names::MEMBER_ADDED), 2);
    assert_eq!(h.events.count(names::TASK_ADDED), 1);

    assert_eq!(h.state.projects().len(), 1);
    assert_eq!(h.state.members().len(), 2);
    assert_eq!(h.state.tasks().len(), 1);
}

#[tokio::test]
async fn foreign_namespace_rejects_whole_batch_before_any_write() {
    let h = harness();
    let batch = vec![
        fixtures::project_created("p1"),
        RawEvent::new("0xdef::other::ProjectCreated", serde_json::json!({})),
    ];

    let err = h
        .coordinator
        .ingest(&batch, NAMESPACE)
        .await
        .expect_err("foreign origin must fail the batch");
    assert!(err.to_string().contains("Invalid event module origin"));

    // Nothing durable happened: no audit rows, no state, no cursor.
    assert!(h.events.is_empty());
    assert!(h.state.projects().is_empty());
    assert!(
        h.cursors
            .load("test-consumer")
            .await
            .expect("cursor load")
            .is_none()
    );
}

#[tokio::test]
async fn unknown_event_type_is_skipped_not_fatal() {
    let h = harness();
    let batch = vec![
        fixtures::project_created("p1"),
        RawEvent::new(
            format!("{NAMESPACE}::ProjectArchived"),
            serde_json::json!({ "id": "p1" }),
        ),
        fixtures::task_added("p1", "t1"),
    ];

    let report = h
        .coordinator
        .ingest(&batch, NAMESPACE)
        .await
        .expect("unknown names are tolerated");

    assert_eq!(report.appended, 2);
    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped_unknown, 1);
    assert_eq!(h.events.len(), 2);
    assert_eq!(h.state.tasks().len(), 1);
}

#[tokio::test]
async fn intra_batch_order_is_preserved_per_entity() {
    let h = harness();
    let batch = vec![
        fixtures::task_added("p1", "t1"),
        fixtures::task_state_updated("t1", 1),
        fixtures::task_name_updated("t1", "Renamed"),
    ];

    let report = h
        .coordinator
        .ingest(&batch, NAMESPACE)
        .await
        .expect("in-order batch applies fully");
    assert_eq!(report.applied, 3);

    let tasks = h.state.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].name, "Renamed");
    assert_eq!(tasks[0].state.as_u8(), 1);
}

#[tokio::test]
async fn patch_before_creation_skips_under_default_policy() {
    let h = harness();
    let batch = vec![
        fixtures::task_state_updated("t-unseen", 2),
        fixtures::task_added("p1", "t-unseen"),
    ];

    let report = h
        .coordinator
        .ingest(&batch, NAMESPACE)
        .await
        .expect("default policy recovers from early patches");

    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped_missing, 1);
    // The creation still landed with its own values, not the patch's.
    let tasks = h.state.tasks();
    assert_eq!(tasks[0].state.as_u8(), 0);
}

#[tokio::test]
async fn patch_before_creation_fails_under_strict_policy() {
    let h = harness_with_policy(MissingEntityPolicy::FailBatch);
    let batch = vec![fixtures::task_state_updated("t-unseen", 2)];

    let err = h
        .coordinator
        .ingest(&batch, NAMESPACE)
        .await
        .expect_err("strict policy surfaces the missing row");
    assert!(err.to_string().contains("t-unseen"));

    // The audit append preceded the fold failure and is retained.
    assert_eq!(h.events.count(names::TASK_STATE_UPDATED), 1);
}

#[tokio::test]
async fn cursor_advances_by_batch_size_across_batches() {
    let h = harness();
    h.coordinator
        .ingest(
            &[
                fixtures::project_created("p1"),
                fixtures::task_added("p1", "t1"),
            ],
            NAMESPACE,
        )
        .await
        .expect("first batch");
    h.coordinator
        .ingest(
            &[
                fixtures::task_state_updated("t1", 1),
                fixtures::task_state_updated("t1", 2),
                fixtures::subtask_added("p1", "t1", "s1"),
            ],
            NAMESPACE,
        )
        .await
        .expect("second batch");

    let cursor = h
        .cursors
        .load("test-consumer")
        .await
        .expect("cursor load")
        .expect("cursor exists after ingestion");
    assert_eq!(cursor.offset, 5);
}

#[tokio::test]
async fn reingesting_the_same_batch_leaves_state_unchanged() {
    let h = harness();
    let batch = vec![
        fixtures::project_created("p1"),
        fixtures::member_added("p1", "0xA"),
        fixtures::task_added("p1", "t1"),
        fixtures::task_state_updated("t1", 1),
        fixtures::subtask_added("p1", "t1", "s1"),
        fixtures::attachment_added("t1", "a1"),
    ];

    h.coordinator
        .ingest(&batch, NAMESPACE)
        .await
        .expect("first delivery");
    let first = fixtures::normalize_tasks(h.state.tasks());
    let members_first = h.state.members();

    h.coordinator
        .ingest(&batch, NAMESPACE)
        .await
        .expect("redelivery");

    // State is unchanged; the audit log faithfully records both deliveries.
    assert_eq!(fixtures::normalize_tasks(h.state.tasks()), first);
    assert_eq!(h.state.members(), members_first);
    assert_eq!(h.state.subtasks().len(), 1);
    assert_eq!(h.state.attachments().len(), 1);
    assert_eq!(h.events.count(names::TASK_ADDED), 2);
}

#[tokio::test]
async fn empty_batch_is_a_clean_noop_that_still_moves_the_cursor() {
    let h = harness();
    let report = h
        .coordinator
        .ingest(&[], NAMESPACE)
        .await
        .expect("empty batch is fine");
    assert_eq!(report.appended, 0);
    assert_eq!(report.applied, 0);

    let cursor = h
        .cursors
        .load("test-consumer")
        .await
        .expect("cursor load")
        .expect("cursor saved even for empty batches");
    assert_eq!(cursor.offset, 0);
}

#[tokio::test]
async fn audit_only_events_are_recorded_but_touch_no_state() {
    let h = harness();
    let batch = vec![fixtures::username_registered("0xA", "alice")];

    let report = h
        .coordinator
        .ingest(&batch, NAMESPACE)
        .await
        .expect("registry events ingest");
    assert_eq!(report.appended, 1);
    assert_eq!(report.applied, 1);

    assert_eq!(h.events.count(names::USERNAME_REGISTERED), 1);
    use taskchain_core::StateStore;
    let counts = h.state.counts().await.expect("counts");
    assert_eq!(counts, taskchain_core::state::StateCounts::default());
}
