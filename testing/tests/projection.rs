//! Fold-level behavioral tests against the real in-memory state store:
//! patch isolation, tombstones, upsert idempotence, and the
//! information-incomplete events.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use serde_json::json;
use std::sync::Arc;
use taskchain_core::state::TaskState;
use taskchain_core::{FoldOutcome, FoldRegistry, Projector, RawEvent};
use taskchain_testing::InMemoryStateStore;
use taskchain_testing::fixtures::{self, NAMESPACE};

fn setup() -> (InMemoryStateStore, Projector) {
    let state = InMemoryStateStore::new();
    let projector = Projector::new(Arc::new(state.clone()), FoldRegistry::task_module());
    (state, projector)
}

async fn apply_all(projector: &Projector, events: &[RawEvent]) {
    for event in events {
        projector.apply(event).await.expect("fold applies");
    }
}

#[tokio::test]
async fn task_patch_changes_only_the_target_field() {
    let (state, projector) = setup();
    apply_all(
        &projector,
        &[
            fixtures::task_added("p1", "t1"),
            fixtures::task_assignee_updated("t1", "0xNewOwner"),
        ],
    )
    .await;

    let tasks = state.tasks();
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.assignee, "0xNewOwner");
    // Every other field keeps its creation value.
    assert_eq!(task.name, "Task t1");
    assert_eq!(task.description, "Description of t1");
    assert_eq!(task.state, TaskState::Todo);
    assert_eq!(task.due_date, "1767225600000");
}

#[tokio::test]
async fn description_update_moves_the_marker_but_not_the_value() {
    let (state, projector) = setup();
    projector
        .apply(&fixtures::task_added("p1", "t1"))
        .await
        .expect("creation");
    let before = state.tasks()[0].clone();

    let outcome = projector
        .apply(&fixtures::task_description_updated("t1"))
        .await
        .expect("description update applies");
    assert_eq!(outcome, FoldOutcome::Applied);

    let after = state.tasks()[0].clone();
    assert_eq!(after.description, before.description);
    assert_eq!(after.name, before.name);
    assert!(after.updated_at >= before.updated_at);
}

#[tokio::test]
async fn deleting_a_task_tombstones_it_and_later_patches_skip() {
    let (state, projector) = setup();
    apply_all(
        &projector,
        &[fixtures::task_added("p1", "t1"), fixtures::delete_task("t1")],
    )
    .await;
    assert!(state.tasks().is_empty());

    let outcome = projector
        .apply(&fixtures::task_name_updated("t1", "Ghost"))
        .await
        .expect("patch on tombstone skips by default");
    assert_eq!(outcome, FoldOutcome::SkippedMissingEntity);
    assert!(state.tasks().is_empty());
}

#[tokio::test]
async fn deleting_an_absent_task_is_a_noop() {
    let (state, projector) = setup();
    let outcome = projector
        .apply(&fixtures::delete_task("t-never-existed"))
        .await
        .expect("tolerant delete");
    assert_eq!(outcome, FoldOutcome::Applied);
    assert!(state.tasks().is_empty());
}

#[tokio::test]
async fn readding_a_task_overwrites_but_keeps_created_at() {
    let (state, projector) = setup();
    projector
        .apply(&fixtures::task_added("p1", "t1"))
        .await
        .expect("first creation");
    let original = state.tasks()[0].clone();

    let readded = RawEvent::new(
        format!("{NAMESPACE}::TaskAdded"),
        json!({
            "project_id": "p1",
            "task_id": "t1",
            "name": "Rewritten",
            "description": "New body",
            "assignee": "0xOther",
            "state": 1,
            "due_date": "1800000000000",
            "added_by": "0xOther",
        }),
    );
    projector.apply(&readded).await.expect("re-creation");

    let task = state.tasks()[0].clone();
    assert_eq!(task.name, "Rewritten");
    assert_eq!(task.state, TaskState::InProgress);
    assert_eq!(task.created_at, original.created_at);
}

#[tokio::test]
async fn member_readd_refreshes_display_name_and_join_time() {
    let (state, projector) = setup();
    projector
        .apply(&fixtures::member_added("p1", "0xA"))
        .await
        .expect("first join");

    let rejoined = RawEvent::new(
        format!("{NAMESPACE}::MemberAdded"),
        json!({
            "project_id": "p1",
            "member_address": "0xA",
            "display_name": "alice-renamed",
            "joined_at": "1740000000000",
        }),
    );
    projector.apply(&rejoined).await.expect("re-join");

    let members = state.members();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].display_name, "alice-renamed");
    assert_eq!(members[0].joined_at, "1740000000000");
}

#[tokio::test]
async fn member_removal_deletes_only_that_membership() {
    let (state, projector) = setup();
    apply_all(
        &projector,
        &[
            fixtures::member_added("p1", "0xA"),
            fixtures::member_added("p1", "0xB"),
            fixtures::member_added("p2", "0xA"),
            fixtures::member_removed("p1", "0xA"),
        ],
    )
    .await;

    let mut members = state.members();
    members.sort_by(|a, b| (a.project_id.clone(), a.address.clone())
        .cmp(&(b.project_id.clone(), b.address.clone())));
    assert_eq!(members.len(), 2);
    assert_eq!((members[0].project_id.as_str(), members[0].address.as_str()), ("p1", "0xB"));
    assert_eq!((members[1].project_id.as_str(), members[1].address.as_str()), ("p2", "0xA"));
}

#[tokio::test]
async fn subtask_lifecycle_add_update_delete() {
    let (state, projector) = setup();
    apply_all(
        &projector,
        &[
            fixtures::subtask_added("p1", "t1", "s1"),
            fixtures::subtask_added("p1", "t1", "s2"),
        ],
    )
    .await;

    let before = state.subtasks();
    let outcome = projector
        .apply(&fixtures::subtask_updated("t1", "s1"))
        .await
        .expect("valueless update applies");
    assert_eq!(outcome, FoldOutcome::Applied);
    // No values in the payload, so the rows are untouched.
    assert_eq!(state.subtasks().len(), before.len());

    projector
        .apply(&fixtures::subtask_deleted("t1", "s1"))
        .await
        .expect("delete");
    let remaining = state.subtasks();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].subtask_id, "s2");
}

#[tokio::test]
async fn attachment_removal_tolerates_absent_keys() {
    let (state, projector) = setup();
    apply_all(
        &projector,
        &[
            fixtures::attachment_added("t1", "a1"),
            fixtures::attachment_removed("t1", "a1"),
            fixtures::attachment_removed("t1", "a1"),
        ],
    )
    .await;
    assert!(state.attachments().is_empty());
}

#[tokio::test]
async fn malformed_payload_is_a_loud_decode_error() {
    let (_state, projector) = setup();
    let event = RawEvent::new(
        format!("{NAMESPACE}::TaskNameUpdated"),
        json!({ "task_id": "t1" }),
    );
    let err = projector
        .apply(&event)
        .await
        .expect_err("missing new_name must fail the fold");
    assert!(err.to_string().contains("new_name"));
}
