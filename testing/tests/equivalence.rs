//! Property test: for any event history within the replay algorithm's
//! validity domain (no key re-created after deletion, no patch before its
//! creation), backfilling the audit log produces exactly the state the
//! incremental path built.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use taskchain_core::{
    BackfillRunner, FoldRegistry, IngestionCoordinator, Projector, RawEvent,
};
use taskchain_testing::fixtures::{self, NAMESPACE};
use taskchain_testing::{InMemoryCursorStore, InMemoryEventStore, InMemoryStateStore};

/// A raw generated operation; indices select from small entity pools.
/// `build_history` drops operations the validity domain forbids.
#[derive(Clone, Debug)]
enum Op {
    ProjectCreated(u8),
    MemberAdded(u8, u8),
    MemberRemoved(u8, u8),
    TaskAdded(u8, u8),
    TaskDeleted(u8),
    TaskRenamed(u8, u8),
    TaskReassigned(u8, u8),
    TaskStateChanged(u8, u8),
    TaskDueDateChanged(u8, u8),
    TaskDescriptionTouched(u8),
    SubtaskAdded(u8, u8, u8),
    SubtaskTouched(u8, u8),
    SubtaskDeleted(u8, u8),
    AttachmentAdded(u8, u8),
    AttachmentRemoved(u8, u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..3).prop_map(Op::ProjectCreated),
        (0u8..3, 0u8..4).prop_map(|(p, m)| Op::MemberAdded(p, m)),
        (0u8..3, 0u8..4).prop_map(|(p, m)| Op::MemberRemoved(p, m)),
        (0u8..3, 0u8..6).prop_map(|(p, t)| Op::TaskAdded(p, t)),
        (0u8..6).prop_map(Op::TaskDeleted),
        (0u8..6, 0u8..4).prop_map(|(t, v)| Op::TaskRenamed(t, v)),
        (0u8..6, 0u8..4).prop_map(|(t, v)| Op::TaskReassigned(t, v)),
        (0u8..6, 0u8..3).prop_map(|(t, s)| Op::TaskStateChanged(t, s)),
        (0u8..6, 0u8..4).prop_map(|(t, v)| Op::TaskDueDateChanged(t, v)),
        (0u8..6).prop_map(Op::TaskDescriptionTouched),
        (0u8..3, 0u8..6, 0u8..3).prop_map(|(p, t, s)| Op::SubtaskAdded(p, t, s)),
        (0u8..6, 0u8..3).prop_map(|(t, s)| Op::SubtaskTouched(t, s)),
        (0u8..6, 0u8..3).prop_map(|(t, s)| Op::SubtaskDeleted(t, s)),
        (0u8..6, 0u8..3).prop_map(|(t, a)| Op::AttachmentAdded(t, a)),
        (0u8..6, 0u8..3).prop_map(|(t, a)| Op::AttachmentRemoved(t, a)),
    ]
}

fn pid(i: u8) -> String {
    format!("p{i}")
}
fn tid(i: u8) -> String {
    format!("t{i}")
}
fn addr(i: u8) -> String {
    format!("0xM{i}")
}
fn sid(i: u8) -> String {
    format!("s{i}")
}
fn aid(i: u8) -> String {
    format!("a{i}")
}

/// Tracks which keys are live or tombstoned so generated histories stay
/// within the validity domain the replay algorithm assumes.
#[derive(Default)]
struct Domain {
    live_tasks: HashSet<String>,
    deleted_tasks: HashSet<String>,
    live_members: HashSet<(String, String)>,
    removed_members: HashSet<(String, String)>,
    live_subtasks: HashSet<(String, String)>,
    deleted_subtasks: HashSet<(String, String)>,
    live_attachments: HashSet<(String, String)>,
    removed_attachments: HashSet<(String, String)>,
}

/// Turn raw operations into a valid event history, dropping any operation
/// that would leave the validity domain (re-creation after deletion, or a
/// patch to a task never created or already deleted).
fn build_history(ops: &[Op]) -> Vec<RawEvent> {
    let mut d = Domain::default();
    let mut history = Vec::new();
    for op in ops {
        match op {
            Op::ProjectCreated(p) => history.push(fixtures::project_created(&pid(*p))),
            Op::MemberAdded(p, m) => {
                let key = (pid(*p), addr(*m));
                if !d.removed_members.contains(&key) {
                    d.live_members.insert(key.clone());
                    history.push(fixtures::member_added(&key.0, &key.1));
                }
            }
            Op::MemberRemoved(p, m) => {
                let key = (pid(*p), addr(*m));
                if d.live_members.remove(&key) {
                    d.removed_members.insert(key.clone());
                    history.push(fixtures::member_removed(&key.0, &key.1));
                }
            }
            Op::TaskAdded(p, t) => {
                let id = tid(*t);
                // Each task is created at most once: re-creating a live task
                // after a patch would let the replay layer that patch on top
                // of the re-creation, which the sequential fold does not do.
                if !d.deleted_tasks.contains(&id) && !d.live_tasks.contains(&id) {
                    d.live_tasks.insert(id.clone());
                    history.push(fixtures::task_added(&pid(*p), &id));
                }
            }
            Op::TaskDeleted(t) => {
                let id = tid(*t);
                if d.live_tasks.remove(&id) {
                    d.deleted_tasks.insert(id.clone());
                    history.push(fixtures::delete_task(&id));
                }
            }
            Op::TaskRenamed(t, v) => {
                let id = tid(*t);
                if d.live_tasks.contains(&id) {
                    history.push(fixtures::task_name_updated(&id, &format!("name-{v}")));
                }
            }
            Op::TaskReassigned(t, v) => {
                let id = tid(*t);
                if d.live_tasks.contains(&id) {
                    history.push(fixtures::task_assignee_updated(&id, &format!("0xA{v}")));
                }
            }
            Op::TaskStateChanged(t, s) => {
                let id = tid(*t);
                if d.live_tasks.contains(&id) {
                    history.push(fixtures::task_state_updated(&id, *s));
                }
            }
            Op::TaskDueDateChanged(t, v) => {
                let id = tid(*t);
                if d.live_tasks.contains(&id) {
                    history.push(fixtures::task_due_date_updated(
                        &id,
                        &format!("17{v}0000000000"),
                    ));
                }
            }
            Op::TaskDescriptionTouched(t) => {
                let id = tid(*t);
                if d.live_tasks.contains(&id) {
                    history.push(fixtures::task_description_updated(&id));
                }
            }
            Op::SubtaskAdded(p, t, s) => {
                let key = (tid(*t), sid(*s));
                if !d.deleted_subtasks.contains(&key) {
                    d.live_subtasks.insert(key.clone());
                    history.push(fixtures::subtask_added(&pid(*p), &key.0, &key.1));
                }
            }
            Op::SubtaskTouched(t, s) => {
                let key = (tid(*t), sid(*s));
                if d.live_subtasks.contains(&key) {
                    history.push(fixtures::subtask_updated(&key.0, &key.1));
                }
            }
            Op::SubtaskDeleted(t, s) => {
                let key = (tid(*t), sid(*s));
                if d.live_subtasks.remove(&key) {
                    d.deleted_subtasks.insert(key.clone());
                    history.push(fixtures::subtask_deleted(&key.0, &key.1));
                }
            }
            Op::AttachmentAdded(t, a) => {
                let key = (tid(*t), aid(*a));
                if !d.removed_attachments.contains(&key) {
                    d.live_attachments.insert(key.clone());
                    history.push(fixtures::attachment_added(&key.0, &key.1));
                }
            }
            Op::AttachmentRemoved(t, a) => {
                let key = (tid(*t), aid(*a));
                if d.live_attachments.remove(&key) {
                    d.removed_attachments.insert(key.clone());
                    history.push(fixtures::attachment_removed(&key.0, &key.1));
                }
            }
        }
    }
    history
}

/// Ingest the history split into batches of `batch_size`, then backfill the
/// resulting audit log into a fresh state store.
async fn run_both_paths(
    history: &[RawEvent],
    batch_size: usize,
) -> (InMemoryStateStore, InMemoryStateStore) {
    let events = InMemoryEventStore::new();
    let live = InMemoryStateStore::new();
    let projector = Projector::new(Arc::new(live.clone()), FoldRegistry::task_module());
    let coordinator = IngestionCoordinator::new(
        Arc::new(events.clone()),
        projector,
        Arc::new(InMemoryCursorStore::new()),
        "equivalence",
    );
    for batch in history.chunks(batch_size.max(1)) {
        coordinator
            .ingest(batch, NAMESPACE)
            .await
            .expect("generated history ingests cleanly");
    }

    let rebuilt = InMemoryStateStore::new();
    BackfillRunner::new(Arc::new(events), Arc::new(rebuilt.clone()))
        .run()
        .await
        .expect("backfill of generated history");
    (live, rebuilt)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn backfill_equals_incremental_for_any_valid_history(
        ops in proptest::collection::vec(op_strategy(), 0..80),
        batch_size in 1usize..12,
    ) {
        let history = build_history(&ops);
        // Every future in the in-memory stack is immediately ready.
        let (live, rebuilt) = futures::executor::block_on(run_both_paths(&history, batch_size));

        let mut live_projects = live.projects();
        let mut rebuilt_projects = rebuilt.projects();
        live_projects.sort_by(|a, b| a.id.cmp(&b.id));
        rebuilt_projects.sort_by(|a, b| a.id.cmp(&b.id));
        prop_assert_eq!(live_projects, rebuilt_projects);

        let mut live_members = live.members();
        let mut rebuilt_members = rebuilt.members();
        live_members.sort_by_key(|m| (m.project_id.clone(), m.address.clone()));
        rebuilt_members.sort_by_key(|m| (m.project_id.clone(), m.address.clone()));
        prop_assert_eq!(live_members, rebuilt_members);

        prop_assert_eq!(
            fixtures::normalize_tasks(live.tasks()),
            fixtures::normalize_tasks(rebuilt.tasks())
        );

        let mut live_subtasks = live.subtasks();
        let mut rebuilt_subtasks = rebuilt.subtasks();
        live_subtasks.sort_by_key(|s| (s.task_id.clone(), s.subtask_id.clone()));
        rebuilt_subtasks.sort_by_key(|s| (s.task_id.clone(), s.subtask_id.clone()));
        prop_assert_eq!(live_subtasks, rebuilt_subtasks);

        let mut live_attachments = live.attachments();
        let mut rebuilt_attachments = rebuilt.attachments();
        live_attachments.sort_by_key(|a| (a.task_id.clone(), a.attachment_id.clone()));
        rebuilt_attachments.sort_by_key(|a| (a.task_id.clone(), a.attachment_id.clone()));
        prop_assert_eq!(live_attachments, rebuilt_attachments);
    }
}
