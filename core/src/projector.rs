//! State projector: folds decoded events into current-state rows.
//!
//! # Overview
//!
//! For each known event type there is one fold function
//! `(current row | absent, event) -> new row | tombstone`, applied through
//! the injected [`StateStore`]. Dispatch is a pure lookup in a
//! [`FoldRegistry`] built at startup — no per-type branching lives anywhere
//! else, and an unknown event name is a logged skip, never a crash.
//!
//! # Idempotence
//!
//! Every fold is safe under at-least-once delivery:
//! - creation folds upsert (re-applying a creation overwrites with the same
//!   values instead of erroring),
//! - patch folds rewrite exactly one field, so re-applying rewrites it to the
//!   value it already has,
//! - deletion folds tolerate the key already being absent.
//!
//! # Example
//!
//! ```ignore
//! let registry = FoldRegistry::task_module();
//! let projector = Projector::new(state_store, registry);
//!
//! for event in &batch {
//!     projector.apply(event).await?;
//! }
//! ```

use crate::event::{
    self, PayloadError, RawEvent, names,
};
use crate::state::{
    AttachmentKey, AttachmentRow, InvalidTaskState, MemberKey, MemberRow, ProjectRow, SubtaskKey,
    SubtaskRow, TaskRow, TaskState,
};
use crate::store::{StateStore, StoreError};
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while folding a single event into the state tables.
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// The payload did not decode into the typed form for its event name.
    /// Not retryable: this signals upstream schema drift and fails the batch
    /// loudly rather than skipping silently.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The payload carried a workflow state outside the declared enum.
    #[error("Invalid workflow state in {event_name} payload: {source}")]
    InvalidState {
        /// Event name whose payload carried the bad value.
        event_name: &'static str,
        /// The out-of-range value.
        source: InvalidTaskState,
    },

    /// A field-patch event referenced an entity absent from the state table.
    /// Only surfaced under [`MissingEntityPolicy::FailBatch`]; the default
    /// policy recovers locally with a warning.
    #[error("{entity} {id} not found while applying {event_name}")]
    MissingEntityForPatch {
        /// Entity table the patch targeted.
        entity: &'static str,
        /// The key that was not found.
        id: String,
        /// Event name of the patch.
        event_name: &'static str,
    },

    /// Storage failure from the state store. Retryable: re-applying the same
    /// events is a no-op for rows already updated.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// What applying one event to the state tables did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FoldOutcome {
    /// A fold ran and the state tables reflect the event.
    Applied,
    /// The event name has no registered fold; nothing was touched.
    SkippedUnknown,
    /// A patch referenced a missing row and the policy recovered locally.
    SkippedMissingEntity,
}

/// How to treat a field-patch event whose target row does not exist.
///
/// This covers an update arriving before (or instead of) its creation event.
/// The default keeps ingestion live; strict deployments can fail the batch
/// instead. This is a configuration decision, not hardcoded behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingEntityPolicy {
    /// Log a warning and treat the event as a no-op (default).
    #[default]
    SkipWithWarning,
    /// Surface [`ProjectionError::MissingEntityForPatch`], failing the batch.
    FailBatch,
}

type FoldResult = Result<FoldOutcome>;

/// A fold function: applies one event payload to the state tables.
///
/// Plain `fn` pointers keep the registry a data table rather than a closure
/// soup; everything a fold needs arrives as arguments.
pub type FoldFn =
    for<'a> fn(&'a dyn StateStore, &'a Value, MissingEntityPolicy) -> BoxFuture<'a, FoldResult>;

/// Mapping from short event name to fold function.
///
/// Built once at startup; [`FoldRegistry::task_module`] registers every event
/// the task-management chain module emits today. Extending the domain (for
/// example a future project-closure event) is one [`FoldRegistry::register`]
/// call plus whatever state-store method the new fold needs.
#[derive(Default)]
pub struct FoldRegistry {
    folds: HashMap<&'static str, FoldFn>,
}

impl FoldRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry for the task-management module: all 16 known event types.
    #[must_use]
    pub fn task_module() -> Self {
        let mut registry = Self::new();
        registry.register(names::PROJECT_CREATED, fold_project_created);
        registry.register(names::MEMBER_ADDED, fold_member_added);
        registry.register(names::MEMBER_REMOVED, fold_member_removed);
        registry.register(names::TASK_ADDED, fold_task_added);
        registry.register(names::DELETE_TASK, fold_delete_task);
        registry.register(names::TASK_NAME_UPDATED, fold_task_name_updated);
        registry.register(names::TASK_DESCRIPTION_UPDATED, fold_task_description_updated);
        registry.register(names::TASK_ASSIGNEE_UPDATED, fold_task_assignee_updated);
        registry.register(names::TASK_STATE_UPDATED, fold_task_state_updated);
        registry.register(names::TASK_DUE_DATE_UPDATED, fold_task_due_date_updated);
        registry.register(names::SUBTASK_ADDED, fold_subtask_added);
        registry.register(names::SUBTASK_UPDATED, fold_subtask_updated);
        registry.register(names::SUBTASK_DELETED, fold_subtask_deleted);
        registry.register(names::ATTACHMENT_ADDED, fold_attachment_added);
        registry.register(names::ATTACHMENT_REMOVED, fold_attachment_removed);
        registry.register(names::USERNAME_REGISTERED, fold_username_registered);
        registry
    }

    /// Register (or replace) the fold for an event name.
    pub fn register(&mut self, event_name: &'static str, fold: FoldFn) {
        self.folds.insert(event_name, fold);
    }

    /// Whether a fold is registered for this event name.
    #[must_use]
    pub fn contains(&self, event_name: &str) -> bool {
        self.folds.contains_key(event_name)
    }

    /// Number of registered folds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.folds.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    fn get(&self, event_name: &str) -> Option<FoldFn> {
        self.folds.get(event_name).copied()
    }
}

/// Applies events to the state tables through the registered folds.
///
/// Pure dispatch plus injected storage: deterministic given the same event
/// order, and order-sensitive only within a single entity key.
pub struct Projector {
    store: Arc<dyn StateStore>,
    registry: FoldRegistry,
    policy: MissingEntityPolicy,
}

impl Projector {
    /// Create a projector over the given state store and fold registry.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, registry: FoldRegistry) -> Self {
        Self {
            store,
            registry,
            policy: MissingEntityPolicy::default(),
        }
    }

    /// Set the missing-entity policy (default: skip with a warning).
    #[must_use]
    pub const fn with_missing_entity_policy(mut self, policy: MissingEntityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The fold registry backing this projector.
    #[must_use]
    pub const fn registry(&self) -> &FoldRegistry {
        &self.registry
    }

    /// Fold one event into the state tables.
    ///
    /// Unknown event names are logged and skipped, not errors — the chain
    /// module may emit types this build does not know yet.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] on payload decode failure, storage failure,
    /// or a missing patch target under [`MissingEntityPolicy::FailBatch`].
    pub async fn apply(&self, event: &RawEvent) -> FoldResult {
        let name = event.event_name();
        let Some(fold) = self.registry.get(name) else {
            tracing::warn!(event_type = %event.event_type, "Unknown event type, skipping");
            return Ok(FoldOutcome::SkippedUnknown);
        };
        fold(self.store.as_ref(), &event.parsed_json, self.policy).await
    }
}

fn missing_entity(
    entity: &'static str,
    id: String,
    event_name: &'static str,
    policy: MissingEntityPolicy,
) -> FoldResult {
    match policy {
        MissingEntityPolicy::SkipWithWarning => {
            tracing::warn!(
                entity,
                id = %id,
                event = event_name,
                "Patch event references a missing row, skipping"
            );
            Ok(FoldOutcome::SkippedMissingEntity)
        }
        MissingEntityPolicy::FailBatch => Err(ProjectionError::MissingEntityForPatch {
            entity,
            id,
            event_name,
        }),
    }
}

fn task_state(event_name: &'static str, raw: u8) -> Result<TaskState> {
    TaskState::try_from(raw)
        .map_err(|source| ProjectionError::InvalidState { event_name, source })
}

// Fold functions. One per event type; each decodes its typed payload and
// performs exactly the table mutation the event denotes.

fn fold_project_created<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::ProjectCreated = event::decode(names::PROJECT_CREATED, payload)?;
        store
            .upsert_project(ProjectRow {
                id: ev.id,
                name: ev.name,
                description: ev.description,
                manager: ev.manager,
            })
            .await?;
        Ok(FoldOutcome::Applied)
    })
}

fn fold_member_added<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::MemberAdded = event::decode(names::MEMBER_ADDED, payload)?;
        store
            .upsert_member(MemberRow {
                project_id: ev.project_id,
                address: ev.member_address,
                display_name: ev.display_name,
                joined_at: ev.joined_at,
            })
            .await?;
        Ok(FoldOutcome::Applied)
    })
}

fn fold_member_removed<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::MemberRemoved = event::decode(names::MEMBER_REMOVED, payload)?;
        store
            .delete_member(&MemberKey {
                project_id: ev.project_id,
                address: ev.member_address,
            })
            .await?;
        Ok(FoldOutcome::Applied)
    })
}

fn fold_task_added<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::TaskAdded = event::decode(names::TASK_ADDED, payload)?;
        let state = task_state(names::TASK_ADDED, ev.state)?;
        let now = Utc::now();
        // Redelivered creations keep the original created_at marker.
        let created_at = match store.get_task(&ev.task_id).await? {
            Some(existing) => existing.created_at,
            None => now,
        };
        store
            .upsert_task(TaskRow {
                id: ev.task_id,
                project_id: ev.project_id,
                name: ev.name,
                description: ev.description,
                assignee: ev.assignee,
                state,
                due_date: ev.due_date,
                created_at,
                updated_at: now,
            })
            .await?;
        Ok(FoldOutcome::Applied)
    })
}

fn fold_delete_task<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::DeleteTask = event::decode(names::DELETE_TASK, payload)?;
        store.delete_task(&ev.task_id).await?;
        Ok(FoldOutcome::Applied)
    })
}

async fn patch_task<F>(
    store: &dyn StateStore,
    task_id: String,
    event_name: &'static str,
    policy: MissingEntityPolicy,
    patch: F,
) -> FoldResult
where
    F: FnOnce(&mut TaskRow),
{
    match store.get_task(&task_id).await? {
        Some(mut row) => {
            patch(&mut row);
            row.updated_at = Utc::now();
            store.upsert_task(row).await?;
            Ok(FoldOutcome::Applied)
        }
        None => missing_entity("task", task_id, event_name, policy),
    }
}

fn fold_task_name_updated<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::TaskNameUpdated = event::decode(names::TASK_NAME_UPDATED, payload)?;
        patch_task(store, ev.task_id, names::TASK_NAME_UPDATED, policy, |row| {
            row.name = ev.new_name;
        })
        .await
    })
}

fn fold_task_description_updated<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::TaskDescriptionUpdated =
            event::decode(names::TASK_DESCRIPTION_UPDATED, payload)?;
        // The event carries no new description (upstream schema limitation),
        // so the stored description is deliberately fed forward stale and
        // only the updated_at marker moves. Never fabricate a value here.
        patch_task(
            store,
            ev.task_id,
            names::TASK_DESCRIPTION_UPDATED,
            policy,
            |_row| {},
        )
        .await
    })
}

fn fold_task_assignee_updated<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::TaskAssigneeUpdated = event::decode(names::TASK_ASSIGNEE_UPDATED, payload)?;
        patch_task(store, ev.task_id, names::TASK_ASSIGNEE_UPDATED, policy, |row| {
            row.assignee = ev.new_assignee;
        })
        .await
    })
}

fn fold_task_state_updated<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::TaskStateUpdated = event::decode(names::TASK_STATE_UPDATED, payload)?;
        let state = task_state(names::TASK_STATE_UPDATED, ev.new_state)?;
        patch_task(store, ev.task_id, names::TASK_STATE_UPDATED, policy, |row| {
            row.state = state;
        })
        .await
    })
}

fn fold_task_due_date_updated<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::TaskDueDateUpdated = event::decode(names::TASK_DUE_DATE_UPDATED, payload)?;
        patch_task(store, ev.task_id, names::TASK_DUE_DATE_UPDATED, policy, |row| {
            row.due_date = ev.new_due_date;
        })
        .await
    })
}

fn fold_subtask_added<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::SubtaskAdded = event::decode(names::SUBTASK_ADDED, payload)?;
        let state = task_state(names::SUBTASK_ADDED, ev.state)?;
        store
            .upsert_subtask(SubtaskRow {
                task_id: ev.task_id,
                subtask_id: ev.subtask_id,
                name: ev.name,
                description: ev.description,
                state,
            })
            .await?;
        Ok(FoldOutcome::Applied)
    })
}

fn fold_subtask_updated<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::SubtaskUpdated = event::decode(names::SUBTASK_UPDATED, payload)?;
        let key = SubtaskKey {
            task_id: ev.task_id,
            subtask_id: ev.subtask_id,
        };
        // No new values in the payload: rewrite the row unchanged so the
        // write path still observes the event, exactly like the live indexer.
        match store.get_subtask(&key).await? {
            Some(row) => {
                store.upsert_subtask(row).await?;
                Ok(FoldOutcome::Applied)
            }
            None => missing_entity(
                "subtask",
                format!("{}/{}", key.task_id, key.subtask_id),
                names::SUBTASK_UPDATED,
                policy,
            ),
        }
    })
}

fn fold_subtask_deleted<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::SubtaskDeleted = event::decode(names::SUBTASK_DELETED, payload)?;
        store
            .delete_subtask(&SubtaskKey {
                task_id: ev.task_id,
                subtask_id: ev.subtask_id,
            })
            .await?;
        Ok(FoldOutcome::Applied)
    })
}

fn fold_attachment_added<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::AttachmentAdded = event::decode(names::ATTACHMENT_ADDED, payload)?;
        store
            .upsert_attachment(AttachmentRow {
                task_id: ev.task_id,
                attachment_id: ev.attachment_id,
                name: ev.name,
                url: ev.url,
            })
            .await?;
        Ok(FoldOutcome::Applied)
    })
}

fn fold_attachment_removed<'a>(
    store: &'a dyn StateStore,
    payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    Box::pin(async move {
        let ev: event::AttachmentRemoved = event::decode(names::ATTACHMENT_REMOVED, payload)?;
        store
            .delete_attachment(&AttachmentKey {
                task_id: ev.task_id,
                attachment_id: ev.attachment_id,
            })
            .await?;
        Ok(FoldOutcome::Applied)
    })
}

fn fold_username_registered<'a>(
    _store: &'a dyn StateStore,
    _payload: &'a Value,
    _policy: MissingEntityPolicy,
) -> BoxFuture<'a, FoldResult> {
    // Audit-only event: the registry module materializes no state table, so
    // the fold touches nothing. Registering it keeps the type "known".
    Box::pin(async move { Ok(FoldOutcome::Applied) })
}
