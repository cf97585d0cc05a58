//! Backfill runner: rebuilds the state tables from the audit log alone.
//!
//! # Overview
//!
//! Given the full, ordered audit log, the runner reconstructs every state
//! table from empty — used after schema changes, state-table corruption, or
//! to bootstrap a fresh read replica. Its output must equal what the
//! incremental ingestion path would have produced for the same event
//! history; the test suite holds the two paths to that equivalence.
//!
//! # Algorithm
//!
//! Entities are rebuilt in dependency order (Project → Member → Task →
//! Subtask → Attachment; conceptual order only — no FK enforcement is
//! assumed). Per entity:
//!
//! 1. fold all creation events into an in-memory map keyed by entity key
//!    (later creations overwrite earlier ones, matching upsert semantics),
//! 2. apply all deletion events as a set, removing matching keys,
//! 3. layer field-patch events onto the surviving rows in stored order,
//! 4. upsert the survivors into the state table and report counts.
//!
//! # Ordering assumption
//!
//! The create/delete-as-set pass is equivalent to a strict sequential fold
//! only because these events commute: it assumes no key is deleted and then
//! re-created, and no patch logically precedes its creation. If the history
//! can violate that, the sequential fold used by the ingestion coordinator
//! is the only safe algorithm — the coordinator remains the authoritative
//! semantics, and this runner is an optimization over it.

use crate::event::{self, PayloadError, names};
use crate::state::{
    AttachmentRow, InvalidTaskState, MemberRow, ProjectRow, SubtaskRow, TaskRow, TaskState,
};
use crate::store::{EventStore, StateStore, StoreError};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised during a backfill run.
#[derive(Error, Debug)]
pub enum BackfillError {
    /// Storage failure reading the audit log or writing state tables.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// A stored payload no longer decodes into its typed form.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// A stored payload carried a workflow state outside the declared enum.
    #[error("Invalid workflow state in stored event: {0}")]
    InvalidState(#[from] InvalidTaskState),
}

/// Result type for backfill operations.
pub type Result<T> = std::result::Result<T, BackfillError>;

/// Rows materialized per entity type by one backfill run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Surviving project rows upserted.
    pub projects: usize,
    /// Surviving member rows upserted.
    pub members: usize,
    /// Surviving task rows upserted.
    pub tasks: usize,
    /// Surviving subtask rows upserted.
    pub subtasks: usize,
    /// Surviving attachment rows upserted.
    pub attachments: usize,
}

/// Replays the entire audit log into the state tables.
pub struct BackfillRunner {
    events: Arc<dyn EventStore>,
    state: Arc<dyn StateStore>,
}

impl BackfillRunner {
    /// Create a runner over the given audit log and state store.
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>, state: Arc<dyn StateStore>) -> Self {
        Self { events, state }
    }

    /// Rebuild every state table from the audit log.
    ///
    /// Upserts surviving rows; it does not truncate first, so running
    /// against non-empty state tables converges them toward the log rather
    /// than erroring (rows absent from the log are untouched — drop the
    /// tables first for a strict rebuild).
    ///
    /// # Errors
    ///
    /// Returns [`BackfillError`] on storage failure or an undecodable stored
    /// payload.
    pub async fn run(&self) -> Result<BackfillReport> {
        let report = BackfillReport {
            projects: self.backfill_projects().await?,
            members: self.backfill_members().await?,
            tasks: self.backfill_tasks().await?,
            subtasks: self.backfill_subtasks().await?,
            attachments: self.backfill_attachments().await?,
        };
        let counts = self.state.counts().await?;
        tracing::info!(
            projects = report.projects,
            members = report.members,
            tasks = report.tasks,
            subtasks = report.subtasks,
            attachments = report.attachments,
            total_rows = counts.projects + counts.members + counts.tasks
                + counts.subtasks + counts.attachments,
            "Backfill complete"
        );
        Ok(report)
    }

    async fn backfill_projects(&self) -> Result<usize> {
        let mut rows: HashMap<String, ProjectRow> = HashMap::new();
        for payload in self.load(names::PROJECT_CREATED).await? {
            let ev: event::ProjectCreated = event::decode(names::PROJECT_CREATED, &payload)?;
            rows.insert(
                ev.id.clone(),
                ProjectRow {
                    id: ev.id,
                    name: ev.name,
                    description: ev.description,
                    manager: ev.manager,
                },
            );
        }

        for row in rows.values() {
            self.state.upsert_project(row.clone()).await?;
        }
        tracing::info!(count = rows.len(), "Backfilled projects");
        Ok(rows.len())
    }

    async fn backfill_members(&self) -> Result<usize> {
        let mut rows: HashMap<(String, String), MemberRow> = HashMap::new();
        for payload in self.load(names::MEMBER_ADDED).await? {
            let ev: event::MemberAdded = event::decode(names::MEMBER_ADDED, &payload)?;
            rows.insert(
                (ev.project_id.clone(), ev.member_address.clone()),
                MemberRow {
                    project_id: ev.project_id,
                    address: ev.member_address,
                    display_name: ev.display_name,
                    joined_at: ev.joined_at,
                },
            );
        }
        for payload in self.load(names::MEMBER_REMOVED).await? {
            let ev: event::MemberRemoved = event::decode(names::MEMBER_REMOVED, &payload)?;
            rows.remove(&(ev.project_id, ev.member_address));
        }

        for row in rows.values() {
            self.state.upsert_member(row.clone()).await?;
        }
        tracing::info!(count = rows.len(), "Backfilled members");
        Ok(rows.len())
    }

    #[allow(clippy::too_many_lines)]
    async fn backfill_tasks(&self) -> Result<usize> {
        let mut rows: HashMap<String, TaskRow> = HashMap::new();
        let now = Utc::now();
        for payload in self.load(names::TASK_ADDED).await? {
            let ev: event::TaskAdded = event::decode(names::TASK_ADDED, &payload)?;
            rows.insert(
                ev.task_id.clone(),
                TaskRow {
                    id: ev.task_id,
                    project_id: ev.project_id,
                    name: ev.name,
                    description: ev.description,
                    assignee: ev.assignee,
                    state: TaskState::try_from(ev.state)?,
                    due_date: ev.due_date,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        for payload in self.load(names::DELETE_TASK).await? {
            let ev: event::DeleteTask = event::decode(names::DELETE_TASK, &payload)?;
            rows.remove(&ev.task_id);
        }

        // Patch layering in per-type stored order. TaskDescriptionUpdated is
        // deliberately not replayed: it carries no value and only moves the
        // updated_at marker on the live path.
        for payload in self.load(names::TASK_NAME_UPDATED).await? {
            let ev: event::TaskNameUpdated = event::decode(names::TASK_NAME_UPDATED, &payload)?;
            if let Some(row) = rows.get_mut(&ev.task_id) {
                row.name = ev.new_name;
            }
        }
        for payload in self.load(names::TASK_ASSIGNEE_UPDATED).await? {
            let ev: event::TaskAssigneeUpdated =
                event::decode(names::TASK_ASSIGNEE_UPDATED, &payload)?;
            if let Some(row) = rows.get_mut(&ev.task_id) {
                row.assignee = ev.new_assignee;
            }
        }
        for payload in self.load(names::TASK_STATE_UPDATED).await? {
            let ev: event::TaskStateUpdated = event::decode(names::TASK_STATE_UPDATED, &payload)?;
            if let Some(row) = rows.get_mut(&ev.task_id) {
                row.state = TaskState::try_from(ev.new_state)?;
            }
        }
        for payload in self.load(names::TASK_DUE_DATE_UPDATED).await? {
            let ev: event::TaskDueDateUpdated =
                event::decode(names::TASK_DUE_DATE_UPDATED, &payload)?;
            if let Some(row) = rows.get_mut(&ev.task_id) {
                row.due_date = ev.new_due_date;
            }
        }

        for row in rows.values() {
            self.state.upsert_task(row.clone()).await?;
        }
        tracing::info!(count = rows.len(), "Backfilled tasks");
        Ok(rows.len())
    }

    async fn backfill_subtasks(&self) -> Result<usize> {
        let mut rows: HashMap<(String, String), SubtaskRow> = HashMap::new();
        for payload in self.load(names::SUBTASK_ADDED).await? {
            let ev: event::SubtaskAdded = event::decode(names::SUBTASK_ADDED, &payload)?;
            rows.insert(
                (ev.task_id.clone(), ev.subtask_id.clone()),
                SubtaskRow {
                    task_id: ev.task_id,
                    subtask_id: ev.subtask_id,
                    name: ev.name,
                    description: ev.description,
                    state: TaskState::try_from(ev.state)?,
                },
            );
        }
        for payload in self.load(names::SUBTASK_DELETED).await? {
            let ev: event::SubtaskDeleted = event::decode(names::SUBTASK_DELETED, &payload)?;
            rows.remove(&(ev.task_id, ev.subtask_id));
        }
        // SubtaskUpdated carries no values; nothing to replay.

        for row in rows.values() {
            self.state.upsert_subtask(row.clone()).await?;
        }
        tracing::info!(count = rows.len(), "Backfilled subtasks");
        Ok(rows.len())
    }

    async fn backfill_attachments(&self) -> Result<usize> {
        let mut rows: HashMap<(String, String), AttachmentRow> = HashMap::new();
        for payload in self.load(names::ATTACHMENT_ADDED).await? {
            let ev: event::AttachmentAdded = event::decode(names::ATTACHMENT_ADDED, &payload)?;
            rows.insert(
                (ev.task_id.clone(), ev.attachment_id.clone()),
                AttachmentRow {
                    task_id: ev.task_id,
                    attachment_id: ev.attachment_id,
                    name: ev.name,
                    url: ev.url,
                },
            );
        }
        for payload in self.load(names::ATTACHMENT_REMOVED).await? {
            let ev: event::AttachmentRemoved = event::decode(names::ATTACHMENT_REMOVED, &payload)?;
            rows.remove(&(ev.task_id, ev.attachment_id));
        }

        for row in rows.values() {
            self.state.upsert_attachment(row.clone()).await?;
        }
        tracing::info!(count = rows.len(), "Backfilled attachments");
        Ok(rows.len())
    }

    async fn load(&self, event_name: &str) -> std::result::Result<Vec<Value>, StoreError> {
        self.events.load_all(event_name).await
    }
}
