//! Current-state rows materialized from the event log.
//!
//! One row type per entity table, addressed by a stable key. Every row here
//! must be derivable by folding the audit log from empty state in delivery
//! order — the backfill runner is the executable form of that invariant.
//!
//! Composite-keyed entities (members, subtasks, attachments) use upsert
//! semantics on creation and set-based removal. Single-keyed entities
//! (projects, tasks) are created once and then field-patched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error for an out-of-range workflow state value in an event payload.
#[derive(Error, Debug)]
#[error("Invalid task state value: {0} (expected 0, 1, or 2)")]
pub struct InvalidTaskState(pub u8);

/// Task / subtask workflow state as declared by the on-chain module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Not started.
    Todo = 0,
    /// Being worked on.
    InProgress = 1,
    /// Finished.
    Done = 2,
}

impl TaskState {
    /// The on-chain numeric encoding of this state.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// The SQL (`SMALLINT`) encoding of this state.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        self as i16
    }

    /// Decode from the SQL (`SMALLINT`) encoding.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTaskState`] for values outside 0..=2.
    pub const fn from_i16(value: i16) -> Result<Self, InvalidTaskState> {
        match value {
            0 => Ok(Self::Todo),
            1 => Ok(Self::InProgress),
            2 => Ok(Self::Done),
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            other => Err(InvalidTaskState(other as u8)),
        }
    }
}

impl TryFrom<u8> for TaskState {
    type Error = InvalidTaskState;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Todo),
            1 => Ok(Self::InProgress),
            2 => Ok(Self::Done),
            other => Err(InvalidTaskState(other)),
        }
    }
}

/// A project row, keyed by project id.
///
/// Created by `ProjectCreated`. No deletion or partial-update events exist
/// for projects in the observed domain; re-creation overwrites in full.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRow {
    /// Project object id (primary key).
    pub id: String,
    /// Project name.
    pub name: String,
    /// Project description.
    pub description: String,
    /// Manager address.
    pub manager: String,
}

/// Composite key for a project member: `(project_id, address)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberKey {
    /// Owning project id.
    pub project_id: String,
    /// Member address.
    pub address: String,
}

/// A project-membership row.
///
/// Upserted by `MemberAdded` (re-adding refreshes the display name and join
/// time), hard-deleted by `MemberRemoved`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRow {
    /// Owning project id.
    pub project_id: String,
    /// Member address.
    pub address: String,
    /// Display name chosen at join time.
    pub display_name: String,
    /// Join timestamp (chain milliseconds, decimal string).
    pub joined_at: String,
}

impl MemberRow {
    /// The composite key addressing this row.
    #[must_use]
    pub fn key(&self) -> MemberKey {
        MemberKey {
            project_id: self.project_id.clone(),
            address: self.address.clone(),
        }
    }
}

/// A task row, keyed by task id.
///
/// Created by `TaskAdded`, mutated one field at a time by the dedicated
/// `Task*Updated` events, hard-deleted by `DeleteTask`. The `created_at` /
/// `updated_at` markers are indexer wall-clock times, not chain times.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    /// Task object id (primary key).
    pub id: String,
    /// Owning project id.
    pub project_id: String,
    /// Task name.
    pub name: String,
    /// Task description.
    pub description: String,
    /// Assignee address.
    pub assignee: String,
    /// Workflow state.
    pub state: TaskState,
    /// Due date (chain milliseconds, decimal string).
    pub due_date: String,
    /// When the indexer first materialized this row.
    pub created_at: DateTime<Utc>,
    /// When the indexer last touched this row.
    pub updated_at: DateTime<Utc>,
}

/// Composite key for a subtask: `(task_id, subtask_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubtaskKey {
    /// Owning task id.
    pub task_id: String,
    /// Subtask id, unique within the task.
    pub subtask_id: String,
}

/// A subtask row.
///
/// Upserted by `SubtaskAdded`, hard-deleted by `SubtaskDeleted`.
/// `SubtaskUpdated` carries no new values and therefore changes nothing here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskRow {
    /// Owning task id.
    pub task_id: String,
    /// Subtask id, unique within the task.
    pub subtask_id: String,
    /// Subtask name.
    pub name: String,
    /// Subtask description.
    pub description: String,
    /// Workflow state.
    pub state: TaskState,
}

impl SubtaskRow {
    /// The composite key addressing this row.
    #[must_use]
    pub fn key(&self) -> SubtaskKey {
        SubtaskKey {
            task_id: self.task_id.clone(),
            subtask_id: self.subtask_id.clone(),
        }
    }
}

/// Composite key for an attachment: `(task_id, attachment_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentKey {
    /// Owning task id.
    pub task_id: String,
    /// Attachment id, unique within the task.
    pub attachment_id: String,
}

/// An attachment row.
///
/// Upserted by `AttachmentAdded`, hard-deleted by `AttachmentRemoved`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRow {
    /// Owning task id.
    pub task_id: String,
    /// Attachment id, unique within the task.
    pub attachment_id: String,
    /// Attachment display name.
    pub name: String,
    /// Attachment URL.
    pub url: String,
}

impl AttachmentRow {
    /// The composite key addressing this row.
    #[must_use]
    pub fn key(&self) -> AttachmentKey {
        AttachmentKey {
            task_id: self.task_id.clone(),
            attachment_id: self.attachment_id.clone(),
        }
    }
}

/// Per-entity row counts, for operational reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    /// Number of project rows.
    pub projects: u64,
    /// Number of member rows.
    pub members: u64,
    /// Number of task rows.
    pub tasks: u64,
    /// Number of subtask rows.
    pub subtasks: u64,
    /// Number of attachment rows.
    pub attachments: u64,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)] // Tests can expect

    use super::*;

    #[test]
    fn task_state_roundtrips_through_u8() {
        for state in [TaskState::Todo, TaskState::InProgress, TaskState::Done] {
            assert_eq!(TaskState::try_from(state.as_u8()).ok(), Some(state));
        }
    }

    #[test]
    fn task_state_rejects_out_of_range() {
        let err = TaskState::try_from(3).expect_err("3 is not a workflow state");
        assert_eq!(err.0, 3);
    }

    #[test]
    fn task_state_sql_encoding_matches_chain_encoding() {
        assert_eq!(TaskState::InProgress.as_i16(), 1);
        assert_eq!(TaskState::from_i16(1).ok(), Some(TaskState::InProgress));
        assert!(TaskState::from_i16(7).is_err());
    }

    #[test]
    fn composite_keys_compare_by_value() {
        let row = SubtaskRow {
            task_id: "t1".to_string(),
            subtask_id: "0".to_string(),
            name: "Step 1".to_string(),
            description: String::new(),
            state: TaskState::Todo,
        };
        assert_eq!(
            row.key(),
            SubtaskKey {
                task_id: "t1".to_string(),
                subtask_id: "0".to_string(),
            }
        );
    }
}
