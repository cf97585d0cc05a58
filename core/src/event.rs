//! Event model for the Taskchain indexer.
//!
//! Events are decoded on-chain facts delivered by an external subscription
//! service. Each event arrives as a [`RawEvent`]: a fully-qualified type tag
//! of the form `<package>::<module>::<EventName>` plus the event's decoded
//! JSON payload. Events are immutable and append-only — they are written to
//! the audit log exactly as delivered and never updated or deleted.
//!
//! # Design
//!
//! Payloads stay JSON (`serde_json::Value`) at the envelope level because the
//! field set varies per event name. Each known event name has a typed payload
//! struct in this module; folds decode the payload they need via [`decode`].
//! Unknown field names in a payload are ignored (the chain module may add
//! fields over time), but a missing required field is a decode error.
//!
//! # Example
//!
//! ```
//! use taskchain_core::event::{RawEvent, names};
//! use serde_json::json;
//!
//! let event = RawEvent::new(
//!     "0xabc::project::TaskAdded",
//!     json!({
//!         "project_id": "p1",
//!         "task_id": "t1",
//!         "name": "Design",
//!         "description": "Design the thing",
//!         "assignee": "0xA",
//!         "state": 0,
//!         "due_date": "1735689600000",
//!         "added_by": "0xA",
//!     }),
//! );
//!
//! assert_eq!(event.event_name(), names::TASK_ADDED);
//! assert!(event.has_namespace("0xabc::project"));
//! ```

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Error raised when an event payload cannot be decoded into its typed form.
#[derive(Error, Debug)]
#[error("Failed to decode {event_name} payload: {reason}")]
pub struct PayloadError {
    /// The short event name whose payload failed to decode.
    pub event_name: String,
    /// Human-readable decode failure description.
    pub reason: String,
}

/// A decoded on-chain event exactly as delivered by the subscription service.
///
/// This is the external inbound contract: the type tag is fully qualified
/// (`<package>::<module>::<EventName>`) and the payload is the event's
/// declared fields as decoded JSON.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEvent {
    /// Fully-qualified event type, e.g. `0xabc::project::TaskAdded`.
    pub event_type: String,
    /// The event's decoded fields.
    pub parsed_json: Value,
}

impl RawEvent {
    /// Create a raw event from a type tag and decoded payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, parsed_json: Value) -> Self {
        Self {
            event_type: event_type.into(),
            parsed_json,
        }
    }

    /// The short event name: the final `::`-separated segment of the type tag.
    ///
    /// Returns the whole tag when it contains no `::` separator, mirroring the
    /// tolerant behavior expected of audit tooling.
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.event_type
            .rsplit("::")
            .next()
            .unwrap_or(&self.event_type)
    }

    /// Whether this event originates from the given module namespace.
    ///
    /// Namespace scoping is a prefix check on the fully-qualified type tag;
    /// the ingestion coordinator rejects whole batches containing any event
    /// outside the expected namespace.
    #[must_use]
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.event_type.starts_with(namespace)
    }
}

/// Decode a JSON payload into a typed per-event payload struct.
///
/// # Errors
///
/// Returns [`PayloadError`] if required fields are missing or have the wrong
/// shape. Extra fields are ignored.
pub fn decode<T: DeserializeOwned>(event_name: &str, payload: &Value) -> Result<T, PayloadError> {
    serde_json::from_value(payload.clone()).map_err(|e| PayloadError {
        event_name: event_name.to_string(),
        reason: e.to_string(),
    })
}

/// Short names of every event type the indexer knows how to fold.
///
/// These are the final segments of the fully-qualified on-chain type tags.
/// A well-namespaced event whose name is not in this set is skipped with a
/// warning rather than failing ingestion (forward compatibility with future
/// module versions).
pub mod names {
    /// A project was created.
    pub const PROJECT_CREATED: &str = "ProjectCreated";
    /// A member joined (or re-joined) a project.
    pub const MEMBER_ADDED: &str = "MemberAdded";
    /// A member was removed from a project.
    pub const MEMBER_REMOVED: &str = "MemberRemoved";
    /// A task was added to a project.
    pub const TASK_ADDED: &str = "TaskAdded";
    /// A task was deleted.
    pub const DELETE_TASK: &str = "DeleteTask";
    /// A task was renamed.
    pub const TASK_NAME_UPDATED: &str = "TaskNameUpdated";
    /// A task description changed on-chain (payload carries no new value).
    pub const TASK_DESCRIPTION_UPDATED: &str = "TaskDescriptionUpdated";
    /// A task was reassigned.
    pub const TASK_ASSIGNEE_UPDATED: &str = "TaskAssigneeUpdated";
    /// A task moved between workflow states.
    pub const TASK_STATE_UPDATED: &str = "TaskStateUpdated";
    /// A task due date changed.
    pub const TASK_DUE_DATE_UPDATED: &str = "TaskDueDateUpdated";
    /// A subtask was added (or re-added) to a task.
    pub const SUBTASK_ADDED: &str = "SubtaskAdded";
    /// A subtask changed on-chain (payload carries no new values).
    pub const SUBTASK_UPDATED: &str = "SubtaskUpdated";
    /// A subtask was deleted.
    pub const SUBTASK_DELETED: &str = "SubtaskDeleted";
    /// An attachment was added (or re-added) to a task.
    pub const ATTACHMENT_ADDED: &str = "AttachmentAdded";
    /// An attachment was removed from a task.
    pub const ATTACHMENT_REMOVED: &str = "AttachmentRemoved";
    /// A username was registered in the on-chain registry (audit-only).
    pub const USERNAME_REGISTERED: &str = "UsernameRegistered";

    /// Every known event name, in a stable order.
    pub const ALL: [&str; 16] = [
        PROJECT_CREATED,
        MEMBER_ADDED,
        MEMBER_REMOVED,
        TASK_ADDED,
        DELETE_TASK,
        TASK_NAME_UPDATED,
        TASK_DESCRIPTION_UPDATED,
        TASK_ASSIGNEE_UPDATED,
        TASK_STATE_UPDATED,
        TASK_DUE_DATE_UPDATED,
        SUBTASK_ADDED,
        SUBTASK_UPDATED,
        SUBTASK_DELETED,
        ATTACHMENT_ADDED,
        ATTACHMENT_REMOVED,
        USERNAME_REGISTERED,
    ];
}

// Typed payloads. Field names mirror the on-chain event declarations; chain
// timestamps (`joined_at`, `due_date`) arrive as decimal strings and are
// passed through untouched.

/// Payload of `ProjectCreated`.
#[derive(Clone, Debug, Deserialize)]
pub struct ProjectCreated {
    /// Project object id.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Project description.
    pub description: String,
    /// Manager address.
    pub manager: String,
}

/// Payload of `MemberAdded`.
#[derive(Clone, Debug, Deserialize)]
pub struct MemberAdded {
    /// Project the member joined.
    pub project_id: String,
    /// Member address.
    pub member_address: String,
    /// Display name chosen at join time.
    pub display_name: String,
    /// Join timestamp (chain milliseconds, decimal string).
    pub joined_at: String,
}

/// Payload of `MemberRemoved`.
#[derive(Clone, Debug, Deserialize)]
pub struct MemberRemoved {
    /// Project the member left.
    pub project_id: String,
    /// Removed member address.
    pub member_address: String,
}

/// Payload of `TaskAdded`.
#[derive(Clone, Debug, Deserialize)]
pub struct TaskAdded {
    /// Owning project id.
    pub project_id: String,
    /// Task object id.
    pub task_id: String,
    /// Task name.
    pub name: String,
    /// Task description.
    pub description: String,
    /// Assignee address.
    pub assignee: String,
    /// Workflow state as emitted on chain (0=Todo, 1=InProgress, 2=Done).
    pub state: u8,
    /// Due date (chain milliseconds, decimal string).
    pub due_date: String,
    /// Address that added the task.
    pub added_by: String,
}

/// Payload of `DeleteTask`.
#[derive(Clone, Debug, Deserialize)]
pub struct DeleteTask {
    /// Deleted task id.
    pub task_id: String,
}

/// Payload of `TaskNameUpdated`.
#[derive(Clone, Debug, Deserialize)]
pub struct TaskNameUpdated {
    /// Updated task id.
    pub task_id: String,
    /// New task name.
    pub new_name: String,
}

/// Payload of `TaskDescriptionUpdated`.
///
/// Information-incomplete: the chain event does not carry the new description,
/// only who performed the update. The fold for this event can only bump the
/// row's `updated_at` marker — the stored description is deliberately fed
/// forward stale until this is fixed upstream.
#[derive(Clone, Debug, Deserialize)]
pub struct TaskDescriptionUpdated {
    /// Updated task id.
    pub task_id: String,
    /// Address that performed the update.
    pub updated_by: String,
}

/// Payload of `TaskAssigneeUpdated`.
#[derive(Clone, Debug, Deserialize)]
pub struct TaskAssigneeUpdated {
    /// Updated task id.
    pub task_id: String,
    /// New assignee address.
    pub new_assignee: String,
}

/// Payload of `TaskStateUpdated`.
#[derive(Clone, Debug, Deserialize)]
pub struct TaskStateUpdated {
    /// Updated task id.
    pub task_id: String,
    /// New workflow state (0=Todo, 1=InProgress, 2=Done).
    pub new_state: u8,
}

/// Payload of `TaskDueDateUpdated`.
#[derive(Clone, Debug, Deserialize)]
pub struct TaskDueDateUpdated {
    /// Updated task id.
    pub task_id: String,
    /// New due date (chain milliseconds, decimal string).
    pub new_due_date: String,
}

/// Payload of `SubtaskAdded`.
#[derive(Clone, Debug, Deserialize)]
pub struct SubtaskAdded {
    /// Owning project id.
    pub project_id: String,
    /// Owning task id.
    pub task_id: String,
    /// Subtask id, unique within the task.
    pub subtask_id: String,
    /// Subtask name.
    pub name: String,
    /// Subtask description.
    pub description: String,
    /// Workflow state as emitted on chain.
    pub state: u8,
    /// Address that added the subtask.
    pub added_by: String,
}

/// Payload of `SubtaskUpdated`.
///
/// Information-incomplete: carries only the actor, not the new field values.
/// See [`TaskDescriptionUpdated`] — the same stale-forwarding behavior
/// applies.
#[derive(Clone, Debug, Deserialize)]
pub struct SubtaskUpdated {
    /// Owning task id.
    pub task_id: String,
    /// Updated subtask id.
    pub subtask_id: String,
    /// Address that performed the update.
    pub updated_by: String,
}

/// Payload of `SubtaskDeleted`.
#[derive(Clone, Debug, Deserialize)]
pub struct SubtaskDeleted {
    /// Owning task id.
    pub task_id: String,
    /// Deleted subtask id.
    pub subtask_id: String,
}

/// Payload of `AttachmentAdded`.
#[derive(Clone, Debug, Deserialize)]
pub struct AttachmentAdded {
    /// Owning task id.
    pub task_id: String,
    /// Attachment id, unique within the task.
    pub attachment_id: String,
    /// Attachment display name.
    pub name: String,
    /// Attachment URL.
    pub url: String,
}

/// Payload of `AttachmentRemoved`.
#[derive(Clone, Debug, Deserialize)]
pub struct AttachmentRemoved {
    /// Owning task id.
    pub task_id: String,
    /// Removed attachment id.
    pub attachment_id: String,
}

/// Payload of `UsernameRegistered`.
///
/// Audit-only: the registry module materializes no current-state table for
/// usernames, so the fold for this event touches nothing. The event is still
/// recorded in the audit log.
#[derive(Clone, Debug, Deserialize)]
pub struct UsernameRegistered {
    /// Registered address.
    pub address: String,
    /// Registered username.
    pub username: String,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)] // Tests can expect

    use super::*;
    use serde_json::json;

    #[test]
    fn event_name_is_final_segment() {
        let event = RawEvent::new("0xabc::project::TaskAdded", json!({}));
        assert_eq!(event.event_name(), "TaskAdded");
    }

    #[test]
    fn event_name_without_separator_is_whole_tag() {
        let event = RawEvent::new("TaskAdded", json!({}));
        assert_eq!(event.event_name(), "TaskAdded");
    }

    #[test]
    fn namespace_check_is_prefix_based() {
        let event = RawEvent::new("0xabc::project::TaskAdded", json!({}));
        assert!(event.has_namespace("0xabc::project"));
        assert!(!event.has_namespace("0xdef::project"));
    }

    #[test]
    fn decode_ignores_extra_fields() {
        let payload = json!({
            "task_id": "t1",
            "new_name": "Renamed",
            "updated_by": "0xA",
        });
        let decoded: TaskNameUpdated = decode(names::TASK_NAME_UPDATED, &payload)
            .expect("payload with extra fields should decode");
        assert_eq!(decoded.task_id, "t1");
        assert_eq!(decoded.new_name, "Renamed");
    }

    #[test]
    fn decode_missing_field_is_an_error() {
        let payload = json!({ "task_id": "t1" });
        let err = decode::<TaskNameUpdated>(names::TASK_NAME_UPDATED, &payload)
            .expect_err("missing new_name must fail");
        assert_eq!(err.event_name, "TaskNameUpdated");
        assert!(err.reason.contains("new_name"));
    }
}
