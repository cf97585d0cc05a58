//! Event builders and snapshot helpers for behavioral tests.
//!
//! Builders produce fully-qualified [`RawEvent`]s under the default test
//! namespace [`NAMESPACE`], with sensible defaults for fields a test does not
//! care about. Normalization helpers strip the indexer wall-clock markers so
//! state produced by different ingestion paths (or at different times) can be
//! compared for equality.

use chrono::{DateTime, Utc};
use serde_json::json;
use taskchain_core::RawEvent;
use taskchain_core::event::names;
use taskchain_core::state::TaskRow;

/// Module namespace used by every builder in this module.
pub const NAMESPACE: &str = "0xabc::project";

fn event(name: &str, payload: serde_json::Value) -> RawEvent {
    RawEvent::new(format!("{NAMESPACE}::{name}"), payload)
}

/// A `ProjectCreated` event for the given project id.
#[must_use]
pub fn project_created(project_id: &str) -> RawEvent {
    event(
        names::PROJECT_CREATED,
        json!({
            "id": project_id,
            "name": format!("Project {project_id}"),
            "description": "A test project",
            "manager": "0xManager",
        }),
    )
}

/// A `MemberAdded` event with a display name derived from the address.
#[must_use]
pub fn member_added(project_id: &str, address: &str) -> RawEvent {
    event(
        names::MEMBER_ADDED,
        json!({
            "project_id": project_id,
            "member_address": address,
            "display_name": format!("user-{address}"),
            "joined_at": "1735689600000",
        }),
    )
}

/// A `MemberRemoved` event.
#[must_use]
pub fn member_removed(project_id: &str, address: &str) -> RawEvent {
    event(
        names::MEMBER_REMOVED,
        json!({
            "project_id": project_id,
            "member_address": address,
        }),
    )
}

/// A `TaskAdded` event in the `Todo` state.
#[must_use]
pub fn task_added(project_id: &str, task_id: &str) -> RawEvent {
    event(
        names::TASK_ADDED,
        json!({
            "project_id": project_id,
            "task_id": task_id,
            "name": format!("Task {task_id}"),
            "description": format!("Description of {task_id}"),
            "assignee": "0xAssignee",
            "state": 0,
            "due_date": "1767225600000",
            "added_by": "0xManager",
        }),
    )
}

/// A `DeleteTask` event.
#[must_use]
pub fn delete_task(task_id: &str) -> RawEvent {
    event(names::DELETE_TASK, json!({ "task_id": task_id }))
}

/// A `TaskNameUpdated` event.
#[must_use]
pub fn task_name_updated(task_id: &str, new_name: &str) -> RawEvent {
    event(
        names::TASK_NAME_UPDATED,
        json!({ "task_id": task_id, "new_name": new_name }),
    )
}

/// A `TaskDescriptionUpdated` event (carries no new description).
#[must_use]
pub fn task_description_updated(task_id: &str) -> RawEvent {
    event(
        names::TASK_DESCRIPTION_UPDATED,
        json!({ "task_id": task_id, "updated_by": "0xEditor" }),
    )
}

/// A `TaskAssigneeUpdated` event.
#[must_use]
pub fn task_assignee_updated(task_id: &str, new_assignee: &str) -> RawEvent {
    event(
        names::TASK_ASSIGNEE_UPDATED,
        json!({ "task_id": task_id, "new_assignee": new_assignee }),
    )
}

/// A `TaskStateUpdated` event.
#[must_use]
pub fn task_state_updated(task_id: &str, new_state: u8) -> RawEvent {
    event(
        names::TASK_STATE_UPDATED,
        json!({ "task_id": task_id, "new_state": new_state }),
    )
}

/// A `TaskDueDateUpdated` event.
#[must_use]
pub fn task_due_date_updated(task_id: &str, new_due_date: &str) -> RawEvent {
    event(
        names::TASK_DUE_DATE_UPDATED,
        json!({ "task_id": task_id, "new_due_date": new_due_date }),
    )
}

/// A `SubtaskAdded` event in the `Todo` state.
#[must_use]
pub fn subtask_added(project_id: &str, task_id: &str, subtask_id: &str) -> RawEvent {
    event(
        names::SUBTASK_ADDED,
        json!({
            "project_id": project_id,
            "task_id": task_id,
            "subtask_id": subtask_id,
            "name": format!("Subtask {subtask_id}"),
            "description": "",
            "state": 0,
            "added_by": "0xAssignee",
        }),
    )
}

/// A `SubtaskUpdated` event (carries no new values).
#[must_use]
pub fn subtask_updated(task_id: &str, subtask_id: &str) -> RawEvent {
    event(
        names::SUBTASK_UPDATED,
        json!({
            "task_id": task_id,
            "subtask_id": subtask_id,
            "updated_by": "0xEditor",
        }),
    )
}

/// A `SubtaskDeleted` event.
#[must_use]
pub fn subtask_deleted(task_id: &str, subtask_id: &str) -> RawEvent {
    event(
        names::SUBTASK_DELETED,
        json!({ "task_id": task_id, "subtask_id": subtask_id }),
    )
}

/// An `AttachmentAdded` event.
#[must_use]
pub fn attachment_added(task_id: &str, attachment_id: &str) -> RawEvent {
    event(
        names::ATTACHMENT_ADDED,
        json!({
            "task_id": task_id,
            "attachment_id": attachment_id,
            "name": format!("file-{attachment_id}.pdf"),
            "url": format!("https://files.example/{attachment_id}"),
        }),
    )
}

/// An `AttachmentRemoved` event.
#[must_use]
pub fn attachment_removed(task_id: &str, attachment_id: &str) -> RawEvent {
    event(
        names::ATTACHMENT_REMOVED,
        json!({ "task_id": task_id, "attachment_id": attachment_id }),
    )
}

/// A `UsernameRegistered` event (audit-only, no state table).
#[must_use]
pub fn username_registered(address: &str, username: &str) -> RawEvent {
    event(
        names::USERNAME_REGISTERED,
        json!({ "address": address, "username": username }),
    )
}

/// The epoch instant used as the normalized timestamp marker.
#[must_use]
pub const fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Sort task rows by id and zero out the wall-clock markers.
///
/// `created_at` / `updated_at` record when the indexer touched a row, so two
/// runs over the same history legitimately differ there. Everything else must
/// match exactly.
#[must_use]
pub fn normalize_tasks(mut rows: Vec<TaskRow>) -> Vec<TaskRow> {
    for row in &mut rows {
        row.created_at = epoch();
        row.updated_at = epoch();
    }
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    rows
}
