//! Storage traits for the audit log, the state tables, and the ingest cursor.
//!
//! # Design
//!
//! Storage is an injected dependency, never a process-wide singleton: the
//! projector, coordinator, and backfill runner all receive `Arc<dyn …>`
//! handles, so tests run against in-memory maps and production runs against
//! `PostgreSQL` without either side knowing the difference.
//!
//! The state store is deliberately a key-value upsert/delete surface. It does
//! NOT provide:
//! - filtered or aggregate queries (the external read API owns those)
//! - cross-row transactions (folds touch one row at a time)
//! - referential integrity (no FK enforcement is assumed between entities)
//!
//! # Dyn Compatibility
//!
//! These traits use explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` to enable trait object usage (`Arc<dyn EventStore>`,
//! `Arc<dyn StateStore>`). This is required for the fold registry, where fold
//! functions capture the state store behind a trait object.

use crate::state::{
    AttachmentKey, AttachmentRow, MemberKey, MemberRow, ProjectRow, StateCounts, SubtaskKey,
    SubtaskRow, TaskRow,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors surfaced by the storage backends.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query failure. Retryable: every write the core
    /// performs is an idempotent upsert or a key-tolerant delete.
    #[error("Database error: {0}")]
    Database(String),

    /// An event name outside the known set was handed to the audit log.
    ///
    /// Audit tables exist per known event type, so the event store refuses
    /// names it has no table for rather than improvising one.
    #[error("No audit table for event type: {0}")]
    UnknownEventTable(String),

    /// Stored payload could not be read back as JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Boxed future alias used by the dyn-compatible storage traits.
type BoxedResult<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Append-only audit log with one table per known event type.
///
/// The log is the durable record of every domain event ever observed, keyed
/// by short event name and holding the raw decoded payload. Rows are never
/// mutated; [`EventStore::load_all`] returns them in durable append order,
/// which is the order the backfill runner replays.
pub trait EventStore: Send + Sync {
    /// Append a batch of payloads for one event type.
    ///
    /// The append is all-or-nothing: either every payload in the call is
    /// durably recorded or none is. Callers group a mixed batch by type and
    /// await each group before projecting, to bound memory and keep failure
    /// boundaries clear.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownEventTable`] if `event_name` has no audit table
    /// - [`StoreError::Database`] on storage failure (the batch is retryable)
    fn append_batch(&self, event_name: &str, payloads: Vec<Value>) -> BoxedResult<'_, ()>;

    /// Load every stored payload for one event type, in append order.
    ///
    /// An event type with no stored payloads yields an empty vector, not an
    /// error.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownEventTable`] if `event_name` has no audit table
    /// - [`StoreError::Database`] on storage failure
    fn load_all(&self, event_name: &str) -> BoxedResult<'_, Vec<Value>>;
}

/// Key-value upsert/delete surface over the current-state tables.
///
/// Upserts are idempotent (re-writing a row with identical values is a no-op
/// in effect) and deletes are tolerant of the key already being absent, which
/// is what makes redelivered batches safe to re-apply.
///
/// There is deliberately no `delete_project`: no project-deletion event
/// exists in the observed domain. If the chain module grows one, the
/// extension point is a method here plus a fold registration.
pub trait StateStore: Send + Sync {
    /// Fetch a project row by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn get_project(&self, id: &str) -> BoxedResult<'_, Option<ProjectRow>>;

    /// Insert or fully overwrite a project row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn upsert_project(&self, row: ProjectRow) -> BoxedResult<'_, ()>;

    /// Fetch a member row by composite key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn get_member(&self, key: &MemberKey) -> BoxedResult<'_, Option<MemberRow>>;

    /// Insert or overwrite a member row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn upsert_member(&self, row: MemberRow) -> BoxedResult<'_, ()>;

    /// Delete a member row; absent keys are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn delete_member(&self, key: &MemberKey) -> BoxedResult<'_, ()>;

    /// Fetch a task row by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn get_task(&self, id: &str) -> BoxedResult<'_, Option<TaskRow>>;

    /// Insert or overwrite a task row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn upsert_task(&self, row: TaskRow) -> BoxedResult<'_, ()>;

    /// Delete a task row; absent ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn delete_task(&self, id: &str) -> BoxedResult<'_, ()>;

    /// Fetch a subtask row by composite key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn get_subtask(&self, key: &SubtaskKey) -> BoxedResult<'_, Option<SubtaskRow>>;

    /// Insert or overwrite a subtask row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn upsert_subtask(&self, row: SubtaskRow) -> BoxedResult<'_, ()>;

    /// Delete a subtask row; absent keys are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn delete_subtask(&self, key: &SubtaskKey) -> BoxedResult<'_, ()>;

    /// Fetch an attachment row by composite key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn get_attachment(&self, key: &AttachmentKey) -> BoxedResult<'_, Option<AttachmentRow>>;

    /// Insert or overwrite an attachment row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn upsert_attachment(&self, row: AttachmentRow) -> BoxedResult<'_, ()>;

    /// Delete an attachment row; absent keys are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn delete_attachment(&self, key: &AttachmentKey) -> BoxedResult<'_, ()>;

    /// Per-entity row counts, for operational reporting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn counts(&self) -> BoxedResult<'_, StateCounts>;
}

/// Watermark recording how far a named consumer has ingested.
///
/// The cursor exists for resumption and lag visibility; redelivery safety
/// rests on fold idempotence, not on the cursor. A redelivered batch below
/// the watermark re-applies cleanly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestCursor {
    /// Count of events ingested so far by this consumer.
    pub offset: u64,
    /// When this position was reached.
    pub timestamp: DateTime<Utc>,
}

impl IngestCursor {
    /// Create a cursor at the given offset.
    #[must_use]
    pub const fn new(offset: u64, timestamp: DateTime<Utc>) -> Self {
        Self { offset, timestamp }
    }

    /// A cursor at the beginning of the stream.
    #[must_use]
    pub fn beginning() -> Self {
        Self {
            offset: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Durable storage for ingest cursors, keyed by consumer name.
pub trait IngestCursorStore: Send + Sync {
    /// Persist the cursor for a consumer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn save(&self, consumer: &str, cursor: IngestCursor) -> BoxedResult<'_, ()>;

    /// Load the last persisted cursor for a consumer.
    ///
    /// Returns `None` for a consumer that has never ingested.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    fn load(&self, consumer: &str) -> BoxedResult<'_, Option<IngestCursor>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_table_error_names_the_type() {
        let error = StoreError::UnknownEventTable("MysteryEvent".to_string());
        assert!(format!("{error}").contains("MysteryEvent"));
    }

    #[test]
    fn cursor_beginning_starts_at_zero() {
        assert_eq!(IngestCursor::beginning().offset, 0);
    }
}
