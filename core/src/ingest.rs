//! Ingestion coordinator: validates, records, and projects event batches.
//!
//! # Overview
//!
//! The coordinator is the write path of the indexer. For each delivered
//! batch it:
//! 1. validates that every event's type tag is scoped to the expected module
//!    namespace (any mismatch fails the whole batch before a durable write),
//! 2. partitions recognized from unknown event names,
//! 3. groups recognized events by full type — in first-arrival order — and
//!    bulk-appends each group to the audit log,
//! 4. projects every event in **original batch order**, so a `TaskAdded` is
//!    folded before a `TaskStateUpdated` for the same id later in the batch,
//! 5. advances the ingest cursor.
//!
//! # Failure boundaries
//!
//! A projection failure mid-batch does not roll back the audit append — the
//! append already succeeded, and rolling audit history back would forge it.
//! The caller retries the same batch; every fold is idempotent, so rows that
//! were already updated absorb the redelivery as a no-op.
//!
//! # Ordering
//!
//! Within one batch, intra-entity event order is preserved end-to-end.
//! Across batches, the subscription service owns delivery order; the
//! coordinator never reorders across batch boundaries.

use crate::event::RawEvent;
use crate::projector::{FoldOutcome, ProjectionError, Projector};
use crate::store::{EventStore, IngestCursor, IngestCursorStore, StoreError};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced to the caller of [`IngestionCoordinator::ingest`].
#[derive(Error, Debug)]
pub enum IngestError {
    /// An event's type tag does not match the expected module namespace.
    /// Fails the whole batch fast, before anything is durably written.
    #[error("Invalid event module origin: {event_type} is not in namespace {expected}")]
    InvalidEventOrigin {
        /// The offending fully-qualified event type.
        event_type: String,
        /// The namespace the batch was declared to come from.
        expected: String,
    },

    /// The audit-log append failed. Nothing was projected for the failed
    /// group; the batch is retryable as a whole.
    #[error("Event store append failed: {0}")]
    Append(#[source] StoreError),

    /// A fold failed after the audit append succeeded. The audit log keeps
    /// the batch; re-ingesting it is safe by fold idempotence.
    #[error("Projection failed after append: {0}")]
    Projection(#[from] ProjectionError),

    /// Cursor persistence failed after the batch was fully applied.
    #[error("Cursor save failed: {0}")]
    Cursor(#[source] StoreError),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// What one [`IngestionCoordinator::ingest`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Events durably appended to the audit log.
    pub appended: usize,
    /// Events folded into the state tables.
    pub applied: usize,
    /// Events skipped because their name has no registered fold.
    pub skipped_unknown: usize,
    /// Patch events skipped because their target row was absent
    /// (only under the lenient missing-entity policy).
    pub skipped_missing: usize,
}

/// Coordinates one batch at a time from validation through projection.
///
/// Batches are bounded units of work — there is no background scheduler
/// here; the external subscription loop calls [`IngestionCoordinator::ingest`]
/// per delivery and owns retry/backoff.
pub struct IngestionCoordinator {
    events: Arc<dyn EventStore>,
    projector: Projector,
    cursor_store: Arc<dyn IngestCursorStore>,
    /// Consumer name under which the cursor is tracked.
    consumer: String,
}

impl IngestionCoordinator {
    /// Create a coordinator over the given stores and projector.
    ///
    /// `consumer` names the cursor row this coordinator advances; distinct
    /// subscription pipelines use distinct consumer names.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        projector: Projector,
        cursor_store: Arc<dyn IngestCursorStore>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            events,
            projector,
            cursor_store,
            consumer: consumer.into(),
        }
    }

    /// Ingest one batch of events delivered from `module_namespace`.
    ///
    /// See the module docs for the exact pipeline. Returns a report of what
    /// was appended, applied, and skipped.
    ///
    /// # Errors
    ///
    /// - [`IngestError::InvalidEventOrigin`] if any event is outside the
    ///   namespace (nothing written)
    /// - [`IngestError::Append`] on audit-log failure (nothing projected for
    ///   the failed group; retry the batch)
    /// - [`IngestError::Projection`] on fold failure (audit log retained;
    ///   retry the batch, idempotence absorbs the overlap)
    /// - [`IngestError::Cursor`] if the watermark could not be saved
    pub async fn ingest(&self, batch: &[RawEvent], module_namespace: &str) -> Result<IngestReport> {
        // 1. Validate origin before any durable write. Fail-fast, whole batch.
        for event in batch {
            if !event.has_namespace(module_namespace) {
                return Err(IngestError::InvalidEventOrigin {
                    event_type: event.event_type.clone(),
                    expected: module_namespace.to_string(),
                });
            }
        }

        let mut report = IngestReport::default();

        // 2. Partition recognized from unknown names. Unknown names have no
        // audit table and no fold; they are counted and logged, nothing more.
        let mut recognized: Vec<&RawEvent> = Vec::with_capacity(batch.len());
        for event in batch {
            if self.projector.registry().contains(event.event_name()) {
                recognized.push(event);
            } else {
                tracing::warn!(event_type = %event.event_type, "Unknown event type in batch, skipping");
                report.skipped_unknown += 1;
            }
        }

        // 3. Bulk-append per type, preserving first-arrival group order.
        for (event_name, payloads) in group_by_name(&recognized) {
            let count = payloads.len();
            self.events
                .append_batch(event_name, payloads)
                .await
                .map_err(IngestError::Append)?;
            report.appended += count;
            tracing::info!(event_name, count, "Appended events to audit log");
        }

        // 4. Project in original batch order to preserve intra-entity
        // causality; the grouped order above is an append-efficiency detail.
        for event in &recognized {
            match self.projector.apply(event).await? {
                FoldOutcome::Applied => report.applied += 1,
                FoldOutcome::SkippedUnknown => report.skipped_unknown += 1,
                FoldOutcome::SkippedMissingEntity => report.skipped_missing += 1,
            }
        }

        // 5. Advance the watermark.
        let offset = self
            .cursor_store
            .load(&self.consumer)
            .await
            .map_err(IngestError::Cursor)?
            .map_or(0, |c| c.offset)
            + batch.len() as u64;
        self.cursor_store
            .save(&self.consumer, IngestCursor::new(offset, Utc::now()))
            .await
            .map_err(IngestError::Cursor)?;

        tracing::info!(
            consumer = %self.consumer,
            appended = report.appended,
            applied = report.applied,
            skipped_unknown = report.skipped_unknown,
            skipped_missing = report.skipped_missing,
            offset,
            "Batch ingested"
        );
        Ok(report)
    }
}

/// Group events by short name, preserving first-arrival order of groups and
/// arrival order of payloads within each group.
fn group_by_name<'a>(events: &[&'a RawEvent]) -> Vec<(&'a str, Vec<Value>)> {
    let mut groups: Vec<(&str, Vec<Value>)> = Vec::new();
    for event in events {
        let name = event.event_name();
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, payloads)) => payloads.push(event.parsed_json.clone()),
            None => groups.push((name, vec![event.parsed_json.clone()])),
        }
    }
    groups
}
