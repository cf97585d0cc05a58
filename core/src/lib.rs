//! # Taskchain Core
//!
//! Event-sourced state reconstruction for an on-chain task-management module.
//!
//! The indexer consumes an append-only log of decoded domain events
//! (`ProjectCreated`, `TaskAdded`, `TaskStateUpdated`, …) and folds them into
//! current-state tables (projects, members, tasks, subtasks, attachments)
//! that the external read API queries. This crate is the whole engine:
//!
//! - **[`event`]**: the inbound event envelope and typed per-event payloads
//! - **[`state`]**: current-state row types and keys
//! - **[`store`]**: injected storage traits (audit log, state tables, cursor)
//! - **[`projector`]**: per-event fold functions behind a data-driven registry
//! - **[`ingest`]**: batch validation, audit append, in-order projection
//! - **[`backfill`]**: full replay of the audit log into fresh state tables
//!
//! # Data flow
//!
//! ```text
//! subscription service (external)
//!         │ batches of RawEvent
//!         ▼
//! ┌──────────────────────┐   per-type append   ┌─────────────────┐
//! │ IngestionCoordinator │────────────────────▶│  audit log      │
//! └──────────┬───────────┘                     │ (one table per  │
//!            │ per event, batch order          │  event type)    │
//!            ▼                                 └────────┬────────┘
//! ┌──────────────────────┐                              │ full replay
//! │ Projector (folds)    │◀─────── BackfillRunner ◀─────┘
//! └──────────┬───────────┘
//!            ▼
//!     state tables (projects, members, tasks, subtasks, attachments)
//! ```
//!
//! # Guarantees
//!
//! - Every state row is derivable by folding the audit log from empty in
//!   delivery order; the backfill runner reproduces the incremental result.
//! - Every fold is idempotent, so at-least-once delivery and batch retry
//!   after partial failure are safe.
//! - Unknown event types are logged and skipped, never fatal.
//!
//! # Example
//!
//! ```ignore
//! use taskchain_core::ingest::IngestionCoordinator;
//! use taskchain_core::projector::{FoldRegistry, Projector};
//!
//! let projector = Projector::new(state_store.clone(), FoldRegistry::task_module());
//! let coordinator = IngestionCoordinator::new(event_store, projector, cursors, "task-indexer");
//!
//! let report = coordinator.ingest(&batch, "0xabc::project").await?;
//! tracing::info!(?report, "ingested");
//! ```

pub mod backfill;
pub mod event;
pub mod ingest;
pub mod projector;
pub mod state;
pub mod store;

pub use backfill::{BackfillReport, BackfillRunner};
pub use event::RawEvent;
pub use ingest::{IngestReport, IngestionCoordinator};
pub use projector::{FoldOutcome, FoldRegistry, MissingEntityPolicy, Projector};
pub use store::{EventStore, IngestCursor, IngestCursorStore, StateStore};
