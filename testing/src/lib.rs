//! # Taskchain Testing
//!
//! Test infrastructure for the Taskchain indexer:
//!
//! - **[`memory`]**: in-memory implementations of the core storage traits
//!   (audit log, state tables, ingest cursor), suitable for fast deterministic
//!   tests with no database
//! - **[`fixtures`]**: event builders producing well-formed [`RawEvent`]s for
//!   the task-management module, plus snapshot normalization helpers for
//!   comparing state across ingestion paths
//!
//! The behavioral test suite for the indexer lives in this crate's `tests/`
//! directory and runs entirely against these doubles.
//!
//! [`RawEvent`]: taskchain_core::RawEvent

pub mod fixtures;
pub mod memory;

pub use memory::{InMemoryCursorStore, InMemoryEventStore, InMemoryStateStore};
