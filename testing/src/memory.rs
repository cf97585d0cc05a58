//! In-memory storage doubles for fast, deterministic testing.
//!
//! Provides `HashMap`-backed implementations of the core storage traits:
//! - [`InMemoryEventStore`]: per-type audit log preserving append order
//! - [`InMemoryStateStore`]: typed current-state tables
//! - [`InMemoryCursorStore`]: ingest watermark tracking
//!
//! These preserve exactly the semantics the core relies on — per-type append
//! order in the audit log, key-value upsert/delete with tolerant deletes in
//! the state tables — without a database.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for lock access
#![allow(clippy::missing_panics_doc)] // Lock poisoning is a test-infrastructure bug

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use taskchain_core::state::{
    AttachmentKey, AttachmentRow, MemberKey, MemberRow, ProjectRow, StateCounts, SubtaskKey,
    SubtaskRow, TaskRow,
};
use taskchain_core::store::{
    EventStore, IngestCursor, IngestCursorStore, Result, StateStore, StoreError,
};

type Boxed<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// In-memory audit log: one ordered payload list per known event type.
///
/// Mirrors the production layout (one table per event type) including its
/// refusal to store names outside the known set.
///
/// # Example
///
/// ```
/// use taskchain_testing::InMemoryEventStore;
/// use taskchain_core::event::names;
/// use taskchain_core::store::EventStore;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryEventStore::new();
/// store.append_batch(names::TASK_ADDED, vec![json!({"task_id": "t1"})]).await?;
/// assert_eq!(store.load_all(names::TASK_ADDED).await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventStore {
    tables: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl InMemoryEventStore {
    /// Create an empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().unwrap().values().map(Vec::len).sum()
    }

    /// Whether nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored events for one type.
    #[must_use]
    pub fn count(&self, event_name: &str) -> usize {
        self.tables
            .read()
            .unwrap()
            .get(event_name)
            .map_or(0, Vec::len)
    }

    /// Clear all stored events (for test isolation).
    pub fn clear(&self) {
        self.tables.write().unwrap().clear();
    }
}

impl EventStore for InMemoryEventStore {
    fn append_batch(&self, event_name: &str, payloads: Vec<Value>) -> Boxed<'_, ()> {
        let event_name = event_name.to_string();
        Box::pin(async move {
            if !taskchain_core::event::names::ALL.contains(&event_name.as_str()) {
                return Err(StoreError::UnknownEventTable(event_name));
            }
            self.tables
                .write()
                .unwrap()
                .entry(event_name)
                .or_default()
                .extend(payloads);
            Ok(())
        })
    }

    fn load_all(&self, event_name: &str) -> Boxed<'_, Vec<Value>> {
        let event_name = event_name.to_string();
        Box::pin(async move {
            if !taskchain_core::event::names::ALL.contains(&event_name.as_str()) {
                return Err(StoreError::UnknownEventTable(event_name));
            }
            Ok(self
                .tables
                .read()
                .unwrap()
                .get(&event_name)
                .cloned()
                .unwrap_or_default())
        })
    }
}

#[derive(Debug, Default)]
struct StateTables {
    projects: HashMap<String, ProjectRow>,
    members: HashMap<MemberKey, MemberRow>,
    tasks: HashMap<String, TaskRow>,
    subtasks: HashMap<SubtaskKey, SubtaskRow>,
    attachments: HashMap<AttachmentKey, AttachmentRow>,
}

/// In-memory current-state tables.
///
/// Inspection helpers (`projects()`, `tasks()`, …) return cloned snapshots
/// for assertions; equality checks in equivalence tests should normalize the
/// wall-clock `created_at`/`updated_at` markers first.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStateStore {
    tables: Arc<RwLock<StateTables>>,
}

impl InMemoryStateStore {
    /// Create empty state tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all project rows.
    #[must_use]
    pub fn projects(&self) -> Vec<ProjectRow> {
        self.tables.read().unwrap().projects.values().cloned().collect()
    }

    /// Snapshot of all member rows.
    #[must_use]
    pub fn members(&self) -> Vec<MemberRow> {
        self.tables.read().unwrap().members.values().cloned().collect()
    }

    /// Snapshot of all task rows.
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskRow> {
        self.tables.read().unwrap().tasks.values().cloned().collect()
    }

    /// Snapshot of all subtask rows.
    #[must_use]
    pub fn subtasks(&self) -> Vec<SubtaskRow> {
        self.tables.read().unwrap().subtasks.values().cloned().collect()
    }

    /// Snapshot of all attachment rows.
    #[must_use]
    pub fn attachments(&self) -> Vec<AttachmentRow> {
        self.tables.read().unwrap().attachments.values().cloned().collect()
    }

    /// Clear every table (for test isolation).
    pub fn clear(&self) {
        *self.tables.write().unwrap() = StateTables::default();
    }
}

impl StateStore for InMemoryStateStore {
    fn get_project(&self, id: &str) -> Boxed<'_, Option<ProjectRow>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.tables.read().unwrap().projects.get(&id).cloned()) })
    }

    fn upsert_project(&self, row: ProjectRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            self.tables.write().unwrap().projects.insert(row.id.clone(), row);
            Ok(())
        })
    }

    fn get_member(&self, key: &MemberKey) -> Boxed<'_, Option<MemberRow>> {
        let key = key.clone();
        Box::pin(async move { Ok(self.tables.read().unwrap().members.get(&key).cloned()) })
    }

    fn upsert_member(&self, row: MemberRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            self.tables.write().unwrap().members.insert(row.key(), row);
            Ok(())
        })
    }

    fn delete_member(&self, key: &MemberKey) -> Boxed<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            self.tables.write().unwrap().members.remove(&key);
            Ok(())
        })
    }

    fn get_task(&self, id: &str) -> Boxed<'_, Option<TaskRow>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.tables.read().unwrap().tasks.get(&id).cloned()) })
    }

    fn upsert_task(&self, row: TaskRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            self.tables.write().unwrap().tasks.insert(row.id.clone(), row);
            Ok(())
        })
    }

    fn delete_task(&self, id: &str) -> Boxed<'_, ()> {
        let id = id.to_string();
        Box::pin(async move {
            self.tables.write().unwrap().tasks.remove(&id);
            Ok(())
        })
    }

    fn get_subtask(&self, key: &SubtaskKey) -> Boxed<'_, Option<SubtaskRow>> {
        let key = key.clone();
        Box::pin(async move { Ok(self.tables.read().unwrap().subtasks.get(&key).cloned()) })
    }

    fn upsert_subtask(&self, row: SubtaskRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            self.tables.write().unwrap().subtasks.insert(row.key(), row);
            Ok(())
        })
    }

    fn delete_subtask(&self, key: &SubtaskKey) -> Boxed<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            self.tables.write().unwrap().subtasks.remove(&key);
            Ok(())
        })
    }

    fn get_attachment(&self, key: &AttachmentKey) -> Boxed<'_, Option<AttachmentRow>> {
        let key = key.clone();
        Box::pin(async move { Ok(self.tables.read().unwrap().attachments.get(&key).cloned()) })
    }

    fn upsert_attachment(&self, row: AttachmentRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            self.tables.write().unwrap().attachments.insert(row.key(), row);
            Ok(())
        })
    }

    fn delete_attachment(&self, key: &AttachmentKey) -> Boxed<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            self.tables.write().unwrap().attachments.remove(&key);
            Ok(())
        })
    }

    fn counts(&self) -> Boxed<'_, StateCounts> {
        Box::pin(async move {
            let tables = self.tables.read().unwrap();
            Ok(StateCounts {
                projects: tables.projects.len() as u64,
                members: tables.members.len() as u64,
                tasks: tables.tasks.len() as u64,
                subtasks: tables.subtasks.len() as u64,
                attachments: tables.attachments.len() as u64,
            })
        })
    }
}

/// In-memory ingest-cursor tracking.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: Arc<RwLock<HashMap<String, IngestCursor>>>,
}

impl InMemoryCursorStore {
    /// Create an empty cursor store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IngestCursorStore for InMemoryCursorStore {
    fn save(&self, consumer: &str, cursor: IngestCursor) -> Boxed<'_, ()> {
        let consumer = consumer.to_string();
        Box::pin(async move {
            self.cursors.write().unwrap().insert(consumer, cursor);
            Ok(())
        })
    }

    fn load(&self, consumer: &str) -> Boxed<'_, Option<IngestCursor>> {
        let consumer = consumer.to_string();
        Box::pin(async move { Ok(self.cursors.read().unwrap().get(&consumer).copied()) })
    }
}
