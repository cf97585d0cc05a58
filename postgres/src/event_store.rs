//! `PostgreSQL` audit log: one append-only table per known event type.
//!
//! Each table carries a `BIGSERIAL` sequence column, the raw payload as
//! `JSONB`, and the wall-clock time the row was recorded. Rows are never
//! updated or deleted; [`PostgresEventStore::load_all`] returns them in
//! sequence order, which is the order the backfill runner replays.

use serde_json::Value;
use sqlx::postgres::PgPool;
use std::future::Future;
use std::pin::Pin;
use taskchain_core::event::names;
use taskchain_core::store::{EventStore, Result, StoreError};

type Boxed<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Map a short event name to its audit table.
///
/// The mapping is closed over the known event set; anything else has no
/// table and is refused. Table names are never interpolated from caller
/// input for that reason.
fn audit_table(event_name: &str) -> Option<&'static str> {
    match event_name {
        names::PROJECT_CREATED => Some("event_project_created"),
        names::MEMBER_ADDED => Some("event_member_added"),
        names::MEMBER_REMOVED => Some("event_member_removed"),
        names::TASK_ADDED => Some("event_task_added"),
        names::DELETE_TASK => Some("event_delete_task"),
        names::TASK_NAME_UPDATED => Some("event_task_name_updated"),
        names::TASK_DESCRIPTION_UPDATED => Some("event_task_description_updated"),
        names::TASK_ASSIGNEE_UPDATED => Some("event_task_assignee_updated"),
        names::TASK_STATE_UPDATED => Some("event_task_state_updated"),
        names::TASK_DUE_DATE_UPDATED => Some("event_task_due_date_updated"),
        names::SUBTASK_ADDED => Some("event_subtask_added"),
        names::SUBTASK_UPDATED => Some("event_subtask_updated"),
        names::SUBTASK_DELETED => Some("event_subtask_deleted"),
        names::ATTACHMENT_ADDED => Some("event_attachment_added"),
        names::ATTACHMENT_REMOVED => Some("event_attachment_removed"),
        names::USERNAME_REGISTERED => Some("event_username_registered"),
        _ => None,
    }
}

/// `PostgreSQL`-backed audit log.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create an event store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl EventStore for PostgresEventStore {
    fn append_batch(&self, event_name: &str, payloads: Vec<Value>) -> Boxed<'_, ()> {
        let event_name = event_name.to_string();
        Box::pin(async move {
            let Some(table) = audit_table(&event_name) else {
                return Err(StoreError::UnknownEventTable(event_name));
            };
            if payloads.is_empty() {
                return Ok(());
            }

            // One transaction per group keeps the append all-or-nothing.
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StoreError::Database(format!("Failed to begin append: {e}")))?;

            let query = format!("INSERT INTO {table} (payload) VALUES ($1)");
            let count = payloads.len();
            for payload in payloads {
                sqlx::query(&query)
                    .bind(payload)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Database(format!("Failed to append: {e}")))?;
            }

            tx.commit()
                .await
                .map_err(|e| StoreError::Database(format!("Failed to commit append: {e}")))?;

            tracing::debug!(event_name = %event_name, count, "Appended audit rows");
            Ok(())
        })
    }

    fn load_all(&self, event_name: &str) -> Boxed<'_, Vec<Value>> {
        let event_name = event_name.to_string();
        Box::pin(async move {
            let Some(table) = audit_table(&event_name) else {
                return Err(StoreError::UnknownEventTable(event_name));
            };

            let query = format!("SELECT payload FROM {table} ORDER BY seq");
            let rows: Vec<(Value,)> = sqlx::query_as(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Database(format!("Failed to load: {e}")))?;

            Ok(rows.into_iter().map(|(payload,)| payload).collect())
        })
    }
}
