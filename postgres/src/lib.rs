//! # Taskchain Postgres
//!
//! `PostgreSQL` storage backends for the Taskchain indexer.
//!
//! Implements the core storage traits against a single `PostgreSQL` database:
//!
//! - **[`event_store`]**: the append-only audit log, one table per known
//!   event type (`event_project_created`, `event_task_added`, …)
//! - **[`state_store`]**: the current-state tables (`projects`, `members`,
//!   `tasks`, `subtasks`, `attachments`) with `ON CONFLICT` upserts
//! - **[`cursor`]**: the `ingest_cursors` watermark table
//!
//! Schema lives in `migrations/` and is applied with `sqlx::migrate!`. The
//! `backfill` binary rebuilds the state tables from the audit log.
//!
//! # Example
//!
//! ```ignore
//! use taskchain_postgres::{connect, PostgresEventStore, PostgresStateStore};
//!
//! let pool = connect(&std::env::var("DATABASE_URL")?).await?;
//! sqlx::migrate!("./migrations").run(&pool).await?;
//!
//! let events = Arc::new(PostgresEventStore::new(pool.clone()));
//! let state = Arc::new(PostgresStateStore::new(pool.clone()));
//! ```

pub mod cursor;
pub mod event_store;
pub mod state_store;

pub use cursor::PostgresCursorStore;
pub use event_store::PostgresEventStore;
pub use state_store::PostgresStateStore;

use sqlx::postgres::{PgPool, PgPoolOptions};
use taskchain_core::store::StoreError;

/// Connect to `PostgreSQL` with defaults suited to the indexer's write path.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))
}
