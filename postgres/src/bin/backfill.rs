//! Rebuilds the current-state tables from the audit log.
//!
//! Reads `DATABASE_URL` from the environment, applies pending migrations,
//! and replays every audit table into the state tables. Safe to run against
//! non-empty state tables: rows converge toward the log.
//!
//! ```text
//! DATABASE_URL=postgres://localhost/taskchain cargo run --bin backfill
//! ```

use anyhow::Context;
use std::sync::Arc;
use taskchain_core::BackfillRunner;
use taskchain_postgres::{PostgresEventStore, PostgresStateStore, connect};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = connect(&database_url)
        .await
        .context("connecting to the database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("applying migrations")?;

    let events = Arc::new(PostgresEventStore::new(pool.clone()));
    let state = Arc::new(PostgresStateStore::new(pool));

    tracing::info!("Starting state backfill from the audit log");
    let report = BackfillRunner::new(events, state)
        .run()
        .await
        .context("backfill run")?;

    tracing::info!(
        projects = report.projects,
        members = report.members,
        tasks = report.tasks,
        subtasks = report.subtasks,
        attachments = report.attachments,
        "State backfill finished"
    );
    Ok(())
}
