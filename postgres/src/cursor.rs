//! `PostgreSQL` ingest-cursor tracking.
//!
//! One row per consumer in the `ingest_cursors` table, recording how far
//! that consumer has ingested and when. Enables resumption and lag
//! visibility; redelivery safety rests on fold idempotence, not here.

use sqlx::postgres::PgPool;
use std::future::Future;
use std::pin::Pin;
use taskchain_core::store::{IngestCursor, IngestCursorStore, Result, StoreError};

type Boxed<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// `PostgreSQL`-backed cursor store.
#[derive(Clone)]
pub struct PostgresCursorStore {
    pool: PgPool,
}

impl PostgresCursorStore {
    /// Create a cursor store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl IngestCursorStore for PostgresCursorStore {
    fn save(&self, consumer: &str, cursor: IngestCursor) -> Boxed<'_, ()> {
        let consumer = consumer.to_string();
        Box::pin(async move {
            // The cursor offset is u64 but BIGINT is i64. Wrapping would take
            // 2^63 events; not a practical concern for this stream.
            #[allow(clippy::cast_possible_wrap)]
            let offset = cursor.offset as i64;

            sqlx::query(
                "INSERT INTO ingest_cursors (consumer, event_offset, event_timestamp, updated_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (consumer) DO UPDATE
                 SET event_offset = EXCLUDED.event_offset,
                     event_timestamp = EXCLUDED.event_timestamp,
                     updated_at = now()",
            )
            .bind(consumer)
            .bind(offset)
            .bind(cursor.timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to save cursor: {e}")))?;
            Ok(())
        })
    }

    fn load(&self, consumer: &str) -> Boxed<'_, Option<IngestCursor>> {
        let consumer = consumer.to_string();
        Box::pin(async move {
            let row: Option<(i64, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
                "SELECT event_offset, event_timestamp FROM ingest_cursors WHERE consumer = $1",
            )
            .bind(consumer)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to load cursor: {e}")))?;

            Ok(row.map(|(offset, timestamp)| {
                #[allow(clippy::cast_sign_loss)] // Offsets are always non-negative
                IngestCursor::new(offset as u64, timestamp)
            }))
        })
    }
}
