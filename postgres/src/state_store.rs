//! `PostgreSQL` current-state tables.
//!
//! One table per entity, keyed exactly as the core's row types are keyed.
//! Writes are `ON CONFLICT` upserts and key-tolerant deletes, so redelivered
//! batches re-apply cleanly; there is no cross-table transaction because
//! folds touch one row at a time.

use sqlx::postgres::PgPool;
use std::future::Future;
use std::pin::Pin;
use taskchain_core::state::{
    AttachmentKey, AttachmentRow, MemberKey, MemberRow, ProjectRow, StateCounts, SubtaskKey,
    SubtaskRow, TaskRow, TaskState,
};
use taskchain_core::store::{Result, StateStore, StoreError};

type Boxed<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

fn db_err(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Database(format!("{context}: {e}"))
}

fn decode_state(value: i16) -> Result<TaskState> {
    TaskState::from_i16(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// `PostgreSQL`-backed state store.
#[derive(Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Create a state store using an existing connection pool.
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

impl StateStore for PostgresStateStore {
    fn get_project(&self, id: &str) -> Boxed<'_, Option<ProjectRow>> {
        let id = id.to_string();
        Box::pin(async move {
            let row: Option<(String, String, String, String)> = sqlx::query_as(
                "SELECT id, name, description, manager FROM projects WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to get project"))?;

            Ok(row.map(|(id, name, description, manager)| ProjectRow {
                id,
                name,
                description,
                manager,
            }))
        })
    }

    fn upsert_project(&self, row: ProjectRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO projects (id, name, description, manager)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE
                 SET name = EXCLUDED.name,
                     description = EXCLUDED.description,
                     manager = EXCLUDED.manager",
            )
            .bind(row.id)
            .bind(row.name)
            .bind(row.description)
            .bind(row.manager)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to upsert project"))?;
            Ok(())
        })
    }

    fn get_member(&self, key: &MemberKey) -> Boxed<'_, Option<MemberRow>> {
        let key = key.clone();
        Box::pin(async move {
            let row: Option<(String, String, String, String)> = sqlx::query_as(
                "SELECT project_id, address, display_name, joined_at
                 FROM members WHERE project_id = $1 AND address = $2",
            )
            .bind(key.project_id)
            .bind(key.address)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to get member"))?;

            Ok(
                row.map(|(project_id, address, display_name, joined_at)| MemberRow {
                    project_id,
                    address,
                    display_name,
                    joined_at,
                }),
            )
        })
    }

    fn upsert_member(&self, row: MemberRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO members (project_id, address, display_name, joined_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (project_id, address) DO UPDATE
                 SET display_name = EXCLUDED.display_name,
                     joined_at = EXCLUDED.joined_at",
            )
            .bind(row.project_id)
            .bind(row.address)
            .bind(row.display_name)
            .bind(row.joined_at)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to upsert member"))?;
            Ok(())
        })
    }

    fn delete_member(&self, key: &MemberKey) -> Boxed<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            sqlx::query("DELETE FROM members WHERE project_id = $1 AND address = $2")
                .bind(key.project_id)
                .bind(key.address)
                .execute(&self.pool)
                .await
                .map_err(db_err("Failed to delete member"))?;
            Ok(())
        })
    }

    fn get_task(&self, id: &str) -> Boxed<'_, Option<TaskRow>> {
        let id = id.to_string();
        Box::pin(async move {
            type TaskTuple = (
                String,
                String,
                String,
                String,
                String,
                i16,
                String,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
            );
            let row: Option<TaskTuple> = sqlx::query_as(
                "SELECT id, project_id, name, description, assignee, state, due_date,
                        created_at, updated_at
                 FROM tasks WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to get task"))?;

            row.map(
                |(
                    id,
                    project_id,
                    name,
                    description,
                    assignee,
                    state,
                    due_date,
                    created_at,
                    updated_at,
                )| {
                    Ok(TaskRow {
                        id,
                        project_id,
                        name,
                        description,
                        assignee,
                        state: decode_state(state)?,
                        due_date,
                        created_at,
                        updated_at,
                    })
                },
            )
            .transpose()
        })
    }

    fn upsert_task(&self, row: TaskRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO tasks (id, project_id, name, description, assignee, state,
                                    due_date, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (id) DO UPDATE
                 SET project_id = EXCLUDED.project_id,
                     name = EXCLUDED.name,
                     description = EXCLUDED.description,
                     assignee = EXCLUDED.assignee,
                     state = EXCLUDED.state,
                     due_date = EXCLUDED.due_date,
                     created_at = EXCLUDED.created_at,
                     updated_at = EXCLUDED.updated_at",
            )
            .bind(row.id)
            .bind(row.project_id)
            .bind(row.name)
            .bind(row.description)
            .bind(row.assignee)
            .bind(row.state.as_i16())
            .bind(row.due_date)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to upsert task"))?;
            Ok(())
        })
    }

    fn delete_task(&self, id: &str) -> Boxed<'_, ()> {
        let id = id.to_string();
        Box::pin(async move {
            sqlx::query("DELETE FROM tasks WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err("Failed to delete task"))?;
            Ok(())
        })
    }

    fn get_subtask(&self, key: &SubtaskKey) -> Boxed<'_, Option<SubtaskRow>> {
        let key = key.clone();
        Box::pin(async move {
            let row: Option<(String, String, String, String, i16)> = sqlx::query_as(
                "SELECT task_id, subtask_id, name, description, state
                 FROM subtasks WHERE task_id = $1 AND subtask_id = $2",
            )
            .bind(key.task_id)
            .bind(key.subtask_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to get subtask"))?;

            row.map(|(task_id, subtask_id, name, description, state)| {
                Ok(SubtaskRow {
                    task_id,
                    subtask_id,
                    name,
                    description,
                    state: decode_state(state)?,
                })
            })
            .transpose()
        })
    }

    fn upsert_subtask(&self, row: SubtaskRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO subtasks (task_id, subtask_id, name, description, state)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (task_id, subtask_id) DO UPDATE
                 SET name = EXCLUDED.name,
                     description = EXCLUDED.description,
                     state = EXCLUDED.state",
            )
            .bind(row.task_id)
            .bind(row.subtask_id)
            .bind(row.name)
            .bind(row.description)
            .bind(row.state.as_i16())
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to upsert subtask"))?;
            Ok(())
        })
    }

    fn delete_subtask(&self, key: &SubtaskKey) -> Boxed<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            sqlx::query("DELETE FROM subtasks WHERE task_id = $1 AND subtask_id = $2")
                .bind(key.task_id)
                .bind(key.subtask_id)
                .execute(&self.pool)
                .await
                .map_err(db_err("Failed to delete subtask"))?;
            Ok(())
        })
    }

    fn get_attachment(&self, key: &AttachmentKey) -> Boxed<'_, Option<AttachmentRow>> {
        let key = key.clone();
        Box::pin(async move {
            let row: Option<(String, String, String, String)> = sqlx::query_as(
                "SELECT task_id, attachment_id, name, url
                 FROM attachments WHERE task_id = $1 AND attachment_id = $2",
            )
            .bind(key.task_id)
            .bind(key.attachment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to get attachment"))?;

            Ok(row.map(|(task_id, attachment_id, name, url)| AttachmentRow {
                task_id,
                attachment_id,
                name,
                url,
            }))
        })
    }

    fn upsert_attachment(&self, row: AttachmentRow) -> Boxed<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO attachments (task_id, attachment_id, name, url)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (task_id, attachment_id) DO UPDATE
                 SET name = EXCLUDED.name,
                     url = EXCLUDED.url",
            )
            .bind(row.task_id)
            .bind(row.attachment_id)
            .bind(row.name)
            .bind(row.url)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to upsert attachment"))?;
            Ok(())
        })
    }

    fn delete_attachment(&self, key: &AttachmentKey) -> Boxed<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            sqlx::query("DELETE FROM attachments WHERE task_id = $1 AND attachment_id = $2")
                .bind(key.task_id)
                .bind(key.attachment_id)
                .execute(&self.pool)
                .await
                .map_err(db_err("Failed to delete attachment"))?;
            Ok(())
        })
    }

    fn counts(&self) -> Boxed<'_, StateCounts> {
        Box::pin(async move {
            let (projects, members, tasks, subtasks, attachments): (i64, i64, i64, i64, i64) =
                sqlx::query_as(
                    "SELECT (SELECT count(*) FROM projects),
                            (SELECT count(*) FROM members),
                            (SELECT count(*) FROM tasks),
                            (SELECT count(*) FROM subtasks),
                            (SELECT count(*) FROM attachments)",
                )
                .fetch_one(&self.pool)
                .await
                .map_err(db_err("Failed to count state rows"))?;

            #[allow(clippy::cast_sign_loss)] // count(*) is never negative
            Ok(StateCounts {
                projects: projects as u64,
                members: members as u64,
                tasks: tasks as u64,
                subtasks: subtasks as u64,
                attachments: attachments as u64,
            })
        })
    }
}
