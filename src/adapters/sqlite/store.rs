//! The SQLite-backed store.
//!
//! One `SqliteStore` over one pool implements every store port; the
//! per-aggregate trait impls live in sibling files. Multi-row operations
//! go through [`SqliteStore::transaction`]; single-row writes are single
//! statements and therefore atomic on their own.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{SqliteConnection, SqlitePool};

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::{PhaseOutput, Plan, Task, TriggerExecution};

tokio::task_local! {
    /// Set while a transaction closure runs on this task; used to refuse
    /// nested `transaction` calls.
    static IN_TX: ();
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Group arbitrary operations into one unit of work; rollback on any
    /// error. Re-entrant use from within a transaction closure fails with
    /// `NestedTx`.
    pub async fn transaction<T, F>(&self, f: F) -> OrcResult<T>
    where
        F: for<'t> FnOnce(
            &'t mut sqlx::Transaction<'static, sqlx::Sqlite>,
        ) -> BoxFuture<'t, OrcResult<T>>,
    {
        if IN_TX.try_with(|_| ()).is_ok() {
            return Err(OrcError::NestedTx);
        }

        let mut tx = self.pool.begin().await?;
        let result = IN_TX.scope((), f(&mut tx)).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }
}

fn parse_ts(s: &str) -> OrcResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrcError::SerializationError(format!("bad timestamp '{s}': {e}")))
}

pub(crate) fn parse_opt_ts(s: &Option<String>) -> OrcResult<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

pub(crate) fn required_ts(s: &str) -> OrcResult<DateTime<Utc>> {
    parse_ts(s)
}

/// Create-or-fully-replace a task row. Plain `INSERT OR REPLACE` would
/// delete-and-reinsert, cascading away the task's plan and outputs, so
/// this spells out the upsert.
pub(crate) async fn upsert_task(conn: &mut SqliteConnection, task: &Task) -> OrcResult<()> {
    let blocked_by = serde_json::to_string(&task.blocked_by)?;
    let related_to = serde_json::to_string(&task.related_to)?;
    let pr = task.pr.as_ref().map(serde_json::to_string).transpose()?;
    let execution = serde_json::to_string(&task.execution)?;
    let metadata = serde_json::to_string(&task.metadata)?;

    sqlx::query(
        r#"INSERT INTO tasks (id, title, description, weight, category, priority, status,
               workflow, current_phase, blocked_by, related_to, initiative_id, branch,
               executor_pid, executor_host, pr, execution, metadata,
               created_at, started_at, completed_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               description = excluded.description,
               weight = excluded.weight,
               category = excluded.category,
               priority = excluded.priority,
               status = excluded.status,
               workflow = excluded.workflow,
               current_phase = excluded.current_phase,
               blocked_by = excluded.blocked_by,
               related_to = excluded.related_to,
               initiative_id = excluded.initiative_id,
               branch = excluded.branch,
               executor_pid = excluded.executor_pid,
               executor_host = excluded.executor_host,
               pr = excluded.pr,
               execution = excluded.execution,
               metadata = excluded.metadata,
               started_at = excluded.started_at,
               completed_at = excluded.completed_at,
               updated_at = excluded.updated_at"#,
    )
    .bind(&task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.weight.as_str())
    .bind(&task.category)
    .bind(task.priority.as_str())
    .bind(task.status.as_str())
    .bind(&task.workflow)
    .bind(&task.current_phase)
    .bind(&blocked_by)
    .bind(&related_to)
    .bind(&task.initiative_id)
    .bind(&task.branch)
    .bind(i64::from(task.executor_pid))
    .bind(&task.executor_host)
    .bind(&pr)
    .bind(&execution)
    .bind(&metadata)
    .bind(task.created_at.to_rfc3339())
    .bind(task.started_at.map(|t| t.to_rfc3339()))
    .bind(task.completed_at.map(|t| t.to_rfc3339()))
    .bind(task.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub(crate) async fn upsert_plan(conn: &mut SqliteConnection, plan: &Plan) -> OrcResult<()> {
    let phases = serde_json::to_string(&plan.phases)?;
    sqlx::query(
        r#"INSERT INTO plans (task_id, version, phases, updated_at)
           VALUES (?, ?, ?, ?)
           ON CONFLICT(task_id) DO UPDATE SET
               version = excluded.version,
               phases = excluded.phases,
               updated_at = excluded.updated_at"#,
    )
    .bind(&plan.task_id)
    .bind(plan.version)
    .bind(&phases)
    .bind(plan.updated_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn upsert_output(
    conn: &mut SqliteConnection,
    output: &PhaseOutput,
) -> OrcResult<()> {
    sqlx::query(
        r#"INSERT INTO phase_outputs (task_id, phase, content, content_hash, source,
               created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(task_id, phase) DO UPDATE SET
               content = excluded.content,
               content_hash = excluded.content_hash,
               source = excluded.source,
               updated_at = excluded.updated_at"#,
    )
    .bind(&output.task_id)
    .bind(&output.phase)
    .bind(&output.content)
    .bind(&output.content_hash)
    .bind(output.source.as_str())
    .bind(output.created_at.to_rfc3339())
    .bind(output.updated_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_execution(
    conn: &mut SqliteConnection,
    execution: &TriggerExecution,
) -> OrcResult<()> {
    sqlx::query(
        r#"INSERT INTO trigger_executions (id, trigger_id, task_id, triggered_at, reason,
               status, completed_at, error)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(execution.id.to_string())
    .bind(&execution.trigger_id)
    .bind(&execution.task_id)
    .bind(execution.triggered_at.to_rfc3339())
    .bind(&execution.reason)
    .bind(execution.status.as_str())
    .bind(execution.completed_at.map(|t| t.to_rfc3339()))
    .bind(&execution.error)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations;

    async fn test_store() -> SqliteStore {
        let pool = create_test_pool().await.expect("test pool");
        migrations::apply_all(&pool).await.expect("migrations");
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn test_transaction_commits() {
        let store = test_store().await;
        let task = Task::new("TASK-001", "demo", crate::domain::models::Weight::Small);

        store
            .transaction(|tx| {
                let task = task.clone();
                Box::pin(async move { upsert_task(tx, &task).await })
            })
            .await
            .expect("transaction commits");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let store = test_store().await;
        let task = Task::new("TASK-001", "demo", crate::domain::models::Weight::Small);

        let result: OrcResult<()> = store
            .transaction(|tx| {
                let task = task.clone();
                Box::pin(async move {
                    upsert_task(tx, &task).await?;
                    Err(OrcError::ValidationFailed("boom".into()))
                })
            })
            .await;
        assert!(result.is_err());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0, "rollback must discard the insert");
    }

    #[tokio::test]
    async fn test_nested_transaction_refused() {
        let store = test_store().await;
        let inner = store.clone();

        let result: OrcResult<()> = store
            .transaction(|_tx| {
                let inner = inner.clone();
                Box::pin(async move {
                    inner
                        .transaction(|_tx2| Box::pin(async { Ok(()) }))
                        .await
                })
            })
            .await;

        assert!(matches!(result, Err(OrcError::NestedTx)));
    }
}
