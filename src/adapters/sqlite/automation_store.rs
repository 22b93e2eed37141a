//! SQLite implementation of the automation runtime state.
//!
//! The at-most-once guarantee lives here: a trigger fire writes the
//! generated task, the execution row, and the cooldown/counter update in
//! one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::adapters::sqlite::store::{insert_execution, parse_opt_ts, upsert_task, SqliteStore};
use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::{Task, TriggerCounter, TriggerExecStatus, TriggerExecution};
use crate::domain::ports::AutomationStore;

#[derive(sqlx::FromRow)]
struct CounterRow {
    trigger_id: String,
    count: i64,
    tasks_since_fire: i64,
    last_value: Option<f64>,
    cooldown_until: Option<String>,
    last_reset: Option<String>,
    last_fired: Option<String>,
}

impl TryFrom<CounterRow> for TriggerCounter {
    type Error = OrcError;

    fn try_from(row: CounterRow) -> OrcResult<Self> {
        Ok(TriggerCounter {
            trigger_id: row.trigger_id,
            count: u64::try_from(row.count).unwrap_or(0),
            tasks_since_fire: u64::try_from(row.tasks_since_fire).unwrap_or(0),
            last_value: row.last_value,
            cooldown_until: parse_opt_ts(&row.cooldown_until)?,
            last_reset: parse_opt_ts(&row.last_reset)?,
            last_fired: parse_opt_ts(&row.last_fired)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    trigger_id: String,
    task_id: Option<String>,
    triggered_at: String,
    reason: String,
    status: String,
    completed_at: Option<String>,
    error: Option<String>,
}

impl TryFrom<ExecutionRow> for TriggerExecution {
    type Error = OrcError;

    fn try_from(row: ExecutionRow) -> OrcResult<Self> {
        let status = TriggerExecStatus::from_str(&row.status)
            .ok_or_else(|| OrcError::SerializationError(format!("bad status '{}'", row.status)))?;
        Ok(TriggerExecution {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| OrcError::SerializationError(e.to_string()))?,
            trigger_id: row.trigger_id,
            task_id: row.task_id,
            triggered_at: crate::adapters::sqlite::store::required_ts(&row.triggered_at)?,
            reason: row.reason,
            status,
            completed_at: parse_opt_ts(&row.completed_at)?,
            error: row.error,
        })
    }
}

#[async_trait]
impl AutomationStore for SqliteStore {
    async fn get_trigger_counter(&self, trigger_id: &str) -> OrcResult<TriggerCounter> {
        let row: Option<CounterRow> =
            sqlx::query_as("SELECT * FROM trigger_counters WHERE trigger_id = ?")
                .bind(trigger_id)
                .fetch_optional(self.pool())
                .await?;
        match row {
            Some(r) => r.try_into(),
            None => Ok(TriggerCounter::new(trigger_id)),
        }
    }

    async fn increment_trigger_counter(
        &self,
        trigger_id: &str,
        delta: u64,
    ) -> OrcResult<TriggerCounter> {
        sqlx::query(
            r#"INSERT INTO trigger_counters (trigger_id, count)
               VALUES (?, ?)
               ON CONFLICT(trigger_id) DO UPDATE SET count = count + excluded.count"#,
        )
        .bind(trigger_id)
        .bind(delta as i64)
        .execute(self.pool())
        .await?;
        self.get_trigger_counter(trigger_id).await
    }

    async fn bump_tasks_since_fire(&self, trigger_id: &str) -> OrcResult<()> {
        sqlx::query(
            r#"INSERT INTO trigger_counters (trigger_id, tasks_since_fire)
               VALUES (?, 1)
               ON CONFLICT(trigger_id) DO UPDATE SET tasks_since_fire = tasks_since_fire + 1"#,
        )
        .bind(trigger_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn reset_trigger_counter(&self, trigger_id: &str) -> OrcResult<()> {
        sqlx::query(
            r#"INSERT INTO trigger_counters (trigger_id, count, last_reset)
               VALUES (?, 0, ?)
               ON CONFLICT(trigger_id) DO UPDATE SET count = 0, last_reset = excluded.last_reset"#,
        )
        .bind(trigger_id)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn set_trigger_last_value(&self, trigger_id: &str, value: f64) -> OrcResult<()> {
        sqlx::query(
            r#"INSERT INTO trigger_counters (trigger_id, last_value)
               VALUES (?, ?)
               ON CONFLICT(trigger_id) DO UPDATE SET last_value = excluded.last_value"#,
        )
        .bind(trigger_id)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn record_trigger_fire(
        &self,
        execution: &TriggerExecution,
        generated_task: &Task,
        reset_count: bool,
    ) -> OrcResult<()> {
        let execution = execution.clone();
        let task = generated_task.clone();
        self.transaction(move |tx| {
            Box::pin(async move {
                upsert_task(tx, &task).await?;
                insert_execution(tx, &execution).await?;

                let now = Utc::now().to_rfc3339();
                if reset_count {
                    sqlx::query(
                        r#"INSERT INTO trigger_counters (trigger_id, count, tasks_since_fire, last_fired)
                           VALUES (?, 0, 0, ?)
                           ON CONFLICT(trigger_id) DO UPDATE SET
                               count = 0, tasks_since_fire = 0, last_fired = excluded.last_fired"#,
                    )
                    .bind(&execution.trigger_id)
                    .bind(&now)
                    .execute(&mut **tx)
                    .await?;
                } else {
                    sqlx::query(
                        r#"INSERT INTO trigger_counters (trigger_id, tasks_since_fire, last_fired)
                           VALUES (?, 0, ?)
                           ON CONFLICT(trigger_id) DO UPDATE SET
                               tasks_since_fire = 0, last_fired = excluded.last_fired"#,
                    )
                    .bind(&execution.trigger_id)
                    .bind(&now)
                    .execute(&mut **tx)
                    .await?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn record_trigger_execution(&self, execution: &TriggerExecution) -> OrcResult<()> {
        let mut conn = self.pool().acquire().await?;
        insert_execution(&mut conn, execution).await
    }

    async fn list_trigger_executions(
        &self,
        trigger_id: Option<&str>,
        limit: usize,
    ) -> OrcResult<Vec<TriggerExecution>> {
        let rows: Vec<ExecutionRow> = match trigger_id {
            Some(id) => {
                sqlx::query_as(
                    r#"SELECT * FROM trigger_executions WHERE trigger_id = ?
                       ORDER BY triggered_at DESC LIMIT ?"#,
                )
                .bind(id)
                .bind(limit as i64)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM trigger_executions ORDER BY triggered_at DESC LIMIT ?",
                )
                .bind(limit as i64)
                .fetch_all(self.pool())
                .await?
            }
        };
        rows.into_iter().map(TriggerExecution::try_from).collect()
    }

    async fn save_trigger_cooldown(
        &self,
        trigger_id: &str,
        until: DateTime<Utc>,
    ) -> OrcResult<()> {
        sqlx::query(
            r#"INSERT INTO trigger_counters (trigger_id, cooldown_until)
               VALUES (?, ?)
               ON CONFLICT(trigger_id) DO UPDATE SET cooldown_until = excluded.cooldown_until"#,
        )
        .bind(trigger_id)
        .bind(until.to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
