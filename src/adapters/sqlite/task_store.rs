//! SQLite implementation of the task store, including the claim CAS.

use async_trait::async_trait;
use chrono::Utc;

use crate::adapters::sqlite::store::{
    parse_opt_ts, required_ts, upsert_plan, upsert_task, SqliteStore,
};
use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::{
    ExecutionState, Plan, PullRequest, Task, TaskPriority, TaskStatus, Weight,
};
use crate::domain::ports::{RunFilter, TaskStore};

#[derive(sqlx::FromRow)]
pub(crate) struct TaskRow {
    id: String,
    title: String,
    description: String,
    weight: String,
    category: String,
    priority: String,
    status: String,
    workflow: Option<String>,
    current_phase: Option<String>,
    blocked_by: String,
    related_to: String,
    initiative_id: Option<String>,
    branch: String,
    executor_pid: i64,
    executor_host: String,
    pr: Option<String>,
    execution: String,
    metadata: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = OrcError;

    fn try_from(row: TaskRow) -> OrcResult<Self> {
        let weight = Weight::from_str(&row.weight)
            .ok_or_else(|| OrcError::SerializationError(format!("bad weight '{}'", row.weight)))?;
        let priority = TaskPriority::from_str(&row.priority).ok_or_else(|| {
            OrcError::SerializationError(format!("bad priority '{}'", row.priority))
        })?;
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| OrcError::SerializationError(format!("bad status '{}'", row.status)))?;
        let pr: Option<PullRequest> = row
            .pr
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let execution: ExecutionState = serde_json::from_str(&row.execution)?;

        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            weight,
            category: row.category,
            priority,
            status,
            workflow: row.workflow,
            current_phase: row.current_phase,
            blocked_by: serde_json::from_str(&row.blocked_by)?,
            related_to: serde_json::from_str(&row.related_to)?,
            initiative_id: row.initiative_id,
            branch: row.branch,
            executor_pid: u32::try_from(row.executor_pid).unwrap_or(0),
            executor_host: row.executor_host,
            pr,
            execution,
            metadata: serde_json::from_str(&row.metadata)?,
            created_at: required_ts(&row.created_at)?,
            started_at: parse_opt_ts(&row.started_at)?,
            completed_at: parse_opt_ts(&row.completed_at)?,
            updated_at: required_ts(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn save_task(&self, task: &Task) -> OrcResult<()> {
        let mut conn = self.pool().acquire().await?;
        upsert_task(&mut conn, task).await
    }

    async fn load_task(&self, id: &str) -> OrcResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn load_all_tasks(&self) -> OrcResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks ORDER BY created_at")
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn delete_task(&self, id: &str) -> OrcResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(OrcError::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_tasks(&self, filter: RunFilter) -> OrcResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(initiative_id) = &filter.initiative_id {
            query.push_str(" AND initiative_id = ?");
            bindings.push(initiative_id.clone());
        }
        if let Some(workflow) = &filter.workflow {
            query.push_str(" AND workflow = ?");
            bindings.push(workflow.clone());
        }
        query.push_str(" ORDER BY created_at");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        let rows = q.fetch_all(self.pool()).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn max_task_number(&self) -> OrcResult<u64> {
        let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM tasks")
            .fetch_all(self.pool())
            .await?;
        Ok(ids
            .iter()
            .filter_map(|(id,)| id.rsplit('-').next())
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0))
    }

    async fn claim_execution_cas(
        &self,
        task_id: &str,
        expected_pid: u32,
        expected_host: &str,
        new_pid: u32,
        new_host: &str,
    ) -> OrcResult<bool> {
        let now = Utc::now().to_rfc3339();
        // The status guard keeps a terminal task from being revived by a
        // claim racing its completion.
        let result = sqlx::query(
            r#"UPDATE tasks SET executor_pid = ?, executor_host = ?, status = 'running',
                   started_at = COALESCE(started_at, ?), updated_at = ?
               WHERE id = ? AND executor_pid = ? AND executor_host = ?
                 AND status NOT IN ('completed', 'resolved')"#,
        )
        .bind(i64::from(new_pid))
        .bind(new_host)
        .bind(&now)
        .bind(&now)
        .bind(task_id)
        .bind(i64::from(expected_pid))
        .bind(expected_host)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_execution_force(
        &self,
        task_id: &str,
        new_pid: u32,
        new_host: &str,
    ) -> OrcResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"UPDATE tasks SET executor_pid = ?, executor_host = ?, status = 'running',
                   started_at = COALESCE(started_at, ?), updated_at = ?
               WHERE id = ?"#,
        )
        .bind(i64::from(new_pid))
        .bind(new_host)
        .bind(&now)
        .bind(&now)
        .bind(task_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrcError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    async fn release_execution(&self, task_id: &str, pid: u32, host: &str) -> OrcResult<bool> {
        // A task still `running` at release time had no terminal status
        // written; demote it so `running` always implies a live executor.
        let result = sqlx::query(
            r#"UPDATE tasks SET executor_pid = 0, executor_host = '',
                   status = CASE WHEN status = 'running' THEN 'planned' ELSE status END,
                   updated_at = ?
               WHERE id = ? AND executor_pid = ? AND executor_host = ?"#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(task_id)
        .bind(i64::from(pid))
        .bind(host)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_task_with_plan(&self, task: &Task, plan: &Plan) -> OrcResult<()> {
        let task = task.clone();
        let plan = plan.clone();
        self.transaction(move |tx| {
            Box::pin(async move {
                upsert_task(tx, &task).await?;
                upsert_plan(tx, &plan).await
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::testing::memory_store;

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = memory_store().await;
        let mut task = Task::new("TASK-001", "roundtrip", Weight::Medium);
        task.description = "desc".into();
        task.blocked_by = vec!["TASK-000".into()];
        task.metadata.insert("key".into(), "value".into());
        task.execution.begin_phase("spec");

        store
            .save_task(&Task::new("TASK-000", "dep", Weight::Trivial))
            .await
            .unwrap();
        store.save_task(&task).await.unwrap();

        let loaded = store.load_task("TASK-001").await.unwrap().expect("present");
        assert_eq!(loaded.id, task.id);
        assert_eq!(loaded.blocked_by, task.blocked_by);
        assert_eq!(loaded.metadata["key"], "value");
        assert_eq!(loaded.execution.phases["spec"].iterations, 1);

        // Save is idempotent on equal input
        store.save_task(&task).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 2);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = memory_store().await;
        let err = store.delete_task("TASK-404").await.unwrap_err();
        assert!(matches!(err, OrcError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_claim_cas_single_winner() {
        let store = memory_store().await;
        store
            .save_task(&Task::new("TASK-001", "contested", Weight::Small))
            .await
            .unwrap();

        let first = store
            .claim_execution_cas("TASK-001", 0, "", 100, "host-a")
            .await
            .unwrap();
        let second = store
            .claim_execution_cas("TASK-001", 0, "", 200, "host-a")
            .await
            .unwrap();

        assert!(first);
        assert!(!second, "second CAS must observe the first claim");

        let task = store.load_task("TASK-001").await.unwrap().unwrap();
        assert_eq!(task.executor_pid, 100);
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());
    }

    #[tokio::test]
    async fn test_release_requires_matching_claim() {
        let store = memory_store().await;
        store
            .save_task(&Task::new("TASK-001", "claimed", Weight::Small))
            .await
            .unwrap();
        store
            .claim_execution_cas("TASK-001", 0, "", 100, "host-a")
            .await
            .unwrap();

        assert!(!store.release_execution("TASK-001", 999, "host-a").await.unwrap());
        assert!(!store.release_execution("TASK-001", 100, "host-b").await.unwrap());
        assert!(store.release_execution("TASK-001", 100, "host-a").await.unwrap());

        let task = store.load_task("TASK-001").await.unwrap().unwrap();
        assert_eq!(task.executor_pid, 0);
        assert_eq!(task.executor_host, "");
    }

    #[tokio::test]
    async fn test_max_task_number_tolerates_prefixes() {
        let store = memory_store().await;
        store
            .save_task(&Task::new("TASK-3", "a", Weight::Trivial))
            .await
            .unwrap();
        store
            .save_task(&Task::new("RM-TASK-12", "b", Weight::Trivial))
            .await
            .unwrap();
        assert_eq!(store.max_task_number().await.unwrap(), 12);
    }
}
