//! SQLite implementation of worktree run records.

use async_trait::async_trait;

use crate::adapters::sqlite::store::{required_ts, SqliteStore};
use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::{WorktreeRun, WorktreeState};
use crate::domain::ports::WorktreeStore;

#[derive(sqlx::FromRow)]
struct WorktreeRow {
    task_id: String,
    path: String,
    branch: String,
    head: String,
    state: String,
    created_at: String,
}

impl TryFrom<WorktreeRow> for WorktreeRun {
    type Error = OrcError;

    fn try_from(row: WorktreeRow) -> OrcResult<Self> {
        let state = WorktreeState::from_str(&row.state)
            .ok_or_else(|| OrcError::SerializationError(format!("bad state '{}'", row.state)))?;
        Ok(WorktreeRun {
            task_id: row.task_id,
            path: row.path,
            branch: row.branch,
            head: row.head,
            state,
            created_at: required_ts(&row.created_at)?,
        })
    }
}

#[async_trait]
impl WorktreeStore for SqliteStore {
    async fn save_worktree_run(&self, run: &WorktreeRun) -> OrcResult<()> {
        sqlx::query(
            r#"INSERT INTO worktree_runs (task_id, path, branch, head, state, created_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(task_id) DO UPDATE SET
                   path = excluded.path,
                   branch = excluded.branch,
                   head = excluded.head,
                   state = excluded.state"#,
        )
        .bind(&run.task_id)
        .bind(&run.path)
        .bind(&run.branch)
        .bind(&run.head)
        .bind(run.state.as_str())
        .bind(run.created_at.to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn load_worktree_run(&self, task_id: &str) -> OrcResult<Option<WorktreeRun>> {
        let row: Option<WorktreeRow> =
            sqlx::query_as("SELECT * FROM worktree_runs WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(self.pool())
                .await?;
        row.map(WorktreeRun::try_from).transpose()
    }

    async fn list_worktree_runs(&self) -> OrcResult<Vec<WorktreeRun>> {
        let rows: Vec<WorktreeRow> =
            sqlx::query_as("SELECT * FROM worktree_runs ORDER BY created_at")
                .fetch_all(self.pool())
                .await?;
        rows.into_iter().map(WorktreeRun::try_from).collect()
    }

    async fn delete_worktree_run(&self, task_id: &str) -> OrcResult<()> {
        sqlx::query("DELETE FROM worktree_runs WHERE task_id = ?")
            .bind(task_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::testing::memory_store;
    use crate::domain::models::{Task, Weight};
    use crate::domain::ports::TaskStore;

    #[tokio::test]
    async fn test_worktree_run_roundtrip() {
        let store = memory_store().await;
        store
            .save_task(&Task::new("TASK-001", "t", Weight::Small))
            .await
            .unwrap();

        let mut run = WorktreeRun::new("TASK-001", "/tmp/wt/orc-TASK-001", "orc/TASK-001");
        store.save_worktree_run(&run).await.unwrap();

        run.state = WorktreeState::Dirty;
        run.head = "abc123".into();
        store.save_worktree_run(&run).await.unwrap();

        let loaded = store
            .load_worktree_run("TASK-001")
            .await
            .unwrap()
            .expect("present");
        assert_eq!(loaded.state, WorktreeState::Dirty);
        assert_eq!(loaded.head, "abc123");
        assert_eq!(store.list_worktree_runs().await.unwrap().len(), 1);
    }
}
