//! Store ports.
//!
//! One trait per aggregate; `Store` is the umbrella bound services hold.
//! The SQLite adapter implements them all over one pool; tests may
//! substitute in-memory mocks per trait.

use async_trait::async_trait;

use crate::domain::errors::OrcResult;
use crate::domain::models::{
    Initiative, PhaseOutput, Plan, Task, TaskStatus, TriggerCounter, TriggerExecution, WorktreeRun,
};

/// Options for listing workflow runs.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<TaskStatus>,
    pub initiative_id: Option<String>,
    pub workflow: Option<String>,
    pub limit: Option<usize>,
}

/// Task persistence, including the execution claim columns.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create or fully replace a task row. Idempotent on equal input.
    async fn save_task(&self, task: &Task) -> OrcResult<()>;

    async fn load_task(&self, id: &str) -> OrcResult<Option<Task>>;

    async fn load_all_tasks(&self) -> OrcResult<Vec<Task>>;

    /// Fails with `NotFound` when the id is unknown.
    async fn delete_task(&self, id: &str) -> OrcResult<()>;

    async fn list_tasks(&self, filter: RunFilter) -> OrcResult<Vec<Task>>;

    /// Highest numeric suffix over existing task ids, for id assignment.
    async fn max_task_number(&self) -> OrcResult<u64>;

    /// Compare-and-swap claim write: atomically set the executor fields
    /// and status `running` iff the row still carries
    /// (`expected_pid`, `expected_host`). Returns false when the row was
    /// concurrently claimed (zero rows matched). This is the
    /// serialisation point for cross-process claim races.
    async fn claim_execution_cas(
        &self,
        task_id: &str,
        expected_pid: u32,
        expected_host: &str,
        new_pid: u32,
        new_host: &str,
    ) -> OrcResult<bool>;

    /// Unconditional claim overwrite for forced takeover.
    async fn claim_execution_force(
        &self,
        task_id: &str,
        new_pid: u32,
        new_host: &str,
    ) -> OrcResult<()>;

    /// Clear the claim iff it is held by (`pid`, `host`). Returns false
    /// on mismatch; the row is left untouched.
    async fn release_execution(&self, task_id: &str, pid: u32, host: &str) -> OrcResult<bool>;

    /// Persist the task row and its plan in one transaction.
    async fn save_task_with_plan(&self, task: &Task, plan: &Plan) -> OrcResult<()>;
}

/// Plan persistence.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn save_plan(&self, plan: &Plan) -> OrcResult<()>;
    async fn load_plan(&self, task_id: &str) -> OrcResult<Option<Plan>>;
    async fn delete_plan(&self, task_id: &str) -> OrcResult<()>;
}

/// Phase output persistence plus full-text search.
#[async_trait]
pub trait OutputStore: Send + Sync {
    async fn save_phase_output(&self, output: &PhaseOutput) -> OrcResult<()>;
    async fn load_phase_output(&self, task_id: &str, phase: &str)
        -> OrcResult<Option<PhaseOutput>>;
    async fn list_phase_outputs(&self, task_id: &str) -> OrcResult<Vec<PhaseOutput>>;
    async fn search_phase_outputs(&self, query: &str, limit: usize)
        -> OrcResult<Vec<PhaseOutput>>;
}

/// Automation runtime state: counters and execution history.
#[async_trait]
pub trait AutomationStore: Send + Sync {
    async fn get_trigger_counter(&self, trigger_id: &str) -> OrcResult<TriggerCounter>;

    /// Bump the rolling counter by `delta`; returns the updated row.
    async fn increment_trigger_counter(
        &self,
        trigger_id: &str,
        delta: u64,
    ) -> OrcResult<TriggerCounter>;

    /// Bump the completions-since-fire clause used by cooldowns.
    async fn bump_tasks_since_fire(&self, trigger_id: &str) -> OrcResult<()>;

    async fn reset_trigger_counter(&self, trigger_id: &str) -> OrcResult<()>;

    /// Record the previous metric sample for threshold edge detection.
    async fn set_trigger_last_value(&self, trigger_id: &str, value: f64) -> OrcResult<()>;

    /// Atomic fire: insert the generated task, the execution row, and
    /// advance the cooldown marker (and counter reset) in ONE
    /// transaction. If any part fails, no side effect is visible.
    async fn record_trigger_fire(
        &self,
        execution: &TriggerExecution,
        generated_task: &Task,
        reset_count: bool,
    ) -> OrcResult<()>;

    /// Record a dispatch attempt that produced no task (failures).
    async fn record_trigger_execution(&self, execution: &TriggerExecution) -> OrcResult<()>;

    async fn list_trigger_executions(
        &self,
        trigger_id: Option<&str>,
        limit: usize,
    ) -> OrcResult<Vec<TriggerExecution>>;

    async fn save_trigger_cooldown(
        &self,
        trigger_id: &str,
        until: chrono::DateTime<chrono::Utc>,
    ) -> OrcResult<()>;
}

/// Worktree run records.
#[async_trait]
pub trait WorktreeStore: Send + Sync {
    async fn save_worktree_run(&self, run: &WorktreeRun) -> OrcResult<()>;
    async fn load_worktree_run(&self, task_id: &str) -> OrcResult<Option<WorktreeRun>>;
    async fn list_worktree_runs(&self) -> OrcResult<Vec<WorktreeRun>>;
    async fn delete_worktree_run(&self, task_id: &str) -> OrcResult<()>;
}

/// Initiative persistence and atomic manifest materialisation.
#[async_trait]
pub trait InitiativeStore: Send + Sync {
    async fn save_initiative(&self, initiative: &Initiative) -> OrcResult<()>;
    async fn load_initiative(&self, id: &str) -> OrcResult<Option<Initiative>>;

    /// Materialise a manifest in one transaction: the initiative (when
    /// new), every task, and any seeded spec outputs. All-or-nothing.
    async fn create_initiative_tasks(
        &self,
        initiative: Option<&Initiative>,
        tasks: &[Task],
        outputs: &[PhaseOutput],
    ) -> OrcResult<()>;
}

/// Umbrella bound for services that need the whole store.
pub trait Store:
    TaskStore + PlanStore + OutputStore + AutomationStore + WorktreeStore + InitiativeStore
{
}

impl<T> Store for T where
    T: TaskStore + PlanStore + OutputStore + AutomationStore + WorktreeStore + InitiativeStore
{
}
