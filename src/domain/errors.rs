//! Domain errors for the orc orchestration engine.

use thiserror::Error;

/// Domain-level errors that can occur while orchestrating tasks.
#[derive(Debug, Error)]
pub enum OrcError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Initiative not found: {0}")]
    InitiativeNotFound(String),

    #[error("Plan not found for task: {0}")]
    PlanNotFound(String),

    #[error("Phase output not found: {task_id}/{phase}")]
    PhaseOutputNotFound { task_id: String, phase: String },

    #[error("Task {task_id} is already claimed by pid {pid} on {host}")]
    AlreadyClaimed {
        task_id: String,
        pid: u32,
        host: String,
    },

    #[error("Stale plan for task {0}: migration required")]
    StalePlan(String),

    #[error("Plan migration failed for task {task_id}: {reason}")]
    MigrationFailed { task_id: String, reason: String },

    #[error("Worktree at {path} has uncommitted changes")]
    WorktreeUnclean { path: String },

    #[error("Refusing to push protected branch: {0}")]
    ProtectedBranch(String),

    #[error("Phase '{phase}' is gated for human review")]
    GateBlocked { phase: String },

    #[error("Agent run failed: {0}")]
    AgentError(String),

    #[error("Phase '{phase}' exceeded its iteration cap of {cap}")]
    IterationCapExceeded { phase: String, cap: u32 },

    #[error("Nested transactions are not supported")]
    NestedTx,

    #[error("Task dependency cycle detected involving: {0}")]
    DependencyCycle(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Run cancelled; state has been persisted")]
    Cancelled,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Git error: {0}")]
    GitError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type OrcResult<T> = Result<T, OrcError>;

impl From<sqlx::Error> for OrcError {
    fn from(err: sqlx::Error) -> Self {
        OrcError::StoreError(err.to_string())
    }
}

impl From<serde_json::Error> for OrcError {
    fn from(err: serde_json::Error) -> Self {
        OrcError::SerializationError(err.to_string())
    }
}
