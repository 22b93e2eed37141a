//! Task domain model.
//!
//! A task is one unit of directed AI work with its own branch and plan.
//! Tasks form a DAG through `blocked_by` edges.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::execution::ExecutionState;

/// Status of a task in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined but has no plan yet
    Created,
    /// Task has a plan and is ready to run
    Planned,
    /// Task is currently being executed by a claimed process
    Running,
    /// Task was deliberately put on hold by an operator
    Paused,
    /// Task is parked pending human action (gate, interrupt, blocker)
    Blocked,
    /// Task completed all phases successfully
    Completed,
    /// Task failed during execution
    Failed,
    /// A human marked the task done without executing it
    Resolved,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Planned => "planned",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Resolved => "resolved",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(Self::Created),
            "planned" => Some(Self::Planned),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "blocked" => Some(Self::Blocked),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Resolved)
    }

    /// Check if the task can be picked up by `run` / `resume`.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Planned | Self::Paused | Self::Blocked | Self::Failed
        )
    }

    /// Valid transitions from this status.
    ///
    /// `Resolved` is reachable from any non-terminal status through the
    /// resolve escape hatch, so it appears in every non-terminal row.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Created => &[Self::Planned, Self::Running, Self::Resolved],
            Self::Planned => &[Self::Running, Self::Paused, Self::Blocked, Self::Resolved],
            Self::Running => &[
                Self::Completed,
                Self::Failed,
                Self::Paused,
                Self::Blocked,
                Self::Resolved,
            ],
            Self::Paused => &[Self::Running, Self::Blocked, Self::Resolved],
            Self::Blocked => &[Self::Running, Self::Paused, Self::Resolved],
            Self::Failed => &[Self::Running, Self::Resolved],
            Self::Completed | Self::Resolved => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Rough size bucket that selects a default plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    Trivial,
    Small,
    Medium,
    Large,
    Greenfield,
}

impl Default for Weight {
    fn default() -> Self {
        Self::Medium
    }
}

impl Weight {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Greenfield => "greenfield",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trivial" => Some(Self::Trivial),
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            "greenfield" => Some(Self::Greenfield),
            _ => None,
        }
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Pull request metadata attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    #[serde(default)]
    pub merged: bool,
}

/// One unit of directed AI work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Human-readable identifier, e.g. `TASK-042` or `RM-TASK-042`
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub weight: Weight,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: TaskStatus,
    /// Workflow identifier; when set, the plan is derived from the
    /// workflow's phase catalogue instead of the weight.
    pub workflow: Option<String>,
    /// Name of the phase currently or most recently executed
    pub current_phase: Option<String>,
    /// Upstream dependency edges; must stay acyclic across the store
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub related_to: Vec<String>,
    pub initiative_id: Option<String>,
    /// Task branch inside worktrees; never a protected branch
    #[serde(default)]
    pub branch: String,
    /// Claiming process id; zero when unclaimed
    #[serde(default)]
    pub executor_pid: u32,
    /// Claiming hostname; empty when unclaimed
    #[serde(default)]
    pub executor_host: String,
    pub pr: Option<PullRequest>,
    #[serde(default)]
    pub execution: ExecutionState,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, weight: Weight) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            weight,
            category: String::new(),
            priority: TaskPriority::Normal,
            status: TaskStatus::Created,
            workflow: None,
            current_phase: None,
            blocked_by: Vec::new(),
            related_to: Vec::new(),
            initiative_id: None,
            branch: String::new(),
            executor_pid: 0,
            executor_host: String::new(),
            pr: None,
            execution: ExecutionState::default(),
            metadata: HashMap::new(),
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Validated status transition.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> OrcResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(OrcError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        match new_status {
            TaskStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            TaskStatus::Completed | TaskStatus::Resolved => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Whether a live claim is recorded on the row.
    pub fn is_claimed(&self) -> bool {
        self.executor_pid != 0
    }

    /// Clear the executor claim fields.
    pub fn clear_claim(&mut self) {
        self.executor_pid = 0;
        self.executor_host.clear();
        self.updated_at = Utc::now();
    }

    /// The branch this task's worktree lives on.
    pub fn branch_name(&self, branch_prefix: &str) -> String {
        if self.branch.is_empty() {
            format!("{}/{}", branch_prefix, self.id)
        } else {
            self.branch.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TaskStatus::Created,
            TaskStatus::Planned,
            TaskStatus::Running,
            TaskStatus::Paused,
            TaskStatus::Blocked,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Resolved,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Resolved.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_transition_validation() {
        let mut task = Task::new("TASK-001", "demo", Weight::Small);
        assert!(task.transition_to(TaskStatus::Planned).is_ok());
        assert!(task.transition_to(TaskStatus::Running).is_ok());
        assert!(task.started_at.is_some());
        assert!(task.transition_to(TaskStatus::Completed).is_ok());
        assert!(task.completed_at.is_some());

        // Terminal: no way out
        let err = task.transition_to(TaskStatus::Running).unwrap_err();
        assert!(matches!(err, OrcError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_resolve_reachable_from_any_nonterminal() {
        for status in [
            TaskStatus::Created,
            TaskStatus::Planned,
            TaskStatus::Running,
            TaskStatus::Paused,
            TaskStatus::Blocked,
            TaskStatus::Failed,
        ] {
            assert!(
                status.can_transition_to(TaskStatus::Resolved),
                "{status:?} should allow resolve"
            );
        }
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Resolved));
    }

    #[test]
    fn test_branch_name_defaults_from_prefix() {
        let task = Task::new("TASK-007", "demo", Weight::Trivial);
        assert_eq!(task.branch_name("orc"), "orc/TASK-007");

        let mut named = task.clone();
        named.branch = "orc/custom".to_string();
        assert_eq!(named.branch_name("orc"), "orc/custom");
    }
}
