//! Automation trigger domain model.
//!
//! Trigger definitions live in user config; the store only keeps their
//! runtime state (counters) and immutable execution history. A trigger
//! pairs a firing condition with an action that materialises a template
//! into a new task.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::task::Weight;

/// Comparison operator for threshold triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
}

impl CompareOp {
    pub fn holds(&self, value: f64, bound: f64) -> bool {
        match self {
            Self::Lt => value < bound,
            Self::Le => value <= bound,
            Self::Eq => (value - bound).abs() < f64::EPSILON,
            Self::Ge => value >= bound,
            Self::Gt => value > bound,
        }
    }
}

/// What a count trigger counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    TasksCompleted,
    PhasesCompleted,
}

impl Default for CounterKind {
    fn default() -> Self {
        Self::TasksCompleted
    }
}

/// Firing condition, one variant per trigger type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerType {
    /// Fire when a stored rolling counter reaches `threshold`.
    Count {
        #[serde(default)]
        counter: CounterKind,
        threshold: u64,
        /// Only completions in these categories count; empty means all
        #[serde(default)]
        categories: Vec<String>,
        /// Only completions with these weights count; empty means all
        #[serde(default)]
        weights: Vec<Weight>,
    },
    /// Fire on a named initiative-level event.
    Initiative { event: String },
    /// Fire on a named engine event (`task_completed`, `pr_merged`, ...).
    Event { name: String },
    /// Fire when a metric crosses the boundary. Fires on the transition,
    /// not on every evaluation while the predicate holds.
    Threshold {
        metric: String,
        op: CompareOp,
        value: f64,
    },
    /// Fire on a cron schedule. Armed only in team mode.
    Schedule { cron: String },
}

impl TriggerType {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Count { .. } => "count",
            Self::Initiative { .. } => "initiative",
            Self::Event { .. } => "event",
            Self::Threshold { .. } => "threshold",
            Self::Schedule { .. } => "schedule",
        }
    }
}

/// What happens when a trigger fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerAction {
    /// Task template identifier to materialise
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
}

/// Refractory window after a fire. Both clauses are AND-combined; both
/// default to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cooldown {
    /// Completed tasks required since the last fire
    #[serde(default)]
    pub tasks: u64,
    /// Wall-clock seconds required since the last fire
    #[serde(default)]
    pub duration_secs: u64,
}

impl Cooldown {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// A declarative automation rule, addressed by its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub id: String,
    #[serde(flatten)]
    pub trigger: TriggerType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub action: TriggerAction,
    #[serde(default)]
    pub cooldown: Cooldown,
    #[serde(default)]
    pub description: String,
}

fn default_enabled() -> bool {
    true
}

/// Per-trigger runtime state kept in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerCounter {
    pub trigger_id: String,
    pub count: u64,
    /// Completions observed since the last fire, for cooldown.tasks
    pub tasks_since_fire: u64,
    /// Previous metric sample, for threshold edge detection
    pub last_value: Option<f64>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_reset: Option<DateTime<Utc>>,
    pub last_fired: Option<DateTime<Utc>>,
}

impl TriggerCounter {
    pub fn new(trigger_id: impl Into<String>) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            ..Self::default()
        }
    }

    /// Whether the cooldown clauses allow another fire at `now`.
    pub fn cooldown_elapsed(&self, cooldown: &Cooldown, now: DateTime<Utc>) -> bool {
        if self.tasks_since_fire < cooldown.tasks {
            return false;
        }
        match self.last_fired {
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or_default();
                elapsed >= cooldown.duration()
            }
            None => true,
        }
    }
}

/// Status of one trigger execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerExecStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TriggerExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Immutable history row written for every fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerExecution {
    pub id: Uuid,
    pub trigger_id: String,
    /// Generated task, if dispatch got that far
    pub task_id: Option<String>,
    pub triggered_at: DateTime<Utc>,
    pub reason: String,
    pub status: TriggerExecStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TriggerExecution {
    pub fn fired(
        trigger_id: impl Into<String>,
        task_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_id: trigger_id.into(),
            task_id: Some(task_id.into()),
            triggered_at: Utc::now(),
            reason: reason.into(),
            status: TriggerExecStatus::Completed,
            completed_at: Some(Utc::now()),
            error: None,
        }
    }

    pub fn failed(
        trigger_id: impl Into<String>,
        reason: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_id: trigger_id.into(),
            task_id: None,
            triggered_at: Utc::now(),
            reason: reason.into(),
            status: TriggerExecStatus::Failed,
            completed_at: Some(Utc::now()),
            error: Some(error.into()),
        }
    }
}
