//! Plan domain model.
//!
//! A plan is the ordered phase sequence for a task. In the modern path
//! plans are derived from the template catalogue and re-checked against
//! it on every load; persisted rows exist so completed work survives
//! template changes. Legacy rows may still carry inline prompts, which
//! mark them stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::execution::PhaseCompletionStatus;

/// Current plan format version. Stored rows below this are migrated on
/// first touch.
pub const PLAN_VERSION: i64 = 3;

/// Policy deciding whether a phase's completion needs additional review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Proceed without checks
    Auto,
    /// A secondary agent judges the phase output
    Ai,
    /// Park the task for a human decision
    Human,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::Auto
    }
}

impl GatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Ai => "ai",
            Self::Human => "human",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "ai" => Some(Self::Ai),
            "human" => Some(Self::Human),
            _ => None,
        }
    }
}

/// One step within a task's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPhase {
    /// Stable identifier, unique within the plan (e.g. `implement`)
    pub id: String,
    /// Human name shown in status output
    pub name: String,
    #[serde(default)]
    pub status: PhaseCompletionStatus,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub gate: GatePolicy,
    /// Commit recorded at completion
    pub commit: Option<String>,
    /// Legacy inline prompt; presence marks the plan stale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl PlanPhase {
    pub fn new(id: impl Into<String>, name: impl Into<String>, gate: GatePolicy) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: PhaseCompletionStatus::Pending,
            iterations: 0,
            gate,
            commit: None,
            prompt: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PhaseCompletionStatus::Completed
    }
}

/// The ordered phase sequence for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub task_id: String,
    pub version: i64,
    pub phases: Vec<PlanPhase>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(task_id: impl Into<String>, phases: Vec<PlanPhase>) -> Self {
        Self {
            task_id: task_id.into(),
            version: PLAN_VERSION,
            phases,
            updated_at: Utc::now(),
        }
    }

    /// Whether any phase carries a legacy inline prompt.
    pub fn has_inline_prompts(&self) -> bool {
        self.phases.iter().any(|p| p.prompt.is_some())
    }

    /// The ordered list of phase ids.
    pub fn phase_ids(&self) -> Vec<String> {
        self.phases.iter().map(|p| p.id.clone()).collect()
    }

    /// First phase that is neither completed nor skipped.
    pub fn first_incomplete(&self) -> Option<&PlanPhase> {
        self.phases
            .iter()
            .find(|p| p.status == PhaseCompletionStatus::Pending)
    }

    pub fn phase(&self, id: &str) -> Option<&PlanPhase> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn phase_mut(&mut self, id: &str) -> Option<&mut PlanPhase> {
        self.phases.iter_mut().find(|p| p.id == id)
    }

    pub fn is_complete(&self) -> bool {
        self.phases
            .iter()
            .all(|p| p.status != PhaseCompletionStatus::Pending)
    }

    /// Validate plan invariants: unique phase ids, completed phases carry
    /// a commit, and completed phases form a prefix modulo explicit skips.
    pub fn validate(&self) -> OrcResult<()> {
        let mut seen = std::collections::HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.id.as_str()) {
                return Err(OrcError::ValidationFailed(format!(
                    "duplicate phase id '{}' in plan for {}",
                    phase.id, self.task_id
                )));
            }
            if phase.is_completed() && phase.commit.as_deref().unwrap_or("").is_empty() {
                return Err(OrcError::ValidationFailed(format!(
                    "completed phase '{}' has no commit in plan for {}",
                    phase.id, self.task_id
                )));
            }
        }

        let mut pending_seen = false;
        for phase in &self.phases {
            match phase.status {
                PhaseCompletionStatus::Pending => pending_seen = true,
                PhaseCompletionStatus::Completed if pending_seen => {
                    return Err(OrcError::ValidationFailed(format!(
                        "completed phase '{}' follows a pending phase in plan for {}",
                        phase.id, self.task_id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
