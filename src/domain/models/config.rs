//! Configuration model.
//!
//! Merged from four layers, highest wins: runtime (ORC_* environment,
//! CLI flags) > personal (~/.orc, .orc/local) > shared (.orc/shared,
//! .orc/config.yaml) > these compiled-in defaults.

use serde::{Deserialize, Serialize};

use crate::domain::models::plan::GatePolicy;
use crate::domain::models::trigger::TriggerConfig;

/// Execution profile selecting a bundle of gate/retry defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Auto,
    Fast,
    Safe,
    Strict,
}

impl Default for Profile {
    fn default() -> Self {
        Self::Auto
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: Option<String>,
    pub profile: Profile,
    pub branch_prefix: BranchPrefix,
    pub commit_prefix: CommitPrefix,
    pub target_branch: TargetBranch,
    pub worktree: WorktreeConfig,
    pub automation: AutomationConfig,
    pub gates: GatesConfig,
    pub retry: RetryConfig,
    pub budget: BudgetConfig,
    pub identity: IdentityConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub agent: AgentConfig,
    pub team: TeamConfig,
    /// User-supplied additions to the compiled-in protected set
    pub protected_branches: Vec<String>,
    /// Named workflows: workflow id -> ordered phase ids. A task with a
    /// workflow set derives its plan from here instead of its weight.
    pub workflows: std::collections::HashMap<String, Vec<String>>,
}

impl Config {
    /// Apply the selected profile's gate posture. Explicit phase
    /// overrides always win; `auto` leaves everything as configured.
    pub fn apply_profile(&mut self) {
        match self.profile {
            Profile::Auto => {}
            Profile::Fast => {
                self.gates.default_type = GatePolicy::Auto;
            }
            Profile::Safe => {
                self.gates.default_type = GatePolicy::Ai;
            }
            Profile::Strict => {
                self.gates.default_type = GatePolicy::Ai;
                self.gates
                    .phase_overrides
                    .entry("review".to_string())
                    .or_insert(GatePolicy::Human);
            }
        }
    }
}

macro_rules! string_newtype {
    ($name:ident, $default:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl Default for $name {
            fn default() -> Self {
                Self($default.to_string())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(BranchPrefix, "orc");
string_newtype!(CommitPrefix, "orc");
string_newtype!(TargetBranch, "main");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    pub enabled: bool,
    /// Directory under the project root holding managed checkouts
    pub dir: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: ".orc/worktrees".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub enabled: bool,
    pub triggers: Vec<TriggerConfig>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            triggers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    pub default_type: GatePolicy,
    /// Phase id -> gate policy overrides
    pub phase_overrides: std::collections::HashMap<String, GatePolicy>,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            default_type: GatePolicy::Auto,
            phase_overrides: std::collections::HashMap::new(),
        }
    }
}

impl GatesConfig {
    /// Effective gate for a phase: override, else the phase's own
    /// template policy, else the configured default.
    pub fn effective(&self, phase_id: &str, template_gate: Option<GatePolicy>) -> GatePolicy {
        if let Some(gate) = self.phase_overrides.get(phase_id) {
            return *gate;
        }
        template_gate.unwrap_or(self.default_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Park the task when accumulated cost crosses this; zero disables
    pub threshold_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Initials prefixed to generated task ids (e.g. `RM-TASK-042`)
    pub initials: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".orc/orc.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Path to the agent CLI binary
    pub binary: String,
    pub model: String,
    pub max_turns: u32,
    /// Per-phase timeout in seconds; zero means unbounded
    pub timeout_secs: u64,
    /// Iteration cap per phase (gate loop-backs and review rounds)
    pub max_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: "sonnet".to_string(),
            max_turns: 25,
            timeout_secs: 0,
            max_iterations: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    /// Shared team-mode store; arms schedule triggers
    pub enabled: bool,
}
