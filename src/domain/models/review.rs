//! Review findings model.
//!
//! The review phase alternates between finding (an agent produces
//! structured findings) and fixing (an implement-style pass addresses
//! them). Findings with severity at or above High force a loop-back.

use serde::{Deserialize, Serialize};

/// Severity of a single review finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// One issue raised by a review pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub detail: String,
    /// True when the finding violates the project constitution
    #[serde(default)]
    pub constitution_violation: bool,
}

/// A full round of review findings for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFindings {
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub summary: String,
}

impl ReviewFindings {
    /// Whether any finding forces another fix round.
    pub fn requires_fixes(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity >= Severity::High || f.constitution_violation)
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}
