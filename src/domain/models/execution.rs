//! Per-task execution state.
//!
//! `ExecutionState` is the durable sub-record on each task row holding
//! phase completion bookkeeping, token/cost accounting, and the agent
//! session descriptor. It is serialized as a JSON column so the schema
//! stays stable while the record evolves.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted completion status of a single phase.
///
/// Transient states (running, failed, interrupted) are never persisted
/// here; they are represented by the task-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseCompletionStatus {
    Pending,
    Completed,
    Skipped,
}

impl Default for PhaseCompletionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl PhaseCompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }
}

/// Completion record for one phase of a task's plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseCompletion {
    #[serde(default)]
    pub status: PhaseCompletionStatus,
    /// Commit recorded when the phase completed; empty while pending
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub iterations: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when an interrupt rolled the phase back to pending
    #[serde(default)]
    pub interrupted: bool,
}

/// Aggregate token counters for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cached: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, input: u64, output: u64, cached: u64) {
        self.input += input;
        self.output += output;
        self.cached += cached;
        self.total += input + output;
    }
}

/// Descriptor of the most recent agent session used by a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSessionInfo {
    pub id: String,
    pub model: String,
    pub turns: u32,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Durable execution bookkeeping for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Phase name -> completion record
    #[serde(default)]
    pub phases: HashMap<String, PhaseCompletion>,
    #[serde(default)]
    pub tokens: TokenUsage,
    /// Total accumulated cost in USD
    #[serde(default)]
    pub cost_usd: f64,
    /// Per-phase cost breakdown
    #[serde(default)]
    pub phase_costs: HashMap<String, f64>,
    pub session: Option<AgentSessionInfo>,
    /// Monotonic review round counter
    #[serde(default)]
    pub review_round: u32,
    /// Set by the signal coordinator; polled by the engine between phases
    #[serde(default)]
    pub interrupted: bool,
    /// Error context from the most recent failure, fed back as retry context
    pub last_error: Option<String>,
}

impl ExecutionState {
    /// Record usage from one agent invocation against a phase.
    pub fn record_usage(
        &mut self,
        phase: &str,
        input: u64,
        output: u64,
        cached: u64,
        cost_usd: f64,
        session: AgentSessionInfo,
    ) {
        self.tokens.accumulate(input, output, cached);
        self.cost_usd += cost_usd;
        *self.phase_costs.entry(phase.to_string()).or_insert(0.0) += cost_usd;
        self.session = Some(session);
    }

    /// Mark the start of a phase attempt, bumping its iteration counter.
    pub fn begin_phase(&mut self, phase: &str) -> u32 {
        let record = self.phases.entry(phase.to_string()).or_default();
        if record.started_at.is_none() {
            record.started_at = Some(Utc::now());
        }
        record.iterations += 1;
        record.interrupted = false;
        record.iterations
    }

    /// Mark a phase completed with its commit.
    pub fn complete_phase(&mut self, phase: &str, commit: impl Into<String>) {
        let record = self.phases.entry(phase.to_string()).or_default();
        record.status = PhaseCompletionStatus::Completed;
        record.commit = commit.into();
        record.completed_at = Some(Utc::now());
        record.interrupted = false;
    }

    /// Roll a phase back to pending after an interrupt.
    pub fn interrupt_phase(&mut self, phase: &str) {
        let record = self.phases.entry(phase.to_string()).or_default();
        record.status = PhaseCompletionStatus::Pending;
        record.interrupted = true;
    }

    /// Drop completion records for `phase` and everything after it in
    /// `order`, so a `--from-phase` resume re-executes them.
    pub fn reset_from(&mut self, phase: &str, order: &[String]) {
        let Some(start) = order.iter().position(|p| p == phase) else {
            return;
        };
        for name in &order[start..] {
            self.phases.remove(name);
        }
    }

    pub fn phase_completed(&self, phase: &str) -> bool {
        self.phases
            .get(phase)
            .map(|r| r.status == PhaseCompletionStatus::Completed)
            .unwrap_or(false)
    }
}
