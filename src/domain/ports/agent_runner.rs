//! Agent runner port.
//!
//! The engine hands a prompt to an injected runner and gets back content
//! plus usage accounting. The transport is the adapter's business: the
//! shipped implementation forks the agent CLI, but an HTTP or in-process
//! runner satisfies the same contract. Accounting is derived solely from
//! the returned value; the core polls no telemetry channel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::OrcResult;
use crate::domain::models::AgentSessionInfo;

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub task_id: String,
    pub phase: String,
    pub prompt: String,
    /// Context variables the adapter may expose to the agent environment
    pub context: HashMap<String, String>,
    /// Directory the agent works in (the task's worktree)
    pub working_dir: PathBuf,
    /// Session to resume, if any
    pub session: Option<String>,
    /// None means unbounded; the engine owns timeout policy
    pub timeout: Option<Duration>,
}

/// Usage accounting returned by the runner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub total_cost_usd: f64,
}

/// The runner's result for one invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentResult {
    /// Full produced text, scanned for completion signals
    pub content: String,
    pub usage: UsageStats,
    pub session: AgentSessionInfo,
}

/// External collaborator that executes agent prompts.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Runner name for logging and display.
    fn name(&self) -> &'static str;

    /// Execute one prompt to completion. Returns when the agent is done
    /// or the request's timeout elapses. Cancellation is cooperative:
    /// the engine drops the future when interrupted.
    async fn run(&self, request: AgentRequest) -> OrcResult<AgentResult>;
}
