//! The workflow engine: drives one task through its plan.
//!
//! The run loop claims the task, resolves (and migrates) its plan,
//! provisions a worktree, then executes phases in order: prompt build,
//! agent run, completion-signal parse, usage accounting, commit, gate
//! check, atomic persistence, interrupt poll. Terminal status is written
//! before the claim is released; trigger evaluation runs after release.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::{
    OutputSource, PhaseCompletionStatus, PhaseOutput, Plan, ReviewFindings, Task, TaskStatus,
    WorktreeRun,
};
use crate::domain::ports::{AgentRequest, AgentResult, AgentRunner, RunFilter, Store, Worktrees};
use crate::services::automation::{AutomationEvent, TriggerRuntime};
use crate::services::claim::ClaimService;
use crate::services::gates::{GateCheck, GateKeeper, GateOutcome};
use crate::services::interrupt::InterruptController;
use crate::services::plan::PlanResolver;
use crate::services::prompts::{PromptBuilder, PromptContext};
use crate::services::review::parse_findings;
use crate::services::signals::{parse_completion, PhaseSignal};

/// Engine knobs, resolved from config at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub branch_prefix: String,
    pub commit_prefix: String,
    pub target_branch: String,
    pub worktree_enabled: bool,
    /// Per-phase iteration cap (gate loop-backs, review rounds)
    pub max_iterations: u32,
    pub retry_enabled: bool,
    pub max_attempts: u32,
    /// Park the task when accumulated cost crosses this; zero disables
    pub budget_threshold_usd: f64,
    /// Per-phase agent timeout; zero means unbounded
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            branch_prefix: "orc".into(),
            commit_prefix: "orc".into(),
            target_branch: "main".into(),
            worktree_enabled: true,
            max_iterations: 3,
            retry_enabled: true,
            max_attempts: 3,
            budget_threshold_usd: 0.0,
            timeout_secs: 0,
        }
    }
}

/// Options for one `run` / `resume` invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Force claim takeover
    pub force: bool,
    /// Resume from this phase; it and everything after reset to pending
    pub from_phase: Option<String>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Parked for human action, with the reason
    Blocked(String),
    /// Already terminal; nothing to do
    NoOp,
}

/// Phases that are expected to change the tree. The others produce
/// artefact text and may legitimately commit nothing.
fn phase_expects_commit(phase_id: &str) -> bool {
    matches!(phase_id, "implement" | "tdd_write" | "docs" | "validate")
}

/// Phases whose agent output is kept as a durable artefact.
fn phase_produces_output(phase_id: &str) -> bool {
    matches!(phase_id, "tiny_spec" | "spec" | "research" | "breakdown")
}

#[derive(Debug)]
enum PhaseOutcome {
    Completed,
    Interrupted,
    AgentBlocked(String),
    GateBlocked,
    BudgetExceeded,
}

pub struct WorkflowEngine<S> {
    store: Arc<S>,
    claims: ClaimService<S>,
    resolver: PlanResolver,
    worktrees: Arc<dyn Worktrees>,
    runner: Arc<dyn AgentRunner>,
    gatekeeper: GateKeeper,
    prompts: PromptBuilder,
    automation: TriggerRuntime<S>,
    interrupts: Arc<InterruptController>,
    config: EngineConfig,
}

impl<S: Store + 'static> WorkflowEngine<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        claims: ClaimService<S>,
        resolver: PlanResolver,
        worktrees: Arc<dyn Worktrees>,
        runner: Arc<dyn AgentRunner>,
        prompts: PromptBuilder,
        automation: TriggerRuntime<S>,
        interrupts: Arc<InterruptController>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            claims,
            resolver,
            worktrees,
            gatekeeper: GateKeeper::new(runner.clone()),
            runner,
            prompts,
            automation,
            interrupts,
            config,
        }
    }

    /// Run a task to completion, a gate, or failure. The claim is
    /// released on every exit path; trigger hooks fire after release.
    pub async fn run(&self, task_id: &str, opts: RunOptions) -> OrcResult<RunOutcome> {
        let existing = self
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| OrcError::TaskNotFound(task_id.to_string()))?;
        if existing.status.is_terminal() {
            info!(
                task_id,
                status = existing.status.as_str(),
                "Task is terminal; nothing to run"
            );
            return Ok(RunOutcome::NoOp);
        }

        let task = self.claims.try_claim(task_id, opts.force).await?;

        match self.run_claimed(task, &opts).await {
            Ok(outcome) => {
                self.claims.release(task_id).await?;
                if outcome == RunOutcome::Completed {
                    self.post_completion_hooks(task_id).await;
                }
                Ok(outcome)
            }
            Err(err) => {
                self.record_failure(task_id, &err).await;
                self.claims.release(task_id).await.ok();
                Err(err)
            }
        }
    }

    async fn run_claimed(&self, mut task: Task, opts: &RunOptions) -> OrcResult<RunOutcome> {
        // Incomplete upstream dependencies park the task instead of running
        let unresolved = self.unresolved_blockers(&task).await?;
        if !unresolved.is_empty() {
            let reason = format!("blocked by incomplete tasks: {}", unresolved.join(", "));
            return self.park(&mut task, None, &reason).await;
        }

        // Resolve the plan, migrating a stale one eagerly
        let stored = self.store.load_plan(&task.id).await?;
        let (mut plan, changed) = self.resolver.resolve(&task, stored)?;
        if changed {
            self.store.save_task_with_plan(&task, &plan).await?;
        }

        // --from-phase resume: that phase and everything after it resets
        if let Some(from_phase) = &opts.from_phase {
            self.reset_from_phase(&mut task, &mut plan, from_phase)?;
            self.store.save_task_with_plan(&task, &plan).await?;
        }

        let worktree = self.provision_worktree(&task).await?;

        for index in 0..plan.phases.len() {
            if plan.phases[index].status != PhaseCompletionStatus::Pending {
                continue;
            }
            let phase_id = plan.phases[index].id.clone();

            if self.interrupts.interrupted() {
                return self.park_interrupted(&mut task, &mut plan, &phase_id).await;
            }

            let outcome = self
                .execute_phase(&mut task, &mut plan, index, &worktree)
                .await?;
            match outcome {
                PhaseOutcome::Completed => {}
                PhaseOutcome::Interrupted => {
                    return self.park_interrupted(&mut task, &mut plan, &phase_id).await;
                }
                PhaseOutcome::AgentBlocked(reason) => {
                    return self.park(&mut task, Some(&plan), &reason).await;
                }
                PhaseOutcome::GateBlocked => {
                    let reason = format!("phase '{phase_id}' gated for human review");
                    return self.park(&mut task, Some(&plan), &reason).await;
                }
                PhaseOutcome::BudgetExceeded => {
                    let reason = format!(
                        "budget threshold ${:.2} exceeded (spent ${:.2})",
                        self.config.budget_threshold_usd, task.execution.cost_usd
                    );
                    return self.park(&mut task, Some(&plan), &reason).await;
                }
            }
        }

        task.current_phase = None;
        task.transition_to(TaskStatus::Completed)?;
        self.store.save_task_with_plan(&task, &plan).await?;
        info!(task_id = %task.id, cost_usd = task.execution.cost_usd, "Task completed");
        Ok(RunOutcome::Completed)
    }

    async fn execute_phase(
        &self,
        task: &mut Task,
        plan: &mut Plan,
        index: usize,
        worktree: &Path,
    ) -> OrcResult<PhaseOutcome> {
        let phase_id = plan.phases[index].id.clone();
        if phase_id == "review" {
            return self.execute_review(task, plan, index, worktree).await;
        }

        let gate = plan.phases[index].gate;
        let branch = task.branch_name(&self.config.branch_prefix);
        let mut retry_context: Option<String> = None;
        let mut agent_errors = 0u32;

        loop {
            let iteration = task.execution.begin_phase(&phase_id);
            if iteration > self.config.max_iterations {
                return Err(OrcError::IterationCapExceeded {
                    phase: phase_id.clone(),
                    cap: self.config.max_iterations,
                });
            }
            plan.phases[index].iterations = iteration;
            task.current_phase = Some(phase_id.clone());
            self.store.save_task_with_plan(task, plan).await?;

            let previous = self.previous_outputs(&task.id).await?;
            let request = self.phase_request(
                task,
                &phase_id,
                iteration,
                retry_context.as_deref(),
                worktree,
                &branch,
                &previous,
            );

            let result = match self.run_agent(request).await {
                Ok(result) => result,
                Err(OrcError::Cancelled) => return Ok(PhaseOutcome::Interrupted),
                Err(OrcError::AgentError(message)) => {
                    agent_errors += 1;
                    if !self.config.retry_enabled || agent_errors >= self.config.max_attempts {
                        return Err(OrcError::AgentError(message));
                    }
                    warn!(
                        task_id = %task.id,
                        phase = %phase_id,
                        attempt = agent_errors,
                        "Agent error; retrying with context"
                    );
                    retry_context = Some(message);
                    continue;
                }
                Err(other) => return Err(other),
            };

            self.record_usage(task, &phase_id, &result);

            match parse_completion(&result.content) {
                PhaseSignal::Blocked(reason) => {
                    self.store.save_task_with_plan(task, plan).await?;
                    return Ok(PhaseOutcome::AgentBlocked(format!(
                        "phase '{phase_id}' blocked: {reason}"
                    )));
                }
                PhaseSignal::None => {
                    self.store.save_task_with_plan(task, plan).await?;
                    retry_context =
                        Some("previous attempt ended without a completion signal".into());
                    continue;
                }
                PhaseSignal::Complete => {}
            }

            // Commit the phase's work; artefact phases may change nothing
            let message = format!("{}({}): {}", self.config.commit_prefix, task.id, phase_id);
            let commit = match self.worktrees.commit_all(worktree, &message).await? {
                Some(hash) => hash,
                None if phase_expects_commit(&phase_id) => {
                    self.store.save_task_with_plan(task, plan).await?;
                    retry_context = Some(format!(
                        "phase '{phase_id}' declared completion but produced no changes"
                    ));
                    continue;
                }
                None => self.worktrees.head(worktree).await?,
            };

            if phase_produces_output(&phase_id) {
                let output = PhaseOutput::new(
                    &task.id,
                    &phase_id,
                    result.content.trim(),
                    OutputSource::Agent,
                );
                self.store.save_phase_output(&output).await?;
            }

            // Gate check; the judge run's usage counts against the task
            let check = self
                .gate_check(task, gate, &phase_id, iteration, worktree, &branch, &previous, &result.content)
                .await?;
            if let Some(judge) = &check.judge {
                self.record_usage(task, &format!("{phase_id}:gate"), judge);
            }

            match check.outcome {
                GateOutcome::LoopBack(findings) => {
                    let summary: Vec<String> = findings
                        .findings
                        .iter()
                        .map(|f| format!("[{}] {}: {}", f.severity.as_str(), f.title, f.detail))
                        .collect();
                    retry_context = Some(format!(
                        "the gate review rejected the previous attempt:\n{}",
                        summary.join("\n")
                    ));
                    self.store.save_task_with_plan(task, plan).await?;
                    continue;
                }
                GateOutcome::Blocked => {
                    // The phase's work is committed; the gate parks the
                    // task before the next phase starts.
                    self.complete_phase(task, plan, index, &commit).await?;
                    return Ok(PhaseOutcome::GateBlocked);
                }
                GateOutcome::Proceed => {}
            }

            self.complete_phase(task, plan, index, &commit).await?;

            if self.budget_exceeded(task) {
                return Ok(PhaseOutcome::BudgetExceeded);
            }
            return Ok(PhaseOutcome::Completed);
        }
    }

    /// The review phase alternates between finding and fixing until a
    /// round comes back clean or the iteration cap is hit.
    async fn execute_review(
        &self,
        task: &mut Task,
        plan: &mut Plan,
        index: usize,
        worktree: &Path,
    ) -> OrcResult<PhaseOutcome> {
        let phase_id = plan.phases[index].id.clone();
        let branch = task.branch_name(&self.config.branch_prefix);

        loop {
            let iteration = task.execution.begin_phase(&phase_id);
            if iteration > self.config.max_iterations {
                return Err(OrcError::IterationCapExceeded {
                    phase: phase_id.clone(),
                    cap: self.config.max_iterations,
                });
            }
            plan.phases[index].iterations = iteration;
            task.current_phase = Some(phase_id.clone());
            task.execution.review_round += 1;
            let round = task.execution.review_round;
            self.store.save_task_with_plan(task, plan).await?;

            // Finding half
            let previous = self.previous_outputs(&task.id).await?;
            let request = {
                let ctx = PromptContext {
                    task,
                    iteration,
                    retry_context: None,
                    worktree,
                    branch: &branch,
                    target_branch: &self.config.target_branch,
                    previous_outputs: &previous,
                };
                AgentRequest {
                    task_id: task.id.clone(),
                    phase: format!("{phase_id}:find"),
                    prompt: self.prompts.review_prompt(&ctx, round),
                    context: self.prompts.context_vars(&phase_id, &ctx),
                    working_dir: worktree.to_path_buf(),
                    session: None,
                    timeout: self.timeout(),
                }
            };
            let result = match self.run_agent(request).await {
                Ok(result) => result,
                Err(OrcError::Cancelled) => return Ok(PhaseOutcome::Interrupted),
                Err(other) => return Err(other),
            };
            self.record_usage(task, &phase_id, &result);

            let findings = parse_findings(&result.content, round);

            // Findings persistence precedes any further transition
            let output = PhaseOutput::new(
                &task.id,
                &phase_id,
                serde_json::to_string_pretty(&findings)?,
                OutputSource::Agent,
            );
            self.store.save_phase_output(&output).await?;
            self.store.save_task_with_plan(task, plan).await?;

            if !findings.requires_fixes() {
                let message = format!(
                    "{}({}): review round {round}",
                    self.config.commit_prefix, task.id
                );
                let commit = match self.worktrees.commit_all(worktree, &message).await? {
                    Some(hash) => hash,
                    None => self.worktrees.head(worktree).await?,
                };
                self.complete_phase(task, plan, index, &commit).await?;
                if self.budget_exceeded(task) {
                    return Ok(PhaseOutcome::BudgetExceeded);
                }
                return Ok(PhaseOutcome::Completed);
            }

            info!(
                task_id = %task.id,
                round,
                findings = findings.findings.len(),
                "Review found blocking issues; running fix pass"
            );

            match self
                .run_review_fix(task, plan, &phase_id, iteration, worktree, &branch, &findings, round)
                .await?
            {
                Some(outcome) => return Ok(outcome),
                None => {} // loop back to a fresh finding round
            }
        }
    }

    /// The fixing half of one review round. Returns Some(outcome) when
    /// the round ends the phase, None to loop back into finding.
    #[allow(clippy::too_many_arguments)]
    async fn run_review_fix(
        &self,
        task: &mut Task,
        plan: &mut Plan,
        phase_id: &str,
        iteration: u32,
        worktree: &Path,
        branch: &str,
        findings: &ReviewFindings,
        round: u32,
    ) -> OrcResult<Option<PhaseOutcome>> {
        let previous = self.previous_outputs(&task.id).await?;
        let request = {
            let ctx = PromptContext {
                task,
                iteration,
                retry_context: None,
                worktree,
                branch,
                target_branch: &self.config.target_branch,
                previous_outputs: &previous,
            };
            AgentRequest {
                task_id: task.id.clone(),
                phase: format!("{phase_id}:fix"),
                prompt: self.prompts.fix_prompt(&ctx, findings),
                context: self.prompts.context_vars(phase_id, &ctx),
                working_dir: worktree.to_path_buf(),
                session: None,
                timeout: self.timeout(),
            }
        };
        let result = match self.run_agent(request).await {
            Ok(result) => result,
            Err(OrcError::Cancelled) => return Ok(Some(PhaseOutcome::Interrupted)),
            Err(other) => return Err(other),
        };
        self.record_usage(task, phase_id, &result);

        if let PhaseSignal::Blocked(reason) = parse_completion(&result.content) {
            self.store.save_task_with_plan(task, plan).await?;
            return Ok(Some(PhaseOutcome::AgentBlocked(format!(
                "review fix blocked: {reason}"
            ))));
        }

        let message = format!(
            "{}({}): review fixes round {round}",
            self.config.commit_prefix, task.id
        );
        self.worktrees.commit_all(worktree, &message).await?;
        self.store.save_task_with_plan(task, plan).await?;

        if self.interrupts.interrupted() {
            return Ok(Some(PhaseOutcome::Interrupted));
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn phase_request(
        &self,
        task: &Task,
        phase_id: &str,
        iteration: u32,
        retry_context: Option<&str>,
        worktree: &Path,
        branch: &str,
        previous: &[(String, String)],
    ) -> AgentRequest {
        let ctx = PromptContext {
            task,
            iteration,
            retry_context,
            worktree,
            branch,
            target_branch: &self.config.target_branch,
            previous_outputs: previous,
        };
        AgentRequest {
            task_id: task.id.clone(),
            phase: phase_id.to_string(),
            prompt: self.prompts.phase_prompt(phase_id, &ctx),
            context: self.prompts.context_vars(phase_id, &ctx),
            working_dir: worktree.to_path_buf(),
            session: task.execution.session.as_ref().map(|s| s.id.clone()),
            timeout: self.timeout(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn gate_check(
        &self,
        task: &Task,
        gate: crate::domain::models::GatePolicy,
        phase_id: &str,
        iteration: u32,
        worktree: &Path,
        branch: &str,
        previous: &[(String, String)],
        phase_output: &str,
    ) -> OrcResult<GateCheck> {
        let ctx = PromptContext {
            task,
            iteration,
            retry_context: None,
            worktree,
            branch,
            target_branch: &self.config.target_branch,
            previous_outputs: previous,
        };
        self.gatekeeper
            .apply(gate, phase_id, &self.prompts, &ctx, phase_output)
            .await
    }

    fn record_usage(&self, task: &mut Task, phase: &str, result: &AgentResult) {
        task.execution.record_usage(
            phase,
            result.usage.input_tokens,
            result.usage.output_tokens,
            result.usage.cached_tokens,
            result.usage.total_cost_usd,
            result.session.clone(),
        );
    }

    /// Run one agent call, racing it against the interrupt flag. An
    /// in-flight call that finishes alongside the interrupt keeps its
    /// result; a still-pending one is dropped, killing a spawned child
    /// via kill_on_drop.
    async fn run_agent(&self, request: AgentRequest) -> OrcResult<AgentResult> {
        tokio::select! {
            biased;
            result = self.runner.run(request) => result,
            () = self.interrupts.cancelled() => Err(OrcError::Cancelled),
        }
    }

    async fn previous_outputs(&self, task_id: &str) -> OrcResult<Vec<(String, String)>> {
        Ok(self
            .store
            .list_phase_outputs(task_id)
            .await?
            .into_iter()
            .map(|o| (o.phase, o.content))
            .collect())
    }

    async fn unresolved_blockers(&self, task: &Task) -> OrcResult<Vec<String>> {
        let mut unresolved = Vec::new();
        for dep in &task.blocked_by {
            let blocker = self
                .store
                .load_task(dep)
                .await?
                .ok_or_else(|| OrcError::TaskNotFound(dep.clone()))?;
            if !blocker.status.is_terminal() {
                unresolved.push(dep.clone());
            }
        }
        Ok(unresolved)
    }

    fn reset_from_phase(
        &self,
        task: &mut Task,
        plan: &mut Plan,
        from_phase: &str,
    ) -> OrcResult<()> {
        let order = plan.phase_ids();
        let start = order
            .iter()
            .position(|p| p == from_phase)
            .ok_or_else(|| OrcError::ValidationFailed(format!("unknown phase '{from_phase}'")))?;
        for phase in plan.phases.iter_mut().skip(start) {
            phase.status = PhaseCompletionStatus::Pending;
            phase.commit = None;
            phase.iterations = 0;
        }
        task.execution.reset_from(from_phase, &order);
        info!(task_id = %task.id, from_phase, "Reset phases for resume");
        Ok(())
    }

    async fn provision_worktree(&self, task: &Task) -> OrcResult<PathBuf> {
        if !self.config.worktree_enabled {
            return std::env::current_dir()
                .map_err(|e| OrcError::GitError(format!("cannot resolve working dir: {e}")));
        }

        let branch = task.branch_name(&self.config.branch_prefix);
        let path = self
            .worktrees
            .provision(&task.id, task.initiative_id.as_deref(), &branch)
            .await?;

        let mut run = WorktreeRun::new(&task.id, path.to_string_lossy(), &branch);
        run.head = self.worktrees.head(&path).await.unwrap_or_default();
        self.store.save_worktree_run(&run).await?;
        Ok(path)
    }

    async fn complete_phase(
        &self,
        task: &mut Task,
        plan: &mut Plan,
        index: usize,
        commit: &str,
    ) -> OrcResult<()> {
        let phase_id = plan.phases[index].id.clone();
        plan.phases[index].status = PhaseCompletionStatus::Completed;
        plan.phases[index].commit = Some(commit.to_string());
        task.execution.complete_phase(&phase_id, commit);
        self.store.save_task_with_plan(task, plan).await?;
        info!(task_id = %task.id, phase = %phase_id, commit, "Phase completed");
        Ok(())
    }

    /// Park the task as blocked, persisting the reason.
    async fn park(
        &self,
        task: &mut Task,
        plan: Option<&Plan>,
        reason: &str,
    ) -> OrcResult<RunOutcome> {
        task.transition_to(TaskStatus::Blocked)?;
        task.metadata
            .insert("blocked_reason".into(), reason.to_string());
        match plan {
            Some(plan) => self.store.save_task_with_plan(task, plan).await?,
            None => self.store.save_task(task).await?,
        }
        info!(task_id = %task.id, reason, "Task parked");
        Ok(RunOutcome::Blocked(reason.to_string()))
    }

    /// Interrupt handling: the in-flight phase rolls back to pending
    /// with the interrupted marker so `resume` picks it up cleanly.
    async fn park_interrupted(
        &self,
        task: &mut Task,
        plan: &mut Plan,
        phase_id: &str,
    ) -> OrcResult<RunOutcome> {
        task.execution.interrupt_phase(phase_id);
        task.execution.interrupted = true;
        if let Some(phase) = plan.phase_mut(phase_id) {
            phase.status = PhaseCompletionStatus::Pending;
        }
        task.transition_to(TaskStatus::Blocked)?;
        task.metadata
            .insert("blocked_reason".into(), "interrupted".into());
        self.store.save_task_with_plan(task, plan).await?;
        info!(task_id = %task.id, phase_id, "Interrupted; state saved");
        Ok(RunOutcome::Blocked("interrupted".into()))
    }

    async fn record_failure(&self, task_id: &str, err: &OrcError) {
        let Ok(Some(mut task)) = self.store.load_task(task_id).await else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        if task.transition_to(TaskStatus::Failed).is_err() {
            task.status = TaskStatus::Failed;
            task.updated_at = Utc::now();
        }
        task.metadata.insert("error".into(), err.to_string());
        task.execution.last_error = Some(err.to_string());
        if let Err(save_err) = self.store.save_task(&task).await {
            error!(task_id, %save_err, "Failed to persist failure state");
        }
    }

    /// Synchronous trigger hooks after a completed run. Trigger failures
    /// never fail the run.
    async fn post_completion_hooks(&self, task_id: &str) {
        let Ok(Some(task)) = self.store.load_task(task_id).await else {
            return;
        };

        if let Err(err) = self
            .automation
            .evaluate(&AutomationEvent::TaskCompleted(Box::new(task.clone())))
            .await
        {
            warn!(task_id, %err, "Trigger evaluation after completion failed");
        }

        if task.pr.as_ref().map(|pr| pr.merged).unwrap_or(false) {
            let event = AutomationEvent::Named {
                name: "pr_merged".into(),
                task_id: Some(task.id.clone()),
            };
            if let Err(err) = self.automation.evaluate(&event).await {
                warn!(task_id, %err, "pr_merged trigger evaluation failed");
            }
        }

        // Initiative completion: every sibling task terminal
        if let Some(initiative_id) = &task.initiative_id {
            let filter = RunFilter {
                initiative_id: Some(initiative_id.clone()),
                ..Default::default()
            };
            if let Ok(siblings) = self.store.list_tasks(filter).await {
                if !siblings.is_empty() && siblings.iter().all(|t| t.status.is_terminal()) {
                    let event = AutomationEvent::Initiative {
                        event: "on_initiative_completed".into(),
                        initiative_id: initiative_id.clone(),
                    };
                    if let Err(err) = self.automation.evaluate(&event).await {
                        warn!(task_id, %err, "Initiative trigger evaluation failed");
                    }
                }
            }
        }
    }

    fn timeout(&self) -> Option<Duration> {
        (self.config.timeout_secs > 0).then(|| Duration::from_secs(self.config.timeout_secs))
    }

    fn budget_exceeded(&self, task: &Task) -> bool {
        self.config.budget_threshold_usd > 0.0
            && task.execution.cost_usd >= self.config.budget_threshold_usd
    }
}
