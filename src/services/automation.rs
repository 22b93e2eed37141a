//! Automation trigger runtime.
//!
//! Turns observable events into new tasks, deterministically and at most
//! once per firing condition. Evaluation runs after every task
//! completion (in the engine's release path) and on explicit `run`
//! invocation. Each trigger is considered independently; the fire itself
//! (generated task + execution row + cooldown/counter update) is one
//! store transaction.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::config::AutomationConfig;
use crate::domain::models::{
    CounterKind, PhaseCompletionStatus, Task, TaskPriority, TaskStatus, TriggerConfig,
    TriggerExecution, TriggerType, Weight,
};
use crate::domain::ports::{RunFilter, Store};

/// Events the runtime evaluates triggers against.
#[derive(Debug, Clone)]
pub enum AutomationEvent {
    /// A task reached `completed`; fired synchronously from the engine
    TaskCompleted(Box<Task>),
    /// A named engine event (`pr_merged`, ...), optionally task-scoped
    Named { name: String, task_id: Option<String> },
    /// A named initiative-level event
    Initiative { event: String, initiative_id: String },
    /// Explicit `automation run` from the operator
    Manual,
}

pub struct TriggerRuntime<S> {
    store: Arc<S>,
    config: AutomationConfig,
    team_mode: bool,
    branch_prefix: String,
}

impl<S: Store> TriggerRuntime<S> {
    pub fn new(
        store: Arc<S>,
        config: AutomationConfig,
        team_mode: bool,
        branch_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            config,
            team_mode,
            branch_prefix: branch_prefix.into(),
        }
    }

    pub fn triggers(&self) -> &[TriggerConfig] {
        &self.config.triggers
    }

    pub fn trigger(&self, id: &str) -> Option<&TriggerConfig> {
        self.config.triggers.iter().find(|t| t.id == id)
    }

    /// Evaluate every enabled trigger against an event. Returns the ids
    /// of triggers that fired.
    pub async fn evaluate(&self, event: &AutomationEvent) -> OrcResult<Vec<String>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        let mut fired = Vec::new();
        for trigger in &self.config.triggers {
            if !trigger.enabled {
                continue;
            }
            match self.evaluate_one(trigger, event).await {
                Ok(true) => fired.push(trigger.id.clone()),
                Ok(false) => {}
                Err(err) => {
                    // A failing trigger must not poison the others
                    warn!(trigger_id = %trigger.id, %err, "Trigger evaluation failed");
                }
            }
        }
        Ok(fired)
    }

    async fn evaluate_one(
        &self,
        trigger: &TriggerConfig,
        event: &AutomationEvent,
    ) -> OrcResult<bool> {
        match (&trigger.trigger, event) {
            (
                TriggerType::Count {
                    counter: kind,
                    threshold,
                    categories,
                    weights,
                },
                AutomationEvent::TaskCompleted(task),
            ) => {
                if !Self::completion_counts(task, categories, weights) {
                    self.store.bump_tasks_since_fire(&trigger.id).await?;
                    return Ok(false);
                }
                let delta = match kind {
                    CounterKind::TasksCompleted => 1,
                    CounterKind::PhasesCompleted => task
                        .execution
                        .phases
                        .values()
                        .filter(|p| p.status == PhaseCompletionStatus::Completed)
                        .count() as u64,
                };
                let counter = self.store.get_trigger_counter(&trigger.id).await?;
                let candidate = counter.count + delta;
                let ready = candidate >= *threshold
                    && counter.cooldown_elapsed(&trigger.cooldown, Utc::now());
                if ready {
                    // The increment is absorbed by the fire's counter reset,
                    // keeping increment + fire in one transaction.
                    let reason = format!(
                        "counter reached {candidate} (threshold {threshold}) after {}",
                        task.id
                    );
                    return self.fire(trigger, &reason, true).await;
                }
                self.store
                    .increment_trigger_counter(&trigger.id, delta)
                    .await?;
                self.store.bump_tasks_since_fire(&trigger.id).await?;
                Ok(false)
            }

            (TriggerType::Count { .. }, AutomationEvent::Manual) => {
                let counter = self.store.get_trigger_counter(&trigger.id).await?;
                if let TriggerType::Count { threshold, .. } = &trigger.trigger {
                    if counter.count >= *threshold
                        && counter.cooldown_elapsed(&trigger.cooldown, Utc::now())
                    {
                        let reason = format!(
                            "counter at {} (threshold {threshold}) on manual run",
                            counter.count
                        );
                        return self.fire(trigger, &reason, true).await;
                    }
                }
                Ok(false)
            }

            (TriggerType::Event { name }, AutomationEvent::TaskCompleted(task)) => {
                self.store.bump_tasks_since_fire(&trigger.id).await?;
                if name != "task_completed" {
                    return Ok(false);
                }
                if !self.cooldown_ok(trigger).await? {
                    return Ok(false);
                }
                let reason = format!("event task_completed for {}", task.id);
                self.fire(trigger, &reason, false).await
            }

            (TriggerType::Event { name }, AutomationEvent::Named { name: event_name, task_id }) => {
                if name != event_name {
                    return Ok(false);
                }
                if !self.cooldown_ok(trigger).await? {
                    return Ok(false);
                }
                let reason = match task_id {
                    Some(id) => format!("event {event_name} for {id}"),
                    None => format!("event {event_name}"),
                };
                self.fire(trigger, &reason, false).await
            }

            (
                TriggerType::Initiative { event },
                AutomationEvent::Initiative {
                    event: event_name,
                    initiative_id,
                },
            ) => {
                if event != event_name {
                    return Ok(false);
                }
                if !self.cooldown_ok(trigger).await? {
                    return Ok(false);
                }
                let reason = format!("initiative event {event_name} for {initiative_id}");
                self.fire(trigger, &reason, false).await
            }

            (
                TriggerType::Threshold { metric, op, value },
                AutomationEvent::TaskCompleted(_) | AutomationEvent::Manual,
            ) => {
                if let AutomationEvent::TaskCompleted(_) = event {
                    self.store.bump_tasks_since_fire(&trigger.id).await?;
                }
                let Some(sample) = self.metric_value(metric).await? else {
                    debug!(trigger_id = %trigger.id, metric, "Unknown metric; skipping");
                    return Ok(false);
                };
                let counter = self.store.get_trigger_counter(&trigger.id).await?;
                let was_holding = counter
                    .last_value
                    .map(|prev| op.holds(prev, *value))
                    .unwrap_or(false);
                let now_holding = op.holds(sample, *value);
                self.store.set_trigger_last_value(&trigger.id, sample).await?;

                // Fires on the transition across the boundary, not on
                // every evaluation while the predicate holds.
                if !now_holding || was_holding {
                    return Ok(false);
                }
                if !self.cooldown_ok(trigger).await? {
                    return Ok(false);
                }
                let reason = format!("metric {metric} = {sample} crossed {value}");
                self.fire(trigger, &reason, false).await
            }

            (TriggerType::Schedule { cron }, AutomationEvent::Manual) => {
                // Schedule triggers are team-mode only; a no-op otherwise.
                if !self.team_mode {
                    return Ok(false);
                }
                let counter = self.store.get_trigger_counter(&trigger.id).await?;
                if !self.schedule_due(cron, counter.last_fired)? {
                    return Ok(false);
                }
                if !self.cooldown_ok(trigger).await? {
                    return Ok(false);
                }
                let reason = format!("schedule '{cron}' due");
                self.fire(trigger, &reason, false).await
            }

            (TriggerType::Schedule { .. }, AutomationEvent::TaskCompleted(_)) => {
                self.store.bump_tasks_since_fire(&trigger.id).await?;
                Ok(false)
            }

            _ => Ok(false),
        }
    }

    fn completion_counts(task: &Task, categories: &[String], weights: &[Weight]) -> bool {
        if !categories.is_empty() && !categories.iter().any(|c| *c == task.category) {
            return false;
        }
        if !weights.is_empty() && !weights.contains(&task.weight) {
            return false;
        }
        true
    }

    async fn cooldown_ok(&self, trigger: &TriggerConfig) -> OrcResult<bool> {
        let counter = self.store.get_trigger_counter(&trigger.id).await?;
        Ok(counter.cooldown_elapsed(&trigger.cooldown, Utc::now()))
    }

    fn schedule_due(
        &self,
        cron_expr: &str,
        last_fired: Option<chrono::DateTime<Utc>>,
    ) -> OrcResult<bool> {
        use std::str::FromStr;
        // Config uses 5-field cron (min hour dom month dow); the parser
        // wants a seconds field.
        let normalized = if cron_expr.split_whitespace().count() == 5 {
            format!("0 {cron_expr}")
        } else {
            cron_expr.to_string()
        };
        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| OrcError::ValidationFailed(format!("bad cron '{cron_expr}': {e}")))?;
        let anchor = match last_fired {
            Some(fired) => fired,
            // Never fired: due if any occurrence exists at all
            None => return Ok(schedule.upcoming(Utc).next().is_some()),
        };
        Ok(schedule.after(&anchor).next().map(|due| due <= Utc::now()).unwrap_or(false))
    }

    /// Builtin metrics computed from the store.
    async fn metric_value(&self, name: &str) -> OrcResult<Option<f64>> {
        let tasks = self.store.list_tasks(RunFilter::default()).await?;
        let value = match name {
            "tasks_completed" => tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count() as f64,
            "tasks_failed" => tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Failed)
                .count() as f64,
            "tasks_blocked" => tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Blocked)
                .count() as f64,
            "cost_usd_total" => tasks.iter().map(|t| t.execution.cost_usd).sum(),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Materialise the trigger's action template into a task and commit
    /// the fire atomically. A dispatch failure records a failed
    /// execution row and leaves the trigger enabled.
    async fn fire(
        &self,
        trigger: &TriggerConfig,
        reason: &str,
        reset_count: bool,
    ) -> OrcResult<bool> {
        match self.build_generated_task(trigger).await {
            Ok(task) => {
                let execution = TriggerExecution::fired(&trigger.id, &task.id, reason);
                self.store
                    .record_trigger_fire(&execution, &task, reset_count)
                    .await?;
                info!(
                    trigger_id = %trigger.id,
                    task_id = %task.id,
                    reason,
                    "Trigger fired"
                );
                Ok(true)
            }
            Err(err) => {
                warn!(trigger_id = %trigger.id, %err, "Trigger dispatch failed");
                let execution =
                    TriggerExecution::failed(&trigger.id, reason, err.to_string());
                self.store.record_trigger_execution(&execution).await?;
                Ok(false)
            }
        }
    }

    /// The same materialisation path the CLI's `new` uses: next id,
    /// branch from the prefix, template recorded in metadata.
    async fn build_generated_task(&self, trigger: &TriggerConfig) -> OrcResult<Task> {
        if trigger.action.template.is_empty() {
            return Err(OrcError::ValidationFailed(format!(
                "trigger '{}' has an empty action template",
                trigger.id
            )));
        }

        let number = self.store.max_task_number().await? + 1;
        let id = format!("TASK-{number:03}");
        let title = trigger.action.template.replace(['-', '_'], " ");

        let mut task = Task::new(&id, title, Weight::Small);
        task.category = "automation".to_string();
        task.branch = format!("{}/{}", self.branch_prefix, id);
        if let Some(priority) = &trigger.action.priority {
            task.priority = TaskPriority::from_str(priority).ok_or_else(|| {
                OrcError::ValidationFailed(format!("bad priority '{priority}'"))
            })?;
        }
        task.metadata
            .insert("template".into(), trigger.action.template.clone());
        task.metadata
            .insert("generated_by".into(), trigger.id.clone());
        if let Some(queue) = &trigger.action.queue {
            task.metadata.insert("queue".into(), queue.clone());
        }
        Ok(task)
    }

    /// Reset a trigger's counter on operator request.
    pub async fn reset(&self, trigger_id: &str) -> OrcResult<()> {
        if self.trigger(trigger_id).is_none() {
            return Err(OrcError::ValidationFailed(format!(
                "unknown trigger '{trigger_id}'"
            )));
        }
        self.store.reset_trigger_counter(trigger_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::testing::memory_store;
    use crate::adapters::sqlite::SqliteStore;
    use crate::domain::models::trigger::{CompareOp, Cooldown, CounterKind, TriggerAction};
    use crate::domain::ports::{AutomationStore, TaskStore};

    fn count_trigger(threshold: u64, cooldown_tasks: u64) -> TriggerConfig {
        TriggerConfig {
            id: "t-count".into(),
            trigger: TriggerType::Count {
                counter: CounterKind::TasksCompleted,
                threshold,
                categories: vec![],
                weights: vec![],
            },
            enabled: true,
            action: TriggerAction {
                template: "tech-debt-review".into(),
                priority: None,
                queue: None,
            },
            cooldown: Cooldown {
                tasks: cooldown_tasks,
                duration_secs: 0,
            },
            description: String::new(),
        }
    }

    fn runtime(
        store: Arc<SqliteStore>,
        triggers: Vec<TriggerConfig>,
    ) -> TriggerRuntime<SqliteStore> {
        TriggerRuntime::new(
            store,
            AutomationConfig {
                enabled: true,
                triggers,
            },
            false,
            "orc",
        )
    }

    fn completed(id: &str) -> AutomationEvent {
        let mut task = Task::new(id, "done", Weight::Small);
        task.status = TaskStatus::Completed;
        AutomationEvent::TaskCompleted(Box::new(task))
    }

    #[tokio::test]
    async fn test_count_trigger_fires_once_then_cools_down() {
        let store = Arc::new(memory_store().await);
        let runtime = runtime(store.clone(), vec![count_trigger(3, 2)]);

        let mut fires = Vec::new();
        for i in 1..=5 {
            let fired = runtime
                .evaluate(&completed(&format!("TASK-{i:03}")))
                .await
                .unwrap();
            fires.push(!fired.is_empty());
        }

        // Fires exactly once, after the 3rd completion
        assert_eq!(fires, vec![false, false, true, false, false]);
        let history = store
            .list_trigger_executions(Some("t-count"), 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);

        // A generated task exists and the counter was reset: atomic three-way
        let generated = history[0].task_id.as_ref().unwrap();
        assert!(store.load_task(generated).await.unwrap().is_some());
        let counter = store.get_trigger_counter("t-count").await.unwrap();
        assert_eq!(counter.tasks_since_fire, 2);
        assert!(counter.last_fired.is_some());

        // Cooldown satisfied and threshold reached again: second fire
        let fired = runtime.evaluate(&completed("TASK-006")).await.unwrap();
        assert_eq!(fired, vec!["t-count"]);
        let history = store
            .list_trigger_executions(Some("t-count"), 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_count_trigger_category_filter() {
        let store = Arc::new(memory_store().await);
        let mut trigger = count_trigger(1, 0);
        trigger.trigger = TriggerType::Count {
            counter: CounterKind::TasksCompleted,
            threshold: 1,
            categories: vec!["bugfix".into()],
            weights: vec![],
        };
        let runtime = runtime(store.clone(), vec![trigger]);

        // Wrong category does not count
        let fired = runtime.evaluate(&completed("TASK-001")).await.unwrap();
        assert!(fired.is_empty());

        let mut task = Task::new("TASK-002", "fix", Weight::Small);
        task.category = "bugfix".into();
        task.status = TaskStatus::Completed;
        let fired = runtime
            .evaluate(&AutomationEvent::TaskCompleted(Box::new(task)))
            .await
            .unwrap();
        assert_eq!(fired, vec!["t-count"]);
    }

    #[tokio::test]
    async fn test_event_trigger_matches_by_name() {
        let store = Arc::new(memory_store().await);
        let trigger = TriggerConfig {
            id: "t-pr".into(),
            trigger: TriggerType::Event {
                name: "pr_merged".into(),
            },
            enabled: true,
            action: TriggerAction {
                template: "changelog-update".into(),
                priority: Some("high".into()),
                queue: None,
            },
            cooldown: Cooldown::default(),
            description: String::new(),
        };
        let runtime = runtime(store.clone(), vec![trigger]);

        let fired = runtime
            .evaluate(&AutomationEvent::Named {
                name: "pr_merged".into(),
                task_id: Some("TASK-001".into()),
            })
            .await
            .unwrap();
        assert_eq!(fired, vec!["t-pr"]);

        let history = store.list_trigger_executions(Some("t-pr"), 10).await.unwrap();
        let generated = store
            .load_task(history[0].task_id.as_ref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(generated.priority, TaskPriority::High);
        assert_eq!(generated.metadata["generated_by"], "t-pr");

        let fired = runtime
            .evaluate(&AutomationEvent::Named {
                name: "something_else".into(),
                task_id: None,
            })
            .await
            .unwrap();
        assert!(fired.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_fires_on_transition_only() {
        let store = Arc::new(memory_store().await);
        let trigger = TriggerConfig {
            id: "t-fail".into(),
            trigger: TriggerType::Threshold {
                metric: "tasks_failed".into(),
                op: CompareOp::Ge,
                value: 2.0,
            },
            enabled: true,
            action: TriggerAction {
                template: "stability-audit".into(),
                priority: None,
                queue: None,
            },
            cooldown: Cooldown::default(),
            description: String::new(),
        };
        let runtime = runtime(store.clone(), vec![trigger]);

        // Below the boundary: records the sample, no fire
        let mut failed = Task::new("TASK-900", "f1", Weight::Small);
        failed.status = TaskStatus::Failed;
        store.save_task(&failed).await.unwrap();
        assert!(runtime.evaluate(&completed("TASK-001")).await.unwrap().is_empty());

        // Crosses the boundary: fires
        let mut failed2 = Task::new("TASK-901", "f2", Weight::Small);
        failed2.status = TaskStatus::Failed;
        store.save_task(&failed2).await.unwrap();
        assert_eq!(
            runtime.evaluate(&completed("TASK-002")).await.unwrap(),
            vec!["t-fail"]
        );

        // Still above the boundary: no refire without a transition
        assert!(runtime.evaluate(&completed("TASK-003")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_noop_outside_team_mode() {
        let store = Arc::new(memory_store().await);
        let trigger = TriggerConfig {
            id: "t-cron".into(),
            trigger: TriggerType::Schedule {
                // Every second, so it is always due
                cron: "* * * * * *".into(),
            },
            enabled: true,
            action: TriggerAction {
                template: "nightly-sweep".into(),
                priority: None,
                queue: None,
            },
            cooldown: Cooldown::default(),
            description: String::new(),
        };

        let solo = runtime(store.clone(), vec![trigger.clone()]);
        assert!(solo.evaluate(&AutomationEvent::Manual).await.unwrap().is_empty());

        let team = TriggerRuntime::new(
            store.clone(),
            AutomationConfig {
                enabled: true,
                triggers: vec![trigger],
            },
            true,
            "orc",
        );
        assert_eq!(
            team.evaluate(&AutomationEvent::Manual).await.unwrap(),
            vec!["t-cron"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_records_failed_execution() {
        let store = Arc::new(memory_store().await);
        let mut trigger = count_trigger(1, 0);
        trigger.action.template = String::new();
        let runtime = runtime(store.clone(), vec![trigger]);

        let fired = runtime.evaluate(&completed("TASK-001")).await.unwrap();
        assert!(fired.is_empty());

        let history = store
            .list_trigger_executions(Some("t-count"), 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].status,
            crate::domain::models::TriggerExecStatus::Failed
        );
        assert!(history[0].error.is_some());
        assert!(history[0].task_id.is_none());
    }

    #[tokio::test]
    async fn test_disabled_runtime_is_inert() {
        let store = Arc::new(memory_store().await);
        let runtime = TriggerRuntime::new(
            store.clone(),
            AutomationConfig {
                enabled: false,
                triggers: vec![count_trigger(1, 0)],
            },
            false,
            "orc",
        );
        assert!(runtime.evaluate(&completed("TASK-001")).await.unwrap().is_empty());
        assert!(store
            .list_trigger_executions(None, 10)
            .await
            .unwrap()
            .is_empty());
    }
}
