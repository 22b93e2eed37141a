//! Task CLI commands: new, show, status, deps, resolve, reset.

use anyhow::{anyhow, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use serde::Serialize;

use crate::cli::app::App;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::{parse_priority, parse_weight};
use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::{PlanStore, TaskStore, WorktreeStore};

#[derive(Debug, Serialize)]
struct TaskSummary {
    id: String,
    title: String,
    status: String,
    weight: String,
    phase: Option<String>,
    executor: Option<String>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: truncate(&task.title, 48),
            status: task.status.as_str().to_string(),
            weight: task.weight.as_str().to_string(),
            phase: task.current_phase.clone(),
            executor: task
                .is_claimed()
                .then(|| format!("{}@{}", task.executor_pid, task.executor_host)),
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_new(
    app: &App,
    title: String,
    description: Option<String>,
    weight: &str,
    category: Option<String>,
    priority: Option<String>,
    workflow: Option<String>,
    initiative: Option<String>,
    depends_on: Vec<String>,
    json: bool,
) -> Result<()> {
    let weight = parse_weight(weight)?;
    let priority = priority.as_deref().map(parse_priority).transpose()?;

    let service = app.task_service();
    let task = service
        .create(
            &title,
            description,
            weight,
            category,
            priority,
            workflow,
            initiative,
        )
        .await?;
    for dep in depends_on {
        service.add_dependency(&task.id, &dep).await?;
    }

    let task = app
        .store
        .load_task(&task.id)
        .await?
        .ok_or_else(|| anyhow!("task vanished after creation"))?;
    output(&TaskSummary::from(&task), json);
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    counts: Vec<(String, usize)>,
    running: Vec<TaskSummary>,
    recent_failures: Vec<TaskSummary>,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let mut sections = Vec::new();

        let mut counts = Table::new();
        counts.load_preset(UTF8_FULL_CONDENSED);
        counts.set_header(["Status", "Count"]);
        for (status, count) in &self.counts {
            counts.add_row([status.clone(), count.to_string()]);
        }
        sections.push(counts.to_string());

        if !self.running.is_empty() {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_header(["Task", "Title", "Phase", "Executor"]);
            for task in &self.running {
                table.add_row([
                    task.id.clone(),
                    task.title.clone(),
                    task.phase.clone().unwrap_or_default(),
                    task.executor.clone().unwrap_or_default(),
                ]);
            }
            sections.push(format!("Running:\n{table}"));
        }

        if !self.recent_failures.is_empty() {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_header(["Task", "Title", "Weight"]);
            for task in &self.recent_failures {
                table.add_row([task.id.clone(), task.title.clone(), task.weight.clone()]);
            }
            sections.push(format!("Recent failures:\n{table}"));
        }

        sections.join("\n")
    }
}

pub async fn handle_status(app: &App, json: bool) -> Result<()> {
    let tasks = app.store.load_all_tasks().await?;

    let mut counts: std::collections::BTreeMap<&'static str, usize> = Default::default();
    for task in &tasks {
        *counts.entry(task.status.as_str()).or_insert(0) += 1;
    }

    let running = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Running)
        .map(TaskSummary::from)
        .collect();
    let mut failures: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .collect();
    failures.sort_by_key(|t| std::cmp::Reverse(t.updated_at));

    output(
        &StatusOutput {
            counts: counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            running,
            recent_failures: failures.into_iter().take(5).map(TaskSummary::from).collect(),
        },
        json,
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    task: Task,
    plan: Vec<(String, String, Option<String>)>,
}

impl CommandOutput for ShowOutput {
    fn to_human(&self) -> String {
        let task = &self.task;
        let mut lines = vec![
            format!("{}  {}", task.id, task.title),
            format!(
                "  status: {}  weight: {}  priority: {}",
                task.status.as_str(),
                task.weight.as_str(),
                task.priority.as_str()
            ),
            format!("  branch: {}", task.branch),
        ];
        if !task.description.is_empty() {
            lines.push(format!("  description: {}", truncate(&task.description, 120)));
        }
        if let Some(initiative) = &task.initiative_id {
            lines.push(format!("  initiative: {initiative}"));
        }
        if task.is_claimed() {
            lines.push(format!(
                "  executor: {}@{}",
                task.executor_pid, task.executor_host
            ));
        }
        if !task.blocked_by.is_empty() {
            lines.push(format!("  blocked by: {}", task.blocked_by.join(", ")));
        }
        if let Some(reason) = task.metadata.get("blocked_reason") {
            lines.push(format!("  blocked reason: {reason}"));
        }
        lines.push(format!(
            "  tokens: {} in / {} out / {} cached  cost: ${:.2}",
            task.execution.tokens.input,
            task.execution.tokens.output,
            task.execution.tokens.cached,
            task.execution.cost_usd
        ));

        if !self.plan.is_empty() {
            lines.push("  plan:".to_string());
            for (phase, status, commit) in &self.plan {
                let commit = commit
                    .as_deref()
                    .map(|c| format!(" ({})", &c[..c.len().min(8)]))
                    .unwrap_or_default();
                lines.push(format!("    {status:<9} {phase}{commit}"));
            }
        }
        lines.join("\n")
    }
}

pub async fn handle_show(app: &App, task_id: &str, json: bool) -> Result<()> {
    let task = app
        .store
        .load_task(task_id)
        .await?
        .ok_or_else(|| anyhow!("task not found: {task_id}"))?;
    let plan = app
        .store
        .load_plan(task_id)
        .await?
        .map(|p| {
            p.phases
                .iter()
                .map(|ph| {
                    (
                        ph.id.clone(),
                        ph.status.as_str().to_string(),
                        ph.commit.clone(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    output(&ShowOutput { task, plan }, json);
    Ok(())
}

#[derive(Debug, Serialize)]
struct DepsOutput {
    task_id: String,
    blocked_by: Vec<String>,
    blocks: Vec<String>,
}

impl CommandOutput for DepsOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("{}:", self.task_id)];
        if self.blocked_by.is_empty() && self.blocks.is_empty() {
            lines.push("  no dependency edges".to_string());
        }
        for dep in &self.blocked_by {
            lines.push(format!("  blocked by {dep}"));
        }
        for dep in &self.blocks {
            lines.push(format!("  blocks {dep}"));
        }
        lines.join("\n")
    }
}

pub async fn handle_deps(app: &App, task_id: &str, json: bool) -> Result<()> {
    let task = app
        .store
        .load_task(task_id)
        .await?
        .ok_or_else(|| anyhow!("task not found: {task_id}"))?;
    let blocks = app.task_service().blocks(task_id).await?;
    output(
        &DepsOutput {
            task_id: task.id,
            blocked_by: task.blocked_by,
            blocks,
        },
        json,
    );
    Ok(())
}

pub async fn handle_resolve(
    app: &App,
    task_id: &str,
    force: bool,
    cleanup: bool,
    message: Option<String>,
    json: bool,
) -> Result<()> {
    let worktrees = app.worktrees();
    let run = app.store.load_worktree_run(task_id).await?;

    let worktree_dirty = match &run {
        Some(run) => {
            let status = worktrees.status(std::path::Path::new(&run.path)).await?;
            status.exists.then_some(status.dirty)
        }
        None => None,
    };

    let task = app
        .task_service()
        .resolve(task_id, message.as_deref(), force, worktree_dirty)
        .await?;

    if cleanup {
        if let Some(run) = run {
            worktrees
                .cleanup(std::path::Path::new(&run.path), force)
                .await?;
            app.store.delete_worktree_run(task_id).await?;
        }
    }

    output(&TaskSummary::from(&task), json);
    Ok(())
}

pub async fn handle_reset(app: &App, task_id: &str, force: bool, json: bool) -> Result<()> {
    let task = app.task_service().reset(task_id, force).await?;
    output(&TaskSummary::from(&task), json);
    Ok(())
}

impl CommandOutput for TaskSummary {
    fn to_human(&self) -> String {
        format!(
            "{}  {}  [{} / {}]{}",
            self.id,
            self.title,
            self.status,
            self.weight,
            self.phase
                .as_deref()
                .map(|p| format!("  phase: {p}"))
                .unwrap_or_default()
        )
    }
}
