//! Worktree CLI commands: cleanup and diff.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use tokio::process::Command;

use crate::cli::app::App;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::WorktreeRun;
use crate::domain::ports::{TaskStore, WorktreeStore};

#[derive(Debug, Serialize)]
struct CleanupOutput {
    removed: Vec<String>,
    skipped: Vec<(String, String)>,
    dry_run: bool,
}

impl CommandOutput for CleanupOutput {
    fn to_human(&self) -> String {
        let verb = if self.dry_run { "Would remove" } else { "Removed" };
        let mut lines = Vec::new();
        for path in &self.removed {
            lines.push(format!("{verb} {path}"));
        }
        for (path, reason) in &self.skipped {
            lines.push(format!("Skipped {path}: {reason}"));
        }
        if lines.is_empty() {
            lines.push("Nothing to clean up.".to_string());
        }
        lines.join("\n")
    }
}

/// Candidates: a named task's worktree, or with --all every worktree
/// whose task is terminal (orphaned checkouts included).
async fn candidates(app: &App, task_id: Option<&str>, all: bool) -> Result<Vec<WorktreeRun>> {
    if let Some(task_id) = task_id {
        return Ok(app
            .store
            .load_worktree_run(task_id)
            .await?
            .into_iter()
            .collect());
    }
    if !all {
        bail!("pass a task id or --all");
    }

    let mut out = Vec::new();
    for run in app.store.list_worktree_runs().await? {
        let terminal = match app.store.load_task(&run.task_id).await? {
            Some(task) => task.status.is_terminal(),
            // Task row gone entirely: the worktree is orphaned
            None => true,
        };
        if terminal {
            out.push(run);
        }
    }
    Ok(out)
}

pub async fn handle_cleanup(
    app: &App,
    task_id: Option<&str>,
    dry_run: bool,
    all: bool,
    force: bool,
    json: bool,
) -> Result<()> {
    let worktrees = app.worktrees();
    let mut removed = Vec::new();
    let mut skipped = Vec::new();

    for run in candidates(app, task_id, all).await? {
        let path = Path::new(&run.path);
        if dry_run {
            removed.push(run.path.clone());
            continue;
        }
        match worktrees.cleanup(path, force).await {
            Ok(()) => {
                app.store.delete_worktree_run(&run.task_id).await?;
                removed.push(run.path.clone());
            }
            Err(err) => skipped.push((run.path.clone(), err.to_string())),
        }
    }

    output(
        &CleanupOutput {
            removed,
            skipped,
            dry_run,
        },
        json,
    );
    Ok(())
}

pub async fn handle_diff(app: &App, task_id: &str) -> Result<()> {
    let run = app
        .store
        .load_worktree_run(task_id)
        .await?
        .ok_or_else(|| anyhow!("no worktree registered for {task_id}"))?;

    let output = Command::new("git")
        .current_dir(&run.path)
        .args([
            "diff",
            &format!("{}...HEAD", &*app.config.target_branch),
            "--stat",
            "--patch",
        ])
        .output()
        .await?;
    if !output.status.success() {
        bail!(
            "git diff failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    print!("{}", String::from_utf8_lossy(&output.stdout));
    Ok(())
}
