//! Task lifecycle service: id assignment, creation, dependencies, and
//! the manual resolve/reset escape hatches.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::config::IdentityConfig;
use crate::domain::models::{Task, TaskPriority, TaskStatus, Weight};
use crate::domain::ports::{RunFilter, TaskStore};
use crate::services::claim::pid_alive;

/// Walk `blocked_by` edges from `start`; returns the cycle path if one
/// is reachable.
pub fn find_cycle(edges: &HashMap<String, Vec<String>>, start: &str) -> Option<Vec<String>> {
    fn visit(
        node: &str,
        edges: &HashMap<String, Vec<String>>,
        path: &mut Vec<String>,
        on_path: &mut std::collections::HashSet<String>,
    ) -> Option<Vec<String>> {
        if on_path.contains(node) {
            let mut cycle: Vec<String> =
                path.iter().skip_while(|n| *n != node).cloned().collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        path.push(node.to_string());
        on_path.insert(node.to_string());
        if let Some(deps) = edges.get(node) {
            for dep in deps {
                if let Some(cycle) = visit(dep, edges, path, on_path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        on_path.remove(node);
        None
    }

    let mut path = Vec::new();
    let mut on_path = std::collections::HashSet::new();
    visit(start, edges, &mut path, &mut on_path)
}

pub struct TaskService<S> {
    store: Arc<S>,
    identity: IdentityConfig,
    branch_prefix: String,
}

impl<S: TaskStore> TaskService<S> {
    pub fn new(store: Arc<S>, identity: IdentityConfig, branch_prefix: impl Into<String>) -> Self {
        Self {
            store,
            identity,
            branch_prefix: branch_prefix.into(),
        }
    }

    /// Next monotonic task id, optionally initials-prefixed.
    pub async fn next_id(&self) -> OrcResult<String> {
        let number = self.store.max_task_number().await? + 1;
        if self.identity.initials.is_empty() {
            Ok(format!("TASK-{number:03}"))
        } else {
            Ok(format!(
                "{}-TASK-{number:03}",
                self.identity.initials.to_uppercase()
            ))
        }
    }

    /// Create and persist a new task.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        title: &str,
        description: Option<String>,
        weight: Weight,
        category: Option<String>,
        priority: Option<TaskPriority>,
        workflow: Option<String>,
        initiative_id: Option<String>,
    ) -> OrcResult<Task> {
        let id = self.next_id().await?;
        let mut task = Task::new(&id, title, weight);
        task.description = description.unwrap_or_default();
        task.category = category.unwrap_or_default();
        task.priority = priority.unwrap_or_default();
        task.workflow = workflow;
        task.initiative_id = initiative_id;
        task.branch = format!("{}/{}", self.branch_prefix, id);

        self.store.save_task(&task).await?;
        info!(task_id = %task.id, weight = task.weight.as_str(), "Created task");
        Ok(task)
    }

    /// Add a dependency edge, refusing cycles and dangling references.
    pub async fn add_dependency(&self, task_id: &str, depends_on: &str) -> OrcResult<()> {
        if task_id == depends_on {
            return Err(OrcError::DependencyCycle(task_id.to_string()));
        }
        let mut task = self
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| OrcError::TaskNotFound(task_id.to_string()))?;
        self.store
            .load_task(depends_on)
            .await?
            .ok_or_else(|| OrcError::TaskNotFound(depends_on.to_string()))?;

        if task.blocked_by.iter().any(|d| d == depends_on) {
            return Ok(());
        }
        task.blocked_by.push(depends_on.to_string());

        // Cycle check over the whole graph with the candidate edge added
        let mut edges: HashMap<String, Vec<String>> = self
            .store
            .load_all_tasks()
            .await?
            .into_iter()
            .map(|t| (t.id, t.blocked_by))
            .collect();
        edges.insert(task.id.clone(), task.blocked_by.clone());
        if let Some(cycle) = find_cycle(&edges, task_id) {
            return Err(OrcError::DependencyCycle(cycle.join(" -> ")));
        }

        self.store.save_task(&task).await?;
        Ok(())
    }

    /// Downstream edges, recomputed from upstream edges rather than
    /// stored.
    pub async fn blocks(&self, task_id: &str) -> OrcResult<Vec<String>> {
        Ok(self
            .store
            .list_tasks(RunFilter::default())
            .await?
            .into_iter()
            .filter(|t| t.blocked_by.iter().any(|d| d == task_id))
            .map(|t| t.id)
            .collect())
    }

    /// Mark a non-completed task done without executing it. Records the
    /// manual-intervention markers in metadata; never re-runs anything.
    pub async fn resolve(
        &self,
        task_id: &str,
        message: Option<&str>,
        force: bool,
        worktree_was_dirty: Option<bool>,
    ) -> OrcResult<Task> {
        let mut task = self
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| OrcError::TaskNotFound(task_id.to_string()))?;

        if task.is_claimed() && pid_alive(task.executor_pid) && !force {
            return Err(OrcError::AlreadyClaimed {
                task_id: task_id.to_string(),
                pid: task.executor_pid,
                host: task.executor_host.clone(),
            });
        }

        let original_status = task.status.as_str().to_string();
        task.transition_to(TaskStatus::Resolved)?;
        task.clear_claim();
        task.metadata.insert("resolved".into(), "true".into());
        task.metadata
            .insert("resolved_at".into(), Utc::now().to_rfc3339());
        task.metadata
            .insert("original_status".into(), original_status);
        if let Some(message) = message {
            task.metadata
                .insert("resolution_message".into(), message.to_string());
        }
        if let Some(pr) = &task.pr {
            task.metadata
                .insert("pr_was_merged".into(), pr.merged.to_string());
        }
        if let Some(dirty) = worktree_was_dirty {
            task.metadata
                .insert("worktree_was_dirty".into(), dirty.to_string());
        }

        self.store.save_task(&task).await?;
        info!(task_id, "Resolved task without execution");
        Ok(task)
    }

    /// Reset a task so it runs from scratch: execution state dropped,
    /// claim cleared, status back to `planned`.
    pub async fn reset(&self, task_id: &str, force: bool) -> OrcResult<Task> {
        let mut task = self
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| OrcError::TaskNotFound(task_id.to_string()))?;

        if task.is_claimed() && pid_alive(task.executor_pid) && !force {
            return Err(OrcError::AlreadyClaimed {
                task_id: task_id.to_string(),
                pid: task.executor_pid,
                host: task.executor_host.clone(),
            });
        }

        task.execution = Default::default();
        task.current_phase = None;
        task.clear_claim();
        task.status = TaskStatus::Planned;
        task.started_at = None;
        task.completed_at = None;
        task.updated_at = Utc::now();

        self.store.save_task(&task).await?;
        info!(task_id, "Reset task execution state");
        Ok(task)
    }
}
