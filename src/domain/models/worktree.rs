//! Worktree domain model.
//!
//! Each running task gets its own git worktree so parallel agents never
//! write into the same checkout. The main repository stays read-only to
//! running tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a managed worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeState {
    Active,
    Dirty,
    InRebase,
    InMerge,
    HasConflicts,
    /// Registered to a task that has since terminated
    Orphaned,
}

impl Default for WorktreeState {
    fn default() -> Self {
        Self::Active
    }
}

impl WorktreeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dirty => "dirty",
            Self::InRebase => "in_rebase",
            Self::InMerge => "in_merge",
            Self::HasConflicts => "has_conflicts",
            Self::Orphaned => "orphaned",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "dirty" => Some(Self::Dirty),
            "in_rebase" => Some(Self::InRebase),
            "in_merge" => Some(Self::InMerge),
            "has_conflicts" => Some(Self::HasConflicts),
            "orphaned" => Some(Self::Orphaned),
            _ => None,
        }
    }
}

/// Persisted record of an active working copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeRun {
    pub task_id: String,
    pub path: String,
    pub branch: String,
    pub head: String,
    pub state: WorktreeState,
    pub created_at: DateTime<Utc>,
}

impl WorktreeRun {
    pub fn new(
        task_id: impl Into<String>,
        path: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            path: path.into(),
            branch: branch.into(),
            head: String::new(),
            state: WorktreeState::Active,
            created_at: Utc::now(),
        }
    }

    /// Worktree directory name for a task, optionally embedding the
    /// initiative id.
    pub fn dir_name(branch_prefix: &str, task_id: &str, initiative_id: Option<&str>) -> String {
        match initiative_id {
            Some(init) => format!("{branch_prefix}-{init}-{task_id}"),
            None => format!("{branch_prefix}-{task_id}"),
        }
    }

    /// Recover a task id from a worktree directory name. Tolerates an
    /// embedded initiative segment: the task id is the trailing
    /// `<WORD>-<NUMBER>` pair.
    pub fn task_id_from_dir(dir: &str) -> Option<String> {
        let parts: Vec<&str> = dir.split('-').collect();
        if parts.len() < 2 {
            return None;
        }
        let num = parts.last()?;
        if !num.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let word = parts.get(parts.len() - 2)?;
        Some(format!("{word}-{num}"))
    }
}

/// Observational status report for a task's worktree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorktreeStatus {
    pub exists: bool,
    pub dirty: bool,
    pub rebase_in_progress: bool,
    pub merge_in_progress: bool,
    pub conflict_files: Vec<String>,
    pub uncommitted_count: usize,
}
