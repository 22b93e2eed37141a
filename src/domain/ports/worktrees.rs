//! Worktree manager port.
//!
//! Hands each running task an isolated checkout. The git adapter is the
//! shipped implementation; tests substitute an in-memory fake.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::errors::OrcResult;
use crate::domain::models::WorktreeStatus;

/// Isolation mechanism giving each task its own working copy.
#[async_trait]
pub trait Worktrees: Send + Sync {
    /// Create (or return the existing) worktree for a task on its
    /// branch. The branch is created from the target branch if absent.
    /// Idempotent: an existing worktree registered to the task is
    /// returned unchanged.
    async fn provision(
        &self,
        task_id: &str,
        initiative_id: Option<&str>,
        branch: &str,
    ) -> OrcResult<PathBuf>;

    /// Observational status; never mutates. An unknown path reports
    /// `exists = false` with no error.
    async fn status(&self, path: &Path) -> OrcResult<WorktreeStatus>;

    /// Tear down a worktree. Fails with `WorktreeUnclean` on uncommitted
    /// changes unless `force` is set.
    async fn cleanup(&self, path: &Path, force: bool) -> OrcResult<()>;

    /// Abort any in-progress rebase/merge, reset to HEAD, remove
    /// untracked files.
    async fn discard(&self, path: &Path) -> OrcResult<()>;

    /// Publish the branch. Refuses protected branches unconditionally;
    /// no flag overrides the refusal.
    async fn push(&self, path: &Path, branch: &str) -> OrcResult<()>;

    /// Stage and commit everything in the worktree. Returns the new
    /// commit hash, or None when there was nothing to commit.
    async fn commit_all(&self, path: &Path, message: &str) -> OrcResult<Option<String>>;

    /// Current HEAD commit of the worktree.
    async fn head(&self, path: &Path) -> OrcResult<String>;
}
