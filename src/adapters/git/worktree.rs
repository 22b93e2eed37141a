//! Git worktree manager.
//!
//! Shells out to `git` for worktree lifecycle, status inspection, and
//! publishing. Every mutating operation happens inside a task worktree;
//! the main checkout is never used as one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::{WorktreeRun, WorktreeStatus};
use crate::domain::ports::Worktrees;

/// Branches that must never be pushed to or used for task worktrees.
pub const PROTECTED_BRANCHES: &[&str] = &["main", "master", "develop", "release/*"];

const PRE_PUSH_HOOK: &str = r#"#!/bin/sh
# Installed by orc: refuse pushes to protected branches.
while read local_ref local_sha remote_ref remote_sha; do
    case "$remote_ref" in
        refs/heads/main|refs/heads/master|refs/heads/develop|refs/heads/release/*)
            echo "orc: refusing push to protected branch ${remote_ref#refs/heads/}" >&2
            exit 1
            ;;
    esac
done
exit 0
"#;

/// Check a branch name against a protected set. Entries ending in `/*`
/// match any branch under that prefix.
pub fn is_protected(branch: &str, extra: &[String]) -> bool {
    let matches = |pattern: &str| {
        if let Some(prefix) = pattern.strip_suffix("/*") {
            branch == prefix || branch.starts_with(&format!("{prefix}/"))
        } else {
            branch == pattern
        }
    };
    PROTECTED_BRANCHES.iter().any(|p| matches(p)) || extra.iter().any(|p| matches(p))
}

pub struct GitWorktrees {
    repo_root: PathBuf,
    worktree_dir: PathBuf,
    branch_prefix: String,
    target_branch: String,
    extra_protected: Vec<String>,
}

impl GitWorktrees {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        worktree_dir: impl Into<PathBuf>,
        branch_prefix: impl Into<String>,
        target_branch: impl Into<String>,
        extra_protected: Vec<String>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            worktree_dir: worktree_dir.into(),
            branch_prefix: branch_prefix.into(),
            target_branch: target_branch.into(),
            extra_protected,
        }
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> OrcResult<String> {
        let output = Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .await
            .map_err(|e| OrcError::GitError(format!("failed to spawn git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OrcError::GitError(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn git_ok(&self, dir: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn branch_exists(&self, branch: &str) -> bool {
        self.git_ok(
            &self.repo_root,
            &["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")],
        )
        .await
    }

    /// A worktree checkout has a `.git` file (not a directory).
    async fn is_valid_worktree(&self, path: &Path) -> bool {
        let git_file = path.join(".git");
        git_file.is_file() && self.git_ok(path, &["rev-parse", "--git-dir"]).await
    }

    async fn plant_pre_push_hook(&self, worktree: &Path) -> OrcResult<()> {
        let hooks_dir = self.git(worktree, &["rev-parse", "--git-path", "hooks"]).await?;
        let hooks_dir = if Path::new(&hooks_dir).is_absolute() {
            PathBuf::from(hooks_dir)
        } else {
            worktree.join(hooks_dir)
        };
        tokio::fs::create_dir_all(&hooks_dir)
            .await
            .map_err(|e| OrcError::GitError(format!("failed to create hooks dir: {e}")))?;

        let hook_path = hooks_dir.join("pre-push");
        tokio::fs::write(&hook_path, PRE_PUSH_HOOK)
            .await
            .map_err(|e| OrcError::GitError(format!("failed to write pre-push hook: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            tokio::fs::set_permissions(&hook_path, perms)
                .await
                .map_err(|e| OrcError::GitError(format!("failed to chmod hook: {e}")))?;
        }

        debug!(hook = %hook_path.display(), "Planted pre-push hook");
        Ok(())
    }
}

#[async_trait]
impl Worktrees for GitWorktrees {
    async fn provision(
        &self,
        task_id: &str,
        initiative_id: Option<&str>,
        branch: &str,
    ) -> OrcResult<PathBuf> {
        if is_protected(branch, &self.extra_protected) {
            return Err(OrcError::ProtectedBranch(branch.to_string()));
        }

        let dir_name = WorktreeRun::dir_name(&self.branch_prefix, task_id, initiative_id);
        let path = self.worktree_dir.join(dir_name);

        if self.is_valid_worktree(&path).await {
            debug!(task_id, path = %path.display(), "Reusing existing worktree");
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OrcError::GitError(format!("failed to create worktree dir: {e}")))?;
        }

        let path_str = path.to_string_lossy().to_string();
        if self.branch_exists(branch).await {
            self.git(&self.repo_root, &["worktree", "add", &path_str, branch])
                .await?;
        } else {
            self.git(
                &self.repo_root,
                &[
                    "worktree",
                    "add",
                    "-b",
                    branch,
                    &path_str,
                    &self.target_branch,
                ],
            )
            .await?;
        }

        self.plant_pre_push_hook(&path).await?;

        info!(task_id, branch, path = %path.display(), "Provisioned worktree");
        Ok(path)
    }

    async fn status(&self, path: &Path) -> OrcResult<WorktreeStatus> {
        if !self.is_valid_worktree(path).await {
            return Ok(WorktreeStatus::default());
        }

        let porcelain = self.git(path, &["status", "--porcelain"]).await?;
        let lines: Vec<&str> = porcelain.lines().filter(|l| !l.is_empty()).collect();
        let conflict_files: Vec<String> = lines
            .iter()
            .filter(|l| {
                let code = l.get(..2).unwrap_or("");
                matches!(code, "UU" | "AA" | "DD" | "AU" | "UA" | "DU" | "UD")
            })
            .map(|l| l[3..].to_string())
            .collect();

        let git_dir = self.git(path, &["rev-parse", "--git-dir"]).await?;
        let git_dir = if Path::new(&git_dir).is_absolute() {
            PathBuf::from(git_dir)
        } else {
            path.join(git_dir)
        };
        let rebase_in_progress =
            git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists();
        let merge_in_progress = git_dir.join("MERGE_HEAD").exists();

        Ok(WorktreeStatus {
            exists: true,
            dirty: !lines.is_empty(),
            rebase_in_progress,
            merge_in_progress,
            uncommitted_count: lines.len(),
            conflict_files,
        })
    }

    async fn cleanup(&self, path: &Path, force: bool) -> OrcResult<()> {
        let status = self.status(path).await?;
        if !status.exists {
            return Ok(());
        }
        if status.dirty && !force {
            return Err(OrcError::WorktreeUnclean {
                path: path.to_string_lossy().to_string(),
            });
        }

        let path_str = path.to_string_lossy().to_string();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);

        if let Err(err) = self.git(&self.repo_root, &args).await {
            warn!(path = %path.display(), %err, "worktree remove failed, retrying with --force");
            self.git(&self.repo_root, &["worktree", "remove", "--force", &path_str])
                .await?;
        }
        Ok(())
    }

    async fn discard(&self, path: &Path) -> OrcResult<()> {
        // Abort whatever is half-done; both abort calls are no-ops when
        // nothing is in progress.
        let _ = self.git_ok(path, &["rebase", "--abort"]).await;
        let _ = self.git_ok(path, &["merge", "--abort"]).await;
        self.git(path, &["reset", "--hard", "HEAD"]).await?;
        self.git(path, &["clean", "-fd"]).await?;
        Ok(())
    }

    async fn push(&self, path: &Path, branch: &str) -> OrcResult<()> {
        if is_protected(branch, &self.extra_protected) {
            return Err(OrcError::ProtectedBranch(branch.to_string()));
        }
        self.git(path, &["push", "-u", "origin", branch]).await?;
        Ok(())
    }

    async fn commit_all(&self, path: &Path, message: &str) -> OrcResult<Option<String>> {
        self.git(path, &["add", "-A"]).await?;
        let staged = self.git(path, &["status", "--porcelain"]).await?;
        if staged.is_empty() {
            return Ok(None);
        }
        self.git(path, &["commit", "-m", message]).await?;
        let head = self.head(path).await?;
        Ok(Some(head))
    }

    async fn head(&self, path: &Path) -> OrcResult<String> {
        self.git(path, &["rev-parse", "HEAD"]).await
    }
}
