//! Worktree manager against a real git repository.

mod common;

use std::path::Path;

use orc::domain::errors::OrcError;
use orc::domain::ports::Worktrees;

use common::{git_repo, git_worktrees};

#[tokio::test]
async fn test_provision_creates_branch_and_checkout() {
    let (_guard, root) = git_repo();
    let worktrees = git_worktrees(&root);

    let path = worktrees
        .provision("TASK-001", None, "orc/TASK-001")
        .await
        .unwrap();
    assert!(path.join(".git").is_file(), "worktrees carry a .git file");
    assert!(path.ends_with("orc-TASK-001"));

    // Idempotent: the same registration comes back unchanged
    let again = worktrees
        .provision("TASK-001", None, "orc/TASK-001")
        .await
        .unwrap();
    assert_eq!(path, again);

    // Initiative-scoped worktrees embed the initiative id
    let scoped = worktrees
        .provision("TASK-002", Some("INIT-1"), "orc/TASK-002")
        .await
        .unwrap();
    assert!(scoped.ends_with("orc-INIT-1-TASK-002"));
}

#[tokio::test]
async fn test_provision_refuses_protected_branch() {
    let (_guard, root) = git_repo();
    let worktrees = git_worktrees(&root);

    let err = worktrees
        .provision("TASK-001", None, "main")
        .await
        .unwrap_err();
    assert!(matches!(err, OrcError::ProtectedBranch(_)));
}

#[tokio::test]
async fn test_push_protected_branch_always_refused() {
    let (_guard, root) = git_repo();
    let worktrees = git_worktrees(&root);
    let path = worktrees
        .provision("TASK-001", None, "orc/TASK-001")
        .await
        .unwrap();

    for branch in ["main", "master", "develop", "release/2.1"] {
        let err = worktrees.push(&path, branch).await.unwrap_err();
        assert!(
            matches!(err, OrcError::ProtectedBranch(_)),
            "push to {branch} must be refused"
        );
    }
}

#[tokio::test]
async fn test_pre_push_hook_planted() {
    let (_guard, root) = git_repo();
    let worktrees = git_worktrees(&root);
    let path = worktrees
        .provision("TASK-001", None, "orc/TASK-001")
        .await
        .unwrap();

    // The hook lives in the worktree's resolved hooks dir
    let output = std::process::Command::new("git")
        .current_dir(&path)
        .args(["rev-parse", "--git-path", "hooks"])
        .output()
        .unwrap();
    let hooks = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let hooks_dir = if Path::new(&hooks).is_absolute() {
        std::path::PathBuf::from(hooks)
    } else {
        path.join(hooks)
    };
    let hook = hooks_dir.join("pre-push");
    assert!(hook.is_file(), "pre-push hook planted at provision time");

    let content = std::fs::read_to_string(&hook).unwrap();
    assert!(content.contains("refs/heads/main"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&hook).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0, "hook must be executable");
    }
}

#[tokio::test]
async fn test_status_and_cleanup_discipline() {
    let (_guard, root) = git_repo();
    let worktrees = git_worktrees(&root);
    let path = worktrees
        .provision("TASK-001", None, "orc/TASK-001")
        .await
        .unwrap();

    // Clean checkout
    let status = worktrees.status(&path).await.unwrap();
    assert!(status.exists);
    assert!(!status.dirty);
    assert_eq!(status.uncommitted_count, 0);

    // Unknown path reports exists=false with no error
    let missing = worktrees.status(Path::new("/nonexistent/wt")).await.unwrap();
    assert!(!missing.exists);

    // Dirty the tree: cleanup refuses without force
    std::fs::write(path.join("scratch.txt"), "wip").unwrap();
    let status = worktrees.status(&path).await.unwrap();
    assert!(status.dirty);
    assert_eq!(status.uncommitted_count, 1);

    let err = worktrees.cleanup(&path, false).await.unwrap_err();
    assert!(matches!(err, OrcError::WorktreeUnclean { .. }));

    // Discard resets the tree, then cleanup succeeds
    worktrees.discard(&path).await.unwrap();
    let status = worktrees.status(&path).await.unwrap();
    assert!(!status.dirty);

    worktrees.cleanup(&path, false).await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_commit_all_and_head() {
    let (_guard, root) = git_repo();
    let worktrees = git_worktrees(&root);
    let path = worktrees
        .provision("TASK-001", None, "orc/TASK-001")
        .await
        .unwrap();

    // Nothing to commit
    let none = worktrees.commit_all(&path, "orc(TASK-001): empty").await.unwrap();
    assert!(none.is_none());

    std::fs::write(path.join("work.rs"), "fn work() {}").unwrap();
    let commit = worktrees
        .commit_all(&path, "orc(TASK-001): implement")
        .await
        .unwrap()
        .expect("a commit was created");
    assert_eq!(worktrees.head(&path).await.unwrap(), commit);
    assert_eq!(common::commits_ahead_of_main(&root, "orc/TASK-001"), 1);
}
