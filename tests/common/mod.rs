//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use orc::adapters::git::GitWorktrees;
use orc::adapters::runner::MockRunner;
use orc::adapters::sqlite::{create_test_pool, migrations, SqliteStore};
use orc::domain::models::config::{AutomationConfig, GatesConfig};
use orc::domain::ports::{AgentRunner, Worktrees};
use orc::services::{
    ClaimService, EngineConfig, InterruptController, PlanResolver, PromptBuilder, TriggerRuntime,
    WorkflowEngine,
};

pub async fn memory_store() -> Arc<SqliteStore> {
    let pool = create_test_pool().await.expect("test pool");
    migrations::apply_all(&pool).await.expect("migrations");
    Arc::new(SqliteStore::new(pool))
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("git spawns");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// A throwaway repository with one commit on `main`.
pub fn git_repo() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_path_buf();
    git(&root, &["init", "-b", "main"]);
    git(&root, &["config", "user.email", "orc@test.invalid"]);
    git(&root, &["config", "user.name", "orc test"]);
    std::fs::write(root.join("README.md"), "# fixture\n").unwrap();
    git(&root, &["add", "-A"]);
    git(&root, &["commit", "-m", "initial"]);
    (dir, root)
}

pub fn git_worktrees(root: &Path) -> Arc<GitWorktrees> {
    Arc::new(GitWorktrees::new(
        root.to_path_buf(),
        root.join(".orc/worktrees"),
        "orc",
        "main",
        Vec::new(),
    ))
}

/// Commits on `branch` that are not on main.
pub fn commits_ahead_of_main(root: &Path, branch: &str) -> usize {
    let output = Command::new("git")
        .current_dir(root)
        .args(["rev-list", "--count", &format!("main..{branch}")])
        .output()
        .expect("git spawns");
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .unwrap_or(0)
}

pub struct EngineFixture {
    pub store: Arc<SqliteStore>,
    pub runner: Arc<MockRunner>,
    pub interrupts: Arc<InterruptController>,
    pub engine: WorkflowEngine<SqliteStore>,
}

pub struct EngineOptions {
    pub automation: AutomationConfig,
    pub config: EngineConfig,
    pub runner_override: Option<Arc<dyn AgentRunner>>,
    pub interrupts_override: Option<Arc<InterruptController>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            automation: AutomationConfig {
                enabled: true,
                triggers: Vec::new(),
            },
            config: EngineConfig::default(),
            runner_override: None,
            interrupts_override: None,
        }
    }
}

pub async fn engine_fixture(repo_root: &Path, options: EngineOptions) -> EngineFixture {
    let store = memory_store().await;
    let runner = Arc::new(MockRunner::default());
    let interrupts = options
        .interrupts_override
        .unwrap_or_else(InterruptController::new);

    let dyn_runner: Arc<dyn AgentRunner> = match options.runner_override {
        Some(runner) => runner,
        None => runner.clone(),
    };

    let worktrees: Arc<dyn Worktrees> = git_worktrees(repo_root);
    let engine = WorkflowEngine::new(
        store.clone(),
        ClaimService::new(store.clone()),
        PlanResolver::new(GatesConfig::default(), Default::default()),
        worktrees,
        dyn_runner,
        PromptBuilder::new(None),
        TriggerRuntime::new(store.clone(), options.automation, false, "orc"),
        interrupts.clone(),
        options.config,
    );

    EngineFixture {
        store,
        runner,
        interrupts,
        engine,
    }
}
