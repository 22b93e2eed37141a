//! Application context: project discovery, config, store, and the
//! service graph the command handlers draw from.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::adapters::git::GitWorktrees;
use crate::adapters::runner::{ClaudeCliConfig, ClaudeCliRunner};
use crate::adapters::sqlite::{create_pool, migrations, SqliteStore};
use crate::domain::models::Config;
use crate::domain::ports::{AgentRunner, Worktrees};
use crate::infrastructure::project;
use crate::services::{
    ClaimService, EngineConfig, InitiativePlanner, InterruptController, PlanResolver,
    PromptBuilder, TaskService, TriggerRuntime, WorkflowEngine,
};

pub struct App {
    pub root: PathBuf,
    pub config: Config,
    pub store: Arc<SqliteStore>,
}

impl App {
    /// Locate the project, load config, open the store, run migrations.
    pub async fn bootstrap() -> Result<Self> {
        let cwd = std::env::current_dir().context("cannot resolve working directory")?;
        let Some(root) = project::find_project_root(&cwd) else {
            bail!("not inside an orc project (no .orc/ directory found); run `orc init` first");
        };

        let config = crate::infrastructure::config::ConfigLoader::load(Some(&root))?;

        let db_path = project::store_path(&root);
        let url = format!("sqlite://{}", db_path.display());
        let pool = create_pool(&url, config.database.max_connections)
            .await
            .context("failed to open the store")?;
        migrations::apply_all(&pool)
            .await
            .context("failed to run store migrations")?;

        Ok(Self {
            root,
            config,
            store: Arc::new(SqliteStore::new(pool)),
        })
    }

    pub fn task_service(&self) -> TaskService<SqliteStore> {
        TaskService::new(
            self.store.clone(),
            self.config.identity.clone(),
            self.config.branch_prefix.to_string(),
        )
    }

    pub fn initiative_planner(&self) -> InitiativePlanner<SqliteStore> {
        InitiativePlanner::new(
            self.store.clone(),
            self.config.identity.clone(),
            self.config.branch_prefix.to_string(),
        )
    }

    pub fn worktrees(&self) -> Arc<dyn Worktrees> {
        Arc::new(GitWorktrees::new(
            self.root.clone(),
            self.root.join(&self.config.worktree.dir),
            self.config.branch_prefix.to_string(),
            self.config.target_branch.to_string(),
            self.config.protected_branches.clone(),
        ))
    }

    pub fn automation(&self) -> TriggerRuntime<SqliteStore> {
        TriggerRuntime::new(
            self.store.clone(),
            self.config.automation.clone(),
            self.config.team.enabled,
            self.config.branch_prefix.to_string(),
        )
    }

    pub fn engine(&self, interrupts: Arc<InterruptController>) -> WorkflowEngine<SqliteStore> {
        let runner: Arc<dyn AgentRunner> = Arc::new(ClaudeCliRunner::new(ClaudeCliConfig {
            binary: self.config.agent.binary.clone(),
            model: self
                .config
                .model
                .clone()
                .unwrap_or_else(|| self.config.agent.model.clone()),
            max_turns: self.config.agent.max_turns,
        }));

        let resolver = PlanResolver::new(self.config.gates.clone(), self.config.workflows.clone());
        let prompts = PromptBuilder::new(project::load_constitution(&self.root));
        let engine_config = EngineConfig {
            branch_prefix: self.config.branch_prefix.to_string(),
            commit_prefix: self.config.commit_prefix.to_string(),
            target_branch: self.config.target_branch.to_string(),
            worktree_enabled: self.config.worktree.enabled,
            max_iterations: self.config.agent.max_iterations,
            retry_enabled: self.config.retry.enabled,
            max_attempts: self.config.retry.max_attempts,
            budget_threshold_usd: self.config.budget.threshold_usd,
            timeout_secs: self.config.agent.timeout_secs,
        };

        WorkflowEngine::new(
            self.store.clone(),
            ClaimService::new(self.store.clone()),
            resolver,
            self.worktrees(),
            runner,
            prompts,
            self.automation(),
            interrupts,
            engine_config,
        )
    }
}
