//! CLI surface: command definitions, handlers, and output formatting.

pub mod app;
pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::domain::models::{TaskPriority, Weight};

#[derive(Parser, Debug)]
#[command(
    name = "orc",
    about = "Local orchestration engine for AI coding agents",
    version
)]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialise a .orc/ project in the current directory
    Init {
        /// Re-scaffold over an existing project
        #[arg(long)]
        force: bool,
    },

    /// Create a new task
    New {
        /// Task title
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// trivial | small | medium | large | greenfield
        #[arg(short, long, default_value = "medium")]
        weight: String,
        #[arg(short, long)]
        category: Option<String>,
        /// low | normal | high | critical
        #[arg(short, long)]
        priority: Option<String>,
        /// Derive the plan from a named workflow instead of the weight
        #[arg(long)]
        workflow: Option<String>,
        #[arg(long)]
        initiative: Option<String>,
        /// Task ids this task depends on
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },

    /// Execute a task through its plan
    Run {
        task_id: String,
        /// Take over a held claim
        #[arg(long)]
        force: bool,
    },

    /// Resume a paused, blocked, or failed task
    Resume {
        task_id: String,
        #[arg(long)]
        force: bool,
        /// Re-run from this phase onward
        #[arg(long = "from-phase")]
        from_phase: Option<String>,
    },

    /// Reset a task's execution state so it runs from scratch
    Reset {
        task_id: String,
        #[arg(long)]
        force: bool,
    },

    /// Mark a task done without executing it
    Resolve {
        task_id: String,
        #[arg(long)]
        force: bool,
        /// Also tear down the task's worktree
        #[arg(long)]
        cleanup: bool,
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Dashboard: counts by status, running tasks, recent failures
    Status,

    /// Show one task in detail
    Show { task_id: String },

    /// Show a task's dependency edges
    Deps { task_id: String },

    /// Show the diff of a task's worktree against the target branch
    Diff { task_id: String },

    /// Tear down worktrees for terminal tasks
    Cleanup {
        /// Specific task to clean up
        task_id: Option<String>,
        #[arg(long)]
        dry_run: bool,
        /// Sweep every orphaned worktree
        #[arg(long)]
        all: bool,
        /// Discard uncommitted changes
        #[arg(long)]
        force: bool,
    },

    /// Automation trigger management
    Automation {
        #[command(subcommand)]
        command: AutomationCommands,
    },

    /// Initiative management
    Initiative {
        #[command(subcommand)]
        command: InitiativeCommands,
    },

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Full-text search over phase outputs
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum AutomationCommands {
    /// List configured triggers and their counters
    List,
    /// Show one trigger in detail
    Show { trigger_id: String },
    /// Enable a trigger in the project config
    Enable { trigger_id: String },
    /// Disable a trigger in the project config
    Disable { trigger_id: String },
    /// Evaluate all triggers now
    Run,
    /// Show trigger execution history
    History {
        trigger_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Reset a trigger's counter
    Reset { trigger_id: String },
}

#[derive(Subcommand, Debug)]
pub enum InitiativeCommands {
    /// Materialise an initiative manifest into tasks
    Plan { manifest: std::path::PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show,
    /// Print one key from the merged configuration
    Get { key: String },
    /// Explain which layer files are consulted
    Resolution,
}

pub(crate) fn parse_weight(s: &str) -> anyhow::Result<Weight> {
    Weight::from_str(s).ok_or_else(|| {
        anyhow::anyhow!("invalid weight '{s}' (trivial|small|medium|large|greenfield)")
    })
}

pub(crate) fn parse_priority(s: &str) -> anyhow::Result<TaskPriority> {
    TaskPriority::from_str(s)
        .ok_or_else(|| anyhow::anyhow!("invalid priority '{s}' (low|normal|high|critical)"))
}
