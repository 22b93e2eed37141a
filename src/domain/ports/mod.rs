//! Ports: trait seams between the domain and the adapters.

pub mod agent_runner;
pub mod store;
pub mod worktrees;

pub use agent_runner::{AgentRequest, AgentResult, AgentRunner, UsageStats};
pub use store::{
    AutomationStore, InitiativeStore, OutputStore, PlanStore, RunFilter, Store, TaskStore,
    WorktreeStore,
};
pub use worktrees::Worktrees;
