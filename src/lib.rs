//! orc: local orchestration engine for AI coding agents.
//!
//! Drives long-running agents through multi-phase workflows per task:
//! - durable progress in a SQLite store, persisted after every step
//! - at most one live executor per task, with orphan detection
//! - an isolated git worktree per running task
//! - declarative automation triggers with cooldowns
//! - template-derived plans migrated in place when they go stale

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
