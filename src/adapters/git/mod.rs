//! Git adapter.

pub mod worktree;

pub use worktree::{is_protected, GitWorktrees, PROTECTED_BRANCHES};
