//! SQLite store adapter.

pub mod automation_store;
pub mod connection;
pub mod initiative_store;
pub mod migrations;
pub mod plan_store;
pub mod store;
pub mod task_store;
pub mod worktree_store;

pub use connection::{create_pool, create_test_pool};
pub use store::SqliteStore;
