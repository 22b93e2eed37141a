//! Agent runner adapters.

pub mod claude_cli;
pub mod mock;

pub use claude_cli::{ClaudeCliConfig, ClaudeCliRunner};
pub use mock::{MockRunner, ScriptedRun};
