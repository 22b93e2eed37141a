//! `orc init`: scaffold a project.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::project;

#[derive(Debug, Serialize)]
struct InitOutput {
    path: String,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        format!(
            "Initialised orc project at {}\nEdit {}/config.yaml and {}/constitution.md to taste.",
            self.path, self.path, self.path
        )
    }
}

pub fn handle_init(force: bool, json: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let orc = project::init_project(&cwd, force)?;
    output(
        &InitOutput {
            path: orc.display().to_string(),
        },
        json,
    );
    Ok(())
}
