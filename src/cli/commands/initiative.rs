//! `orc initiative plan`: materialise a manifest.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::app::App;
use crate::cli::output::{output, CommandOutput};

#[derive(Debug, Serialize)]
struct PlanOutput {
    initiative: Option<String>,
    tasks: Vec<(String, String)>,
}

impl CommandOutput for PlanOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if let Some(initiative) = &self.initiative {
            lines.push(format!("Initiative: {initiative}"));
        }
        lines.push(format!("Created {} task(s):", self.tasks.len()));
        for (id, title) in &self.tasks {
            lines.push(format!("  {id}  {title}"));
        }
        lines.join("\n")
    }
}

pub async fn handle_plan(app: &App, manifest_path: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("cannot read manifest {}", manifest_path.display()))?;

    let planner = app.initiative_planner();
    let manifest = planner.parse(&text)?;
    let planned = planner.plan(&manifest).await?;

    output(
        &PlanOutput {
            initiative: planned.initiative.map(|i| i.id),
            tasks: planned
                .tasks
                .iter()
                .map(|t| (t.id.clone(), t.title.clone()))
                .collect(),
        },
        json,
    );
    Ok(())
}
