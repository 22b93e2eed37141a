//! `orc search`: full-text search over phase outputs.

use anyhow::Result;
use serde::Serialize;

use crate::cli::app::App;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::ports::OutputStore;

#[derive(Debug, Serialize)]
struct SearchOutput {
    hits: Vec<(String, String, String)>,
}

impl CommandOutput for SearchOutput {
    fn to_human(&self) -> String {
        if self.hits.is_empty() {
            return "No matches.".to_string();
        }
        self.hits
            .iter()
            .map(|(task, phase, snippet)| format!("{task}/{phase}: {snippet}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub async fn handle_search(app: &App, query: &str, limit: usize, json: bool) -> Result<()> {
    let outputs = app.store.search_phase_outputs(query, limit).await?;
    output(
        &SearchOutput {
            hits: outputs
                .iter()
                .map(|o| {
                    (
                        o.task_id.clone(),
                        o.phase.clone(),
                        truncate(o.content.trim(), 100),
                    )
                })
                .collect(),
        },
        json,
    );
    Ok(())
}
