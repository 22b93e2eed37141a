//! `orc run` / `orc resume`: execute a task through its plan.

use anyhow::Result;
use serde::Serialize;

use crate::cli::app::App;
use crate::cli::output::{output, CommandOutput};
use crate::services::{InterruptController, RunOptions, RunOutcome};

#[derive(Debug, Serialize)]
struct RunOutput {
    task_id: String,
    outcome: String,
    detail: Option<String>,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        match (&self.outcome[..], &self.detail) {
            ("completed", _) => format!("{}: completed", self.task_id),
            ("blocked", Some(reason)) => {
                format!(
                    "{}: blocked: {reason}\nResume with `orc resume {}`",
                    self.task_id, self.task_id
                )
            }
            ("noop", _) => format!("{}: already terminal; nothing to do", self.task_id),
            _ => format!("{}: {}", self.task_id, self.outcome),
        }
    }
}

pub async fn handle_run(
    app: &App,
    task_id: &str,
    force: bool,
    from_phase: Option<String>,
    json: bool,
) -> Result<()> {
    let interrupts = InterruptController::new();
    interrupts.clone().install();

    let engine = app.engine(interrupts);
    let outcome = engine
        .run(
            task_id,
            RunOptions {
                force,
                from_phase,
            },
        )
        .await?;

    let (outcome, detail) = match outcome {
        RunOutcome::Completed => ("completed", None),
        RunOutcome::Blocked(reason) => ("blocked", Some(reason)),
        RunOutcome::NoOp => ("noop", None),
    };
    output(
        &RunOutput {
            task_id: task_id.to_string(),
            outcome: outcome.to_string(),
            detail,
        },
        json,
    );
    Ok(())
}
