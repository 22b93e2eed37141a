//! Automation trigger CLI commands.

use anyhow::{anyhow, bail, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use serde::Serialize;

use crate::cli::app::App;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::ports::AutomationStore;
use crate::services::AutomationEvent;

#[derive(Debug, Serialize)]
struct TriggerRow {
    id: String,
    kind: String,
    enabled: bool,
    armed: bool,
    count: u64,
    last_fired: Option<String>,
    description: String,
}

#[derive(Debug, Serialize)]
struct TriggerListOutput {
    triggers: Vec<TriggerRow>,
}

impl CommandOutput for TriggerListOutput {
    fn to_human(&self) -> String {
        if self.triggers.is_empty() {
            return "No triggers configured.".to_string();
        }
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(["Id", "Type", "Enabled", "Armed", "Count", "Last fired", "Description"]);
        for row in &self.triggers {
            table.add_row([
                row.id.clone(),
                row.kind.clone(),
                if row.enabled { "yes" } else { "no" }.to_string(),
                if row.armed { "yes" } else { "no" }.to_string(),
                row.count.to_string(),
                row.last_fired.clone().unwrap_or_default(),
                truncate(&row.description, 40),
            ]);
        }
        table.to_string()
    }
}

pub async fn handle_list(app: &App, json: bool) -> Result<()> {
    let runtime = app.automation();
    let mut rows = Vec::new();
    for trigger in runtime.triggers() {
        let counter = app.store.get_trigger_counter(&trigger.id).await?;
        // Schedule triggers only arm in team mode
        let armed = trigger.enabled
            && (trigger.trigger.kind() != "schedule" || app.config.team.enabled);
        rows.push(TriggerRow {
            id: trigger.id.clone(),
            kind: trigger.trigger.kind().to_string(),
            enabled: trigger.enabled,
            armed,
            count: counter.count,
            last_fired: counter.last_fired.map(|t| t.to_rfc3339()),
            description: trigger.description.clone(),
        });
    }
    output(&TriggerListOutput { triggers: rows }, json);
    Ok(())
}

#[derive(Debug, Serialize)]
struct TriggerDetailOutput {
    config: crate::domain::models::TriggerConfig,
    counter: crate::domain::models::TriggerCounter,
}

impl CommandOutput for TriggerDetailOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("{} ({})", self.config.id, self.config.trigger.kind()),
            format!("  enabled: {}", self.config.enabled),
            format!("  action template: {}", self.config.action.template),
            format!(
                "  cooldown: {} tasks, {}s",
                self.config.cooldown.tasks, self.config.cooldown.duration_secs
            ),
            format!("  counter: {}", self.counter.count),
            format!("  tasks since fire: {}", self.counter.tasks_since_fire),
        ];
        if let Some(fired) = self.counter.last_fired {
            lines.push(format!("  last fired: {}", fired.to_rfc3339()));
        }
        if !self.config.description.is_empty() {
            lines.push(format!("  {}", self.config.description));
        }
        lines.join("\n")
    }
}

pub async fn handle_show(app: &App, trigger_id: &str, json: bool) -> Result<()> {
    let runtime = app.automation();
    let config = runtime
        .trigger(trigger_id)
        .ok_or_else(|| anyhow!("unknown trigger '{trigger_id}'"))?
        .clone();
    let counter = app.store.get_trigger_counter(trigger_id).await?;
    output(&TriggerDetailOutput { config, counter }, json);
    Ok(())
}

/// Flip a trigger's `enabled` flag in `.orc/config.yaml`. Triggers
/// defined in other layers must be edited there.
pub fn handle_set_enabled(app: &App, trigger_id: &str, enabled: bool) -> Result<()> {
    let path = app.root.join(".orc/config.yaml");
    let text = std::fs::read_to_string(&path)
        .map_err(|e| anyhow!("cannot read {}: {e}", path.display()))?;
    let mut doc: serde_yaml::Value = serde_yaml::from_str(&text)?;

    let triggers = doc
        .get_mut("automation")
        .and_then(|a| a.get_mut("triggers"))
        .and_then(|t| t.as_sequence_mut())
        .ok_or_else(|| anyhow!("no automation.triggers in {}", path.display()))?;

    let entry = triggers
        .iter_mut()
        .find(|t| t.get("id").and_then(|i| i.as_str()) == Some(trigger_id))
        .ok_or_else(|| {
            anyhow!(
                "trigger '{trigger_id}' is not defined in {}; edit its defining layer",
                path.display()
            )
        })?;
    entry
        .as_mapping_mut()
        .ok_or_else(|| anyhow!("malformed trigger entry"))?
        .insert("enabled".into(), serde_yaml::Value::Bool(enabled));

    std::fs::write(&path, serde_yaml::to_string(&doc)?)?;
    println!(
        "{} trigger '{trigger_id}'",
        if enabled { "Enabled" } else { "Disabled" }
    );
    Ok(())
}

pub async fn handle_run(app: &App, json: bool) -> Result<()> {
    let runtime = app.automation();
    let fired = runtime.evaluate(&AutomationEvent::Manual).await?;

    #[derive(Debug, Serialize)]
    struct RunResult {
        fired: Vec<String>,
    }
    impl CommandOutput for RunResult {
        fn to_human(&self) -> String {
            if self.fired.is_empty() {
                "No triggers fired.".to_string()
            } else {
                format!("Fired: {}", self.fired.join(", "))
            }
        }
    }
    output(&RunResult { fired }, json);
    Ok(())
}

#[derive(Debug, Serialize)]
struct HistoryOutput {
    executions: Vec<crate::domain::models::TriggerExecution>,
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        if self.executions.is_empty() {
            return "No trigger executions.".to_string();
        }
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(["When", "Trigger", "Status", "Task", "Reason"]);
        for execution in &self.executions {
            table.add_row([
                execution.triggered_at.to_rfc3339(),
                execution.trigger_id.clone(),
                execution.status.as_str().to_string(),
                execution.task_id.clone().unwrap_or_default(),
                truncate(&execution.reason, 40),
            ]);
        }
        table.to_string()
    }
}

pub async fn handle_history(
    app: &App,
    trigger_id: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    if let Some(id) = trigger_id {
        if app.automation().trigger(id).is_none() {
            bail!("unknown trigger '{id}'");
        }
    }
    let executions = app.store.list_trigger_executions(trigger_id, limit).await?;
    output(&HistoryOutput { executions }, json);
    Ok(())
}

pub async fn handle_reset(app: &App, trigger_id: &str) -> Result<()> {
    app.automation().reset(trigger_id).await?;
    println!("Reset counter for '{trigger_id}'");
    Ok(())
}
