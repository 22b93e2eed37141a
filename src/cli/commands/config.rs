//! `orc config`: inspect the merged configuration.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::cli::app::App;
use crate::cli::output::{output, CommandOutput};

#[derive(Debug, Serialize)]
struct ConfigShowOutput {
    yaml: String,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        self.yaml.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_yaml::from_str(&self.yaml).unwrap_or_default()
    }
}

pub fn handle_show(app: &App, json: bool) -> Result<()> {
    let yaml = serde_yaml::to_string(&app.config)?;
    output(&ConfigShowOutput { yaml }, json);
    Ok(())
}

pub fn handle_get(app: &App, key: &str) -> Result<()> {
    let value = serde_yaml::to_value(&app.config)?;
    let mut cursor = &value;
    for part in key.split('.') {
        cursor = cursor
            .get(part)
            .ok_or_else(|| anyhow!("unknown config key '{key}'"))?;
    }
    println!("{}", serde_yaml::to_string(cursor)?.trim_end());
    Ok(())
}

#[derive(Debug, Serialize)]
struct ResolutionOutput {
    layers: Vec<(String, bool)>,
}

impl CommandOutput for ResolutionOutput {
    fn to_human(&self) -> String {
        let mut lines = vec!["Configuration layers, lowest to highest precedence:".to_string()];
        for (layer, present) in &self.layers {
            lines.push(format!(
                "  [{}] {layer}",
                if *present { "x" } else { " " }
            ));
        }
        lines.push("  [x] ORC_* environment variables".to_string());
        lines.join("\n")
    }
}

pub fn handle_resolution(app: &App, json: bool) -> Result<()> {
    let mut layers = vec![("compiled-in defaults".to_string(), true)];
    for relative in [
        ".orc/config.yaml",
        ".orc/shared/config.yaml",
    ] {
        let path = app.root.join(relative);
        layers.push((path.display().to_string(), path.is_file()));
    }
    if let Ok(home) = std::env::var("HOME") {
        let path = std::path::Path::new(&home).join(".orc/config.yaml");
        layers.push((path.display().to_string(), path.is_file()));
    }
    let local = app.root.join(".orc/local/config.yaml");
    layers.push((local.display().to_string(), local.is_file()));

    output(&ResolutionOutput { layers }, json);
    Ok(())
}
