//! Layered configuration loading.
//!
//! Precedence, lowest to highest: compiled-in defaults < shared project
//! layers (`.orc/config.yaml`, `.orc/shared/config.yaml`) < personal
//! layers (`~/.orc/config.yaml`, `.orc/local/config.yaml`) < `ORC_*`
//! environment variables.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid retry.max_attempts: {0}. Cannot be 0 while retry is enabled")]
    InvalidMaxAttempts(u32),

    #[error("Invalid agent.max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    #[error("Duplicate trigger id: {0}")]
    DuplicateTriggerId(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging rooted at the
    /// project directory (when inside one).
    pub fn load(project_root: Option<&Path>) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(root) = project_root {
            figment = figment
                .merge(Yaml::file(root.join(".orc/config.yaml")))
                .merge(Yaml::file(root.join(".orc/shared/config.yaml")));
        }
        if let Ok(home) = std::env::var("HOME") {
            figment = figment.merge(Yaml::file(Path::new(&home).join(".orc/config.yaml")));
        }
        if let Some(root) = project_root {
            figment = figment.merge(Yaml::file(root.join(".orc/local/config.yaml")));
        }

        let mut config: Config = figment
            .merge(Env::prefixed("ORC_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;
        config.apply_profile();

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(0));
        }

        if config.retry.enabled && config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(0));
        }

        if config.agent.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(0));
        }

        if config.branch_prefix.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "branch_prefix cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for trigger in &config.automation.triggers {
            if trigger.id.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "trigger id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(trigger.id.as_str()) {
                return Err(ConfigError::DuplicateTriggerId(trigger.id.clone()));
            }
            if trigger.action.template.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "trigger '{}' has an empty action template",
                    trigger.id
                )));
            }
        }

        for branch in &config.protected_branches {
            if branch.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "protected branch entries cannot be blank".to_string(),
                ));
            }
        }

        Ok(())
    }
}
