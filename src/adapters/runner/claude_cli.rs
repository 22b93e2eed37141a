//! Agent runner backed by the Claude Code CLI.
//!
//! Spawns the CLI in print mode inside the task's worktree and derives
//! accounting from the final result line of its stream-JSON output.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::AgentSessionInfo;
use crate::domain::ports::{AgentRequest, AgentResult, AgentRunner, UsageStats};

/// Claude CLI runner configuration.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub binary: String,
    pub model: String,
    pub max_turns: u32,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: "sonnet".to_string(),
            max_turns: 25,
        }
    }
}

pub struct ClaudeCliRunner {
    config: ClaudeCliConfig,
}

impl ClaudeCliRunner {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, request: &AgentRequest) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--max-turns".to_string(),
            self.config.max_turns.to_string(),
            "--model".to_string(),
            self.config.model.clone(),
        ];
        if let Some(session) = &request.session {
            args.push("--resume".to_string());
            args.push(session.clone());
        }
        args.push("-p".to_string());
        args.push(request.prompt.clone());
        args
    }

    /// Fold one stream-JSON line into the accumulating result. Returns
    /// true when the line was the terminal result record.
    fn fold_line(line: &str, content: &mut String, result: &mut AgentResult) -> bool {
        let Ok(json) = serde_json::from_str::<serde_json::Value>(line) else {
            // Non-JSON output is agent text
            if !line.trim().is_empty() {
                content.push_str(line);
                content.push('\n');
            }
            return false;
        };

        match json.get("type").and_then(|t| t.as_str()) {
            Some("assistant") => {
                if let Some(text) = extract_assistant_text(&json) {
                    content.push_str(&text);
                    content.push('\n');
                }
                false
            }
            Some("result") => {
                let usage = json.get("usage").cloned().unwrap_or_default();
                result.usage = UsageStats {
                    input_tokens: usage
                        .get("input_tokens")
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(0),
                    output_tokens: usage
                        .get("output_tokens")
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(0),
                    cached_tokens: usage
                        .get("cache_read_input_tokens")
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(0),
                    total_cost_usd: json
                        .get("total_cost_usd")
                        .and_then(serde_json::Value::as_f64)
                        .unwrap_or(0.0),
                };
                result.session = AgentSessionInfo {
                    id: json
                        .get("session_id")
                        .and_then(|s| s.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    model: json
                        .get("model")
                        .and_then(|s| s.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    turns: u32::try_from(
                        json.get("num_turns")
                            .and_then(serde_json::Value::as_u64)
                            .unwrap_or(0),
                    )
                    .unwrap_or(u32::MAX),
                    last_activity: Some(Utc::now()),
                };
                // The result record carries the final text when present
                if let Some(text) = json.get("result").and_then(|r| r.as_str()) {
                    if !text.is_empty() {
                        content.push_str(text);
                        content.push('\n');
                    }
                }
                true
            }
            _ => false,
        }
    }
}

fn extract_assistant_text(json: &serde_json::Value) -> Option<String> {
    // Either a flat content string or a message with content blocks
    if let Some(text) = json.get("content").and_then(|c| c.as_str()) {
        return Some(text.to_string());
    }
    let blocks = json.get("message")?.get("content")?.as_array()?;
    let text: String = blocks
        .iter()
        .filter_map(|b| {
            if b.get("type").and_then(|t| t.as_str()) == Some("text") {
                b.get("text").and_then(|t| t.as_str()).map(String::from)
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl AgentRunner for ClaudeCliRunner {
    fn name(&self) -> &'static str {
        "claude_cli"
    }

    async fn run(&self, request: AgentRequest) -> OrcResult<AgentResult> {
        let args = self.build_args(&request);

        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&args)
            .current_dir(&request.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &request.context {
            cmd.env(format!("ORC_{}", key.to_uppercase()), value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| OrcError::AgentError(format!("failed to spawn {}: {e}", self.config.binary)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrcError::AgentError("failed to capture agent stdout".into()))?;

        let task_id = request.task_id.clone();
        let phase = request.phase.clone();
        let drain = async move {
            let mut content = String::new();
            let mut result = AgentResult::default();
            let mut lines = BufReader::new(stdout).lines();
            let mut saw_result = false;

            while let Ok(Some(line)) = lines.next_line().await {
                if Self::fold_line(&line, &mut content, &mut result) {
                    saw_result = true;
                }
            }

            let status = child
                .wait()
                .await
                .map_err(|e| OrcError::AgentError(format!("agent wait failed: {e}")))?;

            if !status.success() {
                return Err(OrcError::AgentError(format!(
                    "agent exited with {status} for {task_id}/{phase}"
                )));
            }
            if !saw_result {
                warn!(task_id, phase, "agent stream ended without a result record");
            }

            result.content = content;
            Ok(result)
        };

        let result = match request.timeout {
            Some(timeout) => tokio::time::timeout(timeout, drain)
                .await
                .map_err(|_| OrcError::AgentError("agent call timed out".into()))?,
            None => drain.await,
        }?;

        debug!(
            task_id = request.task_id,
            phase = request.phase,
            input_tokens = result.usage.input_tokens,
            output_tokens = result.usage.output_tokens,
            cost_usd = result.usage.total_cost_usd,
            "Agent run finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request() -> AgentRequest {
        AgentRequest {
            task_id: "TASK-001".into(),
            phase: "implement".into(),
            prompt: "do it".into(),
            context: std::collections::HashMap::new(),
            working_dir: PathBuf::from("."),
            session: Some("sess-9".into()),
            timeout: None,
        }
    }

    #[test]
    fn test_build_args_resume_and_prompt() {
        let runner = ClaudeCliRunner::new(ClaudeCliConfig::default());
        let args = runner.build_args(&request());
        assert!(args.contains(&"--print".to_string()));
        assert!(args.contains(&"--resume".to_string()));
        assert!(args.contains(&"sess-9".to_string()));
        assert_eq!(args.last().unwrap(), "do it");
    }

    #[test]
    fn test_fold_result_line() {
        let mut content = String::new();
        let mut result = AgentResult::default();

        let done = ClaudeCliRunner::fold_line(
            r#"{"type":"result","result":"phase_complete=true","session_id":"s1","num_turns":4,"total_cost_usd":0.12,"usage":{"input_tokens":100,"output_tokens":40,"cache_read_input_tokens":10}}"#,
            &mut content,
            &mut result,
        );

        assert!(done);
        assert_eq!(result.usage.input_tokens, 100);
        assert_eq!(result.usage.cached_tokens, 10);
        assert!((result.usage.total_cost_usd - 0.12).abs() < 1e-9);
        assert_eq!(result.session.id, "s1");
        assert_eq!(result.session.turns, 4);
        assert!(content.contains("phase_complete=true"));
    }

    #[test]
    fn test_fold_assistant_blocks() {
        let mut content = String::new();
        let mut result = AgentResult::default();

        let done = ClaudeCliRunner::fold_line(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"working on it"}]}}"#,
            &mut content,
            &mut result,
        );
        assert!(!done);
        assert!(content.contains("working on it"));
    }
}
