//! Scripted agent runner for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::AgentSessionInfo;
use crate::domain::ports::{AgentRequest, AgentResult, AgentRunner, UsageStats};

/// One scripted step: optionally write a file into the worktree, then
/// return the canned content.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub content: String,
    /// (relative path, file content) written before returning
    pub write_file: Option<(String, String)>,
    pub cost_usd: f64,
}

impl ScriptedRun {
    pub fn completing(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            write_file: None,
            cost_usd: 0.01,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, body: impl Into<String>) -> Self {
        self.write_file = Some((path.into(), body.into()));
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }
}

/// Runner that replays a fixed script and records every request.
#[derive(Default)]
pub struct MockRunner {
    script: Mutex<VecDeque<ScriptedRun>>,
    pub requests: Mutex<Vec<AgentRequest>>,
}

impl MockRunner {
    pub fn new(script: Vec<ScriptedRun>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, run: ScriptedRun) {
        self.script.lock().unwrap().push_back(run);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl AgentRunner for MockRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, request: AgentRequest) -> OrcResult<AgentResult> {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| OrcError::AgentError("mock script exhausted".into()))?;

        if let Some((path, body)) = &step.write_file {
            let target = request.working_dir.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| OrcError::AgentError(e.to_string()))?;
            }
            tokio::fs::write(&target, body)
                .await
                .map_err(|e| OrcError::AgentError(e.to_string()))?;
        }

        self.requests.lock().unwrap().push(request.clone());

        Ok(AgentResult {
            content: step.content,
            usage: UsageStats {
                input_tokens: 100,
                output_tokens: 50,
                cached_tokens: 10,
                total_cost_usd: step.cost_usd,
            },
            session: AgentSessionInfo {
                id: "mock-session".into(),
                model: "mock".into(),
                turns: 1,
                last_activity: Some(Utc::now()),
            },
        })
    }
}
