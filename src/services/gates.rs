//! Gate application.
//!
//! After a phase completes, its gate decides what happens next: `auto`
//! proceeds, `human` parks the task, and `ai` asks a secondary agent to
//! judge the output. A failed AI judgement with severity at or above
//! High loops the phase back; anything milder proceeds.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::domain::errors::OrcResult;
use crate::domain::models::{Finding, GatePolicy, ReviewFindings, Severity};
use crate::domain::ports::{AgentRequest, AgentResult, AgentRunner};
use crate::services::prompts::{PromptBuilder, PromptContext};
use crate::services::review::extract_json_object;

/// Decision produced by a gate check.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// Move on to the next phase
    Proceed,
    /// Re-run the phase with the judge's issues as retry context
    LoopBack(ReviewFindings),
    /// Park the task for a human
    Blocked,
}

/// Gate check result; carries the judge run (when one happened) so the
/// engine can account its usage.
pub struct GateCheck {
    pub outcome: GateOutcome,
    pub judge: Option<AgentResult>,
}

#[derive(Deserialize)]
struct Verdict {
    pass: bool,
    #[serde(default)]
    issues: Vec<Finding>,
}

pub struct GateKeeper {
    runner: Arc<dyn AgentRunner>,
}

impl GateKeeper {
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self { runner }
    }

    pub async fn apply(
        &self,
        gate: GatePolicy,
        phase_id: &str,
        prompts: &PromptBuilder,
        ctx: &PromptContext<'_>,
        phase_output: &str,
    ) -> OrcResult<GateCheck> {
        match gate {
            GatePolicy::Auto => Ok(GateCheck {
                outcome: GateOutcome::Proceed,
                judge: None,
            }),
            GatePolicy::Human => Ok(GateCheck {
                outcome: GateOutcome::Blocked,
                judge: None,
            }),
            GatePolicy::Ai => {
                let request = AgentRequest {
                    task_id: ctx.task.id.clone(),
                    phase: format!("{phase_id}:gate"),
                    prompt: prompts.judge_prompt(phase_id, ctx, phase_output),
                    context: prompts.context_vars(phase_id, ctx),
                    working_dir: ctx.worktree.to_path_buf(),
                    session: None,
                    timeout: None,
                };
                let result = self.runner.run(request).await?;
                let outcome = Self::judge_outcome(phase_id, &result.content, ctx.iteration);
                Ok(GateCheck {
                    outcome,
                    judge: Some(result),
                })
            }
        }
    }

    fn judge_outcome(phase_id: &str, content: &str, round: u32) -> GateOutcome {
        let verdict = extract_json_object(content)
            .and_then(|json| serde_json::from_str::<Verdict>(json).ok());

        let Some(verdict) = verdict else {
            // An unreadable verdict cannot justify a loop-back
            tracing::warn!(phase_id, "AI gate verdict was unparseable; proceeding");
            return GateOutcome::Proceed;
        };

        if verdict.pass {
            return GateOutcome::Proceed;
        }

        let blocking = verdict
            .issues
            .iter()
            .any(|i| i.severity >= Severity::High || i.constitution_violation);
        if blocking {
            info!(phase_id, issues = verdict.issues.len(), "AI gate failed; looping back");
            GateOutcome::LoopBack(ReviewFindings {
                round,
                findings: verdict.issues,
                summary: format!("AI gate failed for phase {phase_id}"),
            })
        } else {
            GateOutcome::Proceed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_verdict_proceeds() {
        let outcome = GateKeeper::judge_outcome("implement", r#"{"pass": true, "issues": []}"#, 1);
        assert!(matches!(outcome, GateOutcome::Proceed));
    }

    #[test]
    fn test_fail_with_high_severity_loops_back() {
        let content = r#"{"pass": false, "issues": [
            {"title": "data loss", "severity": "high", "detail": "drops rows"}
        ]}"#;
        let outcome = GateKeeper::judge_outcome("implement", content, 2);
        match outcome {
            GateOutcome::LoopBack(findings) => {
                assert_eq!(findings.round, 2);
                assert_eq!(findings.findings.len(), 1);
            }
            other => panic!("expected loop back, got {other:?}"),
        }
    }

    #[test]
    fn test_fail_with_only_low_severity_proceeds() {
        let content = r#"{"pass": false, "issues": [
            {"title": "nit", "severity": "low", "detail": "rename"}
        ]}"#;
        let outcome = GateKeeper::judge_outcome("implement", content, 1);
        assert!(matches!(outcome, GateOutcome::Proceed));
    }

    #[test]
    fn test_unparseable_verdict_proceeds() {
        let outcome = GateKeeper::judge_outcome("implement", "looks good to me", 1);
        assert!(matches!(outcome, GateOutcome::Proceed));
    }
}
