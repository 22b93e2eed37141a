//! Prompt assembly for phase execution.
//!
//! Each phase has a builtin template; the builder fills it with task
//! context, prior phase outputs, retry context, and the project
//! constitution, then appends the completion protocol the engine parses
//! for (`phase_complete` / `phase_blocked`).

use std::collections::HashMap;
use std::path::Path;

use crate::domain::models::{ReviewFindings, Task};

const COMPLETION_PROTOCOL: &str = "\
When the phase goal is met, emit a line `phase_complete=true`.
If you cannot proceed without intervention, emit `phase_blocked=<reason>` instead.";

fn phase_goal(phase_id: &str) -> &'static str {
    match phase_id {
        "tiny_spec" => "Write a short specification for this task: intended behavior, edge cases, and acceptance criteria. Keep it tight; this is a small change.",
        "spec" => "Write a full specification for this task: scope, behavior, data shapes, edge cases, error handling, and acceptance criteria.",
        "research" => "Survey the existing code and external constraints relevant to this task. Produce findings that later phases can build on. Do not modify code.",
        "tdd_write" => "Write failing tests that pin down the specified behavior before any implementation exists.",
        "breakdown" => "Break the implementation into an ordered checklist of concrete steps, each independently verifiable.",
        "implement" => "Implement the specified behavior. Make the tests pass. Follow the existing code style.",
        "review" => "Review the changes on this branch against the specification and the constitution.",
        "docs" => "Update documentation affected by this change: doc comments, README sections, changelogs.",
        "validate" => "Run the full verification available in this repository and fix anything it surfaces.",
        _ => "Carry out this phase of the task.",
    }
}

/// Everything a phase prompt draws from.
pub struct PromptContext<'a> {
    pub task: &'a Task,
    pub iteration: u32,
    pub retry_context: Option<&'a str>,
    pub worktree: &'a Path,
    pub branch: &'a str,
    pub target_branch: &'a str,
    /// (phase id, content) of outputs from earlier phases
    pub previous_outputs: &'a [(String, String)],
}

pub struct PromptBuilder {
    constitution: Option<String>,
}

impl PromptBuilder {
    pub fn new(constitution: Option<String>) -> Self {
        Self { constitution }
    }

    /// Variable map exposed to the agent environment alongside the prompt.
    pub fn context_vars(&self, phase_id: &str, ctx: &PromptContext<'_>) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("task_id".to_string(), ctx.task.id.clone());
        vars.insert("phase".to_string(), phase_id.to_string());
        vars.insert("weight".to_string(), ctx.task.weight.as_str().to_string());
        vars.insert("iteration".to_string(), ctx.iteration.to_string());
        vars.insert("branch".to_string(), ctx.branch.to_string());
        vars.insert("target_branch".to_string(), ctx.target_branch.to_string());
        vars.insert(
            "worktree".to_string(),
            ctx.worktree.to_string_lossy().into_owned(),
        );
        vars
    }

    /// The full prompt for one phase attempt.
    pub fn phase_prompt(&self, phase_id: &str, ctx: &PromptContext<'_>) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "# Task {}: {}\n\nPhase: {} (iteration {})\nWeight: {}\nBranch: {} (target: {})\nWorktree: {}\n",
            ctx.task.id,
            ctx.task.title,
            phase_id,
            ctx.iteration,
            ctx.task.weight.as_str(),
            ctx.branch,
            ctx.target_branch,
            ctx.worktree.display(),
        ));

        if !ctx.task.description.is_empty() {
            prompt.push_str(&format!("\n## Description\n{}\n", ctx.task.description));
        }

        prompt.push_str(&format!("\n## Goal\n{}\n", phase_goal(phase_id)));

        for (phase, content) in ctx.previous_outputs {
            prompt.push_str(&format!("\n## Output of earlier phase `{phase}`\n{content}\n"));
        }

        if let Some(constitution) = &self.constitution {
            prompt.push_str(&format!("\n## Project constitution\n{constitution}\n"));
        }

        if let Some(retry) = ctx.retry_context {
            prompt.push_str(&format!(
                "\n## Previous attempt failed\n{retry}\nAddress the failure before anything else.\n"
            ));
        }

        prompt.push_str(&format!("\n{COMPLETION_PROTOCOL}\n"));
        prompt
    }

    /// Prompt for the AI gate judge. The judge returns a JSON verdict.
    pub fn judge_prompt(&self, phase_id: &str, ctx: &PromptContext<'_>, output: &str) -> String {
        format!(
            "You are reviewing the output of phase `{phase_id}` for task {} ({}).\n\
             Judge whether the phase met its goal: {}\n\n\
             ## Phase output\n{output}\n\n\
             Respond with a single JSON object: {{\"pass\": bool, \"issues\": \
             [{{\"title\": str, \"severity\": \"low\"|\"medium\"|\"high\"|\"critical\", \
             \"detail\": str}}]}}",
            ctx.task.id,
            ctx.task.title,
            phase_goal(phase_id),
        )
    }

    /// Prompt for a review finding pass.
    pub fn review_prompt(&self, ctx: &PromptContext<'_>, round: u32) -> String {
        let mut prompt = format!(
            "Review round {round} for task {} ({}) on branch {}.\n\
             Inspect the diff against {} and report findings.\n",
            ctx.task.id, ctx.task.title, ctx.branch, ctx.target_branch,
        );
        if let Some(constitution) = &self.constitution {
            prompt.push_str(&format!(
                "\nFlag violations of the project constitution:\n{constitution}\n"
            ));
        }
        prompt.push_str(
            "\nRespond with a single JSON object: {\"findings\": [{\"title\": str, \
             \"severity\": \"low\"|\"medium\"|\"high\"|\"critical\", \"file\": str?, \
             \"detail\": str, \"constitution_violation\": bool}], \"summary\": str}\n",
        );
        prompt.push_str(&format!("\n{COMPLETION_PROTOCOL}\n"));
        prompt
    }

    /// Prompt for the fixing half of a review round.
    pub fn fix_prompt(&self, ctx: &PromptContext<'_>, findings: &ReviewFindings) -> String {
        let mut prompt = format!(
            "Address the review findings below for task {} ({}).\n",
            ctx.task.id, ctx.task.title,
        );
        for finding in &findings.findings {
            prompt.push_str(&format!(
                "- [{}]{} {}: {}\n",
                finding.severity.as_str(),
                if finding.constitution_violation {
                    " [constitution]"
                } else {
                    ""
                },
                finding.title,
                finding.detail,
            ));
        }
        prompt.push_str(&format!("\n{COMPLETION_PROTOCOL}\n"));
        prompt
    }
}
