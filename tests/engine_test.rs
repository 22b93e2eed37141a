//! End-to-end engine runs against a real git repository with a scripted
//! agent runner.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use orc::adapters::runner::{MockRunner, ScriptedRun};
use orc::domain::errors::{OrcError, OrcResult};
use orc::domain::models::{PhaseCompletionStatus, Task, TaskStatus, Weight};
use orc::domain::ports::{
    AgentRequest, AgentResult, AgentRunner, PlanStore, TaskStore, WorktreeStore,
};
use orc::services::{EngineConfig, InterruptController, RunOptions, RunOutcome};

use common::{commits_ahead_of_main, engine_fixture, git_repo, EngineOptions};

fn small_task() -> Task {
    let mut task = Task::new("TASK-001", "add retry logic", Weight::Small);
    task.branch = "orc/TASK-001".to_string();
    task
}

const CLEAN_REVIEW: &str = r#"{"findings": [], "summary": "clean"}"#;

#[tokio::test]
async fn test_happy_path_small_task() {
    let (_guard, root) = git_repo();
    let fixture = engine_fixture(&root, EngineOptions::default()).await;
    fixture.store.save_task(&small_task()).await.unwrap();

    fixture.runner.push(
        ScriptedRun::completing("spec text\nphase_complete=true")
            .with_file("SPEC.md", "the spec"),
    );
    fixture.runner.push(
        ScriptedRun::completing("done\nphase_complete=true").with_file("src.rs", "fn main() {}"),
    );
    fixture.runner.push(ScriptedRun::completing(CLEAN_REVIEW));

    let outcome = fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let task = fixture.store.load_task("TASK-001").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.completed_at.is_some());
    assert!(!task.is_claimed(), "claim released after the run");
    assert!(task.execution.cost_usd > 0.0);

    // Every phase completed with a commit recorded
    let plan = fixture.store.load_plan("TASK-001").await.unwrap().unwrap();
    assert_eq!(plan.phase_ids(), vec!["tiny_spec", "implement", "review"]);
    for phase in &plan.phases {
        assert_eq!(phase.status, PhaseCompletionStatus::Completed);
        assert!(phase.commit.as_deref().is_some_and(|c| !c.is_empty()));
    }

    // The two file-writing phases produced commits on the task branch
    assert_eq!(commits_ahead_of_main(&root, "orc/TASK-001"), 2);

    // Worktree run record points at the managed checkout
    let run = fixture
        .store
        .load_worktree_run("TASK-001")
        .await
        .unwrap()
        .unwrap();
    assert!(run.path.contains("orc-TASK-001"));

    // Re-running a completed task is a no-op that consumes no script
    let outcome = fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::NoOp);
    assert_eq!(fixture.runner.request_count(), 3);
}

#[tokio::test]
async fn test_blocked_phase_then_resume() {
    let (_guard, root) = git_repo();
    let fixture = engine_fixture(&root, EngineOptions::default()).await;
    fixture.store.save_task(&small_task()).await.unwrap();

    fixture.runner.push(
        ScriptedRun::completing("phase_complete=true").with_file("SPEC.md", "the spec"),
    );
    fixture
        .runner
        .push(ScriptedRun::completing("phase_blocked=missing API credentials"));

    let outcome = fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap();
    match outcome {
        RunOutcome::Blocked(reason) => assert!(reason.contains("missing API credentials")),
        other => panic!("expected blocked, got {other:?}"),
    }

    let task = fixture.store.load_task("TASK-001").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Blocked);
    assert!(!task.is_claimed());
    let spec_iterations = task.execution.phases["tiny_spec"].iterations;
    assert_eq!(spec_iterations, 1);

    // Resume: implement succeeds this time, review is clean
    fixture.runner.push(
        ScriptedRun::completing("phase_complete=true").with_file("src.rs", "fn main() {}"),
    );
    fixture.runner.push(ScriptedRun::completing(CLEAN_REVIEW));

    let outcome = fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let task = fixture.store.load_task("TASK-001").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    // tiny_spec was not re-run on resume
    assert_eq!(task.execution.phases["tiny_spec"].iterations, 1);
}

#[tokio::test]
async fn test_iteration_cap_fails_task() {
    let (_guard, root) = git_repo();
    let options = EngineOptions {
        config: EngineConfig {
            max_iterations: 2,
            ..EngineConfig::default()
        },
        ..EngineOptions::default()
    };
    let fixture = engine_fixture(&root, options).await;

    let mut task = small_task();
    task.weight = Weight::Trivial; // tiny_spec -> implement
    fixture.store.save_task(&task).await.unwrap();

    fixture
        .runner
        .push(ScriptedRun::completing("phase_complete=true").with_file("SPEC.md", "s"));
    // implement never emits a signal: two iterations, then the cap
    fixture.runner.push(ScriptedRun::completing("working..."));
    fixture.runner.push(ScriptedRun::completing("still working..."));

    let err = fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrcError::IterationCapExceeded { .. }));

    let task = fixture.store.load_task("TASK-001").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.metadata.contains_key("error"));
    assert!(!task.is_claimed(), "claim released on the failure path");
}

#[tokio::test]
async fn test_one_below_cap_succeeds() {
    let (_guard, root) = git_repo();
    let options = EngineOptions {
        config: EngineConfig {
            max_iterations: 2,
            ..EngineConfig::default()
        },
        ..EngineOptions::default()
    };
    let fixture = engine_fixture(&root, options).await;

    let mut task = small_task();
    task.weight = Weight::Trivial;
    fixture.store.save_task(&task).await.unwrap();

    fixture
        .runner
        .push(ScriptedRun::completing("phase_complete=true").with_file("SPEC.md", "s"));
    // First implement attempt has no signal, second succeeds: exactly the cap
    fixture.runner.push(ScriptedRun::completing("working..."));
    fixture
        .runner
        .push(ScriptedRun::completing("phase_complete=true").with_file("src.rs", "x"));

    let outcome = fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let task = fixture.store.load_task("TASK-001").await.unwrap().unwrap();
    assert_eq!(task.execution.phases["implement"].iterations, 2);
}

#[tokio::test]
async fn test_review_loop_fixes_then_completes() {
    let (_guard, root) = git_repo();
    let fixture = engine_fixture(&root, EngineOptions::default()).await;
    fixture.store.save_task(&small_task()).await.unwrap();

    fixture
        .runner
        .push(ScriptedRun::completing("phase_complete=true").with_file("SPEC.md", "s"));
    fixture
        .runner
        .push(ScriptedRun::completing("phase_complete=true").with_file("src.rs", "v1"));
    // Round 1 finds a high-severity problem, the fix pass addresses it,
    // round 2 is clean
    fixture.runner.push(ScriptedRun::completing(
        r#"{"findings": [{"title": "drops errors", "severity": "high", "detail": "io result ignored"}], "summary": "one blocker"}"#,
    ));
    fixture.runner.push(
        ScriptedRun::completing("fixed\nphase_complete=true").with_file("src.rs", "v2"),
    );
    fixture.runner.push(ScriptedRun::completing(CLEAN_REVIEW));

    let outcome = fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let task = fixture.store.load_task("TASK-001").await.unwrap().unwrap();
    assert_eq!(task.execution.review_round, 2);

    // The fix pass produced an extra commit
    assert_eq!(commits_ahead_of_main(&root, "orc/TASK-001"), 3);

    // The persisted findings are the latest round's
    let prompts = fixture.runner.prompts();
    assert!(prompts.iter().any(|p| p.contains("drops errors")));
}

#[tokio::test]
async fn test_from_phase_resets_suffix() {
    let (_guard, root) = git_repo();
    let fixture = engine_fixture(&root, EngineOptions::default()).await;
    fixture.store.save_task(&small_task()).await.unwrap();

    for content in [
        ScriptedRun::completing("phase_complete=true").with_file("SPEC.md", "s"),
        ScriptedRun::completing("phase_complete=true").with_file("src.rs", "v1"),
        ScriptedRun::completing(CLEAN_REVIEW),
    ] {
        fixture.runner.push(content);
    }
    fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap();

    // Completed tasks never re-run, so reopen it first
    let mut task = fixture.store.load_task("TASK-001").await.unwrap().unwrap();
    task.status = TaskStatus::Planned;
    task.completed_at = None;
    fixture.store.save_task(&task).await.unwrap();

    fixture.runner.push(
        ScriptedRun::completing("phase_complete=true").with_file("src.rs", "v3"),
    );
    fixture.runner.push(ScriptedRun::completing(CLEAN_REVIEW));

    let outcome = fixture
        .engine
        .run(
            "TASK-001",
            RunOptions {
                force: false,
                from_phase: Some("implement".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let task = fixture.store.load_task("TASK-001").await.unwrap().unwrap();
    // tiny_spec kept its single run; implement ran again from scratch
    assert_eq!(task.execution.phases["tiny_spec"].iterations, 1);
    assert_eq!(task.execution.phases["implement"].iterations, 1);
    assert_eq!(fixture.runner.request_count(), 5);
}

#[tokio::test]
async fn test_blocker_dependencies_park_the_task() {
    let (_guard, root) = git_repo();
    let fixture = engine_fixture(&root, EngineOptions::default()).await;

    let mut dep = Task::new("TASK-000", "upstream", Weight::Trivial);
    dep.branch = "orc/TASK-000".into();
    fixture.store.save_task(&dep).await.unwrap();

    let mut task = small_task();
    task.blocked_by = vec!["TASK-000".into()];
    fixture.store.save_task(&task).await.unwrap();

    let outcome = fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap();
    match outcome {
        RunOutcome::Blocked(reason) => assert!(reason.contains("TASK-000")),
        other => panic!("expected blocked, got {other:?}"),
    }
    assert_eq!(fixture.runner.request_count(), 0, "no agent work was spent");
}

/// Delegating runner that raises the interrupt flag after its first
/// completed call, simulating Ctrl-C between phases.
struct InterruptAfterFirst {
    inner: Arc<MockRunner>,
    interrupts: Arc<InterruptController>,
    calls: AtomicUsize,
}

#[async_trait]
impl AgentRunner for InterruptAfterFirst {
    fn name(&self) -> &'static str {
        "interrupt-after-first"
    }

    async fn run(&self, request: AgentRequest) -> OrcResult<AgentResult> {
        let result = self.inner.run(request).await;
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.interrupts.trigger();
        }
        result
    }
}

#[tokio::test]
async fn test_interrupt_between_phases_parks_the_task() {
    let (_guard, root) = git_repo();

    let inner = Arc::new(MockRunner::default());
    let interrupts = InterruptController::new();
    let wrapped: Arc<dyn AgentRunner> = Arc::new(InterruptAfterFirst {
        inner: inner.clone(),
        interrupts: interrupts.clone(),
        calls: AtomicUsize::new(0),
    });

    // The engine must poll the same controller the runner flips, so the
    // fixture is built around this pair.
    let fixture = engine_fixture(
        &root,
        EngineOptions {
            runner_override: Some(wrapped),
            interrupts_override: Some(interrupts),
            ..EngineOptions::default()
        },
    )
    .await;

    fixture.store.save_task(&small_task()).await.unwrap();
    inner.push(ScriptedRun::completing("phase_complete=true").with_file("SPEC.md", "s"));

    let outcome = fixture
        .engine
        .run("TASK-001", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Blocked("interrupted".into()));

    let task = fixture.store.load_task("TASK-001").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Blocked);
    assert!(task.execution.interrupted);
    assert!(!task.is_claimed());
    // The finished phase stays completed; the next one is pending and
    // marked interrupted
    assert_eq!(
        task.execution.phases["tiny_spec"].status,
        PhaseCompletionStatus::Completed
    );
    assert!(task.execution.phases["implement"].interrupted);
    assert_eq!(
        task.execution.phases["implement"].status,
        PhaseCompletionStatus::Pending
    );
}
