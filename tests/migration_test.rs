//! Legacy plan migration, end to end: a persisted inline-prompt plan is
//! rewritten against the current catalogue on first touch, preserving
//! completed work.

mod common;

use orc::adapters::runner::ScriptedRun;
use orc::domain::models::{
    GatePolicy, PhaseCompletionStatus, Plan, PlanPhase, Task, TaskStatus, Weight,
};
use orc::domain::ports::{PlanStore, TaskStore};
use orc::services::{RunOptions, RunOutcome};
use proptest::prelude::*;

use common::{engine_fixture, git_repo, EngineOptions};

fn legacy_plan(task_id: &str) -> Plan {
    let mut plan = Plan::new(
        task_id,
        vec![
            PlanPhase::new("implement", "Implement", GatePolicy::Auto),
            PlanPhase::new("test", "Test", GatePolicy::Auto),
        ],
    );
    plan.version = 1;
    plan.phases[0].status = PhaseCompletionStatus::Completed;
    plan.phases[0].commit = Some("c0ffee00".to_string());
    plan.phases[0].iterations = 1;
    plan.phases[0].prompt = Some("You are an implementation agent. Do the thing.".to_string());
    plan.phases[1].prompt = Some("You are a test agent.".to_string());
    plan
}

#[tokio::test]
async fn test_legacy_plan_migrates_and_run_completes() {
    let (_guard, root) = git_repo();
    let fixture = engine_fixture(&root, EngineOptions::default()).await;

    let mut task = Task::new("TASK-003", "ported task", Weight::Small);
    task.branch = "orc/TASK-003".to_string();
    fixture.store.save_task(&task).await.unwrap();
    fixture.store.save_plan(&legacy_plan("TASK-003")).await.unwrap();

    // Only the phases the migrated plan still owes get agent runs:
    // tiny_spec and review; implement is already done.
    fixture.runner.push(
        ScriptedRun::completing("phase_complete=true").with_file("SPEC.md", "spec"),
    );
    fixture
        .runner
        .push(ScriptedRun::completing(r#"{"findings": [], "summary": "clean"}"#));

    let outcome = fixture
        .engine
        .run("TASK-003", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(fixture.runner.request_count(), 2);

    let plan = fixture.store.load_plan("TASK-003").await.unwrap().unwrap();
    assert_eq!(plan.phase_ids(), vec!["tiny_spec", "implement", "review"]);
    assert!(!plan.has_inline_prompts(), "inline prompts are discarded");

    // implement kept its original commit through the migration
    let implement = plan.phase("implement").unwrap();
    assert_eq!(implement.status, PhaseCompletionStatus::Completed);
    assert_eq!(implement.commit.as_deref(), Some("c0ffee00"));
    assert_eq!(implement.iterations, 1);

    // The dropped legacy phase is gone
    assert!(plan.phase("test").is_none());

    let task = fixture.store.load_task("TASK-003").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

proptest! {
    /// Migration is stable: migrating a migrated plan changes nothing.
    #[test]
    fn prop_migration_idempotent(
        completed in proptest::collection::vec(any::<bool>(), 1..6),
        weight_index in 0usize..5,
    ) {
        use orc::domain::models::config::GatesConfig;
        use orc::services::PlanResolver;

        let weights = [
            Weight::Trivial,
            Weight::Small,
            Weight::Medium,
            Weight::Large,
            Weight::Greenfield,
        ];
        let task = Task::new("TASK-P", "prop", weights[weight_index]);
        let resolver = PlanResolver::new(GatesConfig::default(), Default::default());

        // Synthesize an arbitrary legacy plan over a fixed phase pool
        let pool = ["implement", "test", "spec", "review", "docs", "lint"];
        let phases: Vec<PlanPhase> = completed
            .iter()
            .enumerate()
            .map(|(i, done)| {
                let mut phase = PlanPhase::new(pool[i], pool[i], GatePolicy::Auto);
                if *done {
                    phase.status = PhaseCompletionStatus::Completed;
                    phase.commit = Some(format!("commit-{i}"));
                    phase.iterations = 1;
                }
                phase.prompt = Some("legacy".to_string());
                phase
            })
            .collect();
        let mut legacy = Plan::new("TASK-P", phases);
        legacy.version = 1;

        let once = resolver.migrate(&legacy, &task).unwrap();
        let twice = resolver.migrate(&once, &task).unwrap();
        prop_assert_eq!(&once.phases, &twice.phases);
        prop_assert_eq!(once.version, twice.version);
    }
}
