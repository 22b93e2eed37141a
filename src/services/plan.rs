//! Plan resolution and migration.
//!
//! Plans are derived data: the resolver recomputes the phase list from
//! the task's workflow (when set) or its weight, and migrates stale
//! persisted plans against the current catalogue while preserving
//! completed work.

use std::collections::HashMap;

use tracing::info;

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::config::GatesConfig;
use crate::domain::models::{
    PhaseCompletionStatus, Plan, PlanPhase, Task, Weight, PLAN_VERSION,
};

/// Builtin phase sequences by weight.
fn weight_sequence(weight: Weight) -> &'static [&'static str] {
    match weight {
        Weight::Trivial => &["tiny_spec", "implement"],
        Weight::Small => &["tiny_spec", "implement", "review"],
        Weight::Medium => &["spec", "tdd_write", "implement", "review", "docs"],
        Weight::Large => &[
            "spec",
            "tdd_write",
            "breakdown",
            "implement",
            "review",
            "docs",
            "validate",
        ],
        Weight::Greenfield => &[
            "research",
            "spec",
            "tdd_write",
            "breakdown",
            "implement",
            "review",
            "docs",
            "validate",
        ],
    }
}

/// Display name for a builtin phase id.
pub fn phase_display_name(id: &str) -> String {
    match id {
        "tiny_spec" => "Tiny spec".to_string(),
        "spec" => "Specification".to_string(),
        "research" => "Research".to_string(),
        "tdd_write" => "Write tests".to_string(),
        "breakdown" => "Breakdown".to_string(),
        "implement" => "Implement".to_string(),
        "review" => "Review".to_string(),
        "docs" => "Documentation".to_string(),
        "validate" => "Validate".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        }
    }
}

/// Derives plans, detects staleness, and migrates legacy rows.
pub struct PlanResolver {
    gates: GatesConfig,
    /// Workflow id -> ordered phase ids
    workflows: HashMap<String, Vec<String>>,
}

impl PlanResolver {
    pub fn new(gates: GatesConfig, workflows: HashMap<String, Vec<String>>) -> Self {
        Self { gates, workflows }
    }

    /// Ordered phase ids for a task.
    pub fn phase_ids_for(&self, task: &Task) -> OrcResult<Vec<String>> {
        if let Some(workflow) = &task.workflow {
            return self
                .workflows
                .get(workflow)
                .cloned()
                .ok_or_else(|| {
                    OrcError::ValidationFailed(format!("unknown workflow '{workflow}'"))
                });
        }
        Ok(weight_sequence(task.weight)
            .iter()
            .map(|s| (*s).to_string())
            .collect())
    }

    /// Derive a fresh plan for a task from the current catalogue.
    pub fn derive(&self, task: &Task) -> OrcResult<Plan> {
        let phases = self
            .phase_ids_for(task)?
            .into_iter()
            .map(|id| {
                let gate = self.gates.effective(&id, None);
                let name = phase_display_name(&id);
                PlanPhase::new(id, name, gate)
            })
            .collect();
        Ok(Plan::new(&task.id, phases))
    }

    /// Staleness test: stored phase list differs from the derived list,
    /// any phase carries an inline prompt, or the version is old.
    pub fn is_stale(&self, stored: &Plan, task: &Task) -> OrcResult<bool> {
        if stored.version < PLAN_VERSION || stored.has_inline_prompts() {
            return Ok(true);
        }
        let derived = self.phase_ids_for(task)?;
        Ok(stored.phase_ids() != derived)
    }

    /// Rewrite a stale plan against the current catalogue. Completed
    /// phases that still exist keep their status, commit, and iteration
    /// count; everything else starts pending. Inline prompts are gone.
    pub fn migrate(&self, stored: &Plan, task: &Task) -> OrcResult<Plan> {
        let mut migrated = self.derive(task)?;
        for phase in &mut migrated.phases {
            if let Some(old) = stored.phase(&phase.id) {
                if old.status == PhaseCompletionStatus::Completed {
                    phase.status = PhaseCompletionStatus::Completed;
                    phase.commit = old.commit.clone();
                    phase.iterations = old.iterations;
                }
            }
        }
        // A preserved completion may sit after phases the new template
        // added before it; those still run, so only the structural
        // checks apply here. The completed-prefix invariant is restored
        // once the run finishes the earlier phases.
        let mut seen = std::collections::HashSet::new();
        for phase in &migrated.phases {
            if !seen.insert(phase.id.clone()) {
                return Err(OrcError::MigrationFailed {
                    task_id: task.id.clone(),
                    reason: format!("duplicate phase id '{}'", phase.id),
                });
            }
            if phase.is_completed() && phase.commit.as_deref().unwrap_or("").is_empty() {
                return Err(OrcError::MigrationFailed {
                    task_id: task.id.clone(),
                    reason: format!("completed phase '{}' lost its commit", phase.id),
                });
            }
        }
        info!(
            task_id = %task.id,
            from_version = stored.version,
            to_version = migrated.version,
            "Migrated stale plan"
        );
        Ok(migrated)
    }

    /// Resolve the plan for a run: create one if absent, migrate if
    /// stale, pass through otherwise. Returns the plan and whether it
    /// changed (and therefore needs persisting).
    pub fn resolve(&self, task: &Task, stored: Option<Plan>) -> OrcResult<(Plan, bool)> {
        match stored {
            None => Ok((self.derive(task)?, true)),
            Some(plan) => {
                if self.is_stale(&plan, task)? {
                    Ok((self.migrate(&plan, task)?, true))
                } else {
                    Ok((plan, false))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GatePolicy;

    fn resolver() -> PlanResolver {
        PlanResolver::new(GatesConfig::default(), HashMap::new())
    }

    fn task(weight: Weight) -> Task {
        Task::new("TASK-001", "demo", weight)
    }

    #[test]
    fn test_weight_sequences() {
        assert_eq!(weight_sequence(Weight::Trivial), &["tiny_spec", "implement"]);
        assert_eq!(
            weight_sequence(Weight::Small),
            &["tiny_spec", "implement", "review"]
        );
        assert_eq!(weight_sequence(Weight::Greenfield).len(), 8);
    }

    #[test]
    fn test_derive_from_weight() {
        let plan = resolver().derive(&task(Weight::Medium)).unwrap();
        assert_eq!(
            plan.phase_ids(),
            vec!["spec", "tdd_write", "implement", "review", "docs"]
        );
        assert_eq!(plan.version, PLAN_VERSION);
    }

    #[test]
    fn test_derive_from_workflow() {
        let mut workflows = HashMap::new();
        workflows.insert(
            "hotfix".to_string(),
            vec!["implement".to_string(), "validate".to_string()],
        );
        let resolver = PlanResolver::new(GatesConfig::default(), workflows);

        let mut t = task(Weight::Large);
        t.workflow = Some("hotfix".to_string());
        let plan = resolver.derive(&t).unwrap();
        assert_eq!(plan.phase_ids(), vec!["implement", "validate"]);

        t.workflow = Some("nope".to_string());
        assert!(resolver.derive(&t).is_err());
    }

    #[test]
    fn test_gate_override_applied_at_derivation() {
        let mut gates = GatesConfig::default();
        gates
            .phase_overrides
            .insert("review".to_string(), GatePolicy::Human);
        let resolver = PlanResolver::new(gates, HashMap::new());

        let plan = resolver.derive(&task(Weight::Small)).unwrap();
        assert_eq!(plan.phase("review").unwrap().gate, GatePolicy::Human);
        assert_eq!(plan.phase("implement").unwrap().gate, GatePolicy::Auto);
    }

    fn legacy_plan() -> Plan {
        let mut plan = Plan::new(
            "TASK-001",
            vec![
                PlanPhase::new("implement", "Implement", GatePolicy::Auto),
                PlanPhase::new("test", "Test", GatePolicy::Auto),
            ],
        );
        plan.version = 1;
        plan.phases[0].status = PhaseCompletionStatus::Completed;
        plan.phases[0].commit = Some("c0ffee".to_string());
        plan.phases[0].iterations = 2;
        plan.phases[0].prompt = Some("legacy inline prompt".to_string());
        plan
    }

    #[test]
    fn test_staleness_detection() {
        let resolver = resolver();
        let t = task(Weight::Small);

        assert!(resolver.is_stale(&legacy_plan(), &t).unwrap());

        let current = resolver.derive(&t).unwrap();
        assert!(!resolver.is_stale(&current, &t).unwrap());

        // Same phases but older version is still stale
        let mut old_version = current.clone();
        old_version.version = PLAN_VERSION - 1;
        assert!(resolver.is_stale(&old_version, &t).unwrap());
    }

    #[test]
    fn test_migration_preserves_completed_work() {
        let resolver = resolver();
        let t = task(Weight::Small);

        let migrated = resolver.migrate(&legacy_plan(), &t).unwrap();
        assert_eq!(migrated.phase_ids(), vec!["tiny_spec", "implement", "review"]);
        assert!(!migrated.has_inline_prompts());
        assert_eq!(migrated.version, PLAN_VERSION);

        // implement survived with its commit and iterations...
        let implement = migrated.phase("implement").unwrap();
        assert_eq!(implement.status, PhaseCompletionStatus::Completed);
        assert_eq!(implement.commit.as_deref(), Some("c0ffee"));
        assert_eq!(implement.iterations, 2);

        // ...but the dropped `test` phase is gone and new phases are pending
        assert!(migrated.phase("test").is_none());
        assert_eq!(
            migrated.phase("tiny_spec").unwrap().status,
            PhaseCompletionStatus::Pending
        );
    }

    #[test]
    fn test_migration_is_idempotent() {
        let resolver = resolver();
        let t = task(Weight::Small);

        let once = resolver.migrate(&legacy_plan(), &t).unwrap();
        let twice = resolver.migrate(&once, &t).unwrap();
        assert_eq!(once.phases, twice.phases);
        assert_eq!(once.version, twice.version);
    }

    #[test]
    fn test_resolve_creates_when_absent() {
        let resolver = resolver();
        let t = task(Weight::Trivial);

        let (plan, changed) = resolver.resolve(&t, None).unwrap();
        assert!(changed);
        assert_eq!(plan.phase_ids(), vec!["tiny_spec", "implement"]);

        let (_, changed) = resolver.resolve(&t, Some(plan)).unwrap();
        assert!(!changed, "a current plan passes through untouched");
    }
}
