//! Dependency resolution and wave planning
//!
//! Jobs form a directed acyclic graph through their `needs` lists.
//! The planner repeatedly collects every unplaced job whose
//! dependencies are all placed; each such set is one wave. Jobs in a
//! wave have no dependency relationship and may run concurrently;
//! waves execute strictly in order. When no job can be placed while
//! unplaced jobs remain, the remainder is mutually blocked and the
//! whole plan is rejected.

use crate::pipeline::{DefinitionError, PipelineDefinition};
use std::collections::HashSet;

/// A planned execution order: waves of concurrently runnable jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    waves: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// The waves, in execution order. Definition order is preserved
    /// within each wave.
    #[must_use]
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Index of the wave containing the given job
    #[must_use]
    pub fn wave_of(&self, job: &str) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|j| j == job))
    }

    /// Total number of planned jobs
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }
}

/// Computes the execution plan for a definition.
///
/// # Errors
///
/// Returns [`DefinitionError::CyclicDependency`] listing the jobs
/// that could not be placed. No job is scheduled in that case.
pub fn plan(definition: &PipelineDefinition) -> Result<ExecutionPlan, DefinitionError> {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut waves: Vec<Vec<String>> = Vec::new();

    while placed.len() < definition.jobs.len() {
        let ready: Vec<&str> = definition
            .jobs
            .iter()
            .filter(|job| {
                !placed.contains(job.id.as_str())
                    && job.needs.iter().all(|need| placed.contains(need.as_str()))
            })
            .map(|job| job.id.as_str())
            .collect();

        if ready.is_empty() {
            let unresolved: Vec<String> = definition
                .jobs
                .iter()
                .filter(|job| !placed.contains(job.id.as_str()))
                .map(|job| job.id.clone())
                .collect();
            return Err(DefinitionError::CyclicDependency { unresolved });
        }

        placed.extend(ready.iter().copied());
        waves.push(ready.into_iter().map(String::from).collect());
    }

    tracing::debug!(waves = waves.len(), jobs = placed.len(), "execution plan computed");

    Ok(ExecutionPlan { waves })
}

/// Transitive dependents of the given root jobs, roots excluded.
///
/// Used to propagate skips: when a job fails or is cancelled, its
/// whole downstream closure is marked skipped without executing.
#[must_use]
pub fn downstream_closure(definition: &PipelineDefinition, roots: &[String]) -> HashSet<String> {
    let mut closure: HashSet<String> = HashSet::new();
    let mut frontier: Vec<&str> = roots.iter().map(String::as_str).collect();

    while let Some(current) = frontier.pop() {
        for job in &definition.jobs {
            if job.needs.iter().any(|need| need == current) && closure.insert(job.id.clone()) {
                frontier.push(job.id.as_str());
            }
        }
    }

    closure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Job, Step, Trigger};
    use proptest::prelude::*;

    fn definition(jobs: Vec<Job>) -> PipelineDefinition {
        PipelineDefinition {
            name: None,
            on: Trigger::default(),
            jobs,
        }
    }

    fn job(id: &str, needs: &[&str]) -> Job {
        let mut job = Job::new(id, vec![Step::run("true")]);
        job.needs = needs.iter().map(|n| (*n).to_string()).collect();
        job
    }

    #[test]
    fn test_linear_chain_one_job_per_wave() {
        let def = definition(vec![
            job("checkout", &[]),
            job("test", &["checkout"]),
            job("publish", &["test"]),
        ]);
        let plan = plan(&def).unwrap();
        assert_eq!(
            plan.waves(),
            &[
                vec!["checkout".to_string()],
                vec!["test".to_string()],
                vec!["publish".to_string()],
            ]
        );
    }

    #[test]
    fn test_independent_jobs_share_a_wave() {
        let def = definition(vec![
            job("lint", &[]),
            job("build", &[]),
            job("package", &["lint", "build"]),
        ]);
        let plan = plan(&def).unwrap();
        assert_eq!(plan.waves().len(), 2);
        assert_eq!(plan.waves()[0], vec!["lint", "build"]);
        assert_eq!(plan.wave_of("package"), Some(1));
    }

    #[test]
    fn test_diamond_graph() {
        let def = definition(vec![
            job("a", &[]),
            job("b", &["a"]),
            job("c", &["a"]),
            job("d", &["b", "c"]),
        ]);
        let plan = plan(&def).unwrap();
        assert_eq!(plan.waves().len(), 3);
        assert_eq!(plan.wave_of("a"), Some(0));
        assert_eq!(plan.wave_of("b"), Some(1));
        assert_eq!(plan.wave_of("c"), Some(1));
        assert_eq!(plan.wave_of("d"), Some(2));
    }

    #[test]
    fn test_cycle_rejected_with_unresolved_set() {
        let def = definition(vec![
            job("ok", &[]),
            job("a", &["b"]),
            job("b", &["a"]),
        ]);
        let err = plan(&def).unwrap_err();
        match err {
            DefinitionError::CyclicDependency { unresolved } => {
                assert_eq!(unresolved, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_downstream_closure() {
        let def = definition(vec![
            job("a", &[]),
            job("b", &["a"]),
            job("c", &["b"]),
            job("d", &[]),
        ]);
        let closure = downstream_closure(&def, &["a".to_string()]);
        assert_eq!(closure.len(), 2);
        assert!(closure.contains("b"));
        assert!(closure.contains("c"));
        assert!(!closure.contains("d"));
    }

    #[test]
    fn test_downstream_closure_excludes_roots() {
        let def = definition(vec![job("a", &[]), job("b", &["a"])]);
        let closure = downstream_closure(&def, &["a".to_string()]);
        assert!(!closure.contains("a"));
    }

    // Arbitrary acyclic definitions: job i may only depend on jobs
    // with a smaller index.
    fn acyclic_definition() -> impl Strategy<Value = PipelineDefinition> {
        prop::collection::vec(prop::collection::vec(0usize..12, 0..4), 1..12).prop_map(
            |needs_lists| {
                let jobs = needs_lists
                    .iter()
                    .enumerate()
                    .map(|(i, raw)| {
                        let mut needs: Vec<String> = raw
                            .iter()
                            .filter_map(|&n| (i > 0).then(|| format!("job{}", n % i)))
                            .collect();
                        needs.sort();
                        needs.dedup();
                        let mut job = Job::new(format!("job{i}"), vec![Step::run("true")]);
                        job.needs = needs;
                        job
                    })
                    .collect();
                definition(jobs)
            },
        )
    }

    proptest! {
        #[test]
        fn prop_every_job_in_exactly_one_wave(def in acyclic_definition()) {
            let plan = plan(&def).unwrap();
            prop_assert_eq!(plan.job_count(), def.jobs.len());
            for job in &def.jobs {
                let occurrences: usize = plan
                    .waves()
                    .iter()
                    .map(|wave| wave.iter().filter(|j| **j == job.id).count())
                    .sum();
                prop_assert_eq!(occurrences, 1);
            }
        }

        #[test]
        fn prop_waves_respect_dependencies(def in acyclic_definition()) {
            let plan = plan(&def).unwrap();
            for job in &def.jobs {
                let wave = plan.wave_of(&job.id).unwrap();
                for need in &job.needs {
                    let need_wave = plan.wave_of(need).unwrap();
                    prop_assert!(need_wave < wave);
                }
            }
        }

        #[test]
        fn prop_cycle_always_detected(def in acyclic_definition(), extra in 0usize..12) {
            // Adding a mutual dependency between the first job and any
            // later job makes the graph cyclic.
            let mut def = def;
            prop_assume!(def.jobs.len() >= 2);
            let target_idx = 1 + extra % (def.jobs.len() - 1);
            let target = format!("job{target_idx}");
            def.jobs[0].needs.push(target);
            def.jobs[target_idx].needs.push("job0".to_string());
            prop_assert!(
                matches!(
                    plan(&def),
                    Err(DefinitionError::CyclicDependency { .. })
                ),
                "expected CyclicDependency error"
            );
        }
    }
}
