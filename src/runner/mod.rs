//! Job execution
//!
//! The job runner executes one job's steps strictly in declared
//! order. The first step that fails ends the job: later steps are
//! never started and their outputs never exist. A fully successful
//! job exposes the union of its steps' outputs, with later steps
//! winning on key clashes.

use crate::executor::{JobContext, StepExecute};
use crate::pipeline::{tail_lines, Job, JobStatus, RunResult, StepFailure};
use std::collections::HashMap;
use std::time::SystemTime;

/// Number of stderr lines kept for the failure report
const STDERR_TAIL_LINES: usize = 10;

/// Runs jobs through a step executor
#[derive(Debug, Clone)]
pub struct JobRunner<E> {
    executor: E,
}

impl<E: StepExecute> JobRunner<E> {
    /// Creates a runner over the given executor
    #[must_use]
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Executes the job's steps in order and returns its terminal
    /// record. Never returns an error: every failure mode is folded
    /// into the result's status and reason.
    pub async fn run(&self, job: &Job, ctx: &JobContext) -> RunResult {
        let started_at = SystemTime::now();
        let mut outputs: HashMap<String, String> = HashMap::new();
        let mut failure: Option<(String, StepFailure, String)> = None;

        tracing::info!(job = %job.id, steps = job.steps.len(), "job starting");

        for step in &job.steps {
            let outcome = self.executor.execute(step, ctx).await;

            match outcome.failure {
                None => {
                    outputs.extend(outcome.outputs);
                }
                Some(reason) => {
                    failure = Some((
                        outcome.step,
                        reason,
                        tail_lines(&outcome.stderr, STDERR_TAIL_LINES),
                    ));
                    break;
                }
            }
        }

        let finished_at = SystemTime::now();

        match failure {
            None => {
                tracing::info!(job = %job.id, "job succeeded");
                RunResult {
                    job: job.id.clone(),
                    status: JobStatus::Succeeded,
                    failed_step: None,
                    reason: None,
                    stderr_tail: None,
                    outputs,
                    started_at,
                    finished_at,
                }
            }
            Some((step, reason, stderr_tail)) => {
                let status = if reason.is_cancellation() {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Failed
                };
                tracing::warn!(job = %job.id, step = %step, status = %status, "job did not succeed");
                RunResult {
                    job: job.id.clone(),
                    status,
                    failed_step: Some(step),
                    reason: Some(reason),
                    stderr_tail: Some(stderr_tail),
                    // Steps that never ran contribute nothing here;
                    // completed steps keep their outputs for the record.
                    outputs,
                    started_at,
                    finished_at,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StepExecutor;
    use crate::pipeline::{Step, StepOutcome};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    /// Executor fake: scripted outcomes, records execution order.
    struct FakeExecutor {
        executed: Arc<Mutex<Vec<String>>>,
        failing_step: Option<String>,
    }

    impl FakeExecutor {
        fn new() -> Self {
            Self {
                executed: Arc::new(Mutex::new(Vec::new())),
                failing_step: None,
            }
        }

        fn failing_at(step: &str) -> Self {
            Self {
                executed: Arc::new(Mutex::new(Vec::new())),
                failing_step: Some(step.to_string()),
            }
        }
    }

    #[async_trait]
    impl StepExecute for FakeExecutor {
        async fn execute(&self, step: &Step, _ctx: &JobContext) -> StepOutcome {
            let name = step.display_name().to_string();
            self.executed.lock().push(name.clone());

            if self.failing_step.as_deref() == Some(name.as_str()) {
                return StepOutcome::failed_before_start(
                    name,
                    StepFailure::ExecutionFault { code: 1 },
                );
            }

            let mut outputs = HashMap::new();
            for key in &step.outputs {
                outputs.insert(key.clone(), format!("value-of-{name}"));
            }
            StepOutcome {
                step: name,
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                outputs,
                duration: Duration::from_millis(1),
                failure: None,
            }
        }
    }

    fn job_with(steps: Vec<Step>) -> Job {
        Job::new("test-job", steps)
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let executor = FakeExecutor::new();
        let executed = executor.executed.clone();
        let runner = JobRunner::new(executor);

        let job = job_with(vec![
            Step::run("a").with_name("one"),
            Step::run("b").with_name("two"),
        ]);
        let result = runner.run(&job, &JobContext::new("test-job", "/tmp")).await;

        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(*executed.lock(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_first_failure_short_circuits() {
        let executor = FakeExecutor::failing_at("two");
        let executed = executor.executed.clone();
        let runner = JobRunner::new(executor);

        let job = job_with(vec![
            Step::run("a").with_name("one").with_output("first"),
            Step::run("b").with_name("two"),
            Step::run("c").with_name("three").with_output("third"),
        ]);
        let result = runner.run(&job, &JobContext::new("test-job", "/tmp")).await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.failed_step.as_deref(), Some("two"));
        assert_eq!(*executed.lock(), vec!["one", "two"]);
        // The never-executed third step left no trace.
        assert!(result.outputs.contains_key("first"));
        assert!(!result.outputs.contains_key("third"));
    }

    #[tokio::test]
    async fn test_outputs_union_last_write_wins() {
        let runner = JobRunner::new(FakeExecutor::new());
        let job = job_with(vec![
            Step::run("a").with_name("one").with_output("shared"),
            Step::run("b").with_name("two").with_output("shared"),
        ]);
        let result = runner.run(&job, &JobContext::new("test-job", "/tmp")).await;

        assert_eq!(
            result.outputs.get("shared").map(String::as_str),
            Some("value-of-two")
        );
    }

    #[tokio::test]
    async fn test_cancelled_step_yields_cancelled_job() {
        struct CancellingExecutor;

        #[async_trait]
        impl StepExecute for CancellingExecutor {
            async fn execute(&self, step: &Step, _ctx: &JobContext) -> StepOutcome {
                StepOutcome::failed_before_start(step.display_name(), StepFailure::Cancelled)
            }
        }

        let runner = JobRunner::new(CancellingExecutor);
        let job = job_with(vec![Step::run("a")]);
        let result = runner.run(&job, &JobContext::new("test-job", "/tmp")).await;

        assert_eq!(result.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_real_executor_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(StepExecutor::new());
        let job = job_with(vec![
            Step::run("echo step-one > marker.txt"),
            Step::run("cat marker.txt"),
        ]);
        let result = runner
            .run(&job, &JobContext::new("test-job", dir.path()))
            .await;

        assert_eq!(result.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_real_executor_failure_captures_step() {
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(StepExecutor::new());
        let job = job_with(vec![
            Step::run("true").with_name("fine"),
            Step::run("echo broken >&2; exit 1").with_name("breaks"),
            Step::run("true").with_name("never"),
        ]);
        let result = runner
            .run(&job, &JobContext::new("test-job", dir.path()))
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.failed_step.as_deref(), Some("breaks"));
        assert_eq!(
            result.reason,
            Some(StepFailure::ExecutionFault { code: 1 })
        );
        assert_eq!(result.stderr_tail.as_deref(), Some("broken"));
    }
}
