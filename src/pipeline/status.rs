//! Status and result types for pipeline runs
//!
//! This module contains the terminal states of jobs and runs and the
//! immutable result records the controller aggregates.

use crate::pipeline::errors::StepFailure;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Lifecycle state of a job within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting for its wave
    Pending,
    /// Dispatched and executing
    Running,
    /// All steps completed successfully
    Succeeded,
    /// A step failed
    Failed,
    /// Never executed because an upstream job failed, was cancelled,
    /// or the run was aborted before the job started
    Skipped,
    /// Aborted mid-execution by a cancellation request
    Cancelled,
}

impl JobStatus {
    /// Returns true once the job can no longer change state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    /// Returns true if the job completed successfully
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the job failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Overall outcome of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Every job succeeded
    Succeeded,
    /// At least one job failed
    Failed,
    /// The run was aborted; no job failed on its own
    Cancelled,
    /// The trigger did not match; nothing executed
    NotTriggered,
}

impl PipelineStatus {
    /// Returns true if the run completed successfully
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Aggregates job results into the run status.
    ///
    /// A failed job dominates; cancellation comes next; skip chains
    /// only ever originate from one of those two, so everything else
    /// is success.
    #[must_use]
    pub fn from_results(results: &[RunResult]) -> Self {
        if results.iter().any(|r| r.status == JobStatus::Failed) {
            Self::Failed
        } else if results.iter().any(|r| r.status == JobStatus::Cancelled) {
            Self::Cancelled
        } else {
            Self::Succeeded
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::NotTriggered => write!(f, "NOT TRIGGERED"),
        }
    }
}

/// Result of executing a single step.
///
/// Captured output is already redacted when the outcome leaves the
/// executor; nothing downstream sees raw secret material.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Step display name
    pub step: String,
    /// Exit code of the underlying process, when one ran to completion
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Output key/value pairs the step produced
    pub outputs: HashMap<String, String>,
    /// Wall-clock duration
    pub duration: Duration,
    /// Why the step failed, when it did
    pub failure: Option<StepFailure>,
}

impl StepOutcome {
    /// Returns true if the step succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Creates an outcome for a step that never ran a process
    #[must_use]
    pub fn failed_before_start(step: impl Into<String>, failure: StepFailure) -> Self {
        Self {
            step: step.into(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            outputs: HashMap::new(),
            duration: Duration::ZERO,
            failure: Some(failure),
        }
    }
}

/// Terminal record for one job within a run.
///
/// Immutable once the job reaches a terminal status.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Job identifier
    pub job: String,
    /// Terminal status
    pub status: JobStatus,
    /// Display name of the step that ended the job early, if any
    pub failed_step: Option<String>,
    /// The failing step's reason, if any
    pub reason: Option<StepFailure>,
    /// Redacted tail of the failing step's stderr
    pub stderr_tail: Option<String>,
    /// Union of the job's step outputs; later steps win on key clashes
    pub outputs: HashMap<String, String>,
    /// When the job started executing
    pub started_at: SystemTime,
    /// When the job reached its terminal status
    pub finished_at: SystemTime,
}

impl RunResult {
    /// Creates a record for a job that never executed
    #[must_use]
    pub fn skipped(job: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            job: job.into(),
            status: JobStatus::Skipped,
            failed_step: None,
            reason: None,
            stderr_tail: None,
            outputs: HashMap::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Creates a record for a job cancelled before any step ran
    #[must_use]
    pub fn cancelled(job: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            job: job.into(),
            status: JobStatus::Cancelled,
            failed_step: None,
            reason: Some(StepFailure::Cancelled),
            stderr_tail: None,
            outputs: HashMap::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Wall-clock duration of the job
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.finished_at
            .duration_since(self.started_at)
            .unwrap_or(Duration::ZERO)
    }
}

/// Aggregate record of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Unique run identifier
    pub id: Uuid,
    /// Pipeline name from the definition
    pub pipeline: Option<String>,
    /// Overall status
    pub status: PipelineStatus,
    /// Per-job results in definition order
    pub results: Vec<RunResult>,
    /// When the run started
    pub started_at: SystemTime,
    /// When the run finished
    pub finished_at: SystemTime,
}

impl PipelineRun {
    /// Creates the record for a run whose trigger did not match
    #[must_use]
    pub fn not_triggered(pipeline: Option<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            pipeline,
            status: PipelineStatus::NotTriggered,
            results: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Looks up the result for a job
    #[must_use]
    pub fn result(&self, job: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.job == job)
    }

    /// Terminal status of a job, when recorded
    #[must_use]
    pub fn status_of(&self, job: &str) -> Option<JobStatus> {
        self.result(job).map(|r| r.status)
    }

    /// Renders the user-facing final report: every job's terminal
    /// status and, for failures, the originating step with its
    /// redacted stderr tail.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = format!(
            "pipeline {}: {} (run {})\n",
            self.pipeline.as_deref().unwrap_or("unnamed"),
            self.status,
            self.id
        );

        let width = self
            .results
            .iter()
            .map(|r| r.job.len())
            .max()
            .unwrap_or(0);

        for result in &self.results {
            out.push_str(&format!(
                "  {:width$}  {:9}  ({:.1}s)\n",
                result.job,
                result.status.to_string(),
                result.duration().as_secs_f64(),
            ));
            if result.status == JobStatus::Failed {
                if let (Some(step), Some(reason)) = (&result.failed_step, &result.reason) {
                    out.push_str(&format!("    step '{step}': {reason}\n"));
                }
                if let Some(tail) = &result.stderr_tail {
                    if !tail.is_empty() {
                        for line in tail.lines() {
                            out.push_str(&format!("      {line}\n"));
                        }
                    }
                }
            }
        }

        out
    }
}

/// Returns the last `lines` lines of the given text.
#[must_use]
pub fn tail_lines(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Skipped.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_pipeline_status_aggregation() {
        let mut a = RunResult::skipped("a");
        a.status = JobStatus::Succeeded;
        let b = RunResult::skipped("b");
        assert_eq!(
            PipelineStatus::from_results(&[a.clone(), b.clone()]),
            PipelineStatus::Succeeded
        );

        let mut failed = RunResult::skipped("c");
        failed.status = JobStatus::Failed;
        assert_eq!(
            PipelineStatus::from_results(&[a.clone(), failed]),
            PipelineStatus::Failed
        );

        let cancelled = RunResult::cancelled("d");
        assert_eq!(
            PipelineStatus::from_results(&[a, cancelled]),
            PipelineStatus::Cancelled
        );
    }

    #[test]
    fn test_failed_dominates_cancelled() {
        let mut failed = RunResult::skipped("a");
        failed.status = JobStatus::Failed;
        let cancelled = RunResult::cancelled("b");
        assert_eq!(
            PipelineStatus::from_results(&[cancelled, failed]),
            PipelineStatus::Failed
        );
    }

    #[test]
    fn test_tail_lines() {
        let text = "one\ntwo\nthree\nfour";
        assert_eq!(tail_lines(text, 2), "three\nfour");
        assert_eq!(tail_lines(text, 10), text);
        assert_eq!(tail_lines("", 3), "");
    }

    #[test]
    fn test_report_shows_failing_step() {
        let now = SystemTime::now();
        let run = PipelineRun {
            id: Uuid::new_v4(),
            pipeline: Some("ci".to_string()),
            status: PipelineStatus::Failed,
            results: vec![RunResult {
                job: "test".to_string(),
                status: JobStatus::Failed,
                failed_step: Some("run tests".to_string()),
                reason: Some(crate::pipeline::StepFailure::ExecutionFault { code: 1 }),
                stderr_tail: Some("assertion failed".to_string()),
                outputs: HashMap::new(),
                started_at: now,
                finished_at: now,
            }],
            started_at: now,
            finished_at: now,
        };

        let report = run.report();
        assert!(report.contains("pipeline ci: FAILED"));
        assert!(report.contains("step 'run tests': command failed with exit code 1"));
        assert!(report.contains("assertion failed"));
    }

    #[test]
    fn test_step_outcome_success() {
        let outcome = StepOutcome {
            step: "build".to_string(),
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            outputs: HashMap::new(),
            duration: Duration::from_millis(5),
            failure: None,
        };
        assert!(outcome.is_success());
    }
}
