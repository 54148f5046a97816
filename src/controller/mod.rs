//! Top-level pipeline orchestration
//!
//! The controller owns a run from trigger to final report: it
//! validates the definition, plans execution waves, dispatches every
//! job of the current wave into a bounded worker pool, waits for the
//! wave to settle, propagates skips, and aggregates the overall
//! status. Dispatch is not completion: a later wave only starts once
//! every job of the current one is terminal, because its jobs may
//! consume this wave's outputs.

use crate::executor::{CancelHandle, JobContext, StepExecute, StepExecutor};
use crate::infrastructure::EngineConfig;
use crate::pipeline::{
    DefinitionError, Job, JobStatus, PipelineDefinition, PipelineRun, PipelineStatus, RunResult,
    StepFailure, TriggerEvent, Validate,
};
use crate::runner::JobRunner;
use crate::scheduler;
use crate::secrets::SecretStore;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// Orchestrates pipeline runs
pub struct PipelineController<E = StepExecutor> {
    config: EngineConfig,
    store: Arc<SecretStore>,
    executor: Arc<E>,
    cancel: CancelHandle,
    statuses: Arc<RwLock<HashMap<String, JobStatus>>>,
}

impl PipelineController<StepExecutor> {
    /// Creates a controller backed by the real step executor
    #[must_use]
    pub fn new(config: EngineConfig, store: Arc<SecretStore>) -> Self {
        Self::with_executor(config, store, StepExecutor::new())
    }
}

impl<E: StepExecute + 'static> PipelineController<E> {
    /// Creates a controller over a custom step executor
    #[must_use]
    pub fn with_executor(config: EngineConfig, store: Arc<SecretStore>, executor: E) -> Self {
        Self {
            config,
            store,
            executor: Arc::new(executor),
            cancel: CancelHandle::new(),
            statuses: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Requests cancellation of the in-flight run.
    ///
    /// Running jobs get the configured grace period, are then killed
    /// and recorded as cancelled; jobs not yet started are skipped.
    pub fn cancel(&self) {
        tracing::info!("run cancellation requested");
        self.cancel.cancel();
    }

    /// Read-only snapshot of every job's current status
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, JobStatus> {
        self.statuses.read().clone()
    }

    /// Executes a pipeline for a trigger event.
    ///
    /// Returns the aggregated run record. A trigger mismatch executes
    /// nothing and reports [`PipelineStatus::NotTriggered`].
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] for malformed or cyclic
    /// definitions, before any job starts.
    pub async fn run(
        &self,
        definition: &PipelineDefinition,
        event: &TriggerEvent,
    ) -> Result<PipelineRun, DefinitionError> {
        definition.validate()?;
        let plan = scheduler::plan(definition)?;

        if !definition.on.matches(event) {
            tracing::info!(
                event = %event.event,
                branch = %event.branch,
                "trigger did not match, nothing to run"
            );
            return Ok(PipelineRun::not_triggered(definition.name.clone()));
        }

        let run_id = Uuid::new_v4();
        let started_at = SystemTime::now();
        let run_root = self.config.workspace_root.join(run_id.to_string());

        {
            let mut statuses = self.statuses.write();
            statuses.clear();
            for job in &definition.jobs {
                statuses.insert(job.id.clone(), JobStatus::Pending);
            }
        }

        tracing::info!(
            run = %run_id,
            pipeline = definition.name.as_deref().unwrap_or("unnamed"),
            jobs = definition.jobs.len(),
            waves = plan.waves().len(),
            "run starting"
        );

        let mut results: HashMap<String, RunResult> = HashMap::new();
        let mut skipped: HashSet<String> = HashSet::new();

        for wave in plan.waves() {
            if self.cancel.token().is_cancelled() {
                break;
            }

            let mut runnable: Vec<&Job> = Vec::new();
            for id in wave {
                if skipped.contains(id) {
                    self.set_status(id, JobStatus::Skipped);
                    results.insert(id.clone(), RunResult::skipped(id.clone()));
                } else if let Some(job) = definition.job(id) {
                    runnable.push(job);
                }
            }

            // Upstream outputs are frozen before dispatch: the jobs
            // producing them are terminal by wave ordering.
            let prepared: Vec<(&Job, HashMap<String, HashMap<String, String>>)> = runnable
                .into_iter()
                .map(|job| {
                    let upstream = job
                        .needs
                        .iter()
                        .filter_map(|need| {
                            results.get(need).map(|r| (need.clone(), r.outputs.clone()))
                        })
                        .collect();
                    (job, upstream)
                })
                .collect();

            let mut in_flight = stream::FuturesUnordered::new();
            let mut pending = prepared.into_iter();
            let slots = self.config.worker_slots.max(1);
            for (job, upstream) in pending.by_ref().take(slots) {
                in_flight.push(self.run_one(job, upstream, &run_root));
            }
            let mut wave_results: Vec<RunResult> = Vec::new();
            while let Some(result) = in_flight.next().await {
                wave_results.push(result);
                if let Some((job, upstream)) = pending.next() {
                    in_flight.push(self.run_one(job, upstream, &run_root));
                }
            }

            for result in wave_results {
                if matches!(result.status, JobStatus::Failed | JobStatus::Cancelled) {
                    skipped.extend(scheduler::downstream_closure(
                        definition,
                        &[result.job.clone()],
                    ));
                }
                results.insert(result.job.clone(), result);
            }
        }

        // Jobs left without a record never ran: either downstream of
        // a failure in a wave that was not reached, or the run was
        // aborted before their wave.
        let mut ordered = Vec::with_capacity(definition.jobs.len());
        for job in &definition.jobs {
            let result = results
                .remove(&job.id)
                .unwrap_or_else(|| RunResult::skipped(job.id.clone()));
            self.set_status(&job.id, result.status);
            ordered.push(result);
        }

        let status = PipelineStatus::from_results(&ordered);
        let run = PipelineRun {
            id: run_id,
            pipeline: definition.name.clone(),
            status,
            results: ordered,
            started_at,
            finished_at: SystemTime::now(),
        };

        tracing::info!(run = %run_id, status = %run.status, "run finished");

        Ok(run)
    }

    async fn run_one(
        &self,
        job: &Job,
        upstream: HashMap<String, HashMap<String, String>>,
        run_root: &std::path::Path,
    ) -> RunResult {
        let token = self.cancel.token();
        if token.is_cancelled() {
            self.set_status(&job.id, JobStatus::Cancelled);
            return RunResult::cancelled(job.id.clone());
        }

        self.set_status(&job.id, JobStatus::Running);

        let workspace = run_root.join(&job.id);
        if let Err(err) = tokio::fs::create_dir_all(&workspace).await {
            tracing::error!(job = %job.id, error = %err, "workspace setup failed");
            self.set_status(&job.id, JobStatus::Failed);
            let now = SystemTime::now();
            return RunResult {
                job: job.id.clone(),
                status: JobStatus::Failed,
                failed_step: None,
                reason: Some(StepFailure::Spawn {
                    program: workspace.display().to_string(),
                    reason: err.to_string(),
                }),
                stderr_tail: None,
                outputs: HashMap::new(),
                started_at: now,
                finished_at: now,
            };
        }

        let ctx = JobContext {
            job_id: job.id.clone(),
            workspace,
            env: job.env.clone(),
            upstream,
            secrets: Arc::clone(&self.store),
            redactor: self.store.redactor(),
            cancel: token,
            shell: self.config.shell.clone(),
            default_timeout: self.config.step_timeout,
            grace: self.config.cancel_grace,
        };

        let result = JobRunner::new(Arc::clone(&self.executor))
            .run(job, &ctx)
            .await;
        self.set_status(&job.id, result.status);
        result
    }

    fn set_status(&self, job: &str, status: JobStatus) {
        self.statuses.write().insert(job.to_string(), status);
    }
}
