//! Step execution
//!
//! The step executor runs a single unit of work: a shell command or
//! one of the built-in capability invocations. Failures of any kind
//! are returned as data in the [`StepOutcome`]; the executor never
//! panics the engine over a misbehaving step.

pub mod capability;
pub mod context;
pub mod expand;
pub mod shell;

pub use context::{CancelHandle, CancelToken, JobContext};
pub use expand::{expand, expand_outputs, expand_vars};
pub use shell::{run_captured, Capture, ExecSpec, Termination};

use crate::pipeline::{Step, StepFailure, StepKind, StepOutcome};
use crate::secrets::SecretError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Name of the environment variable pointing a `run` step at its
/// output file
pub const OUTPUT_ENV: &str = "CONVEYOR_OUTPUT";

/// Seam for step execution.
///
/// The job runner and the controller are generic over this trait so
/// tests can substitute a fake that never touches the system.
#[async_trait]
pub trait StepExecute: Send + Sync {
    /// Executes one step in the given job context
    async fn execute(&self, step: &Step, ctx: &JobContext) -> StepOutcome;
}

#[async_trait]
impl<T: StepExecute + ?Sized> StepExecute for std::sync::Arc<T> {
    async fn execute(&self, step: &Step, ctx: &JobContext) -> StepOutcome {
        (**self).execute(step, ctx).await
    }
}

/// Built-in step executor backed by real processes
#[derive(Debug, Default, Clone)]
pub struct StepExecutor;

impl StepExecutor {
    /// Creates a new step executor
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepExecute for StepExecutor {
    async fn execute(&self, step: &Step, ctx: &JobContext) -> StepOutcome {
        let name = step.display_name().to_string();

        if ctx.cancel.is_cancelled() {
            return StepOutcome::failed_before_start(name, StepFailure::Cancelled);
        }

        // Resolve declared secrets up front; a scope violation is
        // fatal to the step before anything runs.
        let mut secret_env = HashMap::new();
        for secret in &step.secrets {
            match ctx.secrets.get(secret, &ctx.job_id) {
                Ok(value) => {
                    secret_env.insert(secret.clone(), value.expose().to_string());
                }
                Err(err) => {
                    tracing::warn!(step = %name, job = %ctx.job_id, error = %err, "secret resolution failed");
                    return StepOutcome::failed_before_start(name, secret_failure(err));
                }
            }
        }

        let mut env = ctx.env.clone();
        env.extend(secret_env.clone());

        let timeout = step.timeout(ctx.default_timeout);
        let xp = |input: &str| expand(input, &ctx.env, &ctx.upstream);

        tracing::info!(step = %name, job = %ctx.job_id, kind = %step.kind.label(), "executing step");

        let outcome = match &step.kind {
            StepKind::Run { command } => {
                self.execute_run(&name, &xp(command), step, env, timeout, ctx).await
            }
            StepKind::Checkout { revision, url } => {
                let specs = capability::checkout_specs(
                    &xp(revision),
                    url.as_deref().map(|u| xp(u)).as_deref(),
                    &ctx.workspace,
                    &env,
                );
                self.execute_sequence(&name, specs, timeout, ctx).await
            }
            StepKind::ImageBuild { context, tag } => {
                let spec = capability::image_build_spec(&xp(context), &xp(tag), &ctx.workspace, &env)
                    .with_timeout(timeout);
                let mut outcome = self.execute_spec(&name, &spec, ctx).await;
                if outcome.is_success() {
                    if let Some(id) = capability::parse_build_image_id(&outcome.stdout) {
                        outcome
                            .outputs
                            .insert(capability::OUTPUT_IMAGE_ID.to_string(), id);
                    }
                }
                outcome
            }
            StepKind::RegistryLogin {
                registry,
                username_secret,
                password_secret,
            } => {
                // Both names are guaranteed declared by load-time
                // validation, so the values are present here.
                let username = secret_env.get(username_secret).cloned().unwrap_or_default();
                let password = secret_env.get(password_secret).cloned().unwrap_or_default();
                let spec = capability::registry_login_spec(
                    &xp(registry),
                    &username,
                    &password,
                    &ctx.workspace,
                    &env,
                )
                .with_timeout(timeout);
                self.execute_spec(&name, &spec, ctx).await
            }
            StepKind::ImagePush { tag } => {
                let spec = capability::image_push_spec(&xp(tag), &ctx.workspace, &env)
                    .with_timeout(timeout);
                let mut outcome = self.execute_spec(&name, &spec, ctx).await;
                if outcome.is_success() {
                    if let Some(digest) = capability::parse_push_digest(&outcome.stdout) {
                        outcome
                            .outputs
                            .insert(capability::OUTPUT_DIGEST.to_string(), digest);
                    }
                }
                outcome
            }
        };

        match &outcome.failure {
            None => tracing::info!(step = %name, job = %ctx.job_id, "step succeeded"),
            Some(failure) => {
                tracing::warn!(step = %name, job = %ctx.job_id, error = %failure, "step failed");
            }
        }

        outcome
    }
}

impl StepExecutor {
    async fn execute_run(
        &self,
        name: &str,
        command: &str,
        step: &Step,
        mut env: HashMap<String, String>,
        timeout: Duration,
        ctx: &JobContext,
    ) -> StepOutcome {
        let output_path = ctx
            .workspace
            .join(format!(".conveyor-output-{}", Uuid::new_v4()));
        env.insert(OUTPUT_ENV.to_string(), output_path.display().to_string());

        let spec = match ExecSpec::shell(&ctx.shell, command, &ctx.workspace) {
            Ok(spec) => spec.with_env(env).with_timeout(timeout),
            Err(failure) => return StepOutcome::failed_before_start(name, failure),
        };

        let mut outcome = self.execute_spec(name, &spec, ctx).await;

        if outcome.is_success() && !step.outputs.is_empty() {
            if let Ok(contents) = tokio::fs::read_to_string(&output_path).await {
                for (key, value) in parse_output_lines(&contents, &step.outputs) {
                    outcome.outputs.insert(key, ctx.redactor.redact(&value));
                }
            }
        }
        let _ = tokio::fs::remove_file(&output_path).await;

        outcome
    }

    /// Runs one spec and folds the capture into an outcome
    async fn execute_spec(&self, name: &str, spec: &ExecSpec, ctx: &JobContext) -> StepOutcome {
        match run_captured(spec, &ctx.cancel, ctx.grace).await {
            Ok(capture) => outcome_from_capture(name, &capture, spec.timeout, ctx),
            Err(failure) => StepOutcome::failed_before_start(name, failure),
        }
    }

    /// Runs specs in order, stopping at the first one that does not
    /// succeed. Output of all executed specs is concatenated.
    async fn execute_sequence(
        &self,
        name: &str,
        specs: Vec<ExecSpec>,
        timeout: Duration,
        ctx: &JobContext,
    ) -> StepOutcome {
        let mut combined_stdout = String::new();
        let mut combined_stderr = String::new();
        let mut total = Duration::ZERO;

        for spec in specs {
            let spec = spec.with_timeout(timeout);
            let mut outcome = self.execute_spec(name, &spec, ctx).await;
            combined_stdout.push_str(&outcome.stdout);
            combined_stderr.push_str(&outcome.stderr);
            total += outcome.duration;

            if !outcome.is_success() {
                outcome.stdout = combined_stdout;
                outcome.stderr = combined_stderr;
                outcome.duration = total;
                return outcome;
            }
        }

        StepOutcome {
            step: name.to_string(),
            exit_code: Some(0),
            stdout: combined_stdout,
            stderr: combined_stderr,
            outputs: HashMap::new(),
            duration: total,
            failure: None,
        }
    }
}

fn secret_failure(err: SecretError) -> StepFailure {
    match err {
        SecretError::NotFound { name } => StepFailure::SecretNotFound { name },
        SecretError::AccessDenied { job, name } => StepFailure::SecretAccessDenied { job, name },
    }
}

fn outcome_from_capture(
    name: &str,
    capture: &Capture,
    timeout: Duration,
    ctx: &JobContext,
) -> StepOutcome {
    let failure = match capture.termination {
        Termination::TimedOut => Some(StepFailure::Timeout {
            limit_secs: timeout.as_secs(),
        }),
        Termination::Cancelled => Some(StepFailure::Cancelled),
        Termination::Exited => match capture.exit_code {
            Some(0) => None,
            code => Some(StepFailure::ExecutionFault {
                code: code.unwrap_or(-1),
            }),
        },
    };

    StepOutcome {
        step: name.to_string(),
        exit_code: capture.exit_code,
        stdout: ctx.redactor.redact(&capture.stdout),
        stderr: ctx.redactor.redact(&capture.stderr),
        outputs: HashMap::new(),
        duration: capture.duration,
        failure,
    }
}

/// Parses `key=value` lines from an output file, keeping only the
/// declared keys. Later lines win on repeats.
#[must_use]
pub fn parse_output_lines(contents: &str, declared: &[String]) -> HashMap<String, String> {
    let mut outputs = HashMap::new();
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if declared.iter().any(|d| d == key) {
                outputs.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    outputs
}
