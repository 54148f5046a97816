//! The `run` subcommand: execute a pipeline end to end

use conveyor::controller::PipelineController;
use conveyor::infrastructure::EngineConfig;
use conveyor::pipeline::{PipelineDefinition, TriggerEvent};
use conveyor::secrets::SecretStore;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Loads and executes the definition, printing the final report.
///
/// Definition problems map to exit code 2; a failed or cancelled run
/// maps to 1; success and trigger mismatch map to 0.
pub fn execute(
    definition: &Path,
    event: &TriggerEvent,
    workers: Option<usize>,
    timeout: Option<u64>,
    workspace: Option<PathBuf>,
) -> Result<ExitCode> {
    let def = match PipelineDefinition::from_path(definition) {
        Ok(def) => def,
        Err(err) => {
            eprintln!("definition error: {err}");
            return Ok(ExitCode::from(2));
        }
    };

    let mut config = EngineConfig::default();
    if let Some(workers) = workers {
        config = config.with_worker_slots(workers);
    }
    if let Some(timeout) = timeout {
        config = config.with_step_timeout(Duration::from_secs(timeout));
    }
    if let Some(workspace) = workspace {
        config = config.with_workspace_root(workspace);
    }

    let store = Arc::new(SecretStore::from_env(&config.secret_env_prefix, &def));
    let controller = Arc::new(PipelineController::new(config, store));

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let outcome = runtime.block_on(async {
        // Interrupting the process cancels the run instead of
        // orphaning child processes.
        let interrupt = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    controller.cancel();
                }
            })
        };

        let outcome = controller.run(&def, event).await;
        interrupt.abort();
        outcome
    });

    match outcome {
        Ok(run) => {
            print!("{}", run.report());
            Ok(ExitCode::from(super::exit_code_for(run.status)))
        }
        Err(err) => {
            eprintln!("definition error: {err}");
            Ok(ExitCode::from(2))
        }
    }
}
