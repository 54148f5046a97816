//! The `check` subcommand: validate a definition without executing it

use conveyor::pipeline::PipelineDefinition;
use conveyor::scheduler;
use anyhow::Result;
use std::path::Path;
use std::process::ExitCode;

/// Loads, validates and plans the definition.
///
/// Catches everything `run` would reject before execution, including
/// cyclic dependency graphs.
pub fn execute(definition: &Path) -> Result<ExitCode> {
    let def = match PipelineDefinition::from_path(definition) {
        Ok(def) => def,
        Err(err) => {
            eprintln!("definition error: {err}");
            return Ok(ExitCode::from(2));
        }
    };

    match scheduler::plan(&def) {
        Ok(plan) => {
            println!(
                "OK: {} ({} jobs, {} waves)",
                definition.display(),
                def.job_count(),
                plan.waves().len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("definition error: {err}");
            Ok(ExitCode::from(2))
        }
    }
}
