//! The `plan` subcommand: show a definition's execution waves

use conveyor::pipeline::PipelineDefinition;
use conveyor::scheduler;
use anyhow::Result;
use std::path::Path;
use std::process::ExitCode;

/// Output format for the plan listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable wave listing
    Text,
    /// JSON array of waves
    Json,
}

/// Loads the definition and prints its wave plan
pub fn execute(definition: &Path, format: OutputFormat) -> Result<ExitCode> {
    let def = match PipelineDefinition::from_path(definition) {
        Ok(def) => def,
        Err(err) => {
            eprintln!("definition error: {err}");
            return Ok(ExitCode::from(2));
        }
    };

    let plan = match scheduler::plan(&def) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("definition error: {err}");
            return Ok(ExitCode::from(2));
        }
    };

    match format {
        OutputFormat::Text => {
            for (index, wave) in plan.waves().iter().enumerate() {
                println!("wave {}: {}", index, wave.join(", "));
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(plan.waves())?);
        }
    }

    Ok(ExitCode::SUCCESS)
}
