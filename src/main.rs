//! conveyor - CLI for the pipeline execution engine
//!
//! ## Commands
//!
//! - `conveyor run` - Execute a pipeline definition for a trigger event
//! - `conveyor check` - Validate a definition without executing it
//! - `conveyor plan` - Show a definition's execution waves
//! - `conveyor completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate a definition
//! conveyor check pipeline.yml
//!
//! # Inspect the execution order
//! conveyor plan pipeline.yml
//!
//! # Run it for a push to main
//! conveyor run pipeline.yml --event push --branch main
//! ```
//!
//! Secrets are provisioned through the environment: a variable named
//! `CONVEYOR_SECRET_<NAME>` becomes the secret `<NAME>`, readable
//! only by jobs whose steps declare it.

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    let level = std::env::var("CONVEYOR_LOG").unwrap_or_else(|_| "info".to_string());
    conveyor::init_logging(&level);

    match cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            if std::env::var("CONVEYOR_VERBOSE").is_ok() {
                eprintln!("{:?}", e);
            }
            ExitCode::from(2)
        }
    }
}
