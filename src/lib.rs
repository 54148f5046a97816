//! # Conveyor - a minimal CI pipeline execution engine
//!
//! Conveyor is the orchestration core of a CI runner: it takes a
//! declarative pipeline definition (jobs, dependencies, steps,
//! secret declarations), resolves the job graph into execution
//! waves, and drives each wave through a bounded worker pool.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conveyor::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), conveyor::DefinitionError> {
//! let definition = PipelineDefinition::from_path("pipeline.yml")?;
//! let store = Arc::new(SecretStore::from_env("CONVEYOR_SECRET_", &definition));
//! let controller = PipelineController::new(EngineConfig::default(), store);
//!
//! let run = controller.run(&definition, &TriggerEvent::push("main")).await?;
//! println!("{}", run.report());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Wave scheduling**: dependency-ordered execution with cycle
//!   detection; independent jobs run concurrently
//! - **Failure semantics**: first failing step ends its job, failed
//!   jobs skip their dependents, the run aggregates honestly
//! - **Scoped secrets**: steps declare the secrets they need; the
//!   store enforces the declaration and audits every access
//! - **Redaction**: secret values are scrubbed from captured output
//!   before anything is persisted
//! - **Cancellation**: in-flight runs can be aborted; running steps
//!   get a grace period before a forced kill
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <https://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or <https://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod controller;
pub mod executor;
pub mod infrastructure;
pub mod pipeline;
pub mod runner;
pub mod scheduler;
pub mod secrets;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use controller::PipelineController;
pub use executor::{
    expand, expand_outputs, expand_vars, CancelHandle, CancelToken, JobContext, StepExecute,
    StepExecutor,
};
pub use infrastructure::{init_logging, EngineConfig};
pub use pipeline::{
    DefinitionError, EventKind, Job, JobStatus, PipelineDefinition, PipelineRun, PipelineStatus,
    RunResult, Step, StepFailure, StepKind, StepOutcome, Trigger, TriggerEvent, Validate,
};
pub use runner::JobRunner;
pub use scheduler::{downstream_closure, plan, ExecutionPlan};
pub use secrets::{AuditRecord, Redactor, SecretError, SecretStore, SecretValue};

/// Version of the conveyor crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
