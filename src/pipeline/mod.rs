//! Pipeline domain types and logic

pub mod definition;
pub mod errors;
pub mod status;
pub mod steps;

pub use definition::{EventKind, Job, PipelineDefinition, Trigger, TriggerEvent};
pub use errors::{DefinitionError, StepFailure};
pub use status::{tail_lines, JobStatus, PipelineRun, PipelineStatus, RunResult, StepOutcome};
pub use steps::{Step, StepKind};

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> Result<(), Self::Error>;
}
