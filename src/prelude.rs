//! Prelude module for common imports

// Re-export all pipeline types with full paths
pub use crate::pipeline::definition::{EventKind, Job, PipelineDefinition, Trigger, TriggerEvent};
pub use crate::pipeline::errors::{DefinitionError, StepFailure};
pub use crate::pipeline::status::{
    JobStatus, PipelineRun, PipelineStatus, RunResult, StepOutcome,
};
pub use crate::pipeline::steps::{Step, StepKind};
pub use crate::pipeline::Validate;

// Re-export engine types
pub use crate::controller::PipelineController;
pub use crate::executor::{CancelHandle, CancelToken, JobContext, StepExecute, StepExecutor};
pub use crate::infrastructure::EngineConfig;
pub use crate::runner::JobRunner;
pub use crate::scheduler::{plan, ExecutionPlan};
pub use crate::secrets::{Redactor, SecretStore};
