//! Error types for the pipeline domain

use thiserror::Error;

/// Errors detected while loading or validating a pipeline definition.
///
/// Any of these is fatal to the run attempt: nothing executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Definition file could not be read
    #[error("failed to read definition: {0}")]
    Io(String),

    /// Definition document could not be parsed
    #[error("failed to parse definition: {0}")]
    Parse(String),

    /// Pipeline must contain at least one job
    #[error("pipeline must have at least one job")]
    EmptyPipeline,

    /// Job identifier is empty or contains invalid characters
    #[error("invalid job id: '{id}'")]
    InvalidJobId {
        /// The offending identifier.
        id: String,
    },

    /// Two jobs share the same identifier
    #[error("duplicate job id '{id}'")]
    DuplicateJob {
        /// The duplicated identifier.
        id: String,
    },

    /// A `needs` entry references a job that is not defined
    #[error("job '{job}' needs undefined job '{reference}'")]
    UnknownDependency {
        /// Job carrying the reference.
        job: String,
        /// The unresolved reference.
        reference: String,
    },

    /// Job must contain at least one step
    #[error("job '{job}' must have at least one step")]
    EmptyJob {
        /// Name of the empty job.
        job: String,
    },

    /// A declared secret name is not usable as an environment variable
    #[error("job '{job}' declares invalid secret name '{name}'")]
    InvalidSecretName {
        /// Job carrying the declaration.
        job: String,
        /// The offending name.
        name: String,
    },

    /// A step's parameters failed variant-specific validation
    #[error("invalid parameters for step '{step}' of job '{job}': {reason}")]
    InvalidParameters {
        /// Job containing the step.
        job: String,
        /// Step name or kind label.
        step: String,
        /// What is wrong with the parameters.
        reason: String,
    },

    /// The dependency graph contains a cycle
    #[error("cyclic dependency among jobs: {}", unresolved.join(", "))]
    CyclicDependency {
        /// Jobs that could not be placed in any execution wave.
        unresolved: Vec<String>,
    },
}

impl From<std::io::Error> for DefinitionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for DefinitionError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Why a step did not succeed.
///
/// Step failures are data carried in the step outcome and propagated
/// to the job runner. They never abort the engine process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    /// Requested secret is not provisioned in the store
    #[error("secret '{name}' is not provisioned")]
    SecretNotFound {
        /// Name of the missing secret.
        name: String,
    },

    /// Requesting job is outside the secret's scope
    #[error("job '{job}' is not allowed to read secret '{name}'")]
    SecretAccessDenied {
        /// Job that attempted the read.
        job: String,
        /// Name of the secret.
        name: String,
    },

    /// Step exceeded its allotted duration and was terminated
    #[error("step exceeded its {limit_secs}s timeout")]
    Timeout {
        /// The limit that was exceeded, in seconds.
        limit_secs: u64,
    },

    /// Command finished with a non-zero exit code
    #[error("command failed with exit code {code}")]
    ExecutionFault {
        /// Exit code reported by the process.
        code: i32,
    },

    /// External tool could not be launched at all
    #[error("failed to launch '{program}': {reason}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying launch error.
        reason: String,
    },

    /// Step was aborted by an external cancellation request
    #[error("step was cancelled")]
    Cancelled,
}

impl StepFailure {
    /// Returns true for failures caused by cancellation rather than
    /// by the step itself.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
