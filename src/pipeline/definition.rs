//! Pipeline definition model and load-time validation
//!
//! The definition document is the declarative input to the engine: a
//! set of triggers plus a collection of jobs, each with an ordered
//! step list and a `needs` dependency list. Secrets appear by name
//! only; values are provisioned out of band.

use crate::pipeline::errors::DefinitionError;
use crate::pipeline::steps::Step;
use crate::pipeline::Validate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Event kinds a trigger rule can match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A branch received new commits
    Push,
    /// A pull request was opened or updated
    PullRequest,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::PullRequest => write!(f, "pull_request"),
        }
    }
}

/// Trigger rules: which events cause a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Trigger {
    /// Event kinds that trigger the pipeline; empty matches any event
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<EventKind>,

    /// Branch allow-list; empty matches any branch
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub branches: Vec<String>,
}

impl Trigger {
    /// Returns true when the given event should cause a run
    #[must_use]
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        let event_ok = self.events.is_empty() || self.events.contains(&event.event);
        let branch_ok = self.branches.is_empty() || self.branches.iter().any(|b| b == &event.branch);
        event_ok && branch_ok
    }
}

/// A concrete event submitted to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    /// What happened
    pub event: EventKind,
    /// Branch the event refers to
    pub branch: String,
}

impl TriggerEvent {
    /// Creates a push event for the given branch
    #[must_use]
    pub fn push(branch: impl Into<String>) -> Self {
        Self {
            event: EventKind::Push,
            branch: branch.into(),
        }
    }

    /// Creates a pull request event for the given branch
    #[must_use]
    pub fn pull_request(branch: impl Into<String>) -> Self {
        Self {
            event: EventKind::PullRequest,
            branch: branch.into(),
        }
    }
}

/// A job: an ordered sequence of steps plus its dependencies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Identifier, unique within the pipeline
    pub id: String,

    /// Target execution environment descriptor
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub runs_on: Option<String>,

    /// Identifiers of jobs that must succeed before this one runs
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub needs: Vec<String>,

    /// Steps, executed strictly in order
    pub steps: Vec<Step>,

    /// Environment variables for every step of this job
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub env: HashMap<String, String>,
}

impl Job {
    /// Creates a job with the given id and steps
    #[must_use]
    pub fn new(id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            runs_on: None,
            needs: Vec::new(),
            steps,
            env: HashMap::new(),
        }
    }

    /// Adds a dependency on another job
    #[must_use]
    pub fn needs(mut self, id: impl Into<String>) -> Self {
        self.needs.push(id.into());
        self
    }

    /// Sets an environment variable for the job
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// All secret names declared by this job's steps
    #[must_use]
    pub fn declared_secrets(&self) -> HashSet<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.secrets.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({}): {} steps", self.id, self.steps.len())
    }
}

/// The whole pipeline definition document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,

    /// Trigger rules
    #[serde(default)]
    pub on: Trigger,

    /// Jobs, in declaration order
    pub jobs: Vec<Job>,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// Secret names double as environment variable names for the step
// process, so they follow the stricter identifier rule.
fn valid_secret_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PipelineDefinition {
    /// Parses a definition from a YAML document.
    ///
    /// The result is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] on parse or validation failure.
    pub fn from_yaml(input: &str) -> Result<Self, DefinitionError> {
        let definition: Self = serde_yaml::from_str(input)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Reads and parses a definition file.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] on read, parse or validation failure.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Looks a job up by id
    #[must_use]
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Number of jobs in the pipeline
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

impl Validate for PipelineDefinition {
    type Error = DefinitionError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.jobs.is_empty() {
            return Err(DefinitionError::EmptyPipeline);
        }

        let mut seen = HashSet::new();
        for job in &self.jobs {
            if !valid_name(&job.id) {
                return Err(DefinitionError::InvalidJobId { id: job.id.clone() });
            }
            if !seen.insert(job.id.as_str()) {
                return Err(DefinitionError::DuplicateJob { id: job.id.clone() });
            }
        }

        for job in &self.jobs {
            for reference in &job.needs {
                if reference == &job.id || !seen.contains(reference.as_str()) {
                    return Err(DefinitionError::UnknownDependency {
                        job: job.id.clone(),
                        reference: reference.clone(),
                    });
                }
            }

            if job.steps.is_empty() {
                return Err(DefinitionError::EmptyJob { job: job.id.clone() });
            }

            for step in &job.steps {
                for secret in &step.secrets {
                    if !valid_secret_name(secret) {
                        return Err(DefinitionError::InvalidSecretName {
                            job: job.id.clone(),
                            name: secret.clone(),
                        });
                    }
                }

                step.validate()
                    .map_err(|reason| DefinitionError::InvalidParameters {
                        job: job.id.clone(),
                        step: step.display_name().to_string(),
                        reason,
                    })?;
            }
        }

        Ok(())
    }
}

impl fmt::Display for PipelineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pipeline({}): {} jobs",
            self.name.as_deref().unwrap_or("unnamed"),
            self.jobs.len()
        )
    }
}
