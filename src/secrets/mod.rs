//! Scoped secret storage
//!
//! Secrets are provisioned out of band (environment variables or an
//! external vault) and handed to steps only through explicit
//! declarations. Every access attempt lands in an audit log that
//! records the requesting job and the secret name, never the value.
//! Captured process output is scrubbed through [`Redactor`] before it
//! is persisted anywhere.

use crate::pipeline::PipelineDefinition;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

/// Errors returned by [`SecretStore::get`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// No secret with that name is provisioned
    #[error("secret '{name}' is not provisioned")]
    NotFound {
        /// Name of the missing secret.
        name: String,
    },

    /// The requesting job is not in the secret's scope
    #[error("job '{job}' is not allowed to read secret '{name}'")]
    AccessDenied {
        /// Job that attempted the read.
        job: String,
        /// Name of the secret.
        name: String,
    },
}

/// A secret value handed out by the store.
///
/// The wrapper keeps the value out of `Debug` output; there is no
/// `Display` implementation on purpose.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Yields the underlying value for use as process input
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue(***)")
    }
}

/// One entry in the access audit trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Job that requested the secret
    pub job: String,
    /// Name of the requested secret
    pub secret: String,
    /// Whether the read was allowed
    pub granted: bool,
    /// When the access happened
    pub at: SystemTime,
}

struct Entry {
    value: String,
    scope: HashSet<String>,
}

/// Holds credential material keyed by name and enforces per-job scope.
///
/// Reads are concurrently safe; the store is never mutated during a
/// run. Only the audit log sits behind a lock.
#[derive(Default)]
pub struct SecretStore {
    entries: HashMap<String, Entry>,
    audit: Mutex<Vec<AuditRecord>>,
}

impl SecretStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from environment variables.
    ///
    /// Variables named `<prefix><NAME>` become secrets named `<NAME>`,
    /// scoped to the jobs whose steps declare that name in the given
    /// definition.
    #[must_use]
    pub fn from_env(prefix: &str, definition: &PipelineDefinition) -> Self {
        let mut store = Self::new();
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix(prefix) {
                if !name.is_empty() {
                    store.provision(name, value);
                }
            }
        }
        store.scope_from_definition(definition);
        store
    }

    /// Provisions a secret with an empty scope.
    ///
    /// Until a scope is attached every read is denied.
    pub fn provision(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(
            name.into(),
            Entry {
                value: value.into(),
                scope: HashSet::new(),
            },
        );
    }

    /// Provisions a secret readable by the listed jobs
    pub fn provision_scoped<I, S>(&mut self, name: impl Into<String>, value: impl Into<String>, jobs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            name.into(),
            Entry {
                value: value.into(),
                scope: jobs.into_iter().map(Into::into).collect(),
            },
        );
    }

    /// Derives every secret's scope from the definition: a job is in
    /// scope exactly when one of its steps declares the name.
    pub fn scope_from_definition(&mut self, definition: &PipelineDefinition) {
        for entry in self.entries.values_mut() {
            entry.scope.clear();
        }
        for job in &definition.jobs {
            for name in job.declared_secrets() {
                if let Some(entry) = self.entries.get_mut(name) {
                    entry.scope.insert(job.id.clone());
                }
            }
        }
    }

    /// Reads a secret on behalf of a job.
    ///
    /// The attempt is recorded in the audit log whether or not it is
    /// granted.
    ///
    /// # Errors
    ///
    /// [`SecretError::NotFound`] when the name is not provisioned,
    /// [`SecretError::AccessDenied`] when the job is out of scope.
    pub fn get(&self, name: &str, job: &str) -> Result<SecretValue, SecretError> {
        let (granted, result) = match self.entries.get(name) {
            None => (
                false,
                Err(SecretError::NotFound {
                    name: name.to_string(),
                }),
            ),
            Some(entry) if !entry.scope.contains(job) => (
                false,
                Err(SecretError::AccessDenied {
                    job: job.to_string(),
                    name: name.to_string(),
                }),
            ),
            Some(entry) => (true, Ok(SecretValue(entry.value.clone()))),
        };

        self.audit.lock().push(AuditRecord {
            job: job.to_string(),
            secret: name.to_string(),
            granted,
            at: SystemTime::now(),
        });

        result
    }

    /// Returns a copy of the audit trail
    #[must_use]
    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.audit.lock().clone()
    }

    /// Names of all provisioned secrets
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Returns true when nothing is provisioned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a redactor over every provisioned value
    #[must_use]
    pub fn redactor(&self) -> Redactor {
        Redactor::new(self.entries.values().map(|e| e.value.clone()))
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore")
            .field("secrets", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// Replaces known secret values in captured text before it is
/// persisted or logged.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    values: Vec<String>,
}

/// Placeholder written over redacted material
pub const REDACTED: &str = "***";

impl Redactor {
    /// Creates a redactor over the given values
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = String>) -> Self {
        Self {
            values: values.into_iter().filter(|v| !v.is_empty()).collect(),
        }
    }

    /// Returns the input with every exact occurrence of a known value
    /// replaced by [`REDACTED`]
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        for value in &self.values {
            if output.contains(value.as_str()) {
                output = output.replace(value.as_str(), REDACTED);
            }
        }
        output
    }
}
