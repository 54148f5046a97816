//! Step types for pipeline jobs
//!
//! A step is the atomic unit of work inside a job: either a shell
//! command or one of the built-in capability invocations. Capability
//! parameters are validated when the definition is loaded, so a
//! malformed step never reaches execution.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The kind of work a step performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepKind {
    /// Shell command execution
    Run {
        /// Command to execute
        command: String,
    },

    /// Populate the working directory from source control
    Checkout {
        /// Revision reference to check out (branch, tag or commit)
        revision: String,
        /// Repository to clone; the working directory is assumed to be
        /// a repository already when absent
        #[serde(skip_serializing_if = "Option::is_none", default)]
        url: Option<String>,
    },

    /// Build a container image from a build context
    ImageBuild {
        /// Build context path, relative to the working directory
        context: String,
        /// Image reference to tag the result with
        tag: String,
    },

    /// Authenticate against a container registry
    RegistryLogin {
        /// Registry host to log in to
        registry: String,
        /// Name of the declared secret holding the username
        username_secret: String,
        /// Name of the declared secret holding the password
        password_secret: String,
    },

    /// Push a previously built image to its registry
    ImagePush {
        /// Image reference to push
        tag: String,
    },
}

impl StepKind {
    /// Short label identifying the kind, used in logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Checkout { .. } => "checkout",
            Self::ImageBuild { .. } => "image-build",
            Self::RegistryLogin { .. } => "registry-login",
            Self::ImagePush { .. } => "image-push",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run { command } => write!(f, "run({command})"),
            Self::Checkout { revision, .. } => write!(f, "checkout({revision})"),
            Self::ImageBuild { context, tag } => write!(f, "image-build({context}, {tag})"),
            Self::RegistryLogin { registry, .. } => write!(f, "registry-login({registry})"),
            Self::ImagePush { tag } => write!(f, "image-push({tag})"),
        }
    }
}

/// A single step in a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// What the step does
    #[serde(flatten)]
    pub kind: StepKind,

    /// Optional name for the step
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,

    /// Names of the secrets this step is allowed to read.
    ///
    /// This list is the only route to secret material: the store
    /// rejects reads of anything not declared here.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub secrets: Vec<String>,

    /// Output keys a `run` step produces via its output file
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub outputs: Vec<String>,

    /// Timeout override for this step, in seconds
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout_secs: Option<u64>,
}

impl Step {
    /// Creates a new step of the given kind
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            name: None,
            secrets: Vec::new(),
            outputs: Vec::new(),
            timeout_secs: None,
        }
    }

    /// Creates a shell command step
    pub fn run(command: impl Into<String>) -> Self {
        Self::new(StepKind::Run {
            command: command.into(),
        })
    }

    /// Creates a checkout step for an already-populated repository
    pub fn checkout(revision: impl Into<String>) -> Self {
        Self::new(StepKind::Checkout {
            revision: revision.into(),
            url: None,
        })
    }

    /// Creates a checkout step that clones first
    pub fn checkout_from(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self::new(StepKind::Checkout {
            revision: revision.into(),
            url: Some(url.into()),
        })
    }

    /// Creates an image build step
    pub fn image_build(context: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(StepKind::ImageBuild {
            context: context.into(),
            tag: tag.into(),
        })
    }

    /// Creates a registry login step.
    ///
    /// The two secret names are added to the step's declarations.
    pub fn registry_login(
        registry: impl Into<String>,
        username_secret: impl Into<String>,
        password_secret: impl Into<String>,
    ) -> Self {
        let username_secret = username_secret.into();
        let password_secret = password_secret.into();
        let mut step = Self::new(StepKind::RegistryLogin {
            registry: registry.into(),
            username_secret: username_secret.clone(),
            password_secret: password_secret.clone(),
        });
        step.secrets = vec![username_secret, password_secret];
        step
    }

    /// Creates an image push step
    pub fn image_push(tag: impl Into<String>) -> Self {
        Self::new(StepKind::ImagePush { tag: tag.into() })
    }

    /// Sets the name of the step
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declares a secret the step needs
    pub fn with_secret(mut self, name: impl Into<String>) -> Self {
        self.secrets.push(name.into());
        self
    }

    /// Declares an output key the step produces
    pub fn with_output(mut self, key: impl Into<String>) -> Self {
        self.outputs.push(key.into());
        self
    }

    /// Sets the timeout for the step
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Name shown in logs and reports: the explicit name when present,
    /// the kind label otherwise
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.label())
    }

    /// The effective timeout, falling back to the given default
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.map_or(default, Duration::from_secs)
    }

    /// Validates the step's parameters.
    ///
    /// Returns a human-readable reason when a required parameter is
    /// missing or malformed. Ran at definition-load time.
    pub fn validate(&self) -> Result<(), String> {
        match &self.kind {
            StepKind::Run { command } => {
                if command.trim().is_empty() {
                    return Err("command cannot be empty".to_string());
                }
            }
            StepKind::Checkout { revision, url } => {
                if revision.trim().is_empty() {
                    return Err("revision cannot be empty".to_string());
                }
                if let Some(url) = url {
                    if url.trim().is_empty() {
                        return Err("url cannot be empty when present".to_string());
                    }
                }
            }
            StepKind::ImageBuild { context, tag } => {
                if context.trim().is_empty() {
                    return Err("build context cannot be empty".to_string());
                }
                if tag.trim().is_empty() {
                    return Err("image tag cannot be empty".to_string());
                }
            }
            StepKind::RegistryLogin {
                registry,
                username_secret,
                password_secret,
            } => {
                if registry.trim().is_empty() {
                    return Err("registry cannot be empty".to_string());
                }
                for secret in [username_secret, password_secret] {
                    if secret.trim().is_empty() {
                        return Err("secret name cannot be empty".to_string());
                    }
                    if !self.secrets.iter().any(|s| s == secret) {
                        return Err(format!("secret '{secret}' is not declared by the step"));
                    }
                }
            }
            StepKind::ImagePush { tag } => {
                if tag.trim().is_empty() {
                    return Err("image tag cannot be empty".to_string());
                }
            }
        }

        if self.timeout_secs == Some(0) {
            return Err("timeout must be positive".to_string());
        }

        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Step({}): {}", name, self.kind),
            None => write!(f, "Step: {}", self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_step() {
        let step = Step::run("cargo test");
        assert!(matches!(step.kind, StepKind::Run { .. }));
        assert_eq!(step.kind.label(), "run");
        assert_eq!(step.to_string(), "Step: run(cargo test)");
    }

    #[test]
    fn test_step_with_name() {
        let step = Step::run("make").with_name("build");
        assert_eq!(step.display_name(), "build");
        assert_eq!(step.to_string(), "Step(build): run(make)");
    }

    #[test]
    fn test_display_name_falls_back_to_label() {
        let step = Step::image_push("app:latest");
        assert_eq!(step.display_name(), "image-push");
    }

    #[test]
    fn test_timeout_fallback() {
        let step = Step::run("sleep 1");
        assert_eq!(step.timeout(Duration::from_secs(30)), Duration::from_secs(30));
        let step = step.with_timeout_secs(5);
        assert_eq!(step.timeout(Duration::from_secs(30)), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_empty_command() {
        let step = Step::run("  ");
        assert!(step.validate().is_err());
    }

    #[test]
    fn test_validate_checkout() {
        assert!(Step::checkout("main").validate().is_ok());
        assert!(Step::checkout("").validate().is_err());
    }

    #[test]
    fn test_validate_image_build() {
        assert!(Step::image_build(".", "app:latest").validate().is_ok());
        assert!(Step::image_build("", "app:latest").validate().is_err());
        assert!(Step::image_build(".", "").validate().is_err());
    }

    #[test]
    fn test_registry_login_declares_secrets() {
        let step = Step::registry_login("ghcr.io", "REG_USER", "REG_TOKEN");
        assert_eq!(step.secrets, vec!["REG_USER", "REG_TOKEN"]);
        assert!(step.validate().is_ok());
    }

    #[test]
    fn test_registry_login_undeclared_secret_rejected() {
        let mut step = Step::registry_login("ghcr.io", "REG_USER", "REG_TOKEN");
        step.secrets.clear();
        let err = step.validate().unwrap_err();
        assert!(err.contains("not declared"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let step = Step::run("true").with_timeout_secs(0);
        assert!(step.validate().is_err());
    }

    #[test]
    fn test_step_yaml_round_trip() {
        let yaml = "type: image-build\ncontext: .\ntag: app:latest\n";
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            step.kind,
            StepKind::ImageBuild { ref context, ref tag } if context == "." && tag == "app:latest"
        ));
    }

    #[test]
    fn test_run_step_yaml_with_outputs() {
        let yaml = "type: run\ncommand: ./version.sh\noutputs: [version]\n";
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.outputs, vec!["version"]);
    }
}
