//! Execution context shared between the controller, the job runner
//! and the step executor.

use crate::secrets::{Redactor, SecretStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Sender side of a cancellation signal.
///
/// Cloneable; the controller keeps one and flips it when an abort is
/// requested.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Creates a fresh, untripped cancellation signal
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests cancellation; all tokens observe it
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Creates a token observing this handle
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that can never be cancelled, for standalone execution
    #[must_use]
    pub fn never() -> Self {
        CancelHandle::new().token()
    }

    /// Returns true once cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is requested; pends forever if the
    /// handle is dropped without cancelling
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

/// Everything a job's steps need at execution time
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Identifier of the job being executed
    pub job_id: String,
    /// Working directory for the job's steps
    pub workspace: PathBuf,
    /// Environment variables visible to every step
    pub env: HashMap<String, String>,
    /// Outputs of the job's direct dependencies, by job id
    pub upstream: HashMap<String, HashMap<String, String>>,
    /// Secret store handle, scope-checked per access
    pub secrets: Arc<SecretStore>,
    /// Redactor applied to captured output
    pub redactor: Redactor,
    /// Cancellation token for the run
    pub cancel: CancelToken,
    /// Shell used for `run` steps
    pub shell: String,
    /// Timeout applied when a step declares none
    pub default_timeout: Duration,
    /// Grace period between a cancellation request and a forced kill
    pub grace: Duration,
}

impl JobContext {
    /// Creates a context with engine defaults, suitable for tests and
    /// standalone runner use
    #[must_use]
    pub fn new(job_id: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            job_id: job_id.into(),
            workspace: workspace.into(),
            env: HashMap::new(),
            upstream: HashMap::new(),
            secrets: Arc::new(SecretStore::new()),
            redactor: Redactor::default(),
            cancel: CancelToken::never(),
            shell: "sh".to_string(),
            default_timeout: Duration::from_secs(3600),
            grace: Duration::from_secs(5),
        }
    }

    /// Sets an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Attaches a secret store and its redactor
    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<SecretStore>) -> Self {
        self.redactor = secrets.redactor();
        self.secrets = secrets;
        self
    }
}
