//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size of the worker pool: how many jobs of a wave run at once
    pub worker_slots: usize,
    /// Timeout applied to steps that declare none
    pub step_timeout: Duration,
    /// Grace period between a cancellation request and a forced kill
    pub cancel_grace: Duration,
    /// Directory under which per-run job workspaces are created
    pub workspace_root: PathBuf,
    /// Shell used for `run` steps; may carry flags, e.g. `bash -eu`
    pub shell: String,
    /// Prefix of environment variables provisioning secrets
    pub secret_env_prefix: String,
    /// Log level
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_slots: 4,
            step_timeout: Duration::from_secs(3600),
            cancel_grace: Duration::from_secs(5),
            workspace_root: PathBuf::from(".conveyor/workspaces"),
            shell: "sh".to_string(),
            secret_env_prefix: "CONVEYOR_SECRET_".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Sets the worker pool size, clamped to at least one slot
    #[must_use]
    pub fn with_worker_slots(mut self, slots: usize) -> Self {
        self.worker_slots = slots.max(1);
        self
    }

    /// Sets the default step timeout
    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Sets the workspace root directory
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_slots, 4);
        assert_eq!(config.shell, "sh");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_worker_slots_clamped() {
        let config = EngineConfig::default().with_worker_slots(0);
        assert_eq!(config.worker_slots, 1);
    }
}
