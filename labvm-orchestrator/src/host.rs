use crate::error::{OrchestratorError, Result};
use labvm_core::{CommandRunner, Escalation, HostCommand, HypervisorConfig};
use std::sync::Arc;

/// The hypervisor host: a command runner plus the settings used to build
/// command lines for it.
#[derive(Clone)]
pub struct Host {
    runner: Arc<dyn CommandRunner>,
    config: Arc<HypervisorConfig>,
}

impl Host {
    pub fn new(runner: Arc<dyn CommandRunner>, config: HypervisorConfig) -> Self {
        Self {
            runner,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HypervisorConfig {
        &self.config
    }

    /// Run a command on the blocking pool; the caller waits for the process.
    pub async fn run(&self, command: HostCommand, escalation: Escalation) -> Result<String> {
        let runner = self.runner.clone();

        let output = tokio::task::spawn_blocking(move || runner.run(&command, escalation))
            .await
            .map_err(|e| OrchestratorError::Internal(format!("command task failed: {}", e)))??;

        Ok(output)
    }
}
