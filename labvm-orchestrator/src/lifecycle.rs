use crate::error::{OrchestratorError, Result};
use crate::host::Host;
use crate::locks::NameLocks;
use crate::vm::{Ledger, Vm, STATE_RUNNING, STATE_SHUTTING_DOWN, STATE_STOPPED, STATE_SUSPENDED};
use labvm_core::{DomainAction, Escalation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Start,
    /// Forceful power-off.
    Stop,
    /// Graceful ACPI shutdown.
    Shutdown,
    Restart,
    Suspend,
    Resume,
}

impl LifecycleAction {
    pub fn domain_action(&self) -> DomainAction {
        match self {
            LifecycleAction::Start => DomainAction::Start,
            LifecycleAction::Stop => DomainAction::Destroy,
            LifecycleAction::Shutdown => DomainAction::Shutdown,
            LifecycleAction::Restart => DomainAction::Reboot,
            LifecycleAction::Suspend => DomainAction::Suspend,
            LifecycleAction::Resume => DomainAction::Resume,
        }
    }

    /// State persisted after the command succeeds. A reboot keeps the
    /// current state.
    pub fn resulting_state(&self) -> Option<&'static str> {
        match self {
            LifecycleAction::Start | LifecycleAction::Resume => Some(STATE_RUNNING),
            LifecycleAction::Stop => Some(STATE_STOPPED),
            LifecycleAction::Shutdown => Some(STATE_SHUTTING_DOWN),
            LifecycleAction::Suspend => Some(STATE_SUSPENDED),
            LifecycleAction::Restart => None,
        }
    }
}

impl FromStr for LifecycleAction {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(LifecycleAction::Start),
            "stop" => Ok(LifecycleAction::Stop),
            "shutdown" => Ok(LifecycleAction::Shutdown),
            "restart" => Ok(LifecycleAction::Restart),
            "suspend" => Ok(LifecycleAction::Suspend),
            "resume" => Ok(LifecycleAction::Resume),
            other => Err(OrchestratorError::InvalidSpec(format!(
                "unknown lifecycle action '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteOutcome {
    /// The record as it was before deletion.
    pub vm: Vm,
    pub storage_removed: bool,
}

#[derive(Clone)]
pub struct LifecycleController {
    host: Host,
    ledger: Ledger,
    locks: NameLocks,
}

impl LifecycleController {
    pub fn new(host: Host, ledger: Ledger, locks: NameLocks) -> Self {
        Self {
            host,
            ledger,
            locks,
        }
    }

    pub async fn start(&self, reference: &str) -> Result<Vm> {
        self.apply(reference, LifecycleAction::Start).await
    }

    pub async fn stop(&self, reference: &str) -> Result<Vm> {
        self.apply(reference, LifecycleAction::Stop).await
    }

    pub async fn shutdown(&self, reference: &str) -> Result<Vm> {
        self.apply(reference, LifecycleAction::Shutdown).await
    }

    pub async fn restart(&self, reference: &str) -> Result<Vm> {
        self.apply(reference, LifecycleAction::Restart).await
    }

    pub async fn suspend(&self, reference: &str) -> Result<Vm> {
        self.apply(reference, LifecycleAction::Suspend).await
    }

    pub async fn resume(&self, reference: &str) -> Result<Vm> {
        self.apply(reference, LifecycleAction::Resume).await
    }

    #[instrument(skip(self))]
    pub async fn apply(&self, reference: &str, action: LifecycleAction) -> Result<Vm> {
        let (vm, _guard) = self.lock(reference).await?;

        let command = self
            .host
            .config()
            .domain(action.domain_action(), &vm.internal_name);
        self.host.run(command, Escalation::Allowed).await?;

        info!("{:?} succeeded for {}", action, vm.internal_name);

        match action.resulting_state() {
            Some(state) => self.ledger.update_state(&vm.internal_name, state).await,
            None => Ok(vm),
        }
    }

    /// Destroy (best effort), undefine, optionally remove the disk, then drop
    /// the ledger row. A failed undefine leaves disk and row untouched.
    #[instrument(skip(self))]
    pub async fn delete(&self, reference: &str, remove_storage: bool) -> Result<DeleteOutcome> {
        let (vm, _guard) = self.lock(reference).await?;
        let config = self.host.config();

        if let Err(e) = self
            .host
            .run(
                config.domain(DomainAction::Destroy, &vm.internal_name),
                Escalation::Allowed,
            )
            .await
        {
            debug!("Ignoring destroy failure for {}: {}", vm.internal_name, e);
        }

        self.host
            .run(
                config.domain(DomainAction::Undefine, &vm.internal_name),
                Escalation::Allowed,
            )
            .await?;

        let storage_removed = if remove_storage {
            let disk = std::path::Path::new(&vm.disk_path);
            match self
                .host
                .run(config.remove_file(disk), Escalation::Allowed)
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    warn!(
                        "Could not remove disk {} of {}, leaving it for cleanup: {}",
                        vm.disk_path, vm.internal_name, e
                    );
                    false
                }
            }
        } else {
            false
        };

        self.ledger.delete(&vm.internal_name).await?;
        info!("Deleted VM {} ({})", vm.name, vm.internal_name);

        Ok(DeleteOutcome {
            vm,
            storage_removed,
        })
    }

    /// Resolve the reference, take the per-name lock and re-read the row
    /// under it.
    async fn lock(&self, reference: &str) -> Result<(Vm, OwnedMutexGuard<()>)> {
        let found = self.ledger.find(reference).await?;
        let guard = self.locks.acquire(&found.internal_name).await;
        let vm = self.ledger.get_by_internal_name(&found.internal_name).await?;
        Ok((vm, guard))
    }
}
