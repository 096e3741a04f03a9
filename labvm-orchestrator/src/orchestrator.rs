use crate::host::Host;
use crate::lifecycle::LifecycleController;
use crate::locks::NameLocks;
use crate::provisioner::VmProvisioner;
use crate::reconciler::StateReconciler;
use crate::request::RequestWorkflow;
use crate::vm::Ledger;
use crate::vm_type::VmTypeCatalog;
use labvm_core::{CommandRunner, HypervisorConfig};
use sqlx::SqlitePool;
use std::sync::Arc;

/// All components wired to one pool, one host and one lock table.
#[derive(Clone)]
pub struct Orchestrator {
    pool: SqlitePool,
    host: Host,
    pub ledger: Ledger,
    pub catalog: VmTypeCatalog,
    pub provisioner: VmProvisioner,
    pub lifecycle: LifecycleController,
    pub reconciler: StateReconciler,
    pub workflow: RequestWorkflow,
}

impl Orchestrator {
    pub fn new(pool: SqlitePool, runner: Arc<dyn CommandRunner>, config: HypervisorConfig) -> Self {
        let host = Host::new(runner, config);
        let locks = NameLocks::new();
        let ledger = Ledger::new(pool.clone());
        let catalog = VmTypeCatalog::new(pool.clone());
        let provisioner = VmProvisioner::new(host.clone(), ledger.clone(), catalog.clone(), locks.clone());

        Self {
            lifecycle: LifecycleController::new(host.clone(), ledger.clone(), locks.clone()),
            reconciler: StateReconciler::new(host.clone(), ledger.clone(), locks.clone()),
            workflow: RequestWorkflow::new(pool.clone(), catalog.clone(), provisioner.clone(), locks),
            pool,
            host,
            ledger,
            catalog,
            provisioner,
        }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn hypervisor(&self) -> &HypervisorConfig {
        self.host.config()
    }
}
