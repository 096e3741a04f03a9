use labvm_orchestrator::Orchestrator;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Grace period applied by the disk cleanup endpoint.
    pub disk_grace: Duration,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, disk_grace: Duration) -> Self {
        Self {
            orchestrator,
            disk_grace,
        }
    }
}
