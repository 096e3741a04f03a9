use labvm_orchestrator::Orchestrator;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Periodically persist live state and sweep unreferenced disks.
pub async fn start_janitor_task(orchestrator: Orchestrator, interval_secs: u64, grace: Duration) {
    let mut interval = interval(Duration::from_secs(interval_secs));

    info!(
        "Janitor task running (checks every {} seconds)",
        interval_secs
    );

    loop {
        interval.tick().await;

        if let Err(e) = run_janitor_pass(&orchestrator, grace).await {
            error!("Janitor pass failed: {}", e);
        }
    }
}

pub async fn run_janitor_pass(orchestrator: &Orchestrator, grace: Duration) -> anyhow::Result<()> {
    let refreshed = orchestrator.reconciler.refresh_states().await?;
    for vm in &refreshed {
        info!("Janitor refreshed {} to '{}'", vm.internal_name, vm.state);
    }

    let report = orchestrator.reconciler.cleanup_unused_disks(grace).await?;
    if !report.removed.is_empty() || !report.failed.is_empty() {
        info!(
            "Janitor removed {} unused disk(s), {} failed",
            report.removed.len(),
            report.failed.len()
        );
    }

    Ok(())
}
