//! Merges the ledger with live hypervisor state.
//!
//! The ledger decides which VMs exist; the hypervisor decides whether they
//! are running. Listing never writes; [`StateReconciler::refresh_states`] is
//! the explicit pass that persists live state.

use crate::error::{OrchestratorError, Result};
use crate::host::Host;
use crate::locks::NameLocks;
use crate::vm::{Ledger, Vm, STATE_SHUTTING_DOWN};
use chrono::Utc;
use labvm_core::{parse_domain_list, Escalation, LiveDomain, VmStatus, OFFLINE_STATE};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

/// A ledger row with its live hypervisor state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VmView {
    #[serde(flatten)]
    pub vm: Vm,
    /// State as reported right now, `shut off` if the domain is not listed.
    pub live_state: String,
    pub status: VmStatus,
    /// Hypervisor id of an active domain.
    pub domain_id: Option<String>,
}

impl VmView {
    fn merge(vm: Vm, live: Option<&LiveDomain>) -> Self {
        let live_state = live
            .map(|domain| domain.state.clone())
            .unwrap_or_else(|| OFFLINE_STATE.to_string());

        Self {
            status: VmStatus::from_hypervisor(&live_state),
            domain_id: live.and_then(|domain| domain.id.clone()),
            live_state,
            vm,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainSummary {
    pub id: Option<String>,
    pub name: String,
    pub state: String,
}

impl From<LiveDomain> for DomainSummary {
    fn from(domain: LiveDomain) -> Self {
        Self {
            id: domain.id,
            name: domain.name,
            state: domain.state,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DiskCleanup {
    pub removed: Vec<String>,
    pub failed: Vec<DiskFailure>,
    /// Unreferenced disks younger than the grace period.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiskFailure {
    pub path: String,
    pub error: String,
}

#[derive(Clone)]
pub struct StateReconciler {
    host: Host,
    ledger: Ledger,
    locks: NameLocks,
}

impl StateReconciler {
    pub fn new(host: Host, ledger: Ledger, locks: NameLocks) -> Self {
        Self {
            host,
            ledger,
            locks,
        }
    }

    pub async fn live_domains(&self) -> Result<Vec<LiveDomain>> {
        let output = self
            .host
            .run(self.host.config().list_domains(), Escalation::Allowed)
            .await?;

        Ok(parse_domain_list(&output))
    }

    /// Every ledger row exactly once, merged with live state.
    #[instrument(skip(self))]
    pub async fn list(&self, only_running: bool) -> Result<Vec<VmView>> {
        let live = self.live_domains().await?;
        let by_name: HashMap<&str, &LiveDomain> =
            live.iter().map(|d| (d.name.as_str(), d)).collect();

        let views = self
            .ledger
            .list_all()
            .await?
            .into_iter()
            .map(|vm| {
                let domain = by_name.get(vm.internal_name.as_str()).copied();
                VmView::merge(vm, domain)
            })
            .filter(|view| !only_running || view.status == VmStatus::Running)
            .collect();

        Ok(views)
    }

    /// One VM by internal or display name, merged with live state.
    pub async fn get(&self, reference: &str) -> Result<VmView> {
        let vm = self.ledger.find(reference).await?;
        let live = self.live_domains().await?;
        let domain = live.iter().find(|d| d.name == vm.internal_name);

        Ok(VmView::merge(vm, domain))
    }

    /// Live domains with no ledger row, e.g. left by a failed provisioning.
    pub async fn orphaned_domains(&self) -> Result<Vec<DomainSummary>> {
        let known: HashSet<String> = self
            .ledger
            .list_all()
            .await?
            .into_iter()
            .map(|vm| vm.internal_name)
            .collect();

        Ok(self
            .live_domains()
            .await?
            .into_iter()
            .filter(|domain| !known.contains(&domain.name))
            .map(Into::into)
            .collect())
    }

    /// Persist live state for rows whose stored state is out of date,
    /// including the transitional `shutting-down` marker. Rows changed after
    /// the listing was taken are left alone.
    #[instrument(skip(self))]
    pub async fn refresh_states(&self) -> Result<Vec<Vm>> {
        let snapshot_at = Utc::now();
        let live = self.live_domains().await?;
        let by_name: HashMap<&str, &LiveDomain> =
            live.iter().map(|d| (d.name.as_str(), d)).collect();

        let mut updated = Vec::new();

        for vm in self.ledger.list_all().await? {
            let live_state = by_name
                .get(vm.internal_name.as_str())
                .map(|d| d.state.as_str())
                .unwrap_or(OFFLINE_STATE);

            let stale = vm.state == STATE_SHUTTING_DOWN
                || vm.status() != VmStatus::from_hypervisor(live_state);
            if !stale {
                continue;
            }

            let _guard = self.locks.acquire(&vm.internal_name).await;
            let current = match self.ledger.get_by_internal_name(&vm.internal_name).await {
                Ok(current) => current,
                Err(OrchestratorError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if current.updated_at.timestamp() >= snapshot_at.timestamp() {
                continue;
            }

            info!(
                "Refreshing state of {}: '{}' -> '{}'",
                vm.internal_name, current.state, live_state
            );
            updated.push(
                self.ledger
                    .update_state(&vm.internal_name, live_state)
                    .await?,
            );
        }

        Ok(updated)
    }

    /// Remove qcow2 images in the disk directory that no ledger row
    /// references. Files modified within `grace` are skipped so an
    /// in-flight provisioning keeps its disk.
    #[instrument(skip(self))]
    pub async fn cleanup_unused_disks(&self, grace: Duration) -> Result<DiskCleanup> {
        let disk_dir = self.host.config().disk_dir.clone();
        let candidates = tokio::task::spawn_blocking(move || scan_disks(&disk_dir))
            .await
            .map_err(|e| OrchestratorError::Internal(format!("disk scan failed: {}", e)))??;

        let referenced: HashSet<PathBuf> = self
            .ledger
            .disk_paths()
            .await?
            .into_iter()
            .map(PathBuf::from)
            .collect();

        let mut report = DiskCleanup::default();
        let now = SystemTime::now();

        for (path, modified) in candidates {
            if referenced.contains(&path) {
                continue;
            }

            let shown = path.display().to_string();
            let age = modified
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or(Duration::MAX);
            if age < grace {
                report.skipped.push(shown);
                continue;
            }

            match self
                .host
                .run(self.host.config().remove_file(&path), Escalation::Allowed)
                .await
            {
                Ok(_) => {
                    info!("Removed unused disk {}", shown);
                    report.removed.push(shown);
                }
                Err(e) => {
                    warn!("Failed to remove unused disk {}: {}", shown, e);
                    report.failed.push(DiskFailure {
                        path: shown,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

fn scan_disks(disk_dir: &Path) -> Result<Vec<(PathBuf, Option<SystemTime>)>> {
    let pattern = disk_dir.join("*.qcow2");
    let pattern = pattern.to_string_lossy();

    let entries = glob::glob(&pattern)
        .map_err(|e| OrchestratorError::Internal(format!("bad disk pattern {}: {}", pattern, e)))?;

    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .map(|path| {
            let modified = path.metadata().and_then(|m| m.modified()).ok();
            (path, modified)
        })
        .collect())
}
