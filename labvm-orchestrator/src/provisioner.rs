//! Turns a validated [`CreateVmSpec`] into a disk image, a running domain and a
//! ledger row.
//!
//! The steps run strictly in order and nothing is rolled back: the CLI tools
//! offer no multi-step transaction. A failed install leaves its disk behind
//! for [`StateReconciler::cleanup_unused_disks`], and a failed ledger insert
//! after a successful install is reported as
//! [`OrchestratorError::UnrecordedDomain`].
//!
//! [`StateReconciler::cleanup_unused_disks`]: crate::reconciler::StateReconciler::cleanup_unused_disks

use crate::error::{OrchestratorError, Result};
use crate::host::Host;
use crate::locks::{display_name_key, NameLocks};
use crate::vm::{Ledger, NewVm, Vm, STATE_RUNNING};
use crate::vm_type::VmTypeCatalog;
use labvm_core::{Escalation, InstallSpec};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateVmSpec {
    pub name: String,
    pub memory_mb: i64,
    pub vcpus: i64,
    pub storage_gb: i64,
    pub os_type: String,
    pub iso_path: String,
    pub vm_type_id: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub ip_address: Option<String>,
}

impl CreateVmSpec {
    fn validate_resources(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(OrchestratorError::InvalidSpec("VM name is required".into()));
        }
        if name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.chars().any(char::is_control)
        {
            return Err(OrchestratorError::InvalidSpec(format!(
                "VM name '{}' must not start with '.' or contain path separators or control characters",
                name.escape_default()
            )));
        }
        for (field, value) in [
            ("memory_mb", self.memory_mb),
            ("vcpus", self.vcpus),
            ("storage_gb", self.storage_gb),
        ] {
            if value <= 0 {
                return Err(OrchestratorError::InvalidSpec(format!(
                    "{} must be positive, got {}",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

/// `{display name}-{uuid}`, with every character outside `[A-Za-z0-9._-]`
/// replaced by a hyphen. The result is safe as a file name.
pub fn internal_name_for(display_name: &str, id: &Uuid) -> String {
    let sanitized: String = display_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    format!("{}-{}", sanitized, id)
}

#[derive(Clone)]
pub struct VmProvisioner {
    host: Host,
    ledger: Ledger,
    catalog: VmTypeCatalog,
    locks: NameLocks,
}

impl VmProvisioner {
    pub fn new(host: Host, ledger: Ledger, catalog: VmTypeCatalog, locks: NameLocks) -> Self {
        Self {
            host,
            ledger,
            catalog,
            locks,
        }
    }

    /// The display name stays locked from the uniqueness check until the
    /// ledger insert, so a duplicate never reaches the hypervisor.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn provision(&self, spec: CreateVmSpec) -> Result<Vm> {
        let _guard = self.locks.acquire(&display_name_key(&spec.name)).await;
        self.validate(&spec).await?;

        let id = Uuid::new_v4();
        let internal_name = internal_name_for(&spec.name, &id);
        let disk = self.host.config().disk_path(&internal_name);
        let disk_path = disk.display().to_string();

        if disk.parent() != Some(self.host.config().disk_dir.as_path()) {
            return Err(OrchestratorError::InvalidSpec(format!(
                "disk path {} is outside the disk directory",
                disk_path
            )));
        }

        if tokio::fs::try_exists(&disk).await? {
            return Err(OrchestratorError::InvalidSpec(format!(
                "disk path {} already exists",
                disk_path
            )));
        }

        info!("Allocating {}G disk at {}", spec.storage_gb, disk_path);
        self.host
            .run(
                self.host.config().create_disk(&disk, spec.storage_gb),
                Escalation::Allowed,
            )
            .await?;

        info!("Installing domain {}", internal_name);
        let install = self.host.config().install(&InstallSpec {
            name: &internal_name,
            memory_mb: spec.memory_mb,
            vcpus: spec.vcpus,
            disk_path: &disk,
            iso_path: &spec.iso_path,
        });

        match self.host.run(install, Escalation::Forbidden).await {
            Ok(_) => {}
            Err(OrchestratorError::Execution(source)) => {
                error!("Install of {} failed, disk {} left behind", internal_name, disk_path);
                return Err(OrchestratorError::ProvisionIncomplete {
                    internal_name,
                    disk_path,
                    source,
                });
            }
            Err(other) => return Err(other),
        }

        let record = NewVm {
            id: id.to_string(),
            name: spec.name.trim().to_string(),
            internal_name: internal_name.clone(),
            state: STATE_RUNNING.to_string(),
            os_type: spec.os_type,
            disk_path: disk_path.clone(),
            memory_mb: spec.memory_mb,
            vcpus: spec.vcpus,
            storage_gb: spec.storage_gb,
            owner: spec.owner,
            vm_type_id: Some(spec.vm_type_id),
            ip_address: spec.ip_address,
            description: spec.description,
        };

        let vm = self.ledger.insert(&record).await.map_err(|source| {
            error!(
                "Domain {} is running but the ledger insert failed: {}",
                internal_name, source
            );
            OrchestratorError::UnrecordedDomain {
                internal_name: internal_name.clone(),
                disk_path: disk_path.clone(),
                source,
            }
        })?;

        info!("Provisioned VM {} as {}", vm.name, vm.internal_name);
        Ok(vm)
    }

    /// Catalog and ledger checks. Runs before any host command.
    async fn validate(&self, spec: &CreateVmSpec) -> Result<()> {
        spec.validate_resources()?;

        let vm_type = match self.catalog.get(&spec.vm_type_id).await {
            Ok(vm_type) => vm_type,
            Err(OrchestratorError::NotFound(_)) => {
                return Err(OrchestratorError::InvalidSpec(format!(
                    "VM type {} does not exist",
                    spec.vm_type_id
                )))
            }
            Err(other) => return Err(other),
        };

        if vm_type.os_type != spec.os_type {
            return Err(OrchestratorError::InvalidSpec(format!(
                "os_type '{}' does not match VM type '{}' ({})",
                spec.os_type, vm_type.name, vm_type.os_type
            )));
        }

        if vm_type.iso_path.as_deref() != Some(spec.iso_path.as_str()) {
            return Err(OrchestratorError::InvalidSpec(format!(
                "install media '{}' does not match VM type '{}'",
                spec.iso_path, vm_type.name
            )));
        }

        if self.ledger.name_exists(spec.name.trim()).await? {
            return Err(OrchestratorError::InvalidSpec(format!(
                "VM name '{}' is already in use",
                spec.name.trim()
            )));
        }

        Ok(())
    }
}
