//! VM ledger rows and their persistence.

use crate::db::from_timestamp;
use crate::error::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use labvm_core::VmStatus;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::instrument;
use utoipa::ToSchema;

pub const STATE_RUNNING: &str = "running";
pub const STATE_STOPPED: &str = "stopped";
pub const STATE_SUSPENDED: &str = "suspended";
/// Transitional marker written by a graceful shutdown.
pub const STATE_SHUTTING_DOWN: &str = "shutting-down";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Vm {
    pub id: String,
    /// User-facing display name.
    pub name: String,
    /// Name of the domain on the hypervisor.
    pub internal_name: String,
    /// Last known hypervisor state, free text.
    pub state: String,
    pub os_type: String,
    pub disk_path: String,
    pub memory_mb: i64,
    pub vcpus: i64,
    pub storage_gb: i64,
    pub owner: Option<String>,
    pub vm_type_id: Option<String>,
    pub ip_address: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vm {
    pub fn status(&self) -> VmStatus {
        VmStatus::from_hypervisor(&self.state)
    }
}

/// Values for a freshly provisioned row.
#[derive(Debug, Clone)]
pub(crate) struct NewVm {
    pub id: String,
    pub name: String,
    pub internal_name: String,
    pub state: String,
    pub os_type: String,
    pub disk_path: String,
    pub memory_mb: i64,
    pub vcpus: i64,
    pub storage_gb: i64,
    pub owner: Option<String>,
    pub vm_type_id: Option<String>,
    pub ip_address: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) async fn insert(&self, vm: &NewVm) -> std::result::Result<Vm, sqlx::Error> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO vms (id, name, internal_name, state, os_type, disk_path, memory_mb, vcpus, storage_gb,
                             owner, vm_type_id, ip_address, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&vm.id)
        .bind(&vm.name)
        .bind(&vm.internal_name)
        .bind(&vm.state)
        .bind(&vm.os_type)
        .bind(&vm.disk_path)
        .bind(vm.memory_mb)
        .bind(vm.vcpus)
        .bind(vm.storage_gb)
        .bind(&vm.owner)
        .bind(&vm.vm_type_id)
        .bind(&vm.ip_address)
        .bind(&vm.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, VmRow>("SELECT * FROM vms WHERE id = ?")
            .bind(&vm.id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    pub async fn get(&self, id: &str) -> Result<Vm> {
        self.fetch("SELECT * FROM vms WHERE id = ?", id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("VM {}", id)))
    }

    pub async fn get_by_internal_name(&self, internal_name: &str) -> Result<Vm> {
        self.fetch("SELECT * FROM vms WHERE internal_name = ?", internal_name)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("VM {}", internal_name)))
    }

    /// Resolve a reference by internal hypervisor name, then by display name.
    pub async fn find(&self, reference: &str) -> Result<Vm> {
        if let Some(vm) = self
            .fetch("SELECT * FROM vms WHERE internal_name = ?", reference)
            .await?
        {
            return Ok(vm);
        }

        self.fetch("SELECT * FROM vms WHERE name = ?", reference)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("VM {}", reference)))
    }

    pub async fn name_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vms WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    /// Every ledger row, oldest first.
    pub async fn list_all(&self) -> Result<Vec<Vm>> {
        let rows = sqlx::query_as::<_, VmRow>("SELECT * FROM vms ORDER BY created_at, name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn disk_paths(&self) -> Result<Vec<String>> {
        let paths = sqlx::query_scalar("SELECT disk_path FROM vms")
            .fetch_all(&self.pool)
            .await?;

        Ok(paths)
    }

    #[instrument(skip(self))]
    pub async fn update_state(&self, internal_name: &str, state: &str) -> Result<Vm> {
        let result = sqlx::query("UPDATE vms SET state = ?, updated_at = ? WHERE internal_name = ?")
            .bind(state)
            .bind(Utc::now().timestamp())
            .bind(internal_name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound(format!("VM {}", internal_name)));
        }

        self.get_by_internal_name(internal_name).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, internal_name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM vms WHERE internal_name = ?")
            .bind(internal_name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound(format!("VM {}", internal_name)));
        }

        Ok(())
    }

    /// Clear ownership of a deleted user's VMs. Returns the number of rows.
    #[instrument(skip(self))]
    pub async fn detach_owner(&self, user: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE vms SET owner = NULL, updated_at = ? WHERE owner = ?")
            .bind(Utc::now().timestamp())
            .bind(user)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn fetch(&self, query: &str, value: &str) -> Result<Option<Vm>> {
        let row = sqlx::query_as::<_, VmRow>(query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }
}

#[derive(sqlx::FromRow)]
struct VmRow {
    id: String,
    name: String,
    internal_name: String,
    state: String,
    os_type: String,
    disk_path: String,
    memory_mb: i64,
    vcpus: i64,
    storage_gb: i64,
    owner: Option<String>,
    vm_type_id: Option<String>,
    ip_address: Option<String>,
    description: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<VmRow> for Vm {
    fn from(row: VmRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            internal_name: row.internal_name,
            state: row.state,
            os_type: row.os_type,
            disk_path: row.disk_path,
            memory_mb: row.memory_mb,
            vcpus: row.vcpus,
            storage_gb: row.storage_gb,
            owner: row.owner,
            vm_type_id: row.vm_type_id,
            ip_address: row.ip_address,
            description: row.description,
            created_at: from_timestamp(row.created_at),
            updated_at: from_timestamp(row.updated_at),
        }
    }
}
