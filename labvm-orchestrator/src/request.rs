//! VM request workflow: `pending -> approved | rejected`, both terminal.

use crate::db::from_timestamp;
use crate::error::{OrchestratorError, Result};
use crate::locks::{request_key, NameLocks};
use crate::provisioner::{CreateVmSpec, VmProvisioner};
use crate::vm::Vm;
use crate::vm_type::VmTypeCatalog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_REJECTION: &str = "Request rejected by administrator";
pub const DEFAULT_APPROVAL: &str = "Request approved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VmRequest {
    pub id: String,
    pub user_id: String,
    pub purpose: String,
    pub course: Option<String>,
    pub duration: Option<String>,
    pub description: Option<String>,
    pub memory_mb: i64,
    pub vcpus: i64,
    pub storage_gb: i64,
    pub os_type: String,
    pub vm_type_id: Option<String>,
    pub status: RequestStatus,
    pub response_message: Option<String>,
    /// Set once approved.
    pub vm_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitRequest {
    pub user_id: String,
    pub purpose: String,
    pub course: Option<String>,
    pub duration: Option<String>,
    pub description: Option<String>,
    pub memory_mb: i64,
    pub vcpus: i64,
    pub storage_gb: i64,
    /// Defaults to the VM type's os family.
    pub os_type: Option<String>,
    pub vm_type_id: Option<String>,
}

/// Administrator adjustments applied on approval; each set field wins over
/// the requested value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ApprovalOverride {
    pub name: Option<String>,
    pub memory_mb: Option<i64>,
    pub vcpus: Option<i64>,
    pub storage_gb: Option<i64>,
    pub os_type: Option<String>,
    pub iso_path: Option<String>,
    pub vm_type_id: Option<String>,
    pub description: Option<String>,
    pub ip_address: Option<String>,
    pub response_message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilters {
    pub user_id: Option<String>,
    pub status: Option<RequestStatus>,
}

#[derive(Clone)]
pub struct RequestWorkflow {
    pool: SqlitePool,
    catalog: VmTypeCatalog,
    provisioner: VmProvisioner,
    locks: NameLocks,
}

impl RequestWorkflow {
    pub fn new(
        pool: SqlitePool,
        catalog: VmTypeCatalog,
        provisioner: VmProvisioner,
        locks: NameLocks,
    ) -> Self {
        Self {
            pool,
            catalog,
            provisioner,
            locks,
        }
    }

    #[instrument(skip(self, payload), fields(user = %payload.user_id))]
    pub async fn submit(&self, payload: SubmitRequest) -> Result<VmRequest> {
        if payload.user_id.trim().is_empty() {
            return Err(OrchestratorError::InvalidSpec("user_id is required".into()));
        }
        if payload.purpose.trim().is_empty() {
            return Err(OrchestratorError::InvalidSpec("purpose is required".into()));
        }
        for (field, value) in [
            ("memory_mb", payload.memory_mb),
            ("vcpus", payload.vcpus),
            ("storage_gb", payload.storage_gb),
        ] {
            if value <= 0 {
                return Err(OrchestratorError::InvalidSpec(format!(
                    "{} must be positive, got {}",
                    field, value
                )));
            }
        }

        let type_os = match &payload.vm_type_id {
            Some(type_id) => match self.catalog.get(type_id).await {
                Ok(vm_type) => Some(vm_type.os_type),
                Err(OrchestratorError::NotFound(_)) => {
                    return Err(OrchestratorError::InvalidSpec(format!(
                        "VM type {} does not exist",
                        type_id
                    )))
                }
                Err(other) => return Err(other),
            },
            None => None,
        };

        let os_type = payload
            .os_type
            .filter(|os| !os.trim().is_empty())
            .or(type_os)
            .ok_or_else(|| OrchestratorError::InvalidSpec("os_type is required".into()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO vm_requests (id, user_id, purpose, course, duration, description, memory_mb, vcpus,
                                     storage_gb, os_type, vm_type_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(payload.user_id.trim())
        .bind(payload.purpose.trim())
        .bind(&payload.course)
        .bind(&payload.duration)
        .bind(&payload.description)
        .bind(payload.memory_mb)
        .bind(payload.vcpus)
        .bind(payload.storage_gb)
        .bind(&os_type)
        .bind(&payload.vm_type_id)
        .bind(RequestStatus::Pending)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!("Submitted VM request {}", id);
        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<VmRequest> {
        let row = sqlx::query_as::<_, VmRequestRow>("SELECT * FROM vm_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("VM request {}", id)))?;

        Ok(row.into())
    }

    /// Requests with optional filters, newest first.
    pub async fn list(&self, filters: RequestFilters) -> Result<Vec<VmRequest>> {
        let mut query = "SELECT * FROM vm_requests WHERE 1=1".to_string();

        if filters.user_id.is_some() {
            query.push_str(" AND user_id = ?");
        }
        if filters.status.is_some() {
            query.push_str(" AND status = ?");
        }

        query.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query_as::<_, VmRequestRow>(&query);

        if let Some(user_id) = &filters.user_id {
            q = q.bind(user_id);
        }
        if let Some(status) = &filters.status {
            q = q.bind(status);
        }

        let rows = q.fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Provision the requested VM and mark the request approved. The request
    /// stays pending if provisioning fails, so approval can be retried.
    #[instrument(skip(self, overrides))]
    pub async fn approve(
        &self,
        id: &str,
        overrides: Option<ApprovalOverride>,
    ) -> Result<(VmRequest, Vm)> {
        let _guard = self.locks.acquire(&request_key(id)).await;

        let request = self.get(id).await?;
        ensure_pending(&request)?;

        let overrides = overrides.unwrap_or_default();
        let response_message = overrides
            .response_message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APPROVAL.to_string());

        let spec = self.merge(&request, overrides).await?;
        let vm = self.provisioner.provision(spec).await?;

        let result = sqlx::query(
            "UPDATE vm_requests
             SET status = ?, vm_id = ?, response_message = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(RequestStatus::Approved)
        .bind(&vm.id)
        .bind(&response_message)
        .bind(Utc::now().timestamp())
        .bind(id)
        .bind(RequestStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            error!(
                "Request {} changed during provisioning; VM {} is not linked to it",
                id, vm.internal_name
            );
            return Err(OrchestratorError::AlreadyProcessed(format!(
                "VM request {} is no longer pending",
                id
            )));
        }

        info!("Approved VM request {} -> VM {}", id, vm.id);
        Ok((self.get(id).await?, vm))
    }

    #[instrument(skip(self))]
    pub async fn reject(&self, id: &str, reason: Option<String>) -> Result<VmRequest> {
        let _guard = self.locks.acquire(&request_key(id)).await;

        let request = self.get(id).await?;
        ensure_pending(&request)?;

        let message = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION.to_string());

        let result = sqlx::query(
            "UPDATE vm_requests
             SET status = ?, response_message = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(RequestStatus::Rejected)
        .bind(&message)
        .bind(Utc::now().timestamp())
        .bind(id)
        .bind(RequestStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::AlreadyProcessed(format!(
                "VM request {} is no longer pending",
                id
            )));
        }

        info!("Rejected VM request {}", id);
        self.get(id).await
    }

    async fn merge(&self, request: &VmRequest, overrides: ApprovalOverride) -> Result<CreateVmSpec> {
        let vm_type_id = overrides
            .vm_type_id
            .or_else(|| request.vm_type_id.clone())
            .ok_or_else(|| {
                OrchestratorError::InvalidSpec(format!(
                    "VM request {} has no VM type to provision from",
                    request.id
                ))
            })?;

        let vm_type = match self.catalog.get(&vm_type_id).await {
            Ok(vm_type) => vm_type,
            Err(OrchestratorError::NotFound(_)) => {
                return Err(OrchestratorError::InvalidSpec(format!(
                    "VM type {} does not exist",
                    vm_type_id
                )))
            }
            Err(other) => return Err(other),
        };

        let iso_path = overrides
            .iso_path
            .or(vm_type.iso_path)
            .ok_or_else(|| {
                OrchestratorError::InvalidSpec(format!(
                    "VM type '{}' has no install media",
                    vm_type.name
                ))
            })?;

        Ok(CreateVmSpec {
            name: overrides
                .name
                .unwrap_or_else(|| default_vm_name(request)),
            memory_mb: overrides.memory_mb.unwrap_or(request.memory_mb),
            vcpus: overrides.vcpus.unwrap_or(request.vcpus),
            storage_gb: overrides.storage_gb.unwrap_or(request.storage_gb),
            os_type: overrides.os_type.unwrap_or_else(|| request.os_type.clone()),
            iso_path,
            vm_type_id,
            owner: Some(request.user_id.clone()),
            description: overrides.description.or_else(|| request.description.clone()),
            ip_address: overrides.ip_address,
        })
    }
}

fn ensure_pending(request: &VmRequest) -> Result<()> {
    if request.status != RequestStatus::Pending {
        return Err(OrchestratorError::AlreadyProcessed(format!(
            "VM request {} is already {:?}",
            request.id, request.status
        )));
    }
    Ok(())
}

/// `{user}-{first 8 chars of the request id}`
fn default_vm_name(request: &VmRequest) -> String {
    let short: String = request.id.chars().take(8).collect();
    format!("{}-{}", request.user_id, short)
}

#[derive(sqlx::FromRow)]
struct VmRequestRow {
    id: String,
    user_id: String,
    purpose: String,
    course: Option<String>,
    duration: Option<String>,
    description: Option<String>,
    memory_mb: i64,
    vcpus: i64,
    storage_gb: i64,
    os_type: String,
    vm_type_id: Option<String>,
    status: RequestStatus,
    response_message: Option<String>,
    vm_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<VmRequestRow> for VmRequest {
    fn from(row: VmRequestRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            purpose: row.purpose,
            course: row.course,
            duration: row.duration,
            description: row.description,
            memory_mb: row.memory_mb,
            vcpus: row.vcpus,
            storage_gb: row.storage_gb,
            os_type: row.os_type,
            vm_type_id: row.vm_type_id,
            status: row.status,
            response_message: row.response_message,
            vm_id: row.vm_id,
            created_at: from_timestamp(row.created_at),
            updated_at: from_timestamp(row.updated_at),
        }
    }
}
