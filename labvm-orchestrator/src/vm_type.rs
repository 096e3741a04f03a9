//! Catalog of OS templates (VM types).

use crate::db::{from_timestamp, is_unique_violation};
use crate::error::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VmType {
    pub id: String,
    pub name: String,
    /// OS family tag, e.g. `linux` or `windows`.
    pub os_type: String,
    /// Install media used by the unattended install.
    pub iso_path: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Administrator-supplied fields for create and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct VmTypeInput {
    pub name: String,
    pub os_type: String,
    pub iso_path: Option<String>,
    pub description: Option<String>,
}

impl VmTypeInput {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::InvalidSpec("VM type name is required".into()));
        }
        if self.os_type.trim().is_empty() {
            return Err(OrchestratorError::InvalidSpec("VM type os_type is required".into()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct VmTypeCatalog {
    pool: SqlitePool,
}

impl VmTypeCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All types ordered by name.
    pub async fn list(&self) -> Result<Vec<VmType>> {
        let rows = sqlx::query_as::<_, VmTypeRow>("SELECT * FROM vm_types ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get(&self, id: &str) -> Result<VmType> {
        let row = sqlx::query_as::<_, VmTypeRow>("SELECT * FROM vm_types WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("VM type {}", id)))?;

        Ok(row.into())
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: VmTypeInput) -> Result<VmType> {
        input.validate()?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO vm_types (id, name, os_type, iso_path, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.os_type.trim())
        .bind(&input.iso_path)
        .bind(&input.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_name(e, &input.name))?;

        info!("Created VM type {} ({})", input.name, id);
        self.get(&id).await
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn update(&self, id: &str, input: VmTypeInput) -> Result<VmType> {
        input.validate()?;

        let result = sqlx::query(
            "UPDATE vm_types
             SET name = ?, os_type = ?, iso_path = ?, description = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(input.name.trim())
        .bind(input.os_type.trim())
        .bind(&input.iso_path)
        .bind(&input.description)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_name(e, &input.name))?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound(format!("VM type {}", id)));
        }

        self.get(id).await
    }

    /// Delete a type that no VM or request references.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let vm_type = self.get(id).await?;

        let (vms, requests) = self.usage(id).await?;
        if vms > 0 || requests > 0 {
            return Err(OrchestratorError::InUse(format!(
                "VM type '{}' is referenced by {} VM(s) and {} request(s)",
                vm_type.name, vms, requests
            )));
        }

        sqlx::query("DELETE FROM vm_types WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!("Deleted VM type {} ({})", vm_type.name, id);
        Ok(())
    }

    /// Count of (VMs, requests) referencing the type.
    pub async fn usage(&self, id: &str) -> Result<(i64, i64)> {
        let vms: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vms WHERE vm_type_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        let requests: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vm_requests WHERE vm_type_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok((vms, requests))
    }
}

fn duplicate_name(err: sqlx::Error, name: &str) -> OrchestratorError {
    if is_unique_violation(&err) {
        OrchestratorError::InvalidSpec(format!("VM type name '{}' already exists", name.trim()))
    } else {
        err.into()
    }
}

#[derive(sqlx::FromRow)]
struct VmTypeRow {
    id: String,
    name: String,
    os_type: String,
    iso_path: Option<String>,
    description: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<VmTypeRow> for VmType {
    fn from(row: VmTypeRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            os_type: row.os_type,
            iso_path: row.iso_path,
            description: row.description,
            created_at: from_timestamp(row.created_at),
            updated_at: from_timestamp(row.updated_at),
        }
    }
}
