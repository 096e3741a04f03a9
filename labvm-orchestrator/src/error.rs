use labvm_core::ExecutionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Invalid input: {0}")]
    InvalidSpec(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("In use: {0}")]
    InUse(String),

    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    /// Disk was allocated but the install failed; the disk is left behind.
    #[error("Provisioning of {internal_name} incomplete, disk {disk_path} left behind: {source}")]
    ProvisionIncomplete {
        internal_name: String,
        disk_path: String,
        #[source]
        source: ExecutionError,
    },

    /// The domain was installed and is running but has no ledger row.
    #[error("Domain {internal_name} is running but was not recorded (disk {disk_path}): {source}")]
    UnrecordedDomain {
        internal_name: String,
        disk_path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How bad a failure is for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The caller asked for something invalid; nothing happened.
    Rejected,
    /// The operation failed cleanly.
    Failed,
    /// Artifacts were left on the host and need the cleanup sweep.
    Partial,
    /// A running domain has no ledger row; manual reconciliation required.
    Critical,
}

impl OrchestratorError {
    pub fn severity(&self) -> Severity {
        match self {
            OrchestratorError::InvalidSpec(_)
            | OrchestratorError::NotFound(_)
            | OrchestratorError::InUse(_)
            | OrchestratorError::AlreadyProcessed(_) => Severity::Rejected,
            OrchestratorError::ProvisionIncomplete { .. } => Severity::Partial,
            OrchestratorError::UnrecordedDomain { .. } => Severity::Critical,
            _ => Severity::Failed,
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Database(_) => "database",
            OrchestratorError::Migration(_) => "migration",
            OrchestratorError::Execution(_) => "execution",
            OrchestratorError::InvalidSpec(_) => "invalid_spec",
            OrchestratorError::NotFound(_) => "not_found",
            OrchestratorError::InUse(_) => "in_use",
            OrchestratorError::AlreadyProcessed(_) => "already_processed",
            OrchestratorError::ProvisionIncomplete { .. } => "provision_incomplete",
            OrchestratorError::UnrecordedDomain { .. } => "unrecorded_domain",
            OrchestratorError::Io(_) => "io",
            OrchestratorError::Internal(_) => "internal",
        }
    }
}
