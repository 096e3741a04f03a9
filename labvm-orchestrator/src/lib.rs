//! VM provisioning, lifecycle reconciliation and request approval.
//!
//! This crate owns the ledger (SQLite) and drives the hypervisor through a
//! [`labvm_core::CommandRunner`]. It is consumed by the labvm-api HTTP
//! service but has no dependency on it.

pub mod db;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod locks;
pub mod orchestrator;
pub mod provisioner;
pub mod reconciler;
pub mod request;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod vm;
pub mod vm_type;

pub use error::{OrchestratorError, Result, Severity};
pub use lifecycle::{DeleteOutcome, LifecycleAction, LifecycleController};
pub use locks::NameLocks;
pub use orchestrator::Orchestrator;
pub use provisioner::{internal_name_for, CreateVmSpec, VmProvisioner};
pub use reconciler::{DiskCleanup, DiskFailure, DomainSummary, StateReconciler, VmView};
pub use request::{
    ApprovalOverride, RequestFilters, RequestStatus, RequestWorkflow, SubmitRequest, VmRequest,
};
pub use vm::{Ledger, Vm};
pub use vm_type::{VmType, VmTypeCatalog, VmTypeInput};
