use crate::error::ErrorBody;
use crate::routes::requests::{ApprovalResult, NewRequestBody, RejectBody};
use labvm_core::VmStatus;
use labvm_orchestrator::{
    ApprovalOverride, CreateVmSpec, DeleteOutcome, DiskCleanup, DiskFailure, DomainSummary,
    RequestStatus, Severity, Vm, VmRequest, VmType, VmTypeInput, VmView,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::vms::create_vm,
        crate::routes::vms::list_vms,
        crate::routes::vms::get_vm,
        crate::routes::vms::vm_action,
        crate::routes::vms::delete_vm,
        crate::routes::requests::submit_request,
        crate::routes::requests::list_requests,
        crate::routes::requests::get_request,
        crate::routes::requests::approve_request,
        crate::routes::requests::reject_request,
        crate::routes::vm_types::list_vm_types,
        crate::routes::vm_types::create_vm_type,
        crate::routes::vm_types::get_vm_type,
        crate::routes::vm_types::update_vm_type,
        crate::routes::vm_types::delete_vm_type,
        crate::routes::maintenance::cleanup_disks,
        crate::routes::maintenance::refresh_states,
        crate::routes::maintenance::orphaned_domains,
    ),
    components(
        schemas(
            Vm,
            VmView,
            VmStatus,
            CreateVmSpec,
            DeleteOutcome,
            VmType,
            VmTypeInput,
            VmRequest,
            RequestStatus,
            NewRequestBody,
            ApprovalOverride,
            ApprovalResult,
            RejectBody,
            DiskCleanup,
            DiskFailure,
            DomainSummary,
            ErrorBody,
            Severity
        )
    ),
    tags(
        (name = "labvm-api", description = "Lab VM provisioning API")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/api/v1/vms",
            "/api/v1/vms/{name}",
            "/api/v1/vms/{name}/{action}",
            "/api/v1/requests/{id}/approve",
            "/api/v1/vm-types/{id}",
            "/api/v1/maintenance/orphans",
            "/health/ready",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {}",
                expected
            );
        }
    }
}
