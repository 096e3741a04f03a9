//! Integration tests for the request approval workflow.

mod common;

use common::{fixture_vm_type, harness, request_payload};
use labvm_orchestrator::{
    ApprovalOverride, OrchestratorError, RequestFilters, RequestStatus, SubmitRequest,
};

#[tokio::test]
async fn test_submit_defaults_os_type_from_vm_type() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;

    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .expect("Failed to submit");

    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.os_type, "linux");
    assert_eq!(request.vm_id, None);
    assert_eq!(request.response_message, None);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_submit_validates_payload() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;

    let mut no_purpose = request_payload("bob", &vm_type);
    no_purpose.purpose = "   ".to_string();
    let err = h.orchestrator.workflow.submit(no_purpose).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidSpec(_)));

    let mut bad_vcpus = request_payload("bob", &vm_type);
    bad_vcpus.vcpus = 0;
    let err = h.orchestrator.workflow.submit(bad_vcpus).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidSpec(_)));

    let untyped = SubmitRequest {
        vm_type_id: None,
        os_type: None,
        ..request_payload("bob", &vm_type)
    };
    let err = h.orchestrator.workflow.submit(untyped).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidSpec(_)));
}

#[tokio::test]
async fn test_approve_provisions_requested_resources() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .unwrap();

    let (approved, vm) = h
        .orchestrator
        .workflow
        .approve(&request.id, None)
        .await
        .expect("Failed to approve");

    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.vm_id.as_deref(), Some(vm.id.as_str()));
    assert_eq!(approved.response_message.as_deref(), Some("Request approved"));

    assert_eq!(vm.memory_mb, 2048);
    assert_eq!(vm.vcpus, 2);
    assert_eq!(vm.storage_gb, 20);
    assert_eq!(vm.os_type, vm_type.os_type);
    assert_eq!(vm.owner.as_deref(), Some("bob"));
    assert_eq!(vm.name, format!("bob-{}", &request.id[..8]));
    assert_eq!(h.runner.calls_matching("virt-install").len(), 1);
}

#[tokio::test]
async fn test_approval_overrides_win() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .unwrap();

    let overrides = ApprovalOverride {
        name: Some("bob-kernel-lab".to_string()),
        memory_mb: Some(4096),
        storage_gb: Some(40),
        response_message: Some("Bumped memory for kernel builds".to_string()),
        ..Default::default()
    };
    let (approved, vm) = h
        .orchestrator
        .workflow
        .approve(&request.id, Some(overrides))
        .await
        .expect("Failed to approve");

    assert_eq!(vm.name, "bob-kernel-lab");
    assert_eq!(vm.memory_mb, 4096);
    assert_eq!(vm.vcpus, 2);
    assert_eq!(vm.storage_gb, 40);
    assert_eq!(
        approved.response_message.as_deref(),
        Some("Bumped memory for kernel builds")
    );
    assert!(h.runner.calls()[0].ends_with("40G"));
}

#[tokio::test]
async fn test_path_like_user_cannot_steer_default_vm_name() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("../../tmp/mallory", &vm_type))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .workflow
        .approve(&request.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidSpec(_)));
    assert!(h.runner.calls().is_empty());
    let request = h.orchestrator.workflow.get(&request.id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    let overrides = ApprovalOverride {
        name: Some("mallory-lab".to_string()),
        ..Default::default()
    };
    let (_, vm) = h
        .orchestrator
        .workflow
        .approve(&request.id, Some(overrides))
        .await
        .expect("Failed to approve with a safe name");
    assert_eq!(
        std::path::Path::new(&vm.disk_path).parent(),
        Some(h.disks.path())
    );
}

#[tokio::test]
async fn test_decided_request_cannot_be_decided_again() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .unwrap();
    h.orchestrator
        .workflow
        .approve(&request.id, None)
        .await
        .unwrap();
    h.runner.reset_calls();

    let err = h
        .orchestrator
        .workflow
        .approve(&request.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AlreadyProcessed(_)));

    let err = h
        .orchestrator
        .workflow
        .reject(&request.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AlreadyProcessed(_)));

    assert!(h.runner.calls().is_empty());
    assert_eq!(h.orchestrator.ledger.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_provisioning_leaves_request_pending() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .unwrap();
    h.runner
        .fail_when("virt-install", "ERROR    Disk not found");

    let err = h
        .orchestrator
        .workflow
        .approve(&request.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ProvisionIncomplete { .. }));

    let still_pending = h.orchestrator.workflow.get(&request.id).await.unwrap();
    assert_eq!(still_pending.status, RequestStatus::Pending);
    assert_eq!(still_pending.vm_id, None);

    h.runner.clear_failures();
    let (approved, _vm) = h
        .orchestrator
        .workflow
        .approve(&request.id, None)
        .await
        .expect("Retry should succeed");
    assert_eq!(approved.status, RequestStatus::Approved);
}

#[tokio::test]
async fn test_reject_records_reason() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .unwrap();

    let rejected = h
        .orchestrator
        .workflow
        .reject(&request.id, Some("insufficient quota".to_string()))
        .await
        .expect("Failed to reject");

    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.response_message.as_deref(), Some("insufficient quota"));
    assert_eq!(rejected.vm_id, None);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_reject_without_reason_uses_default_message() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .unwrap();

    let rejected = h
        .orchestrator
        .workflow
        .reject(&request.id, Some("  ".to_string()))
        .await
        .unwrap();

    assert_eq!(
        rejected.response_message.as_deref(),
        Some("Request rejected by administrator")
    );
}

#[tokio::test]
async fn test_missing_request_is_not_found() {
    let h = harness().await;

    let err = h
        .orchestrator
        .workflow
        .approve("missing", None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));

    let err = h
        .orchestrator
        .workflow
        .reject("missing", None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_approvals_provision_once() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let orchestrator = h.orchestrator.clone();
            let id = request.id.clone();
            tokio::spawn(async move { orchestrator.workflow.approve(&id, None).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, OrchestratorError::AlreadyProcessed(_))),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(h.runner.calls_matching("virt-install").len(), 1);
    assert_eq!(h.orchestrator.ledger.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_filters_by_user_and_status() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let bob = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .unwrap();
    h.orchestrator
        .workflow
        .submit(request_payload("carol", &vm_type))
        .await
        .unwrap();
    h.orchestrator
        .workflow
        .reject(&bob.id, None)
        .await
        .unwrap();

    let all = h
        .orchestrator
        .workflow
        .list(RequestFilters::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let bobs = h
        .orchestrator
        .workflow
        .list(RequestFilters {
            user_id: Some("bob".to_string()),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].id, bob.id);

    let pending = h
        .orchestrator
        .workflow
        .list(RequestFilters {
            user_id: None,
            status: Some(RequestStatus::Pending),
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].user_id, "carol");
}

#[tokio::test]
async fn test_approved_request_keeps_vm_reference_after_vm_deletion() {
    let h = harness().await;
    let vm_type = fixture_vm_type(&h.orchestrator).await;
    let request = h
        .orchestrator
        .workflow
        .submit(request_payload("bob", &vm_type))
        .await
        .unwrap();
    let (_, vm) = h
        .orchestrator
        .workflow
        .approve(&request.id, None)
        .await
        .unwrap();

    h.orchestrator
        .lifecycle
        .delete(&vm.internal_name, true)
        .await
        .unwrap();

    let after = h.orchestrator.workflow.get(&request.id).await.unwrap();
    assert_eq!(after.status, RequestStatus::Approved);
    assert_eq!(after.vm_id.as_deref(), Some(vm.id.as_str()));
}
