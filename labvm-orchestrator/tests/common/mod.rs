//! Shared fixtures for the orchestrator integration tests.

#![allow(dead_code)]

use labvm_orchestrator::test_utils::{create_test_db, test_orchestrator, FakeRunner};
use labvm_orchestrator::{CreateVmSpec, Orchestrator, SubmitRequest, VmType, VmTypeInput};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub runner: Arc<FakeRunner>,
    pub disks: TempDir,
}

pub async fn harness() -> Harness {
    let pool = create_test_db().await;
    let runner = FakeRunner::new();
    let disks = tempfile::tempdir().expect("Failed to create disk dir");
    let orchestrator = test_orchestrator(pool, runner.clone(), disks.path());

    Harness {
        orchestrator,
        runner,
        disks,
    }
}

pub fn ubuntu_input() -> VmTypeInput {
    VmTypeInput {
        name: "ubuntu-22.04".to_string(),
        os_type: "linux".to_string(),
        iso_path: Some("/srv/iso/ubuntu-22.04.iso".to_string()),
        description: Some("Ubuntu server for labs".to_string()),
    }
}

pub async fn fixture_vm_type(orchestrator: &Orchestrator) -> VmType {
    orchestrator
        .catalog
        .create(ubuntu_input())
        .await
        .expect("Failed to create fixture VM type")
}

pub fn vm_spec(name: &str, vm_type: &VmType) -> CreateVmSpec {
    CreateVmSpec {
        name: name.to_string(),
        memory_mb: 2048,
        vcpus: 2,
        storage_gb: 20,
        os_type: vm_type.os_type.clone(),
        iso_path: vm_type.iso_path.clone().expect("fixture type has media"),
        vm_type_id: vm_type.id.clone(),
        owner: Some("alice".to_string()),
        description: None,
        ip_address: None,
    }
}

pub fn request_payload(user: &str, vm_type: &VmType) -> SubmitRequest {
    SubmitRequest {
        user_id: user.to_string(),
        purpose: "Operating systems coursework".to_string(),
        course: Some("CS-340".to_string()),
        duration: Some("1 semester".to_string()),
        description: None,
        memory_mb: 2048,
        vcpus: 2,
        storage_gb: 20,
        os_type: None,
        vm_type_id: Some(vm_type.id.clone()),
    }
}
