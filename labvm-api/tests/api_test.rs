//! Integration tests for REST API endpoints
//!
//! Runs the full router against an in-memory ledger and a scripted
//! hypervisor runner.

mod common;

use axum::http::StatusCode;
use common::{assert_error_envelope, fixture_vm_type, vm_body, TestApp};
use serde_json::json;

#[tokio::test]
async fn test_api_requires_identity() {
    let t = TestApp::new().await;

    let (status, body) = t.send("GET", "/api/v1/vms", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error_envelope(&body, "unauthorized");
}

#[tokio::test]
async fn test_forwarded_user_header_is_accepted() {
    let t = TestApp::new().await;

    let request = axum::http::Request::builder()
        .uri("/api/v1/vm-types")
        .header("x-forwarded-user", "admin")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(t.app.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_needs_no_identity() {
    let t = TestApp::new().await;

    let (status, body) = t.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "labvm-api");

    let (status, body) = t.send("GET", "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");
    assert!(body["tools"].is_object());
}

#[tokio::test]
async fn test_create_vm_defaults_owner_to_caller() {
    let t = TestApp::new().await;
    let vm_type = fixture_vm_type(&t.orchestrator).await;

    let (status, body) = t
        .post("/api/v1/vms", "alice", vm_body("web-lab", &vm_type))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "web-lab");
    assert_eq!(body["data"]["owner"], "alice");
    assert_eq!(body["data"]["state"], "running");
    assert_eq!(t.runner.calls_matching("virt-install").len(), 1);
}

#[tokio::test]
async fn test_create_vm_with_mismatched_os_is_bad_request() {
    let t = TestApp::new().await;
    let vm_type = fixture_vm_type(&t.orchestrator).await;
    let mut body = vm_body("web-lab", &vm_type);
    body["os_type"] = json!("windows");

    let (status, body) = t.post("/api/v1/vms", "alice", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error_envelope(&body, "invalid_spec");
    assert_eq!(body["severity"], "rejected");
    assert!(t.runner.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let t = TestApp::new().await;

    let (status, body) = t
        .post("/api/v1/vm-types", "admin", json!({ "name": 42 }))
        .await;

    assert!(status.is_client_error());
    assert_error_envelope(&body, "bad_request");
}

#[tokio::test]
async fn test_list_and_get_merge_live_state() {
    let t = TestApp::new().await;
    let vm_type = fixture_vm_type(&t.orchestrator).await;
    let (_, created) = t
        .post("/api/v1/vms", "alice", vm_body("web-lab", &vm_type))
        .await;
    let internal = created["data"]["internal_name"].as_str().unwrap().to_string();

    let (status, body) = t.get("/api/v1/vms?running=true", "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    t.runner.set_domains(&[("5", internal.as_str(), "running")]);

    let (_, body) = t.get("/api/v1/vms?running=true", "alice").await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["internal_name"], internal.as_str());
    assert_eq!(rows[0]["live_state"], "running");
    assert_eq!(rows[0]["status"], "running");
    assert_eq!(rows[0]["domain_id"], "5");

    let (status, body) = t.get("/api/v1/vms/web-lab", "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["internal_name"], internal.as_str());

    let (status, body) = t.get("/api/v1/vms/missing", "alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error_envelope(&body, "not_found");
}

#[tokio::test]
async fn test_lifecycle_actions() {
    let t = TestApp::new().await;
    let vm_type = fixture_vm_type(&t.orchestrator).await;
    t.post("/api/v1/vms", "alice", vm_body("web-lab", &vm_type))
        .await;

    let (status, body) = t.post("/api/v1/vms/web-lab/stop", "alice", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "stopped");

    let (status, body) = t
        .post("/api/v1/vms/web-lab/hibernate", "alice", json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error_envelope(&body, "invalid_spec");
}

#[tokio::test]
async fn test_hypervisor_failure_is_bad_gateway_with_stderr() {
    let t = TestApp::new().await;
    let vm_type = fixture_vm_type(&t.orchestrator).await;
    t.post("/api/v1/vms", "alice", vm_body("web-lab", &vm_type))
        .await;
    t.runner
        .fail_when(" start ", "error: Failed to start domain: no bootable device");

    let (status, body) = t.post("/api/v1/vms/web-lab/start", "alice", json!({})).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_error_envelope(&body, "execution");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("no bootable device"));
}

#[tokio::test]
async fn test_delete_vm_with_storage() {
    let t = TestApp::new().await;
    let vm_type = fixture_vm_type(&t.orchestrator).await;
    t.post("/api/v1/vms", "alice", vm_body("web-lab", &vm_type))
        .await;

    let (status, body) = t
        .delete("/api/v1/vms/web-lab?remove_storage=true", "alice")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["storage_removed"], true);
    assert_eq!(t.runner.calls_matching("rm -f --").len(), 1);

    let (status, _) = t.get("/api/v1/vms/web-lab", "alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_approval_flow() {
    let t = TestApp::new().await;
    let vm_type = fixture_vm_type(&t.orchestrator).await;

    let (status, body) = t
        .post(
            "/api/v1/requests",
            "bob",
            json!({
                "purpose": "Networking lab",
                "course": "CS-350",
                "duration": "4 weeks",
                "description": null,
                "memory_mb": 2048,
                "vcpus": 2,
                "storage_gb": 20,
                "os_type": null,
                "vm_type_id": vm_type.id
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user_id"], "bob");
    assert_eq!(body["data"]["status"], "pending");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = t.get("/api/v1/requests?status=pending", "admin").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Approve with no body at all
    let (status, body) = t
        .send("POST", &format!("/api/v1/requests/{}/approve", id), Some("admin"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["request"]["status"], "approved");
    assert_eq!(body["data"]["vm"]["memory_mb"], 2048);
    assert_eq!(body["data"]["vm"]["owner"], "bob");
    assert_eq!(body["data"]["request"]["vm_id"], body["data"]["vm"]["id"]);

    let (status, body) = t
        .post(
            &format!("/api/v1/requests/{}/reject", id),
            "admin",
            json!({ "reason": "too late" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_error_envelope(&body, "already_processed");
}

#[tokio::test]
async fn test_reject_request_with_reason() {
    let t = TestApp::new().await;
    let vm_type = fixture_vm_type(&t.orchestrator).await;
    let request = t
        .orchestrator
        .workflow
        .submit(labvm_orchestrator::SubmitRequest {
            user_id: "bob".to_string(),
            purpose: "Databases lab".to_string(),
            course: None,
            duration: None,
            description: None,
            memory_mb: 1024,
            vcpus: 1,
            storage_gb: 10,
            os_type: None,
            vm_type_id: Some(vm_type.id.clone()),
        })
        .await
        .unwrap();

    let (status, body) = t
        .post(
            &format!("/api/v1/requests/{}/reject", request.id),
            "admin",
            json!({ "reason": "insufficient quota" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["response_message"], "insufficient quota");
    assert!(body["data"]["vm_id"].is_null());
}

#[tokio::test]
async fn test_vm_type_crud_and_in_use_conflict() {
    let t = TestApp::new().await;

    let (status, body) = t
        .post(
            "/api/v1/vm-types",
            "admin",
            json!({ "name": "debian-12", "os_type": "linux", "iso_path": "/srv/iso/debian-12.iso" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = t
        .send(
            "PUT",
            &format!("/api/v1/vm-types/{}", id),
            Some("admin"),
            Some(json!({ "name": "debian-12", "os_type": "linux", "iso_path": "/srv/iso/debian-12.1.iso" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["iso_path"], "/srv/iso/debian-12.1.iso");

    let vm_type = t.orchestrator.catalog.get(&id).await.unwrap();
    t.post("/api/v1/vms", "alice", vm_body("db-lab", &vm_type))
        .await;

    let (status, body) = t.delete(&format!("/api/v1/vm-types/{}", id), "admin").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_error_envelope(&body, "in_use");

    t.delete("/api/v1/vms/db-lab", "admin").await;

    let (status, body) = t.delete(&format!("/api/v1/vm-types/{}", id), "admin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = t.get(&format!("/api/v1/vm-types/{}", id), "admin").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_maintenance_endpoints() {
    let t = TestApp::new().await;
    let orphan_disk = t.disks.path().join("leftover.qcow2");
    std::fs::write(&orphan_disk, b"qcow").unwrap();
    t.runner
        .set_domains(&[("9", "leftover-1b2c", "running")]);

    let (status, body) = t.get("/api/v1/maintenance/orphans", "admin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "leftover-1b2c");

    let (status, body) = t
        .post("/api/v1/maintenance/cleanup-disks", "admin", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["removed"][0],
        orphan_disk.display().to_string()
    );

    let (status, body) = t
        .post("/api/v1/maintenance/refresh", "admin", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}
