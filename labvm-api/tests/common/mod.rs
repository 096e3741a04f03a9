//! Common test utilities and helpers for labvm-api tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use labvm_api::{create_app, AppState};
use labvm_orchestrator::test_utils::{create_test_db, test_orchestrator, FakeRunner};
use labvm_orchestrator::{Orchestrator, VmType, VmTypeInput};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

/// App wired to an in-memory ledger and a scripted hypervisor.
pub struct TestApp {
    pub app: Router,
    pub orchestrator: Orchestrator,
    pub runner: Arc<FakeRunner>,
    pub disks: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = create_test_db().await;
        let runner = FakeRunner::new();
        let disks = tempfile::tempdir().expect("Failed to create disk dir");
        let orchestrator = test_orchestrator(pool, runner.clone(), disks.path());
        let app = create_app(AppState::new(orchestrator.clone(), Duration::ZERO));

        Self {
            app,
            orchestrator,
            runner,
            disks,
        }
    }

    /// Send a request and decode the JSON body.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(user) = user {
            builder = builder.header("x-labvm-user", user);
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Failed to deserialize JSON")
        };

        (status, json)
    }

    pub async fn get(&self, uri: &str, user: &str) -> (StatusCode, Value) {
        self.send("GET", uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(user), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: &str) -> (StatusCode, Value) {
        self.send("DELETE", uri, Some(user), None).await
    }
}

/// Fixture: the Ubuntu template used across tests
pub async fn fixture_vm_type(orchestrator: &Orchestrator) -> VmType {
    orchestrator
        .catalog
        .create(VmTypeInput {
            name: "ubuntu-22.04".to_string(),
            os_type: "linux".to_string(),
            iso_path: Some("/srv/iso/ubuntu-22.04.iso".to_string()),
            description: None,
        })
        .await
        .expect("Failed to create fixture VM type")
}

pub fn vm_body(name: &str, vm_type: &VmType) -> Value {
    serde_json::json!({
        "name": name,
        "memory_mb": 2048,
        "vcpus": 2,
        "storage_gb": 20,
        "os_type": vm_type.os_type,
        "iso_path": vm_type.iso_path,
        "vm_type_id": vm_type.id,
        "owner": null,
        "description": null,
        "ip_address": null
    })
}

/// Failed responses always carry the error envelope.
pub fn assert_error_envelope(body: &Value, kind: &str) {
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], kind);
    assert!(body["message"].is_string());
    assert!(body["severity"].is_string());
}
