//! Helpers shared by the orchestrator and API test suites.

use crate::orchestrator::Orchestrator;
use labvm_core::{CommandRunner, ExecutionError, HostCommand, HypervisorConfig};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Helper to create an in-memory test database with migrations applied.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Hypervisor settings pointing at a scratch disk directory.
pub fn test_hypervisor(disk_dir: &Path) -> HypervisorConfig {
    HypervisorConfig {
        uri: "test:///default".to_string(),
        disk_dir: disk_dir.to_path_buf(),
        ..Default::default()
    }
}

pub fn test_orchestrator(pool: SqlitePool, runner: Arc<FakeRunner>, disk_dir: &Path) -> Orchestrator {
    Orchestrator::new(pool, runner, test_hypervisor(disk_dir))
}

/// Records every command and answers from a script instead of running
/// anything. Commands succeed with empty output unless a failure rule
/// matches; `virsh list` returns the configured listing.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, String)>>,
    listing: Mutex<String>,
    elevation: Vec<String>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            elevation: vec!["sudo".to_string(), "-n".to_string()],
            ..Default::default()
        })
    }

    /// Fail every command whose command line contains `fragment`.
    pub fn fail_when(&self, fragment: &str, stderr: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((fragment.to_string(), stderr.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Set the domain rows returned by `virsh list --all`.
    pub fn set_domains(&self, rows: &[(&str, &str, &str)]) {
        let mut listing = String::from(" Id   Name   State\n----------------------\n");
        for (id, name, state) in rows {
            listing.push_str(&format!(" {}    {}    {}\n", id, name, state));
        }
        *self.listing.lock().unwrap() = listing;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, fragment: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.contains(fragment))
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl CommandRunner for FakeRunner {
    fn execute(&self, command: &HostCommand) -> labvm_core::error::Result<String> {
        let line = command.to_string();
        self.calls.lock().unwrap().push(line.clone());

        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| line.contains(fragment.as_str()))
            .map(|(_, stderr)| stderr.clone());
        if let Some(stderr) = failure {
            return Err(ExecutionError::failed(line, Some(1), stderr));
        }

        if line.contains(" list --all") {
            return Ok(self.listing.lock().unwrap().clone());
        }

        Ok(String::new())
    }

    fn elevation(&self) -> &[String] {
        &self.elevation
    }
}
