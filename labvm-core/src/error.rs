use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use thiserror::Error;

/// Stderr fragments that indicate the command lacked privileges.
const PERMISSION_MARKERS: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "authentication failed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    /// The process ran and exited non-zero.
    Failed,
    /// The process exceeded its time budget and was killed.
    TimedOut,
    /// The process could not be started or waited on.
    Spawn,
}

impl Display for ExecutionKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ExecutionKind::Failed => write!(f, "Command failed"),
            ExecutionKind::TimedOut => write!(f, "Command timed out"),
            ExecutionKind::Spawn => write!(f, "Command could not be run"),
        }
    }
}

/// A failed external command. The raw stderr is kept verbatim so operators
/// can diagnose hypervisor failures from the message alone.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {command}\n{stderr}")]
pub struct ExecutionError {
    pub kind: ExecutionKind,
    pub command: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ExecutionError {
    pub fn failed(command: impl Into<String>, exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            kind: ExecutionKind::Failed,
            command: command.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn timed_out(command: impl Into<String>, limit: Duration) -> Self {
        Self {
            kind: ExecutionKind::TimedOut,
            command: command.into(),
            stderr: format!("killed after {}s", limit.as_secs()),
            exit_code: None,
        }
    }

    pub fn spawn(command: impl Into<String>, err: std::io::Error) -> Self {
        Self {
            kind: ExecutionKind::Spawn,
            command: command.into(),
            stderr: err.to_string(),
            exit_code: None,
        }
    }

    /// Whether the failure is a privilege problem that elevation could fix.
    pub fn is_permission_denied(&self) -> bool {
        if self.kind != ExecutionKind::Failed {
            return false;
        }
        let stderr = self.stderr.to_lowercase();
        PERMISSION_MARKERS
            .iter()
            .any(|marker| stderr.contains(marker))
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
