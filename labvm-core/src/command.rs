//! External command execution with a single, opt-in privilege escalation.
//!
//! Every hypervisor interaction goes through a [`CommandRunner`]. A failed
//! command is retried at most once, prefixed with the configured elevation
//! wrapper, and only when the failure was a permission problem and the call
//! site explicitly allowed it.

// Standard library
use std::fmt::{self, Display, Formatter};
use std::thread;
use std::time::{Duration, Instant};

// External crates
use duct::cmd;
use tracing::{debug, warn};
use which::which;

use crate::error::{ExecutionError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A single external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    program: String,
    args: Vec<String>,
    escalated: bool,
}

impl HostCommand {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            escalated: false,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated
    }

    /// Wrap this command in the elevation prefix (e.g. `sudo -n`).
    pub fn escalate(&self, wrapper: &[String]) -> Self {
        let Some((program, prefix_args)) = wrapper.split_first() else {
            return Self {
                escalated: true,
                ..self.clone()
            };
        };

        let mut args = prefix_args.to_vec();
        args.push(self.program.clone());
        args.extend(self.args.iter().cloned());

        Self {
            program: program.clone(),
            args,
            escalated: true,
        }
    }
}

impl Display for HostCommand {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Whether a call site may retry a permission failure with elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Allowed,
    Forbidden,
}

pub trait CommandRunner: Send + Sync {
    /// Run the command once and return its stdout.
    fn execute(&self, command: &HostCommand) -> Result<String>;

    /// Elevation wrapper used for the escalation retry. Empty disables it.
    fn elevation(&self) -> &[String];

    /// Run the command, retrying once with elevation on a permission failure
    /// when `escalation` allows it. Every other failure is returned as is.
    fn run(&self, command: &HostCommand, escalation: Escalation) -> Result<String> {
        match self.execute(command) {
            Err(err)
                if err.is_permission_denied()
                    && escalation == Escalation::Allowed
                    && !command.is_escalated()
                    && !self.elevation().is_empty() =>
            {
                warn!(command = %command, "Permission denied, retrying with elevation");
                self.execute(&command.escalate(self.elevation()))
            }
            other => other,
        }
    }
}

/// Runs commands as child processes with a bounded wall-clock budget.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    elevation: Vec<String>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>, elevation: Vec<String>) -> Self {
        Self { timeout, elevation }
    }

    /// Split a wrapper such as `"sudo -n"` into its words.
    pub fn parse_elevation(wrapper: &str) -> Vec<String> {
        wrapper.split_whitespace().map(str::to_string).collect()
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(600)), Self::parse_elevation("sudo -n"))
    }
}

impl CommandRunner for ProcessRunner {
    fn execute(&self, command: &HostCommand) -> Result<String> {
        let full_command = command.to_string();
        debug!(command = %full_command, "Executing host command");

        let handle = cmd(command.program(), command.arguments())
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .start()
            .map_err(|e| ExecutionError::spawn(&full_command, e))?;

        let start = Instant::now();

        loop {
            if let Some(limit) = self.timeout {
                if start.elapsed() >= limit {
                    let _ = handle.kill();
                    return Err(ExecutionError::timed_out(full_command, limit));
                }
            }

            match handle.try_wait() {
                Ok(Some(output)) => {
                    if output.status.success() {
                        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
                    }

                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    return Err(ExecutionError::failed(
                        full_command,
                        output.status.code(),
                        stderr,
                    ));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(ExecutionError::spawn(full_command, e)),
            }
        }
    }

    fn elevation(&self) -> &[String] {
        &self.elevation
    }
}

/// Checks if a command-line tool is available in the system's PATH.
pub fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}
