pub mod command;
pub mod domain;
pub mod error;
pub mod hypervisor;

pub use command::{is_tool_installed, CommandRunner, Escalation, HostCommand, ProcessRunner};
pub use domain::{parse_domain_list, LiveDomain, VmStatus, OFFLINE_STATE};
pub use error::{ExecutionError, ExecutionKind};
pub use hypervisor::{DomainAction, HypervisorConfig, InstallSpec, REQUIRED_TOOLS};
