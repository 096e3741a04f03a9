//! Live domain inventory as reported by `virsh list --all`.

use std::fmt::{self, Display, Formatter};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// State reported for ledger rows the hypervisor does not list.
pub const OFFLINE_STATE: &str = "shut off";

/// Closed set of run states exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Running,
    Stopped,
    Suspended,
    Creating,
    Error,
}

impl VmStatus {
    /// Normalize free-text hypervisor state. Unknown text maps to `Error`.
    pub fn from_hypervisor(raw: &str) -> Self {
        let state = raw.trim().to_lowercase();

        if state.contains("running") || state == "idle" || state.contains("blocked") {
            VmStatus::Running
        } else if state.contains("shut")
            || state.contains("stopped")
            || state.contains("shutdown")
        {
            VmStatus::Stopped
        } else if state.contains("paused") || state.contains("suspended") {
            VmStatus::Suspended
        } else if state.contains("creating")
            || state.contains("installing")
            || state.contains("defining")
        {
            VmStatus::Creating
        } else {
            VmStatus::Error
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VmStatus::Running => "running",
            VmStatus::Stopped => "stopped",
            VmStatus::Suspended => "suspended",
            VmStatus::Creating => "creating",
            VmStatus::Error => "error",
        }
    }
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the hypervisor's domain listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDomain {
    /// Numeric id for active domains, `None` for inactive ones (`-`).
    pub id: Option<String>,
    pub name: String,
    pub state: String,
}

fn column_gap() -> &'static Regex {
    static GAP: OnceLock<Regex> = OnceLock::new();
    GAP.get_or_init(|| Regex::new(r"\s{2,}").expect("static regex"))
}

/// Parse the tabular output of `virsh list --all`.
///
/// Header and separator rows are skipped. Columns are split on runs of two
/// or more spaces so that states such as `shut off` stay intact.
pub fn parse_domain_list(output: &str) -> Vec<LiveDomain> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("Id"))
        .filter(|line| !line.chars().all(|c| c == '-'))
        .filter_map(|line| {
            let columns: Vec<&str> = column_gap().splitn(line, 3).collect();
            match columns.as_slice() {
                [id, name, state] => Some(LiveDomain {
                    id: (*id != "-").then(|| id.to_string()),
                    name: name.to_string(),
                    state: state.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}
