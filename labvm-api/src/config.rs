use labvm_core::{HypervisorConfig, ProcessRunner};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_disk_dir")]
    pub disk_dir: PathBuf,

    #[serde(default = "default_libvirt_uri")]
    pub libvirt_uri: String,

    /// Upper bound for a single hypervisor command. `0` disables the limit.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Wrapper used for the one escalated retry, e.g. `sudo -n`.
    #[serde(default = "default_elevation")]
    pub elevation: String,

    #[serde(default = "default_os_variant")]
    pub os_variant: String,

    #[serde(default = "default_network")]
    pub network: String,

    /// `0` disables the janitor.
    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_secs: u64,

    /// Unreferenced disks younger than this are left alone by the sweep.
    #[serde(default = "default_disk_grace")]
    pub disk_grace_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn default_bind_addr() -> String {
    env_or("LABVM_BIND", "0.0.0.0:3131".to_string())
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("LABVM_DB_PATH") {
        return PathBuf::from(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".labvm").join("labvm.db")
}

fn default_disk_dir() -> PathBuf {
    env_or("LABVM_DISK_DIR", PathBuf::from("/var/lib/libvirt/images"))
}

fn default_libvirt_uri() -> String {
    env_or("LABVM_LIBVIRT_URI", "qemu:///system".to_string())
}

fn default_command_timeout() -> u64 {
    env_or("LABVM_COMMAND_TIMEOUT", 600) // 10 minutes
}

fn default_elevation() -> String {
    std::env::var("LABVM_ELEVATION").unwrap_or_else(|_| "sudo -n".to_string())
}

fn default_os_variant() -> String {
    env_or("LABVM_OS_VARIANT", "generic".to_string())
}

fn default_network() -> String {
    env_or("LABVM_NETWORK", "default".to_string())
}

fn default_janitor_interval() -> u64 {
    env_or("LABVM_JANITOR_INTERVAL", 0)
}

fn default_disk_grace() -> u64 {
    env_or("LABVM_DISK_GRACE", 3600) // 1 hour
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            disk_dir: default_disk_dir(),
            libvirt_uri: default_libvirt_uri(),
            command_timeout_secs: default_command_timeout(),
            elevation: default_elevation(),
            os_variant: default_os_variant(),
            network: default_network(),
            janitor_interval_secs: default_janitor_interval(),
            disk_grace_secs: default_disk_grace(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn hypervisor(&self) -> HypervisorConfig {
        HypervisorConfig {
            uri: self.libvirt_uri.clone(),
            disk_dir: self.disk_dir.clone(),
            os_variant: self.os_variant.clone(),
            network: self.network.clone(),
        }
    }

    pub fn runner(&self) -> ProcessRunner {
        let timeout = (self.command_timeout_secs > 0)
            .then(|| Duration::from_secs(self.command_timeout_secs));

        ProcessRunner::new(timeout, ProcessRunner::parse_elevation(&self.elevation))
    }

    pub fn disk_grace(&self) -> Duration {
        Duration::from_secs(self.disk_grace_secs)
    }
}
