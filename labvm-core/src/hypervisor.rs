//! Command lines for the libvirt toolchain (`virsh`, `virt-install`, `qemu-img`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::HostCommand;

/// Tools that must be on PATH for provisioning to work.
pub const REQUIRED_TOOLS: &[&str] = &["virsh", "virt-install", "qemu-img"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypervisorConfig {
    /// libvirt connection URI passed to every `virsh`/`virt-install` call.
    pub uri: String,
    /// Directory holding the qcow2 disk images.
    pub disk_dir: PathBuf,
    pub os_variant: String,
    pub network: String,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            uri: "qemu:///system".to_string(),
            disk_dir: PathBuf::from("/var/lib/libvirt/images"),
            os_variant: "generic".to_string(),
            network: "default".to_string(),
        }
    }
}

/// Single-domain `virsh` verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainAction {
    Start,
    Destroy,
    Shutdown,
    Reboot,
    Suspend,
    Resume,
    Undefine,
}

impl DomainAction {
    pub fn verb(&self) -> &'static str {
        match self {
            DomainAction::Start => "start",
            DomainAction::Destroy => "destroy",
            DomainAction::Shutdown => "shutdown",
            DomainAction::Reboot => "reboot",
            DomainAction::Suspend => "suspend",
            DomainAction::Resume => "resume",
            DomainAction::Undefine => "undefine",
        }
    }
}

/// Arguments for an unattended install.
#[derive(Debug, Clone)]
pub struct InstallSpec<'a> {
    pub name: &'a str,
    pub memory_mb: i64,
    pub vcpus: i64,
    pub disk_path: &'a Path,
    pub iso_path: &'a str,
}

impl HypervisorConfig {
    /// Backing disk location for a domain. Keyed by the internal name only.
    pub fn disk_path(&self, internal_name: &str) -> PathBuf {
        self.disk_dir.join(format!("{}.qcow2", internal_name))
    }

    pub fn create_disk(&self, path: &Path, size_gb: i64) -> HostCommand {
        HostCommand::new("qemu-img")
            .args(["create", "-f", "qcow2"])
            .arg(path.display().to_string())
            .arg(format!("{}G", size_gb))
    }

    pub fn install(&self, spec: &InstallSpec<'_>) -> HostCommand {
        HostCommand::new("virt-install")
            .args(["--connect", self.uri.as_str()])
            .args(["--name", spec.name])
            .arg("--memory")
            .arg(spec.memory_mb.to_string())
            .arg("--vcpus")
            .arg(spec.vcpus.to_string())
            .arg("--disk")
            .arg(format!("path={},format=qcow2", spec.disk_path.display()))
            .args(["--cdrom", spec.iso_path])
            .args(["--os-variant", self.os_variant.as_str()])
            .arg("--network")
            .arg(format!("network={}", self.network))
            .args(["--graphics", "none", "--noautoconsole"])
    }

    pub fn domain(&self, action: DomainAction, name: &str) -> HostCommand {
        self.virsh().arg(action.verb()).arg(name)
    }

    pub fn list_domains(&self) -> HostCommand {
        self.virsh().args(["list", "--all"])
    }

    pub fn remove_file(&self, path: &Path) -> HostCommand {
        HostCommand::new("rm")
            .args(["-f", "--"])
            .arg(path.display().to_string())
    }

    fn virsh(&self) -> HostCommand {
        HostCommand::new("virsh").args(["-c", self.uri.as_str()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HypervisorConfig {
        HypervisorConfig {
            disk_dir: PathBuf::from("/images"),
            ..Default::default()
        }
    }

    #[test]
    fn test_disk_path_is_keyed_by_internal_name() {
        assert_eq!(
            config().disk_path("lab-1-abc"),
            PathBuf::from("/images/lab-1-abc.qcow2")
        );
    }

    #[test]
    fn test_create_disk_command() {
        let cmd = config().create_disk(Path::new("/images/a.qcow2"), 20);
        assert_eq!(cmd.to_string(), "qemu-img create -f qcow2 /images/a.qcow2 20G");
    }

    #[test]
    fn test_install_command_is_headless() {
        let cfg = config();
        let disk = cfg.disk_path("lab-x");
        let cmd = cfg.install(&InstallSpec {
            name: "lab-x",
            memory_mb: 2048,
            vcpus: 2,
            disk_path: &disk,
            iso_path: "/iso/ubuntu.iso",
        });
        let line = cmd.to_string();

        assert!(line.starts_with("virt-install --connect qemu:///system --name lab-x"));
        assert!(line.contains("--memory 2048 --vcpus 2"));
        assert!(line.contains("--disk path=/images/lab-x.qcow2,format=qcow2"));
        assert!(line.contains("--cdrom /iso/ubuntu.iso"));
        assert!(line.ends_with("--graphics none --noautoconsole"));
    }

    #[test]
    fn test_domain_commands() {
        let cfg = config();
        assert_eq!(
            cfg.domain(DomainAction::Destroy, "lab-x").to_string(),
            "virsh -c qemu:///system destroy lab-x"
        );
        assert_eq!(
            cfg.list_domains().to_string(),
            "virsh -c qemu:///system list --all"
        );
    }
}
