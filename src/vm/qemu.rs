//! Command lines for `qemu-system-x86_64` and `qemu-img`.

use super::config::{DisplayMode, VmConfig};
use crate::process::CommandSpec;
use std::path::{Path, PathBuf};

pub const QEMU_SYSTEM: &str = "qemu-system-x86_64";
pub const QEMU_IMG: &str = "qemu-img";

/// Disk image format; also the file extension of images in the VM directory.
pub const DISK_FORMAT: &str = "qcow2";

/// Everything needed to boot one named VM from the install ISO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmLaunch {
    pub name: String,
    pub config: VmConfig,
    pub iso: PathBuf,
    pub disk: PathBuf,
}

impl VmLaunch {
    /// Full hypervisor invocation.
    pub fn command(&self) -> CommandSpec {
        CommandSpec::new(QEMU_SYSTEM)
            .args(["-name", self.name.as_str()])
            .args(["-machine", "type=q35,accel=tcg"])
            .arg("-smp")
            .arg(format!("cores={}", self.config.cores))
            .arg("-m")
            .arg(self.config.memory_mb.to_string())
            .args(["-boot", "d"])
            .arg("-cdrom")
            .arg(self.iso.display().to_string())
            .arg("-drive")
            .arg(format!("file={},format={}", self.disk.display(), DISK_FORMAT))
            .args(display_args(self.config.display))
            .args(network_args(self.config.enable_network))
    }

    /// Human-readable summary printed before launch.
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            "Configuration:".to_string(),
            format!("  CPU Cores: {}", self.config.cores),
            format!("  RAM: {} MB", self.config.memory_mb),
            format!("  Disk: {} GB", self.config.disk_size_gb),
            format!(
                "  Networking: {}",
                if self.config.enable_network {
                    "Enabled"
                } else {
                    "Disabled"
                }
            ),
            format!("  Display: {}", self.config.display),
        ]
    }
}

/// Flags selecting how the guest is presented.
pub fn display_args(mode: DisplayMode) -> Vec<&'static str> {
    match mode {
        DisplayMode::Vnc => vec!["-vnc", ":0"],
        DisplayMode::Serial => vec!["-nographic", "-serial", "stdio"],
        DisplayMode::Sdl => vec!["-display", "default"],
    }
}

/// User-mode virtio NIC, or explicitly no NIC at all.
pub fn network_args(enabled: bool) -> Vec<&'static str> {
    if enabled {
        vec!["-nic", "user,model=virtio"]
    } else {
        vec!["-nic", "none"]
    }
}

/// `qemu-img create -f qcow2 <path> <N>G`
pub fn disk_image_command(path: &Path, size_gb: u32) -> CommandSpec {
    CommandSpec::new(QEMU_IMG)
        .args(["create", "-f", DISK_FORMAT])
        .arg(path.display().to_string())
        .arg(format!("{size_gb}G"))
}
