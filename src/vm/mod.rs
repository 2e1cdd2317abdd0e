//! # VM Module
//!
//! Everything the emulator side needs around QEMU, which itself stays an
//! opaque external tool.
//!
//! | Piece | Module |
//! |-------|--------|
//! | `KEY=value` configuration file | [`config`] |
//! | `qemu-system-x86_64` / `qemu-img` argument lists | [`qemu`] |
//! | `~/.cyberos/vms/*.qcow2` directory | [`images`] |
//! | Pre-flight, disk provisioning, launch | [`launcher`] |

pub mod config;
pub mod images;
pub mod launcher;
pub mod qemu;

pub use config::{
    ConfigWarning, DisplayMode, VmConfig, CONFIG_FILE_NAME, CORES_RANGE, DISK_SIZE_RANGE_GB,
    MEMORY_RANGE_MB,
};
pub use images::{validate_vm_name, VmImage, VmImageStore};
pub use launcher::{describe, VmLauncher};
pub use qemu::{disk_image_command, VmLaunch, QEMU_IMG, QEMU_SYSTEM};

/// Name used when the user has not picked one.
pub const DEFAULT_VM_NAME: &str = "CyberOS-VM";
