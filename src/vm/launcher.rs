//! Pre-flight checks, disk provisioning and hypervisor launch.

use super::config::VmConfig;
use super::images::VmImageStore;
use super::qemu::{disk_image_command, VmLaunch, QEMU_SYSTEM};
use crate::process::{ProcessHandle, ProcessRunner, Termination};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::info;

/// Boots CyberOS VMs from the install ISO.
#[derive(Debug, Clone)]
pub struct VmLauncher {
    runner: ProcessRunner,
    store: VmImageStore,
    iso: PathBuf,
}

impl VmLauncher {
    pub fn new(runner: ProcessRunner, store: VmImageStore, iso: PathBuf) -> Self {
        Self { runner, store, iso }
    }

    pub fn store(&self) -> &VmImageStore {
        &self.store
    }

    /// Refuse to launch when QEMU is missing or the ISO has not been built.
    pub fn preflight(&self) -> Result<()> {
        if which::which(QEMU_SYSTEM).is_err() {
            bail!(
                "QEMU is not installed ({QEMU_SYSTEM} not found in PATH).\n\
                 Install it with `brew install qemu` (macOS) or \
                 `sudo apt-get install qemu-system-x86` (Linux)."
            );
        }
        if !self.iso.is_file() {
            bail!(
                "CyberOS ISO not found at {}. Build CyberOS first (scripts/build.sh).",
                self.iso.display()
            );
        }
        Ok(())
    }

    /// Resolve the disk path for `name` and validate `config`.
    pub fn plan(&self, name: &str, config: VmConfig) -> Result<VmLaunch> {
        config.validate()?;
        let disk = self.store.image_path(name)?;
        Ok(VmLaunch {
            name: name.to_string(),
            config,
            iso: self.iso.clone(),
            disk,
        })
    }

    /// Create the disk image if it does not exist yet.
    ///
    /// Output of `qemu-img` is passed to `sink` line by line. Returns whether
    /// an image was created.
    pub fn ensure_disk(&self, launch: &VmLaunch, mut sink: impl FnMut(&str)) -> Result<bool> {
        if launch.disk.is_file() {
            return Ok(false);
        }
        self.store.ensure_exists()?;

        sink(&format!("Creating disk image: {} GB", launch.config.disk_size_gb));
        let spec = disk_image_command(&launch.disk, launch.config.disk_size_gb);
        let handle = self
            .runner
            .start(&spec)
            .context("Failed to create disk image")?;
        for event in handle.output() {
            sink(&event.line);
        }
        match handle.wait() {
            Termination::Exited(0) => {
                info!(vm = %launch.name, disk = %launch.disk.display(), "Created disk image");
                sink("Disk image created.");
                Ok(true)
            }
            other => bail!("qemu-img failed ({})", describe(other)),
        }
    }

    /// Start the hypervisor. Output streams through the returned handle.
    pub fn start(&self, launch: &VmLaunch) -> Result<ProcessHandle> {
        let handle = self
            .runner
            .start(&launch.command())
            .with_context(|| format!("Failed to launch VM '{}'", launch.name))?;
        info!(vm = %launch.name, pid = handle.pid(), "VM launched");
        Ok(handle)
    }
}

/// Short description of a termination for status messages.
pub fn describe(termination: Termination) -> String {
    match termination {
        Termination::Exited(code) => format!("exit code: {code}"),
        Termination::Killed => "killed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::config::DisplayMode;
    use tempfile::TempDir;

    fn launcher(temp_dir: &TempDir) -> VmLauncher {
        VmLauncher::new(
            ProcessRunner::new(),
            VmImageStore::new(temp_dir.path().join("vms")),
            temp_dir.path().join("iso").join("cyberos.iso"),
        )
    }

    #[test]
    fn test_plan_resolves_disk_path() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let plan = launcher
            .plan(
                "demo",
                VmConfig {
                    display: DisplayMode::Serial,
                    ..VmConfig::default()
                },
            )
            .unwrap();
        assert_eq!(plan.disk, temp_dir.path().join("vms").join("demo.qcow2"));
        assert_eq!(plan.iso, temp_dir.path().join("iso").join("cyberos.iso"));
    }

    #[test]
    fn test_plan_rejects_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        assert!(launcher.plan("../x", VmConfig::default()).is_err());
        let too_many_cores = VmConfig {
            cores: 99,
            ..VmConfig::default()
        };
        assert!(launcher.plan("ok", too_many_cores).is_err());
    }

    #[test]
    fn test_ensure_disk_skips_existing_image() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let plan = launcher.plan("exists", VmConfig::default()).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("vms")).unwrap();
        std::fs::write(&plan.disk, b"img").unwrap();

        let mut lines = Vec::new();
        let created = launcher
            .ensure_disk(&plan, |line| lines.push(line.to_string()))
            .unwrap();
        assert!(!created);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_preflight_reports_missing_pieces() {
        let temp_dir = TempDir::new().unwrap();
        let err = launcher(&temp_dir).preflight().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("QEMU is not installed") || msg.contains("ISO not found"));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(Termination::Exited(2)), "exit code: 2");
        assert_eq!(describe(Termination::Killed), "killed");
    }
}
