//! # VM Configuration File
//!
//! Reads and writes the flat `KEY=value` file the emulator launcher keeps
//! at `~/.cyberos_vm.conf`:
//!
//! ```text
//! # CyberOS VM Configuration
//! CORES=2
//! MEMORY=512
//! DISK_SIZE=2
//! ENABLE_NETWORK=false
//! DISPLAY=sdl
//! ```
//!
//! Unknown keys are ignored, missing keys keep their previous value, and a
//! malformed line is skipped with a [`ConfigWarning`] instead of aborting the
//! load. Comments and key order are not preserved when the file is written
//! back.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// File name of the VM configuration, relative to the home directory.
pub const CONFIG_FILE_NAME: &str = ".cyberos_vm.conf";

pub const CORES_RANGE: RangeInclusive<u32> = 1..=16;
pub const MEMORY_RANGE_MB: RangeInclusive<u32> = 128..=8192;
pub const DISK_SIZE_RANGE_GB: RangeInclusive<u32> = 1..=100;

/// How QEMU presents the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// Local window.
    #[default]
    Sdl,
    /// Remote framebuffer on display `:0`.
    Vnc,
    /// No graphics; guest serial console on stdio.
    Serial,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 3] = [DisplayMode::Sdl, DisplayMode::Vnc, DisplayMode::Serial];

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Sdl => "sdl",
            DisplayMode::Vnc => "vnc",
            DisplayMode::Serial => "serial",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DisplayMode::Sdl => "GUI window",
            DisplayMode::Vnc => "Remote (VNC :0)",
            DisplayMode::Serial => "Text console",
        }
    }

    /// Next mode in display order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            DisplayMode::Sdl => DisplayMode::Vnc,
            DisplayMode::Vnc => DisplayMode::Serial,
            DisplayMode::Serial => DisplayMode::Sdl,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            DisplayMode::Sdl => DisplayMode::Serial,
            DisplayMode::Vnc => DisplayMode::Sdl,
            DisplayMode::Serial => DisplayMode::Vnc,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sdl" => Ok(DisplayMode::Sdl),
            "vnc" => Ok(DisplayMode::Vnc),
            "serial" => Ok(DisplayMode::Serial),
            other => Err(format!(
                "unknown display mode '{other}' (expected sdl, vnc or serial)"
            )),
        }
    }
}

/// A line of the configuration file that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason}")]
pub struct ConfigWarning {
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

/// Resources and presentation of a CyberOS virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    pub cores: u32,
    pub memory_mb: u32,
    pub disk_size_gb: u32,
    pub enable_network: bool,
    pub display: DisplayMode,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            cores: 2,
            memory_mb: 512,
            disk_size_gb: 2,
            enable_network: false,
            display: DisplayMode::Sdl,
        }
    }
}

impl VmConfig {
    /// Parse `contents` on top of the defaults.
    pub fn parse(contents: &str) -> (Self, Vec<ConfigWarning>) {
        let mut config = Self::default();
        let warnings = config.apply(contents);
        (config, warnings)
    }

    /// Apply every valid `KEY=value` line of `contents` to `self`.
    ///
    /// Keys that are absent keep their current value.
    pub fn apply(&mut self, contents: &str) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (index, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warnings.push(ConfigWarning {
                    line: index + 1,
                    reason: format!("expected KEY=value, found '{line}'"),
                });
                continue;
            };

            if let Err(reason) = self.set(key.trim(), value.trim()) {
                warnings.push(ConfigWarning {
                    line: index + 1,
                    reason,
                });
            }
        }

        for warning in &warnings {
            warn!(%warning, "Skipping malformed VM configuration line");
        }
        warnings
    }

    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "CORES" => self.cores = parse_in_range(key, value, &CORES_RANGE)?,
            "MEMORY" => self.memory_mb = parse_in_range(key, value, &MEMORY_RANGE_MB)?,
            "DISK_SIZE" => self.disk_size_gb = parse_in_range(key, value, &DISK_SIZE_RANGE_GB)?,
            "ENABLE_NETWORK" => {
                self.enable_network = match value.to_ascii_lowercase().as_str() {
                    "true" => true,
                    "false" => false,
                    _ => return Err(format!("{key} must be true or false, found '{value}'")),
                }
            }
            "DISPLAY" => self.display = value.parse()?,
            _ => debug!(key, "Ignoring unknown VM configuration key"),
        }
        Ok(())
    }

    /// Serialize to the flat file format.
    pub fn to_file_string(&self) -> String {
        format!(
            "# CyberOS VM Configuration\n\
             CORES={}\n\
             MEMORY={}\n\
             DISK_SIZE={}\n\
             ENABLE_NETWORK={}\n\
             DISPLAY={}\n",
            self.cores, self.memory_mb, self.disk_size_gb, self.enable_network, self.display
        )
    }

    /// Reject values outside the ranges the launcher accepts.
    pub fn validate(&self) -> Result<()> {
        check_range("CPU cores", self.cores, &CORES_RANGE)?;
        check_range("Memory (MB)", self.memory_mb, &MEMORY_RANGE_MB)?;
        check_range("Disk size (GB)", self.disk_size_gb, &DISK_SIZE_RANGE_GB)?;
        Ok(())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<(Self, Vec<ConfigWarning>)> {
        if !path.exists() {
            return Ok((Self::default(), Vec::new()));
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read VM config: {}", path.display()))?;
        Ok(Self::parse(&contents))
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(path, self.to_file_string())
            .with_context(|| format!("Failed to write VM config: {}", path.display()))?;
        Ok(())
    }

    /// `~/.cyberos_vm.conf`
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::BaseDirs::new().context("Could not determine home directory")?;
        Ok(dirs.home_dir().join(CONFIG_FILE_NAME))
    }
}

fn parse_in_range(
    key: &str,
    value: &str,
    range: &RangeInclusive<u32>,
) -> std::result::Result<u32, String> {
    let parsed: u32 = value
        .parse()
        .map_err(|_| format!("{key} must be an integer, found '{value}'"))?;
    if !range.contains(&parsed) {
        return Err(format!(
            "{key}={parsed} is outside {}..={}",
            range.start(),
            range.end()
        ));
    }
    Ok(parsed)
}

fn check_range(label: &str, value: u32, range: &RangeInclusive<u32>) -> Result<()> {
    if !range.contains(&value) {
        bail!(
            "{} must be between {} and {}, got {}",
            label,
            range.start(),
            range.end(),
            value
        );
    }
    Ok(())
}
