//! # VM Disk Image Directory
//!
//! One image per named VM, stored as `<dir>/<name>.qcow2`. The default
//! directory is `~/.cyberos/vms/`.

use super::qemu::DISK_FORMAT;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A disk image found in the VM directory.
#[derive(Debug, Clone, PartialEq)]
pub struct VmImage {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Local>>,
}

impl VmImage {
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_GB
    }

    /// `name (0.19 GB)`
    pub fn summary(&self) -> String {
        format!("{} ({:.2} GB)", self.name, self.size_gb())
    }

    pub fn info_lines(&self) -> Vec<String> {
        let modified = self
            .modified
            .map_or_else(|| "unknown".to_string(), |m| m.format("%Y-%m-%d %H:%M:%S").to_string());
        vec![
            format!("VM: {}", self.name),
            format!("Size: {:.2} GB", self.size_gb()),
            format!("Path: {}", self.path.display()),
            format!("Modified: {modified}"),
        ]
    }
}

/// The directory holding VM disk images.
#[derive(Debug, Clone)]
pub struct VmImageStore {
    dir: PathBuf,
}

impl VmImageStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// `~/.cyberos/vms`
    pub fn default_dir() -> Result<PathBuf> {
        let dirs = directories::BaseDirs::new().context("Could not determine home directory")?;
        Ok(dirs.home_dir().join(".cyberos").join("vms"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create VM directory: {}", self.dir.display()))
    }

    /// Path of the image for `name`, whether or not it exists yet.
    pub fn image_path(&self, name: &str) -> Result<PathBuf> {
        validate_vm_name(name)?;
        Ok(self.dir.join(format!("{name}.{DISK_FORMAT}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.image_path(name).is_ok_and(|p| p.is_file())
    }

    /// All images, sorted by name. A missing directory is an empty list.
    pub fn list(&self) -> Result<Vec<VmImage>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read VM directory: {}", self.dir.display()))?;

        let mut images = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read VM directory entry")?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DISK_FORMAT) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = entry
                .metadata()
                .with_context(|| format!("Failed to stat image: {}", path.display()))?;
            if !metadata.is_file() {
                continue;
            }
            images.push(VmImage {
                name: name.to_string(),
                size_bytes: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Local>::from),
                path,
            });
        }

        images.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(images)
    }

    /// Remove the image for `name`.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.image_path(name)?;
        if !path.is_file() {
            bail!("VM image not found: {}", path.display());
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete VM image: {}", path.display()))?;
        tracing::info!(vm = name, "Deleted VM image");
        Ok(())
    }
}

/// A VM name becomes a file name, so it must not contain separators or
/// start with a dot.
pub fn validate_vm_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("VM name cannot be empty");
    }
    let pattern =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").context("Failed to compile VM name pattern")?;
    if !pattern.is_match(name) {
        bail!(
            "Invalid VM name '{}'. Use letters, digits, '.', '_' or '-' (max 64 characters).",
            name
        );
    }
    Ok(())
}
