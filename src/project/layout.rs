//! Where things live inside a CyberOS checkout.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const PROJECT_NAME: &str = "CyberOS";
pub const PROJECT_VERSION: &str = "0.1.0-alpha";
pub const ISO_FILE_NAME: &str = "cyberos-0.1.0-alpha.iso";

/// Paths of one CyberOS project checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Use `explicit` if given, otherwise the current directory.
    ///
    /// The directory must exist; it is canonicalized so child processes get
    /// an absolute working directory.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        let dir = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let root = dir
            .canonicalize()
            .with_context(|| format!("Failed to access directory: {}", dir.display()))?;
        if !root.is_dir() {
            anyhow::bail!("Path '{}' exists but is not a directory", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn build_script(&self) -> PathBuf {
        self.scripts_dir().join("build.sh")
    }

    pub fn clean_script(&self) -> PathBuf {
        self.scripts_dir().join("clean.sh")
    }

    pub fn iso_file(&self) -> PathBuf {
        self.root.join("iso").join(ISO_FILE_NAME)
    }

    pub fn kernel_image(&self) -> PathBuf {
        self.root.join("kernel").join("vmlinuz")
    }

    pub fn rootfs_dir(&self) -> PathBuf {
        self.root.join("build").join("rootfs")
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.root.join("docs")
    }

    /// ISO size in bytes, `None` if it has not been built.
    pub fn iso_size(&self) -> Option<u64> {
        std::fs::metadata(self.iso_file())
            .ok()
            .filter(std::fs::Metadata::is_file)
            .map(|m| m.len())
    }

    /// Number of `*.sh` files directly under `scripts/`.
    pub fn script_count(&self) -> usize {
        count_with_extension(&self.scripts_dir(), "sh")
    }

    /// Number of `*.md` files in the project root plus `docs/`.
    pub fn doc_count(&self) -> usize {
        count_with_extension(&self.root, "md") + count_with_extension(&self.docs_dir(), "md")
    }
}

fn count_with_extension(dir: &Path, extension: &str) -> usize {
    if !dir.is_dir() {
        return 0;
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some(extension))
        .count()
}
