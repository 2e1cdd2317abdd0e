//! # Activity Log
//!
//! User-facing record of what the control center did, shown in the Logs tab
//! and savable to a plain text file.
//!
//! ## Storage Location
//!
//! ```text
//! ~/.local/share/cyberos/logs/
//! ├── activity-20250101-120000.log
//! └── ...
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// Entries kept in memory before the oldest are dropped.
pub const MAX_ENTRIES: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Local>,
    /// Which part of the application produced the entry ("Build", "Emulator", ...).
    pub source: String,
    pub message: String,
}

impl ActivityEntry {
    /// `[2025-01-01 12:00:00] Build: Build started`
    pub fn line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.source,
            self.message
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: Vec<ActivityEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry stamped with the current local time.
    pub fn record(&mut self, source: &str, message: impl Into<String>) {
        let entry = ActivityEntry {
            timestamp: Local::now(),
            source: source.to_string(),
            message: message.into(),
        };
        tracing::info!(source = %entry.source, "{}", entry.message);
        self.push(entry);
    }

    pub fn push(&mut self, entry: ActivityEntry) {
        self.entries.push(entry);
        if self.entries.len() > MAX_ENTRIES {
            let excess = self.entries.len() - MAX_ENTRIES;
            self.entries.drain(..excess);
        }
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ActivityEntry::line).collect()
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(&entry.line());
            text.push('\n');
        }
        text
    }

    /// Write every entry to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        fs::write(path, self.to_text())
            .with_context(|| format!("Failed to write log file: {}", path.display()))?;
        Ok(())
    }

    /// Save into `dir` under a timestamped name and return the file path.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!(
            "activity-{}.log",
            Local::now().format("%Y%m%d-%H%M%S")
        ));
        self.save_to(&path)?;
        Ok(path)
    }
}

/// `<data_dir>/logs`, e.g. `~/.local/share/cyberos/logs` on Linux.
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("logs"))
}

/// Application data directory.
pub fn data_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("", "", "cyberos")
        .context("Could not determine data directory")?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry(source: &str, message: &str) -> ActivityEntry {
        ActivityEntry {
            timestamp: Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            source: source.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            entry("Build", "Build started").line(),
            "[2025-01-02 03:04:05] Build: Build started"
        );
    }

    #[test]
    fn test_record_and_clear() {
        let mut log = ActivityLog::new();
        assert!(log.is_empty());
        log.record("System", "Dependency check complete");
        log.record("Emulator", "VM launched");
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[1].source, "Emulator");
        assert!(log.lines()[0].ends_with("] System: Dependency check complete"));

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_oldest_entries_dropped() {
        let mut log = ActivityLog::new();
        for i in 0..MAX_ENTRIES + 10 {
            log.push(entry("Test", &i.to_string()));
        }
        assert_eq!(log.len(), MAX_ENTRIES);
        assert_eq!(log.entries()[0].message, "10");
    }

    #[test]
    fn test_save_in_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = ActivityLog::new();
        log.push(entry("Build", "Build started"));
        log.push(entry("Build", "✓ Build complete"));

        let dir = temp_dir.path().join("logs");
        let path = log.save_in(&dir).unwrap();
        assert!(path.starts_with(&dir));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("activity-") && name.ends_with(".log"));

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "[2025-01-02 03:04:05] Build: Build started\n[2025-01-02 03:04:05] Build: ✓ Build complete\n"
        );
    }
}
