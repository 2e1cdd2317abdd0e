//! # UI Preferences
//!
//! Stored as JSON in `~/.config/cyberos/config.json` (resolved through the
//! `directories` crate). Separate from the VM configuration, which keeps
//! its flat `KEY=value` format.

use crate::process::DEFAULT_GRACE_TIMEOUT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UiConfig {
    /// Name of the selected theme (must match a built-in theme name).
    #[serde(default = "default_theme_name")]
    pub theme: String,
    /// Seconds between SIGTERM and SIGKILL when stopping a build or VM.
    #[serde(default = "default_grace_timeout_secs")]
    pub grace_timeout_secs: u64,
}

fn default_theme_name() -> String {
    "Catppuccin Mocha".to_string()
}

fn default_grace_timeout_secs() -> u64 {
    DEFAULT_GRACE_TIMEOUT.as_secs()
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: default_theme_name(),
            grace_timeout_secs: default_grace_timeout_secs(),
        }
    }
}

impl UiConfig {
    /// Load from the default location, falling back to defaults on any error.
    pub fn load() -> Self {
        match Self::config_path().and_then(|path| Self::load_from(&path)) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "Using default UI config");
                Self::default()
            }
        }
    }

    /// Missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Grace timeout, at least one second.
    pub fn grace_timeout(&self) -> Duration {
        Duration::from_secs(self.grace_timeout_secs.max(1))
    }

    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "cyberos")
            .context("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.json"))
    }
}
