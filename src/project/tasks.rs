//! Build and clean script invocations, plus opening folders on the desktop.

use super::layout::ProjectLayout;
use crate::process::CommandSpec;
use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

/// A project script the control center can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTask {
    Build,
    Clean,
}

impl BuildTask {
    pub fn label(self) -> &'static str {
        match self {
            BuildTask::Build => "Build",
            BuildTask::Clean => "Clean",
        }
    }

    pub fn script(self, layout: &ProjectLayout) -> std::path::PathBuf {
        match self {
            BuildTask::Build => layout.build_script(),
            BuildTask::Clean => layout.clean_script(),
        }
    }

    /// Command running the script from the project root with no arguments.
    ///
    /// Fails if the script is missing. On unix the script is made
    /// executable first.
    pub fn command(self, layout: &ProjectLayout) -> Result<CommandSpec> {
        let script = self.script(layout);
        if !script.is_file() {
            anyhow::bail!("{} script not found: {}", self.label(), script.display());
        }
        make_executable(&script)?;
        Ok(CommandSpec::new(script.display().to_string()).current_dir(layout.root()))
    }
}

impl fmt::Display for BuildTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)
        .with_context(|| format!("Failed to read permissions: {}", path.display()))?
        .permissions();
    if permissions.mode() & 0o777 != 0o755 {
        permissions.set_mode(0o755);
        std::fs::set_permissions(path, permissions)
            .with_context(|| format!("Failed to make executable: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Open `path` in the desktop file manager and return immediately.
pub fn open_in_file_manager(path: &Path) -> Result<()> {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    std::process::Command::new(opener)
        .arg(path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to open folder: {}", path.display()))?;
    Ok(())
}
