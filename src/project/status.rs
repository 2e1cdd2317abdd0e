//! Snapshot of the project shown on the dashboard and by `cyberos status`.

use super::deps::{check_dependencies, DependencyStatus};
use super::layout::{ProjectLayout, PROJECT_NAME, PROJECT_VERSION};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct ProjectStatus {
    pub layout: ProjectLayout,
    pub iso_size: Option<u64>,
    pub dependencies: Vec<DependencyStatus>,
    pub script_count: usize,
    pub doc_count: usize,
}

impl ProjectStatus {
    pub fn collect(layout: &ProjectLayout) -> Self {
        Self::with_dependencies(layout, check_dependencies())
    }

    pub fn with_dependencies(layout: &ProjectLayout, dependencies: Vec<DependencyStatus>) -> Self {
        Self {
            layout: layout.clone(),
            iso_size: layout.iso_size(),
            dependencies,
            script_count: layout.script_count(),
            doc_count: layout.doc_count(),
        }
    }

    pub fn iso_built(&self) -> bool {
        self.iso_size.is_some()
    }

    pub fn report_lines(&self) -> Vec<String> {
        let layout = &self.layout;
        let mut lines = vec![
            format!("PROJECT: {PROJECT_NAME} v{PROJECT_VERSION}"),
            "=".repeat(50),
            String::new(),
            "BUILD STATUS:".to_string(),
        ];

        match self.iso_size {
            Some(bytes) => {
                let name = layout
                    .iso_file()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                lines.push(format!(
                    "  ✓ ISO Built: {} ({:.2} MB)",
                    name,
                    bytes as f64 / BYTES_PER_MB
                ));
            }
            None => lines.push("  ✗ ISO Not Built".to_string()),
        }

        lines.push(String::new());
        lines.push("BUILD FILES:".to_string());
        lines.push(format!("  Kernel: {}", layout.kernel_image().display()));
        lines.push(format!("  RootFS: {}", layout.rootfs_dir().display()));
        lines.push(format!("  ISO: {}", layout.iso_file().display()));

        lines.push(String::new());
        lines.push("DEPENDENCIES:".to_string());
        for status in &self.dependencies {
            let mark = if status.is_present() { '✓' } else { '✗' };
            lines.push(format!("  {mark} {}", status.dependency.name));
        }

        lines.push(String::new());
        lines.push("PROJECT STRUCTURE:".to_string());
        lines.push(format!("  Root: {}", layout.root().display()));
        lines.push(format!("  Scripts: {} build scripts", self.script_count));
        lines.push(format!("  Docs: {} documentation files", self.doc_count));
        lines
    }
}
