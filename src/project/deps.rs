//! Host tools the build and the emulator rely on.

use std::path::PathBuf;

/// A host tool and what it is needed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub name: &'static str,
    pub description: &'static str,
}

pub const DEPENDENCIES: &[Dependency] = &[
    Dependency {
        name: "bash",
        description: "Shell interpreter",
    },
    Dependency {
        name: "make",
        description: "Build automation",
    },
    Dependency {
        name: "gcc",
        description: "C compiler (for kernel)",
    },
    Dependency {
        name: "grub-mkrescue",
        description: "GRUB2 bootloader tools",
    },
    Dependency {
        name: "xorriso",
        description: "ISO 9660 creation",
    },
    Dependency {
        name: "qemu-system-x86_64",
        description: "QEMU emulator",
    },
    Dependency {
        name: "python3",
        description: "Python interpreter",
    },
    Dependency {
        name: "git",
        description: "Version control",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStatus {
    pub dependency: Dependency,
    pub location: Option<PathBuf>,
}

impl DependencyStatus {
    pub fn is_present(&self) -> bool {
        self.location.is_some()
    }

    /// `✓ FOUND   - gcc                  (C compiler (for kernel))`
    pub fn line(&self) -> String {
        let mark = if self.is_present() {
            "✓ FOUND  "
        } else {
            "✗ MISSING"
        };
        format!(
            "{} - {:20} ({})",
            mark, self.dependency.name, self.dependency.description
        )
    }
}

/// Look up every entry of [`DEPENDENCIES`] in `PATH`.
pub fn check_dependencies() -> Vec<DependencyStatus> {
    DEPENDENCIES.iter().map(|dep| check(*dep)).collect()
}

pub fn check(dependency: Dependency) -> DependencyStatus {
    let location = which::which(dependency.name).ok();
    tracing::debug!(
        dependency = dependency.name,
        found = location.is_some(),
        "Checked dependency"
    );
    DependencyStatus {
        dependency,
        location,
    }
}

pub fn missing(statuses: &[DependencyStatus]) -> Vec<&'static str> {
    statuses
        .iter()
        .filter(|s| !s.is_present())
        .map(|s| s.dependency.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_list() {
        let names: Vec<&str> = DEPENDENCIES.iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "bash",
                "make",
                "gcc",
                "grub-mkrescue",
                "xorriso",
                "qemu-system-x86_64",
                "python3",
                "git"
            ]
        );
    }

    #[test]
    fn test_missing_tool_reported() {
        let status = check(Dependency {
            name: "definitely-not-a-real-tool-xyz",
            description: "Nothing",
        });
        assert!(!status.is_present());
        assert!(status.line().starts_with("✗ MISSING - definitely-not-a-real-tool-xyz"));
        assert_eq!(missing(&[status]), vec!["definitely-not-a-real-tool-xyz"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_present_tool_reported() {
        let status = check(Dependency {
            name: "sh",
            description: "POSIX shell",
        });
        assert!(status.is_present());
        assert!(status.line().starts_with("✓ FOUND"));
    }
}
