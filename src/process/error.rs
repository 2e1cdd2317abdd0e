use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a supervised process could not be created.
///
/// Launch failures are terminal for the one operation that attempted them;
/// the runner never retries.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Executable not found: {program}")]
    NotFound { program: String },

    #[error("Permission denied when launching {program}")]
    PermissionDenied { program: String },

    #[error("Working directory does not exist: {}", path.display())]
    MissingWorkingDir { path: PathBuf },

    #[error("Failed to create output pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// Classify an error returned by `Command::spawn`.
    pub(crate) fn from_spawn(program: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                program: program.to_string(),
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                program: program.to_string(),
            },
            _ => Self::Spawn {
                program: program.to_string(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_spawn_classifies_not_found() {
        let err = LaunchError::from_spawn("qemu-img", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, LaunchError::NotFound { ref program } if program == "qemu-img"));
        assert_eq!(err.to_string(), "Executable not found: qemu-img");
    }

    #[test]
    fn test_from_spawn_classifies_permission_denied() {
        let err = LaunchError::from_spawn(
            "./build.sh",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, LaunchError::PermissionDenied { .. }));
    }

    #[test]
    fn test_from_spawn_keeps_other_errors() {
        let err = LaunchError::from_spawn("sh", io::Error::other("resource limit"));
        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert!(err.to_string().contains("resource limit"));
    }

    #[test]
    fn test_missing_working_dir_message() {
        let err = LaunchError::MissingWorkingDir {
            path: PathBuf::from("/nope"),
        };
        assert!(err.to_string().contains("/nope"));
    }
}
