//! # Project Module
//!
//! Knowledge about a CyberOS checkout: its layout, the host tools it needs,
//! a status report and the build/clean script invocations. The scripts
//! themselves are opaque; they run through [`crate::process`].

pub mod deps;
pub mod layout;
pub mod status;
pub mod tasks;

pub use deps::{check_dependencies, Dependency, DependencyStatus, DEPENDENCIES};
pub use layout::{ProjectLayout, ISO_FILE_NAME, PROJECT_NAME, PROJECT_VERSION};
pub use status::ProjectStatus;
pub use tasks::{open_in_file_manager, BuildTask};
