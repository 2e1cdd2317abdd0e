//! # Process Module
//!
//! Supervision of long-running external commands (build scripts, `qemu-img`,
//! `qemu-system-x86_64`).
//!
//! ## Overview
//!
//! ```text
//!  caller ──start()──▶ ProcessRunner ──spawn──▶ child (own process group)
//!    │                                              │ stdout+stderr
//!    │◀── OutputStream ◀── reader thread ◀── pipe ◀─┘
//!    │
//!    └── cancel() ──▶ supervisor thread ──SIGTERM … SIGKILL──▶ child
//! ```
//!
//! - [`ProcessRunner::start`] never blocks on the child.
//! - [`ProcessHandle::output`] yields merged output lines in pipe order.
//! - [`ProcessHandle::wait`] reports a [`Termination`]; a non-zero exit is
//!   data for the caller, not an error.
//! - [`ProcessHandle::cancel`] escalates from SIGTERM to SIGKILL after the
//!   grace timeout and is a no-op on terminated handles.

mod error;
mod runner;

pub use error::LaunchError;
pub use runner::{
    CommandSpec, OutputEvent, OutputStream, ProcessHandle, ProcessRunner, ProcessState,
    Termination, DEFAULT_GRACE_TIMEOUT,
};
