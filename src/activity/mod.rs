//! Timestamped, source-tagged operation log.
//!
//! Separate from diagnostics: every entry is also mirrored to `tracing`, but
//! this log is what the user sees in the Logs tab and can save to disk.

pub mod log;

pub use log::{data_dir, default_log_dir, ActivityEntry, ActivityLog, MAX_ENTRIES};
