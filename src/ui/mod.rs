//! # UI Module
//!
//! The ratatui front end of the control center.
//!
//! ## Components
//!
//! - [`App`] - All UI-owned state: tabs, the build and emulator slots, the
//!   activity log, modals
//! - [`jobs`] - Worker threads that drive the process runner and report back
//!   over channels
//! - [`input`] - Key bindings
//! - [`mod@render`] - Drawing
//!
//! ## Layout
//!
//! ```text
//! ┌ CyberOS Control Center ─────────────────────────┐
//! │ 1 Dashboard  2 Build  3 Emulator  4 VMs  5 Logs │
//! ├─────────────────────────────────────────────────┤
//! │                                                 │
//! │                 active tab                      │
//! │                                                 │
//! ├─────────────────────────────────────────────────┤
//! │ key hints                                       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! At most one build and one VM run at a time. That rule lives here, in
//! [`app::SlotState`], not in the process runner.

pub mod app;
pub mod config;
pub mod input;
pub mod jobs;
pub mod render;
pub mod terminal_widget;
pub mod theme;

pub use app::{App, AppSettings};
pub use input::handle_key;
pub use render::render;
