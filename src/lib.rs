//! CyberOS Control - build CyberOS and run it under QEMU from the terminal.
//!
//! The core is [`process`], a supervised process runner that streams the
//! combined output of long-running tools and stops them with a
//! terminate-then-kill escalation. [`project`] and [`vm`] describe the
//! external tools it drives, [`activity`] records what happened and [`ui`]
//! is the TUI on top.

pub mod activity;
pub mod process;
pub mod project;
pub mod ui;
pub mod vm;
