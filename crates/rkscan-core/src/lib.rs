//! rkscan core library.
//!
//! Host-based rootkit indicator checks:
//! - Hidden processes: procfs enumeration reconciled against `ps`
//! - Library preload hooks (`LD_PRELOAD`, `/etc/ld.so.preload`)
//! - Kernel module status published by the companion module
//!
//! The binary entry point is in `main.rs`.

pub mod collect;
pub mod config;
pub mod exit_codes;
pub mod kernel;
pub mod logging;
pub mod preload;
pub mod reconcile;
pub mod report;
pub mod scan;

pub use reconcile::{reconcile, HiddenProcessReport};
pub use scan::{ProcessCheck, ProcessCheckOutcome};
