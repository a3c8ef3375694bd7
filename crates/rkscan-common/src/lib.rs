//! rkscan common types.
//!
//! Foundational types shared by the scanner crates:
//! - Process identity
//! - Error categories
//! - Output format specifications

pub mod error;
pub mod id;
pub mod output;

pub use error::ErrorCategory;
pub use id::{InvalidPid, ProcessId};
pub use output::OutputFormat;
