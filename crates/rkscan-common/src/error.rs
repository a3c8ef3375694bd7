//! Error categories shared across the scanner.
//!
//! Each layer defines its own `thiserror` enum; categories let the CLI and
//! JSON output group them without knowing the concrete type.

use serde::{Deserialize, Serialize};

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file or argument errors.
    Config,
    /// A required system record could not be read.
    Source,
    /// The external listing utility failed.
    Tool,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Source => write!(f, "source"),
            ErrorCategory::Tool => write!(f, "tool"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}
