//! Fatal collection errors.
//!
//! Per-process problems are [`RecordError`](super::RecordError)s and never
//! reach this type. A `ScanError` means a whole collector could not run,
//! which aborts the hidden-process check.

use crate::exit_codes::ExitCode;
use rkscan_common::ErrorCategory;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort a collector and the scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("required source {} unavailable: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("permission denied reading {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("external tool `{command}` failed: {reason}")]
    ExternalToolFailure {
        command: String,
        reason: String,
        timed_out: bool,
    },
}

impl ScanError {
    /// Classify an I/O failure on a required top-level record.
    pub fn source_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            ScanError::PermissionDenied {
                path: path.to_path_buf(),
            }
        } else {
            ScanError::SourceUnavailable {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }
        }
    }

    pub(crate) fn tool(command: &str, reason: impl Into<String>) -> Self {
        ScanError::ExternalToolFailure {
            command: command.to_string(),
            reason: reason.into(),
            timed_out: false,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ScanError::SourceUnavailable { .. } => ExitCode::SourceUnavailable,
            ScanError::PermissionDenied { .. } => ExitCode::PermissionError,
            ScanError::ExternalToolFailure {
                timed_out: true, ..
            } => ExitCode::TimeoutError,
            ScanError::ExternalToolFailure { .. } => ExitCode::ToolError,
        }
    }

    /// Error category for grouping.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScanError::SourceUnavailable { .. } | ScanError::PermissionDenied { .. } => {
                ErrorCategory::Source
            }
            ScanError::ExternalToolFailure { .. } => ErrorCategory::Tool,
        }
    }

    /// Human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            ScanError::SourceUnavailable { .. } => {
                "Check that procfs is mounted and the configured proc root is correct."
            }
            ScanError::PermissionDenied { .. } => {
                "Run the scan as root so every process record is readable."
            }
            ScanError::ExternalToolFailure {
                timed_out: true, ..
            } => "The listing tool hung. A hanging ps is itself suspicious; inspect the binary.",
            ScanError::ExternalToolFailure { .. } => {
                "Verify the listing command exists and accepts the configured arguments."
            }
        }
    }
}
