//! Exit codes for the rkscan CLI.
//!
//! Exit codes let automation read the outcome without parsing output.
//!
//! Exit code ranges:
//! - 0-1: Scan completed (clean or findings)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal and execution errors

/// Exit codes for rkscan operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Scan Outcomes (0-1)
    // ========================================================================
    /// Every check ran and found nothing
    Clean = 0,

    /// At least one check produced a finding
    FindingsDetected = 1,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or configuration
    ArgsError = 10,

    /// Required system source missing (procfs, kernel status file)
    SourceUnavailable = 11,

    /// Permission denied
    PermissionError = 12,

    // ========================================================================
    // Internal / Execution Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// External tool timed out
    TimeoutError = 22,

    /// External tool failed to spawn or exited non-zero
    ToolError = 23,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates any error.
    pub fn is_error(self) -> bool {
        self.as_i32() >= 10
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::FindingsDetected => "OK_FINDINGS",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::SourceUnavailable => "ERR_SOURCE",
            ExitCode::PermissionError => "ERR_PERMISSION",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
            ExitCode::ToolError => "ERR_TOOL",
        }
    }

    /// Pick the more severe of two codes: any error beats findings, which beat clean.
    pub fn worst(self, other: ExitCode) -> ExitCode {
        match (self.is_error(), other.is_error()) {
            (true, _) => self,
            (false, true) => other,
            (false, false) => {
                if self.as_i32() >= other.as_i32() {
                    self
                } else {
                    other
                }
            }
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
