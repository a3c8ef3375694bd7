//! Scan report assembly and rendering.
//!
//! A report holds the outcome of each check that ran. Human output
//! follows the scanner's traditional `=== <Area> Analysis Results ===`
//! layout; JSON output is the same structure through serde.

use crate::collect::{ProcessRecord, ScanError};
use crate::exit_codes::ExitCode;
use crate::kernel::KernelStatus;
use crate::preload::PreloadReport;
use crate::scan::ProcessCheckOutcome;
use chrono::{DateTime, Local, TimeZone, Utc};
use rkscan_common::ErrorCategory;
use serde::Serialize;
use std::fmt::Write;

/// Version of the JSON report layout.
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Display layout for process start times (local zone).
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const BANNER: &str = r"
 ____  _  __ ____   ____    _    _   _
|  _ \| |/ // ___| / ___|  / \  | \ | |
| |_) | ' / \___ \| |     / _ \ |  \| |
|  _ <| . \  ___) | |___ / ___ \| |\  |
|_| \_\_|\_\|____/ \____/_/   \_\_| \_|
";

/// Outcome of one check.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckResult<T> {
    Completed { result: T },
    Failed {
        error: String,
        category: ErrorCategory,
        remediation: String,
        /// An advisory failure is reported but does not set the exit code.
        advisory: bool,
        #[serde(skip)]
        exit_code: ExitCode,
    },
}

impl<T> CheckResult<T> {
    /// Wrap a fatal scan error.
    pub fn failed(err: &ScanError, advisory: bool) -> Self {
        CheckResult::Failed {
            error: err.to_string(),
            category: err.category(),
            remediation: err.remediation().to_string(),
            advisory,
            exit_code: err.exit_code(),
        }
    }

    pub fn from_result(result: Result<T, ScanError>, advisory: bool) -> Self {
        match result {
            Ok(result) => CheckResult::Completed { result },
            Err(e) => Self::failed(&e, advisory),
        }
    }

    fn exit_code(&self, has_findings: impl Fn(&T) -> bool) -> ExitCode {
        match self {
            CheckResult::Completed { result } if has_findings(result) => ExitCode::FindingsDetected,
            CheckResult::Completed { .. } => ExitCode::Clean,
            CheckResult::Failed { advisory: true, .. } => ExitCode::Clean,
            CheckResult::Failed { exit_code, .. } => *exit_code,
        }
    }
}

/// Everything one invocation found.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub schema_version: &'static str,
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<CheckResult<KernelStatus>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preload: Option<CheckResult<PreloadReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processes: Option<CheckResult<ProcessCheckOutcome>>,
}

impl ScanReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            run_id: run_id.into(),
            generated_at: Utc::now(),
            kernel: None,
            preload: None,
            processes: None,
        }
    }

    /// Most severe outcome across every check that ran.
    pub fn exit_code(&self) -> ExitCode {
        let mut code = ExitCode::Clean;
        if let Some(kernel) = &self.kernel {
            code = code.worst(kernel.exit_code(|k| !k.is_clean()));
        }
        if let Some(preload) = &self.preload {
            code = code.worst(preload.exit_code(|p| !p.is_clean()));
        }
        if let Some(processes) = &self.processes {
            code = code.worst(processes.exit_code(|p| !p.report.is_clean()));
        }
        code
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Operator-facing text.
    pub fn render_human(&self, banner: bool) -> String {
        let mut out = String::new();
        if banner {
            out.push_str(BANNER);
            out.push('\n');
        }
        if let Some(kernel) = &self.kernel {
            render_check(&mut out, "Kernel Module", kernel, render_kernel);
        }
        if let Some(preload) = &self.preload {
            render_check(&mut out, "LD_PRELOAD hook", preload, render_preload);
        }
        if let Some(processes) = &self.processes {
            render_check(&mut out, "Hidden Process", processes, render_processes);
        }
        out
    }
}

fn render_check<T>(out: &mut String, area: &str, check: &CheckResult<T>, body: fn(&mut String, &T)) {
    let _ = writeln!(out, "=== {area} Analysis Results ===\n");
    match check {
        CheckResult::Completed { result } => body(out, result),
        CheckResult::Failed {
            error, remediation, ..
        } => {
            let _ = writeln!(out, "[Error] {error}");
            let _ = writeln!(out, "        {remediation}");
        }
    }
    out.push('\n');
}

fn render_kernel(out: &mut String, status: &KernelStatus) {
    if status.is_clean() {
        let _ = writeln!(out, "No kernel module alerts.");
        return;
    }
    for section in status.sections.iter().filter(|s| !s.alerts.is_empty()) {
        let _ = writeln!(out, "[Warning] {}:", section.title);
        for alert in &section.alerts {
            let _ = writeln!(out, "  - {alert}");
        }
    }
}

fn render_preload(out: &mut String, report: &PreloadReport) {
    if report.is_clean() {
        let _ = writeln!(out, "No preload hooks found.");
        return;
    }
    if let Some(value) = &report.env_value {
        let _ = writeln!(out, "[Warning] LD_PRELOAD environment variable found: {value}");
    }
    if !report.suspicious_files.is_empty() {
        let _ = writeln!(out, "[Warning] Suspicious preload configuration files found:");
        for file in &report.suspicious_files {
            let _ = writeln!(out, "  - {}", file.display());
        }
    }
}

fn render_processes(out: &mut String, outcome: &ProcessCheckOutcome) {
    let report = &outcome.report;
    if report.is_clean() {
        let _ = writeln!(
            out,
            "No hidden processes found ({} procfs, {} listed).",
            report.trusted_count, report.listed_count
        );
    } else {
        let _ = writeln!(out, "[Warning] Found {} hidden processes:", report.hidden.len());
        for record in &report.hidden {
            render_record(out, record);
        }
        let _ = writeln!(
            out,
            "Compared {} procfs records with {} listed ({} listing lines unparsed).",
            report.trusted_count, report.listed_count, outcome.listing_stats.skipped
        );
        let _ = writeln!(out, "[Warning] The ps command may have been replaced.");
    }

    let unparsed = outcome.listing_stats.skipped;
    if unparsed > 0 {
        let _ = writeln!(
            out,
            "[Warning] {unparsed} listing lines could not be parsed; \
             check listing.timestamp_format if every process is reported hidden."
        );
    }
}

fn render_record(out: &mut String, record: &ProcessRecord) {
    let _ = writeln!(out, "PID: {}", record.pid);
    let _ = writeln!(out, "Name: {}", record.name);
    let _ = writeln!(out, "UID: {}", record.uid);
    let _ = writeln!(out, "Start Time: {}", format_start_time(record.start_time));
    let _ = writeln!(out, "Command: {}\n", record.cmdline);
}

/// Local-time rendering of a Unix timestamp.
pub fn format_start_time(epoch: i64) -> String {
    match Local.timestamp_opt(epoch, 0).single() {
        Some(dt) => dt.format(START_TIME_FORMAT).to_string(),
        None => epoch.to_string(),
    }
}
