//! Kernel module status check.
//!
//! The companion kernel module publishes its own analysis as a procfs
//! text file:
//!
//! ```text
//! === Module Analysis Results ===
//!
//! hidden module: evil_lkm
//! === Syscall Analysis Results ===
//!
//! ```
//!
//! Each section is a header line followed by zero or more alert lines.

use crate::collect::ScanError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const HEADER_FENCE: &str = "===";
const HEADER_SUFFIX: &str = "Analysis Results";
const PREAMBLE_TITLE: &str = "Preamble";

/// One titled block of the status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSection {
    /// Analysis area, e.g. `Module` or `Syscall`.
    pub title: String,

    /// Non-blank lines under the header.
    pub alerts: Vec<String>,
}

/// Parsed kernel module status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelStatus {
    pub path: PathBuf,
    pub sections: Vec<KernelSection>,
}

impl KernelStatus {
    /// Total alerts across every section.
    pub fn alert_count(&self) -> usize {
        self.sections.iter().map(|s| s.alerts.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.alert_count() == 0
    }
}

/// Read and parse the kernel module status file at `path`.
///
/// A missing file usually means the module is not loaded.
pub fn read_kernel_status(path: &Path) -> Result<KernelStatus, ScanError> {
    let text = fs::read_to_string(path).map_err(|e| ScanError::source_io(path, e))?;
    let sections = parse_sections(&text);
    debug!(path = %path.display(), sections = sections.len(), "kernel status read");
    Ok(KernelStatus {
        path: path.to_path_buf(),
        sections,
    })
}

/// Split status text into sections.
pub fn parse_sections(text: &str) -> Vec<KernelSection> {
    let mut sections = Vec::new();
    let mut current = KernelSection {
        title: PREAMBLE_TITLE.to_string(),
        alerts: Vec::new(),
    };
    let mut in_preamble = true;

    for line in text.lines() {
        if let Some(title) = parse_header(line) {
            if !in_preamble || !current.alerts.is_empty() {
                sections.push(current);
            }
            current = KernelSection {
                title,
                alerts: Vec::new(),
            };
            in_preamble = false;
            continue;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            current.alerts.push(trimmed.to_string());
        }
    }

    if !in_preamble || !current.alerts.is_empty() {
        sections.push(current);
    }
    sections
}

fn parse_header(line: &str) -> Option<String> {
    let inner = line
        .trim()
        .strip_prefix(HEADER_FENCE)?
        .strip_suffix(HEADER_FENCE)?
        .trim();
    if inner.is_empty() {
        return None;
    }
    let title = inner.strip_suffix(HEADER_SUFFIX).unwrap_or(inner).trim();
    Some(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = "=== Module Analysis Results ===\n\n\n\
=== Syscall Analysis Results ===\n\n\n\
=== Process Analysis Results ===\n\n\n\
=== Interrupt Analysis Results ===\n\n\n";

    #[test]
    fn test_clean_status() {
        let sections = parse_sections(CLEAN);
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Module", "Syscall", "Process", "Interrupt"]);
        assert!(sections.iter().all(|s| s.alerts.is_empty()));
    }

    #[test]
    fn test_alerts_attached_to_sections() {
        let text = "=== Module Analysis Results ===\n\n\
hidden module: diamorphine\n\
=== Syscall Analysis Results ===\n\n\
sys_kill hooked -> 0xffffffffc0a01000\n  sys_getdents64 hooked\n";
        let sections = parse_sections(text);
        assert_eq!(sections[0].alerts, vec!["hidden module: diamorphine"]);
        assert_eq!(
            sections[1].alerts,
            vec!["sys_kill hooked -> 0xffffffffc0a01000", "sys_getdents64 hooked"]
        );
    }

    #[test]
    fn test_preamble_kept_only_when_non_blank() {
        let sections = parse_sections("\n  \n=== Module Analysis Results ===\n");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Module");

        let sections = parse_sections("rsc_lkm v0.1\n=== Module Analysis Results ===\n");
        assert_eq!(sections[0].title, "Preamble");
        assert_eq!(sections[0].alerts, vec!["rsc_lkm v0.1"]);
    }

    #[test]
    fn test_header_without_suffix() {
        assert_eq!(parse_header("=== Extra ==="), Some("Extra".to_string()));
        assert_eq!(parse_header("======"), None);
        assert_eq!(parse_header("== Module =="), None);
    }

    #[test]
    fn test_read_kernel_status_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsc_lkm");
        fs::write(&path, "=== Process Analysis Results ===\n\nhidden pid 4242\n").unwrap();

        let status = read_kernel_status(&path).unwrap();
        assert_eq!(status.alert_count(), 1);
        assert!(!status.is_clean());
        assert_eq!(status.path, path);
    }

    #[test]
    fn test_missing_status_file() {
        let err = read_kernel_status(Path::new("/nonexistent/rsc_lkm")).unwrap_err();
        assert!(matches!(err, ScanError::SourceUnavailable { .. }));
    }
}
