//! Dynamic linker preload hook check.
//!
//! Userspace rootkits commonly inject a shared object into every process
//! through `LD_PRELOAD`, the global `/etc/ld.so.preload` list, or a linker
//! config drop-in.

use crate::config::PreloadSection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const PRELOAD_MARKER: &str = "LD_PRELOAD";

/// Findings of the preload check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadReport {
    /// Non-empty `LD_PRELOAD` value of this process's environment.
    pub env_value: Option<String>,

    /// Config files that install a preload.
    pub suspicious_files: Vec<PathBuf>,
}

impl PreloadReport {
    pub fn is_clean(&self) -> bool {
        self.env_value.is_none() && self.suspicious_files.is_empty()
    }

    /// Number of individual findings.
    pub fn finding_count(&self) -> usize {
        usize::from(self.env_value.is_some()) + self.suspicious_files.len()
    }
}

/// A set, non-empty `LD_PRELOAD` value is a finding.
pub fn check_preload_env(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Run the full check.
///
/// `env_value` is the caller's `LD_PRELOAD`, passed in so tests do not
/// depend on the process environment.
pub fn check_preload(config: &PreloadSection, env_value: Option<&str>) -> PreloadReport {
    let mut suspicious_files = Vec::new();

    if preload_file_active(&config.preload_file) {
        suspicious_files.push(config.preload_file.clone());
    }
    suspicious_files.extend(conf_files_with_marker(&config.conf_dir));

    let report = PreloadReport {
        env_value: check_preload_env(env_value),
        suspicious_files,
    };
    debug!(findings = report.finding_count(), "preload check complete");
    report
}

fn preload_file_active(path: &Path) -> bool {
    match fs::read(path) {
        Ok(content) => !content.is_empty(),
        Err(e) => {
            trace!(path = %path.display(), error = %e, "preload file not readable");
            false
        }
    }
}

/// `*.conf` files directly under `dir` that mention `LD_PRELOAD`, sorted.
fn conf_files_with_marker(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            trace!(dir = %dir.display(), error = %e, "linker config dir not readable");
            return Vec::new();
        }
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "conf") && path.is_file())
        .filter(|path| match fs::read_to_string(path) {
            Ok(content) => content.contains(PRELOAD_MARKER),
            Err(e) => {
                trace!(path = %path.display(), error = %e, "skipping unreadable config");
                false
            }
        })
        .collect();
    found.sort();
    found
}
