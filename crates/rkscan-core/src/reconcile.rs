//! Hidden-process reconciliation.
//!
//! Compares the trusted procfs snapshot against the listing snapshot. A
//! PID the kernel exposes but `ps` omits is reported as hidden. PIDs only
//! `ps` reports (typically processes that started after the procfs pass)
//! are ignored.

use crate::collect::{ProcessRecord, ProcessStore};
use serde::{Deserialize, Serialize};

/// Result of comparing two process snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenProcessReport {
    /// Processes seen through procfs and missing from the listing, by PID.
    pub hidden: Vec<ProcessRecord>,

    /// Records in the trusted snapshot.
    pub trusted_count: usize,

    /// Records in the listing snapshot.
    pub listed_count: usize,
}

impl HiddenProcessReport {
    /// True when no process is hidden.
    pub fn is_clean(&self) -> bool {
        self.hidden.is_empty()
    }
}

/// Compute `trusted \ listed` by PID.
///
/// Pure over the two stores; calling it twice gives the same report.
pub fn reconcile(trusted: &ProcessStore, listed: &ProcessStore) -> HiddenProcessReport {
    // records() is already sorted by PID
    let hidden: Vec<ProcessRecord> = trusted
        .records()
        .into_iter()
        .filter(|record| !listed.contains(record.pid))
        .collect();

    HiddenProcessReport {
        hidden,
        trusted_count: trusted.len(),
        listed_count: listed.len(),
    }
}
