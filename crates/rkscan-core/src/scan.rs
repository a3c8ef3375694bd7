//! Hidden-process check orchestration.
//!
//! Calibrates the clock, captures a single reference instant for the age
//! filter, runs both collectors on their own threads and reconciles once
//! both have returned.

use crate::collect::{
    AgeFilter, ClockCalibration, CollectionStats, ListingCollector, ProcessStore, ProcfsCollector,
    ScanError, TimestampLayout, ToolRunner, ToolSpec,
};
use crate::config::{ConfigError, ScanConfig};
use crate::reconcile::{reconcile, HiddenProcessReport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{info, info_span};

/// Inputs for one hidden-process check.
#[derive(Debug, Clone)]
pub struct ProcessCheck {
    pub proc_root: PathBuf,
    pub min_age: Duration,
    pub runner: ToolRunner,
    pub listing: ToolSpec,
    pub layout: TimestampLayout,
}

/// Outcome of a completed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCheckOutcome {
    #[serde(flatten)]
    pub report: HiddenProcessReport,

    /// Boot time used for tick conversion (Unix seconds).
    pub boot_time: i64,

    /// Reference instant of the age filter (Unix seconds).
    pub scanned_at: i64,

    pub min_age_secs: i64,
    pub procfs_stats: CollectionStats,
    pub listing_stats: CollectionStats,
}

impl ProcessCheck {
    /// Build a check from resolved configuration.
    pub fn from_config(config: &ScanConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            proc_root: config.scan.proc_root.clone(),
            min_age: config.min_age(),
            runner: ToolRunner::new(config.tool_config()),
            listing: config.listing_spec(),
            layout: config.timestamp_layout()?,
        })
    }

    /// Run the check against the current wall clock.
    pub fn run(&self) -> Result<ProcessCheckOutcome, ScanError> {
        self.run_at(chrono::Utc::now().timestamp())
    }

    /// Run the check with an explicit reference instant.
    pub fn run_at(&self, now: i64) -> Result<ProcessCheckOutcome, ScanError> {
        let calibration = ClockCalibration::resolve(&self.proc_root)?;
        let age_filter = AgeFilter::new(self.min_age, now);

        let procfs = ProcfsCollector::new(self.proc_root.clone(), calibration, age_filter);
        let listing = ListingCollector::new(
            self.runner.clone(),
            self.listing.clone(),
            self.layout.clone(),
            age_filter,
            self.proc_root.clone(),
        );

        let trusted = ProcessStore::new();
        let listed = ProcessStore::new();

        let (procfs_result, listing_result) = thread::scope(|s| {
            let procfs_handle = s.spawn(|| {
                let _span = info_span!("procfs_collector").entered();
                procfs.collect(&trusted)
            });
            let listing_result = {
                let _span = info_span!("listing_collector").entered();
                listing.collect(&listed)
            };
            let procfs_result = match procfs_handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (procfs_result, listing_result)
        });

        let procfs_stats = procfs_result?;
        let listing_stats = listing_result?;

        let report = reconcile(&trusted, &listed);
        info!(
            trusted = report.trusted_count,
            listed = report.listed_count,
            hidden = report.hidden.len(),
            "reconciliation complete"
        );

        Ok(ProcessCheckOutcome {
            report,
            boot_time: calibration.boot_time,
            scanned_at: now,
            min_age_secs: age_filter.min_age_secs(),
            procfs_stats,
            listing_stats,
        })
    }
}
