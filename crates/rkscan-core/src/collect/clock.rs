//! Boot time and scheduler clock calibration.
//!
//! Procfs reports process start times as clock ticks since boot. Turning
//! them into wall-clock seconds needs the boot time (`btime` in
//! `/proc/stat`) and the tick rate (`_SC_CLK_TCK`).

use super::ScanError;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Tick rate assumed when the system cannot be queried.
///
/// Detecting presence matters more than timestamp precision, so a wrong
/// guess here only skews displayed start times and the age filter.
pub const DEFAULT_CLOCK_TICKS: u64 = 100;

/// Boot time and tick rate for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockCalibration {
    /// System boot time (Unix seconds).
    pub boot_time: i64,

    /// Scheduler clock ticks per second.
    pub ticks_per_second: u64,
}

impl ClockCalibration {
    /// Resolve both values from the live system.
    pub fn resolve(proc_root: &Path) -> Result<Self, ScanError> {
        let boot_time = resolve_boot_time(proc_root)?;
        let ticks_per_second = resolve_clock_frequency();
        debug!(boot_time, ticks_per_second, "clock calibrated");
        Ok(Self {
            boot_time,
            ticks_per_second,
        })
    }

    /// Convert ticks since boot to Unix seconds.
    pub fn to_epoch(&self, ticks: u64) -> i64 {
        ticks_to_epoch(ticks, self.boot_time, self.ticks_per_second)
    }
}

/// Read the boot time from `<proc_root>/stat`.
pub fn resolve_boot_time(proc_root: &Path) -> Result<i64, ScanError> {
    let path = proc_root.join("stat");
    let content = fs::read_to_string(&path).map_err(|e| ScanError::source_io(&path, e))?;
    parse_btime(&content).ok_or_else(|| ScanError::SourceUnavailable {
        path,
        reason: "btime field not found".to_string(),
    })
}

/// Extract the `btime` value from `/proc/stat` content.
pub fn parse_btime(content: &str) -> Option<i64> {
    content.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some("btime"), Some(value)) => value.parse::<i64>().ok(),
            _ => None,
        }
    })
}

/// Query the scheduler tick rate, falling back to [`DEFAULT_CLOCK_TICKS`].
pub fn resolve_clock_frequency() -> u64 {
    // SAFETY: sysconf has no preconditions and only reads system config.
    let value = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if value <= 0 {
        warn!(
            value,
            fallback = DEFAULT_CLOCK_TICKS,
            "sysconf(_SC_CLK_TCK) failed, using default tick rate"
        );
        DEFAULT_CLOCK_TICKS
    } else {
        value as u64
    }
}

/// `boot_time + floor(ticks / freq)`. A zero frequency uses the default.
pub fn ticks_to_epoch(ticks: u64, boot_time: i64, freq: u64) -> i64 {
    let freq = if freq == 0 { DEFAULT_CLOCK_TICKS } else { freq };
    let secs = i64::try_from(ticks / freq).unwrap_or(i64::MAX);
    boot_time.saturating_add(secs)
}
