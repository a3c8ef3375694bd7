//! Process enumeration via procfs (Linux).
//!
//! This is the trusted view: records come straight from the kernel's
//! per-process text files rather than from a userspace tool.
//!
//! Per process we read:
//! - `stat` for the start time (field 22, clock ticks since boot)
//! - `status` for name, parent, real UID and state
//! - `cmdline` for the full invocation (best effort)
//!
//! A process can exit between the directory listing and any of these
//! reads, so every per-PID failure only drops that PID.

use super::clock::ClockCalibration;
use super::store::ProcessStore;
use super::types::{AgeFilter, CollectionStats, ProcessRecord, ProcessState, RecordError, RecordSource};
use super::ScanError;
use rkscan_common::ProcessId;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Position of `starttime` in `/proc/<pid>/stat` (1-based, per proc(5)).
const STAT_STARTTIME_FIELD: usize = 22;

/// Fields after the `comm` field start at `state`, which is field 3.
const STAT_FIELDS_BEFORE_STATE: usize = 2;

/// Collector reading the procfs root.
#[derive(Debug, Clone)]
pub struct ProcfsCollector {
    proc_root: PathBuf,
    calibration: ClockCalibration,
    age_filter: AgeFilter,
}

impl ProcfsCollector {
    /// Create a collector over `proc_root` (normally `/proc`).
    pub fn new(proc_root: impl Into<PathBuf>, calibration: ClockCalibration, age_filter: AgeFilter) -> Self {
        Self {
            proc_root: proc_root.into(),
            calibration,
            age_filter,
        }
    }

    /// Populate `store` with every qualifying process.
    ///
    /// Only a failure to list the procfs root is an error.
    #[instrument(skip(self, store), fields(root = %self.proc_root.display()))]
    pub fn collect(&self, store: &ProcessStore) -> Result<CollectionStats, ScanError> {
        let mut stats = CollectionStats::default();

        for pid in list_pids(&self.proc_root)? {
            let outcome = self.read_process(pid);
            stats.record(&outcome);
            match outcome {
                Ok(record) => {
                    store.insert(record);
                }
                Err(e) => debug!(pid = pid.0, error = %e, "procfs record dropped"),
            }
        }

        debug!(
            candidates = stats.candidates,
            collected = stats.collected,
            too_young = stats.too_young,
            skipped = stats.skipped,
            "procfs collection complete"
        );
        Ok(stats)
    }

    /// Build the record for a single PID.
    pub fn read_process(&self, pid: ProcessId) -> Result<ProcessRecord, RecordError> {
        let dir = self.proc_root.join(pid.to_string());

        let stat = read_record(&dir, "stat")?;
        let ticks = parse_start_ticks(&stat)?;
        let start_time = self.calibration.to_epoch(ticks);
        self.age_filter.check(start_time)?;

        let status = parse_status(&read_record(&dir, "status")?)?;

        Ok(ProcessRecord {
            pid,
            ppid: status.ppid,
            name: status.name,
            uid: status.uid,
            state: status.state,
            start_time,
            cmdline: read_cmdline(&self.proc_root, pid),
            source: RecordSource::Procfs,
        })
    }
}

/// List candidate PIDs under the procfs root, sorted.
///
/// Entries whose names are not positive integers (`self`, `sys`, ...) are
/// ignored. Unreadable individual entries are skipped.
pub fn list_pids(proc_root: &Path) -> Result<Vec<ProcessId>, ScanError> {
    let entries = fs::read_dir(proc_root).map_err(|e| ScanError::source_io(proc_root, e))?;

    let mut pids: Vec<ProcessId> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<ProcessId>().ok())
        .collect();

    pids.sort_unstable();
    Ok(pids)
}

fn read_record(dir: &Path, file: &'static str) -> Result<String, RecordError> {
    fs::read(dir.join(file))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| RecordError::Unreadable { file, source })
}

/// Read `<proc_root>/<pid>/cmdline` with NUL separators turned into spaces.
///
/// Returns an empty string when the record is unreadable (kernel threads,
/// exited processes, permission denied).
pub fn read_cmdline(proc_root: &Path, pid: ProcessId) -> String {
    fs::read(proc_root.join(pid.to_string()).join("cmdline"))
        .map(|bytes| format_cmdline(&bytes))
        .unwrap_or_default()
}

/// Join NUL-separated argv bytes with spaces.
pub fn format_cmdline(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .replace('\0', " ")
        .trim()
        .to_string()
}

/// Extract the start-tick field from `/proc/<pid>/stat`.
///
/// Format: `pid (comm) state ppid pgrp session tty_nr tpgid flags minflt
/// cminflt majflt cmajflt utime stime cutime cstime priority nice
/// num_threads itrealvalue starttime ...`
///
/// `comm` may contain spaces and parentheses, so fields are counted from
/// the last `)`.
pub fn parse_start_ticks(content: &str) -> Result<u64, RecordError> {
    let comm_end = content
        .rfind(')')
        .ok_or_else(|| RecordError::malformed("stat", "missing comm terminator"))?;

    let after_comm = content
        .get(comm_end + 1..)
        .ok_or_else(|| RecordError::malformed("stat", "truncated after comm"))?;

    let index = STAT_STARTTIME_FIELD - STAT_FIELDS_BEFORE_STATE - 1;
    let field = after_comm
        .split_whitespace()
        .nth(index)
        .ok_or_else(|| RecordError::malformed("stat", "too few fields for starttime"))?;

    field
        .parse::<u64>()
        .map_err(|_| RecordError::malformed("stat", format!("invalid starttime {field:?}")))
}

/// Fields taken from `/proc/<pid>/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFields {
    pub name: String,
    pub ppid: u32,
    pub uid: u32,
    pub state: ProcessState,
}

/// Parse the prefix-keyed fields of `/proc/<pid>/status`.
///
/// `Name:`, `Uid:` and `State:` are required; a missing `PPid:` means the
/// parent is unknown and yields 0.
pub fn parse_status(content: &str) -> Result<StatusFields, RecordError> {
    let mut name = None;
    let mut ppid = None;
    let mut uid = None;
    let mut state = None;

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("Name:") {
            name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("PPid:") {
            let value = rest.trim();
            ppid = Some(
                value
                    .parse::<u32>()
                    .map_err(|_| RecordError::malformed("status", format!("invalid PPid {value:?}")))?,
            );
        } else if let Some(rest) = line.strip_prefix("Uid:") {
            // Format: "Uid:\treal\teffective\tsaved\tfs"
            let real = rest
                .split_whitespace()
                .next()
                .ok_or_else(|| RecordError::malformed("status", "empty Uid"))?;
            uid = Some(
                real.parse::<u32>()
                    .map_err(|_| RecordError::malformed("status", format!("invalid Uid {real:?}")))?,
            );
        } else if let Some(rest) = line.strip_prefix("State:") {
            // Format: "State:\tS (sleeping)"
            state = ProcessState::from_token(rest.trim());
        }
    }

    Ok(StatusFields {
        name: name.ok_or_else(|| RecordError::malformed("status", "missing Name"))?,
        ppid: ppid.unwrap_or(0),
        uid: uid.ok_or_else(|| RecordError::malformed("status", "missing Uid"))?,
        state: state.ok_or_else(|| RecordError::malformed("status", "missing State"))?,
    })
}
