//! Common types for process collection.
//!
//! Both collectors normalize their source into [`ProcessRecord`] so the
//! reconciliation engine can compare them by PID alone.

use rkscan_common::ProcessId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Process run state.
///
/// Maps the single-character state code shared by procfs and ps:
/// - R: Running or runnable
/// - S: Interruptible sleep (waiting for event)
/// - D: Uninterruptible sleep (usually I/O)
/// - Z: Zombie (terminated but not reaped)
/// - T: Stopped (by job control or trace)
/// - I: Idle (kernel thread, Linux)
/// - X: Dead (should never be seen)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Sleeping,
    DiskSleep,
    Zombie,
    Stopped,
    Idle,
    Dead,
    Unknown,
}

impl ProcessState {
    /// Parse process state from single character.
    pub fn from_char(c: char) -> Self {
        match c {
            'R' => ProcessState::Running,
            'S' => ProcessState::Sleeping,
            'D' => ProcessState::DiskSleep,
            'Z' => ProcessState::Zombie,
            'T' | 't' => ProcessState::Stopped,
            'I' => ProcessState::Idle,
            'X' | 'x' => ProcessState::Dead,
            _ => ProcessState::Unknown,
        }
    }

    /// Parse the leading character of a state token (`S`, `Ss+`, `R<`).
    pub fn from_token(token: &str) -> Option<Self> {
        token.chars().next().map(ProcessState::from_char)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessState::Running => "R",
            ProcessState::Sleeping => "S",
            ProcessState::DiskSleep => "D",
            ProcessState::Zombie => "Z",
            ProcessState::Stopped => "T",
            ProcessState::Idle => "I",
            ProcessState::Dead => "X",
            ProcessState::Unknown => "?",
        };
        write!(f, "{}", s)
    }
}

/// Which system view produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Direct procfs introspection (trusted).
    Procfs,
    /// External process-listing utility output.
    Listing,
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordSource::Procfs => write!(f, "procfs"),
            RecordSource::Listing => write!(f, "listing"),
        }
    }
}

/// A single process record from one collection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process ID.
    pub pid: ProcessId,

    /// Parent process ID (0 when unknown).
    pub ppid: u32,

    /// Short process name. Procfs reports the kernel `comm`, ps its own
    /// truncated command column, so the two never compare equal reliably.
    pub name: String,

    /// Real user ID.
    pub uid: u32,

    /// Current process state.
    pub state: ProcessState,

    /// Process start time (Unix timestamp, seconds).
    pub start_time: i64,

    /// Full command line, empty if unavailable.
    pub cmdline: String,

    /// Collector that produced this record.
    pub source: RecordSource,
}

/// Why a single process was dropped from a snapshot.
///
/// Never fatal: the collector counts it and moves on.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record {file} unreadable: {source}")]
    Unreadable {
        file: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {file} record: {message}")]
    Malformed { file: &'static str, message: String },

    #[error("process younger than minimum age ({age_secs}s)")]
    TooYoung { age_secs: i64 },
}

impl RecordError {
    pub(crate) fn malformed(file: &'static str, message: impl Into<String>) -> Self {
        RecordError::Malformed {
            file,
            message: message.into(),
        }
    }

    /// Whether the record was dropped by the age filter rather than a failure.
    pub fn is_filtered(&self) -> bool {
        matches!(self, RecordError::TooYoung { .. })
    }
}

/// Minimum-age filter shared by both collectors.
///
/// A record is admitted only when it is strictly older than `min_age` at
/// the instant `now`. Both collectors must use the same `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeFilter {
    min_age_secs: i64,
    now: i64,
}

impl AgeFilter {
    /// Create a filter evaluated at `now` (Unix seconds).
    pub fn new(min_age: Duration, now: i64) -> Self {
        Self {
            min_age_secs: i64::try_from(min_age.as_secs()).unwrap_or(i64::MAX),
            now,
        }
    }

    /// Create a filter evaluated at the current wall clock.
    pub fn from_now(min_age: Duration) -> Self {
        Self::new(min_age, chrono::Utc::now().timestamp())
    }

    /// Reference instant of this filter.
    pub fn now(&self) -> i64 {
        self.now
    }

    /// Configured threshold in seconds.
    pub fn min_age_secs(&self) -> i64 {
        self.min_age_secs
    }

    /// Check a start time against the threshold.
    pub fn check(&self, start_time: i64) -> Result<(), RecordError> {
        let age_secs = self.now.saturating_sub(start_time);
        if age_secs > self.min_age_secs {
            Ok(())
        } else {
            Err(RecordError::TooYoung { age_secs })
        }
    }

    /// Whether a start time passes the filter.
    pub fn admits(&self, start_time: i64) -> bool {
        self.check(start_time).is_ok()
    }
}

/// Counters reported by a collector after a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Candidates seen (PID directories or data lines).
    pub candidates: usize,

    /// Records inserted into the store.
    pub collected: usize,

    /// Records dropped by the age filter.
    pub too_young: usize,

    /// Records dropped because they were unreadable or malformed.
    pub skipped: usize,
}

impl CollectionStats {
    /// Account for one candidate's outcome.
    pub(crate) fn record<T>(&mut self, outcome: &Result<T, RecordError>) {
        self.candidates += 1;
        match outcome {
            Ok(_) => self.collected += 1,
            Err(e) if e.is_filtered() => self.too_young += 1,
            Err(_) => self.skipped += 1,
        }
    }
}
