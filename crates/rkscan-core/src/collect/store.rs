//! Per-collector process snapshot.
//!
//! One store per collector per scan. The owning collector is the only
//! writer; the reconciliation engine and report renderer only read. An
//! `RwLock` gives that exclusive-write / shared-read discipline while the
//! two collectors run on separate threads.

use super::types::ProcessRecord;
use rkscan_common::ProcessId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe mapping from PID to process record.
#[derive(Debug, Default)]
pub struct ProcessStore {
    processes: RwLock<HashMap<ProcessId, ProcessRecord>>,
}

impl ProcessStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock can only come from a collector thread
    // mid-insert; the map itself is still consistent, so keep using it.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ProcessId, ProcessRecord>> {
        self.processes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ProcessId, ProcessRecord>> {
        self.processes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record keyed by its PID, returning any record it replaced.
    pub fn insert(&self, record: ProcessRecord) -> Option<ProcessRecord> {
        self.write().insert(record.pid, record)
    }

    /// Look up a record by PID.
    pub fn get(&self, pid: ProcessId) -> Option<ProcessRecord> {
        self.read().get(&pid).cloned()
    }

    /// Whether the store holds a record for `pid`.
    pub fn contains(&self, pid: ProcessId) -> bool {
        self.read().contains_key(&pid)
    }

    /// All PIDs, sorted ascending.
    pub fn pids(&self) -> Vec<ProcessId> {
        let mut pids: Vec<ProcessId> = self.read().keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Clone out every record, sorted by PID.
    pub fn records(&self) -> Vec<ProcessRecord> {
        let mut records: Vec<ProcessRecord> = self.read().values().cloned().collect();
        records.sort_unstable_by_key(|r| r.pid);
        records
    }
}

impl FromIterator<ProcessRecord> for ProcessStore {
    fn from_iter<I: IntoIterator<Item = ProcessRecord>>(iter: I) -> Self {
        let map = iter.into_iter().map(|r| (r.pid, r)).collect();
        Self {
            processes: RwLock::new(map),
        }
    }
}
