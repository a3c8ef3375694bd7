//! Process identity type.
//!
//! Both collectors key their stores by PID, so this is the only identity
//! the reconciliation engine ever compares. Names, command lines and start
//! times are carried for display but never used for matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Process ID wrapper with display formatting.
///
/// Always positive when produced by [`ProcessId::new`] or parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

/// A token that does not name a valid (positive) PID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pid: {0:?}")]
pub struct InvalidPid(pub String);

impl ProcessId {
    /// Create a PID, rejecting zero.
    pub fn new(pid: u32) -> Option<Self> {
        (pid > 0).then_some(ProcessId(pid))
    }

    /// Raw numeric value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl FromStr for ProcessId {
    type Err = InvalidPid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .ok()
            .and_then(ProcessId::new)
            .ok_or_else(|| InvalidPid(s.to_string()))
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ProcessId> for u32 {
    fn from(pid: ProcessId) -> Self {
        pid.0
    }
}
