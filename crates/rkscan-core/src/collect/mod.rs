//! Process collection from two independent system views.
//!
//! - Procfs enumeration (trusted, read directly from the kernel's files)
//! - External listing via `ps` (the view a userspace rootkit filters)
//! - Tool runner for bounded external command execution
//!
//! Both collectors normalize into [`ProcessRecord`] and write into a
//! [`ProcessStore`]. Per-process problems are [`RecordError`]s and only
//! drop that process; a [`ScanError`] aborts the collector.

mod clock;
mod error;
mod listing;
mod procfs;
mod store;
pub mod tool_runner;
mod types;

pub use clock::{
    parse_btime, resolve_boot_time, resolve_clock_frequency, ticks_to_epoch, ClockCalibration,
    DEFAULT_CLOCK_TICKS,
};
pub use error::ScanError;
pub use listing::{
    parse_listing_line, ListingCollector, TimestampLayout, DEFAULT_LISTING_ARGS,
    DEFAULT_LISTING_COMMAND, DEFAULT_TIMESTAMP_FORMAT,
};
pub use procfs::{
    format_cmdline, list_pids, parse_start_ticks, parse_status, read_cmdline, ProcfsCollector,
    StatusFields,
};
pub use store::ProcessStore;
pub use tool_runner::{
    ToolConfig, ToolError, ToolOutput, ToolRunner, ToolRunnerBuilder, ToolSpec,
    DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_MS,
};
pub use types::{
    AgeFilter, CollectionStats, ProcessRecord, ProcessState, RecordError, RecordSource,
};
