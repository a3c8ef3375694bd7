//! Process enumeration via the external `ps` utility.
//!
//! This is the view a userspace rootkit tampers with. The collector asks
//! for fixed columns:
//!
//! ```text
//! ps ax -o pid,ppid,uid,stat,lstart,comm
//!   PID  PPID   UID STAT                  STARTED COMMAND
//!     1     0     0 Ss   Mon Jan  6 09:12:01 2025 systemd
//! ```
//!
//! `lstart` spans several whitespace-separated tokens; how many is taken
//! from the configured timestamp layout so a different locale or date
//! format can be matched without code changes.

use super::procfs::read_cmdline;
use super::store::ProcessStore;
use super::tool_runner::{ToolRunner, ToolSpec};
use super::types::{AgeFilter, CollectionStats, ProcessRecord, ProcessState, RecordError, RecordSource};
use super::ScanError;
use chrono::format::{Item, StrftimeItems};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use rkscan_common::ProcessId;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, instrument, warn};

/// Default listing command.
pub const DEFAULT_LISTING_COMMAND: &str = "ps";

/// Default listing arguments: pid, ppid, uid, stat, lstart, comm.
pub const DEFAULT_LISTING_ARGS: &[&str] = &["ax", "-o", "pid,ppid,uid,stat,lstart,comm"];

/// `lstart` layout under the C locale, e.g. `Mon Jan  6 09:12:01 2025`.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Tokens of a timestamp rendered with [`DEFAULT_TIMESTAMP_FORMAT`].
const DEFAULT_TIMESTAMP_TOKENS: usize = 5;

/// Columns before the timestamp: pid, ppid, uid, stat.
const LEADING_COLUMNS: usize = 4;

/// How to interpret the listing's timestamp column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampLayout {
    format: String,
    tokens: usize,
}

impl TimestampLayout {
    /// Build a layout from a chrono format string.
    ///
    /// The token count is measured on a rendered reference time, so
    /// composite specifiers such as `%c` or `%r` count as what they expand
    /// to. Returns `None` for an invalid format, one that needs a time zone,
    /// or one that renders to no tokens.
    pub fn new(format: impl Into<String>) -> Option<Self> {
        let format = format.into();
        let tokens = rendered_tokens(&format)?;
        (tokens > 0).then_some(Self { format, tokens })
    }

    /// The chrono format string.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Number of whitespace-separated tokens a timestamp occupies.
    pub fn tokens(&self) -> usize {
        self.tokens
    }

    /// Parse reassembled timestamp tokens as local time into Unix seconds.
    pub fn parse(&self, text: &str) -> Result<i64, RecordError> {
        let naive = NaiveDateTime::parse_from_str(text, &self.format).map_err(|e| {
            RecordError::malformed("listing", format!("timestamp {text:?} does not match {:?}: {e}", self.format))
        })?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| RecordError::malformed("listing", format!("nonexistent local time {text:?}")))
    }
}

impl Default for TimestampLayout {
    fn default() -> Self {
        Self {
            format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            tokens: DEFAULT_TIMESTAMP_TOKENS,
        }
    }
}

/// Whitespace-separated tokens of `format` applied to a fixed local time.
fn rendered_tokens(format: &str) -> Option<usize> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    let reference = NaiveDate::from_ymd_opt(2025, 1, 6)?.and_hms_opt(9, 12, 1)?;
    let mut rendered = String::new();
    // Offset and zone specifiers fail on a naive time.
    write!(rendered, "{}", reference.format_with_items(items.iter())).ok()?;
    Some(rendered.split_whitespace().count())
}

/// Collector running the external listing utility.
#[derive(Debug, Clone)]
pub struct ListingCollector {
    runner: ToolRunner,
    spec: ToolSpec,
    layout: TimestampLayout,
    age_filter: AgeFilter,
    proc_root: PathBuf,
}

impl ListingCollector {
    /// Create a collector.
    ///
    /// `proc_root` is only used to attach full command lines for display.
    pub fn new(
        runner: ToolRunner,
        spec: ToolSpec,
        layout: TimestampLayout,
        age_filter: AgeFilter,
        proc_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            spec,
            layout,
            age_filter,
            proc_root: proc_root.into(),
        }
    }

    /// Default `ps` invocation with the given filter.
    pub fn ps(runner: ToolRunner, age_filter: AgeFilter, proc_root: impl Into<PathBuf>) -> Self {
        let spec = ToolSpec::new(
            DEFAULT_LISTING_COMMAND,
            DEFAULT_LISTING_ARGS.iter().map(|s| s.to_string()).collect(),
        );
        Self::new(runner, spec, TimestampLayout::default(), age_filter, proc_root)
    }

    /// Run the utility and populate `store`.
    ///
    /// Spawn failures, timeouts and non-zero exits are fatal. Individual
    /// lines that do not parse are dropped.
    #[instrument(skip(self, store), fields(cmd = %self.spec.command))]
    pub fn collect(&self, store: &ProcessStore) -> Result<CollectionStats, ScanError> {
        let command = self.spec.command.as_str();
        let output = self
            .runner
            .run(&self.spec)
            .map_err(|e| ScanError::tool(command, e.to_string()))?;

        if output.timed_out {
            return Err(ScanError::ExternalToolFailure {
                command: command.to_string(),
                reason: format!("no exit within {:?}", output.duration),
                timed_out: true,
            });
        }
        if !output.success() {
            let stderr = output.stderr_str();
            return Err(ScanError::tool(
                command,
                format!("exit status {:?}: {}", output.exit_code, stderr.trim()),
            ));
        }
        if output.truncated {
            return Err(ScanError::tool(command, "output exceeded size limit"));
        }

        let stats = self.ingest(&output.stdout_str(), store);
        Ok(stats)
    }

    /// Parse captured listing output into `store`.
    pub fn ingest(&self, output: &str, store: &ProcessStore) -> CollectionStats {
        let mut stats = CollectionStats::default();
        let mut malformed = 0usize;

        // First line is the column header.
        for (line_num, line) in output.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let outcome = parse_listing_line(line, &self.layout, &self.age_filter)
                .map(|mut record| {
                    record.cmdline = read_cmdline(&self.proc_root, record.pid);
                    record
                });
            stats.record(&outcome);
            match outcome {
                Ok(record) => {
                    store.insert(record);
                }
                Err(e) => {
                    if !e.is_filtered() {
                        malformed += 1;
                    }
                    debug!(line = line_num + 1, error = %e, "listing line dropped");
                }
            }
        }

        if malformed > 0 && malformed == stats.candidates {
            warn!(
                lines = malformed,
                layout = self.layout.format(),
                "no listing line parsed; the timestamp layout may not match the tool's output"
            );
        }

        debug!(
            candidates = stats.candidates,
            collected = stats.collected,
            too_young = stats.too_young,
            skipped = stats.skipped,
            "listing collection complete"
        );
        stats
    }
}

/// Parse one data line of listing output.
///
/// The `cmdline` of the returned record is empty; callers attach it.
pub fn parse_listing_line(
    line: &str,
    layout: &TimestampLayout,
    age_filter: &AgeFilter,
) -> Result<ProcessRecord, RecordError> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    let name_idx = LEADING_COLUMNS + layout.tokens();
    if fields.len() <= name_idx {
        return Err(RecordError::malformed(
            "listing",
            format!("expected at least {} fields, got {}", name_idx + 1, fields.len()),
        ));
    }

    let pid: ProcessId = fields[0]
        .parse()
        .map_err(|_| RecordError::malformed("listing", format!("invalid PID {:?}", fields[0])))?;
    let ppid: u32 = fields[1]
        .parse()
        .map_err(|_| RecordError::malformed("listing", format!("invalid PPID {:?}", fields[1])))?;
    let uid: u32 = fields[2]
        .parse()
        .map_err(|_| RecordError::malformed("listing", format!("invalid UID {:?}", fields[2])))?;
    let state = ProcessState::from_token(fields[3]).unwrap_or(ProcessState::Unknown);

    let start_time = layout.parse(&fields[LEADING_COLUMNS..name_idx].join(" "))?;
    age_filter.check(start_time)?;

    Ok(ProcessRecord {
        pid,
        ppid,
        name: fields[name_idx..].join(" "),
        uid,
        state,
        start_time,
        cmdline: String::new(),
        source: RecordSource::Listing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const HEADER: &str = "  PID  PPID   UID STAT                  STARTED COMMAND";

    fn local_epoch(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        let naive = chrono::NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap().timestamp()
    }

    fn far_future_filter() -> AgeFilter {
        AgeFilter::new(Duration::from_secs(60), i64::MAX / 2)
    }

    #[test]
    fn test_parse_line() {
        let line = "    1     0     0 Ss   Mon Jan  6 09:12:01 2025 systemd";
        let rec = parse_listing_line(line, &TimestampLayout::default(), &far_future_filter()).unwrap();

        assert_eq!(rec.pid, ProcessId(1));
        assert_eq!(rec.ppid, 0);
        assert_eq!(rec.uid, 0);
        assert_eq!(rec.state, ProcessState::Sleeping);
        assert_eq!(rec.name, "systemd");
        assert_eq!(rec.start_time, local_epoch(2025, 1, 6, 9, 12, 1));
        assert_eq!(rec.source, RecordSource::Listing);
    }

    #[test]
    fn test_parse_line_two_digit_day_and_spaced_name() {
        let line = "4242  4000  1000 Sl+  Thu Feb 13 22:01:59 2025 Web Content";
        let rec = parse_listing_line(line, &TimestampLayout::default(), &far_future_filter()).unwrap();
        assert_eq!(rec.name, "Web Content");
        assert_eq!(rec.start_time, local_epoch(2025, 2, 13, 22, 1, 59));
    }

    #[test]
    fn test_parse_line_too_few_fields() {
        let err = parse_listing_line("1 0 0 S Mon Jan 6", &TimestampLayout::default(), &far_future_filter())
            .unwrap_err();
        assert!(err.to_string().contains("expected at least 10 fields"), "{err}");
    }

    #[test]
    fn test_parse_line_bad_integers() {
        let layout = TimestampLayout::default();
        let filter = far_future_filter();
        assert!(parse_listing_line("x 0 0 S Mon Jan 6 09:12:01 2025 a", &layout, &filter).is_err());
        assert!(parse_listing_line("1 y 0 S Mon Jan 6 09:12:01 2025 a", &layout, &filter).is_err());
        assert!(parse_listing_line("1 0 z S Mon Jan 6 09:12:01 2025 a", &layout, &filter).is_err());
        assert!(parse_listing_line("0 0 0 S Mon Jan 6 09:12:01 2025 a", &layout, &filter).is_err());
    }

    #[test]
    fn test_parse_line_locale_mismatch() {
        // German locale day/month names do not match the C layout.
        let line = "1 0 0 S Mo Jän 6 09:12:01 2025 systemd";
        let err = parse_listing_line(line, &TimestampLayout::default(), &far_future_filter()).unwrap_err();
        assert!(matches!(err, RecordError::Malformed { .. }), "{err:?}");
    }

    #[test]
    fn test_custom_timestamp_layout() {
        let layout = TimestampLayout::new("%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(layout.tokens(), 2);
        let line = "77 1 0 R 2025-01-06 09:12:01 kworker";
        let rec = parse_listing_line(line, &layout, &far_future_filter()).unwrap();
        assert_eq!(rec.name, "kworker");
        assert_eq!(rec.start_time, local_epoch(2025, 1, 6, 9, 12, 1));
    }

    #[test]
    fn test_empty_layout_rejected() {
        assert!(TimestampLayout::new("   ").is_none());
    }

    #[test]
    fn test_invalid_layout_rejected() {
        assert!(TimestampLayout::new("%Y %").is_none());
    }

    #[test]
    fn test_default_layout_token_count() {
        assert_eq!(TimestampLayout::new(DEFAULT_TIMESTAMP_FORMAT), Some(TimestampLayout::default()));
    }

    #[test]
    fn test_composite_specifier_counts_expanded_tokens() {
        let layout = TimestampLayout::new("%c").unwrap();
        assert_eq!(layout.tokens(), 5);

        let line = "    1     0     0 Ss   Mon Jan  6 09:12:01 2025 systemd";
        let rec = parse_listing_line(line, &layout, &far_future_filter()).unwrap();
        assert_eq!(rec.name, "systemd");
        assert_eq!(rec.start_time, local_epoch(2025, 1, 6, 9, 12, 1));
    }

    #[test]
    fn test_multi_token_custom_layout_with_twelve_hour_clock() {
        let layout = TimestampLayout::new("%d/%m/%Y %r").unwrap();
        assert_eq!(layout.tokens(), 3);

        let line = "88 1 1000 S 06/01/2025 09:12:01 PM backup agent";
        let rec = parse_listing_line(line, &layout, &far_future_filter()).unwrap();
        assert_eq!(rec.name, "backup agent");
        assert_eq!(rec.start_time, local_epoch(2025, 1, 6, 21, 12, 1));
    }

    #[test]
    fn test_parse_line_age_filter_boundary() {
        let start = local_epoch(2025, 1, 6, 9, 12, 1);
        let line = "5 1 0 S Mon Jan 6 09:12:01 2025 cron";
        let layout = TimestampLayout::default();

        let exact = AgeFilter::new(Duration::from_secs(60), start + 60);
        assert!(parse_listing_line(line, &layout, &exact).unwrap_err().is_filtered());

        let older = AgeFilter::new(Duration::from_secs(60), start + 61);
        assert!(parse_listing_line(line, &layout, &older).is_ok());
    }

    fn collector() -> ListingCollector {
        ListingCollector::ps(ToolRunner::with_defaults(), far_future_filter(), "/nonexistent-proc")
    }

    #[test]
    fn test_ingest_skips_header_and_bad_lines() {
        let output = format!(
            "{HEADER}\n\
             1 0 0 Ss Mon Jan 6 09:12:01 2025 systemd\n\
             garbage line\n\
             \n\
             300 1 33 S Mon Jan 6 09:13:00 2025 nginx\n"
        );
        let store = ProcessStore::new();
        let stats = collector().ingest(&output, &store);

        assert_eq!(store.pids(), vec![ProcessId(1), ProcessId(300)]);
        assert_eq!(stats.candidates, 3);
        assert_eq!(stats.skipped, 1);
        // No procfs entry for display; cmdline stays empty.
        assert_eq!(store.get(ProcessId(300)).unwrap().cmdline, "");
    }

    #[test]
    fn test_ingest_header_only() {
        let store = ProcessStore::new();
        let stats = collector().ingest(HEADER, &store);
        assert!(store.is_empty());
        assert_eq!(stats.candidates, 0);
    }

    #[test]
    fn test_ingest_attaches_cmdline_from_procfs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("300")).unwrap();
        std::fs::write(dir.path().join("300/cmdline"), b"nginx: master\0-g\0daemon off;\0").unwrap();

        let collector = ListingCollector::ps(ToolRunner::with_defaults(), far_future_filter(), dir.path());
        let store = ProcessStore::new();
        collector.ingest(
            &format!("{HEADER}\n300 1 33 S Mon Jan 6 09:13:00 2025 nginx\n"),
            &store,
        );
        assert_eq!(
            store.get(ProcessId(300)).unwrap().cmdline,
            "nginx: master -g daemon off;"
        );
    }

    #[test]
    fn test_collect_nonzero_exit_is_fatal() {
        let spec = ToolSpec::new("sh", vec!["-c".into(), "echo boom >&2; exit 3".into()]);
        let collector = ListingCollector::new(
            ToolRunner::with_defaults(),
            spec,
            TimestampLayout::default(),
            far_future_filter(),
            "/proc",
        );
        let err = collector.collect(&ProcessStore::new()).unwrap_err();
        assert!(matches!(err, ScanError::ExternalToolFailure { timed_out: false, .. }));
        assert!(err.to_string().contains("boom"), "{err}");
    }

    #[test]
    fn test_collect_missing_tool_is_fatal() {
        let spec = ToolSpec::new("/nonexistent/bin/ps", vec![]);
        let collector = ListingCollector::new(
            ToolRunner::with_defaults(),
            spec,
            TimestampLayout::default(),
            far_future_filter(),
            "/proc",
        );
        assert!(matches!(
            collector.collect(&ProcessStore::new()),
            Err(ScanError::ExternalToolFailure { .. })
        ));
    }

    #[test]
    fn test_collect_timeout_is_fatal() {
        let spec = ToolSpec::new("sleep", vec!["10".into()]).with_timeout(Duration::from_millis(100));
        let collector = ListingCollector::new(
            ToolRunner::with_defaults(),
            spec,
            TimestampLayout::default(),
            far_future_filter(),
            "/proc",
        );
        let err = collector.collect(&ProcessStore::new()).unwrap_err();
        assert!(matches!(err, ScanError::ExternalToolFailure { timed_out: true, .. }), "{err:?}");
    }

    #[test]
    fn test_collect_scripted_listing() {
        let script = format!("printf '%s\\n' '{HEADER}' '9 1 0 S Mon Jan 6 09:12:01 2025 agetty'");
        let spec = ToolSpec::new("sh", vec!["-c".into(), script]);
        let collector = ListingCollector::new(
            ToolRunner::with_defaults(),
            spec,
            TimestampLayout::default(),
            far_future_filter(),
            "/nonexistent-proc",
        );
        let store = ProcessStore::new();
        let stats = collector.collect(&store).unwrap();
        assert_eq!(stats.collected, 1);
        assert_eq!(store.get(ProcessId(9)).unwrap().name, "agetty");
    }
}
