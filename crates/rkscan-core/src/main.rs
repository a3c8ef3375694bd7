//! rkscan - rootkit indicator scanner
//!
//! The main entry point, handling:
//! - Kernel module status check
//! - Library preload hook check
//! - Hidden process reconciliation (procfs vs `ps`)

use clap::{Args, Parser, Subcommand};
use rkscan_common::{ErrorCategory, OutputFormat};
use rkscan_core::config::{load_config, ConfigError, ConfigOptions, ScanConfig};
use rkscan_core::exit_codes::ExitCode;
use rkscan_core::kernel::{read_kernel_status, KernelStatus};
use rkscan_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use rkscan_core::preload::{check_preload, PreloadReport};
use rkscan_core::report::{CheckResult, ScanReport, REPORT_SCHEMA_VERSION};
use rkscan_core::scan::{ProcessCheck, ProcessCheckOutcome};
use std::path::PathBuf;
use tracing::{error, info, info_span, warn};

/// rkscan - detect hidden processes, preload hooks and kernel module alerts
#[derive(Parser)]
#[command(name = "rkscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,

    #[command(flatten)]
    process: ProcessArgs,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "RKSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Report format
    #[arg(long, short = 'f', global = true, default_value = "human")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Prefix human log lines with a timestamp
    #[arg(long, global = true)]
    log_timestamps: bool,

    /// Do not print the banner in human output
    #[arg(long, global = true)]
    no_banner: bool,
}

/// Hidden-process check overrides
#[derive(Args, Debug, Default)]
struct ProcessArgs {
    /// Ignore processes younger than this many seconds
    #[arg(long, global = true, env = "RKSCAN_MIN_AGE")]
    min_age: Option<u64>,

    /// Procfs mount point to enumerate
    #[arg(long, global = true, env = "RKSCAN_PROC_ROOT")]
    proc_root: Option<PathBuf>,

    /// Kill the listing tool after this many milliseconds
    #[arg(long, global = true)]
    ps_timeout_ms: Option<u64>,

    /// chrono layout of the listing's start-time column
    #[arg(long, global = true)]
    timestamp_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every check: kernel module, preload hooks, hidden processes (default)
    All,

    /// Compare procfs against the process listing tool
    Processes,

    /// Look for library preload hooks
    Preload,

    /// Read the kernel module status file
    Kernel,

    /// Print version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = (cli.global.verbose > 0 || cli.global.quiet)
        .then(|| LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet));
    let log_config = LogConfig::from_env(cli_level, cli.global.log_format);
    init_logging(&log_config.with_timestamps(cli.global.log_timestamps));

    let plan = match cli.command.unwrap_or(Commands::All) {
        Commands::Version => {
            print_version(&cli.global);
            std::process::exit(ExitCode::Clean.as_i32());
        }
        Commands::All => CheckPlan {
            kernel: true,
            kernel_advisory: true,
            preload: true,
            processes: true,
        },
        Commands::Processes => CheckPlan {
            processes: true,
            ..CheckPlan::default()
        },
        Commands::Preload => CheckPlan {
            preload: true,
            ..CheckPlan::default()
        },
        Commands::Kernel => CheckPlan {
            kernel: true,
            ..CheckPlan::default()
        },
    };

    let run_id = generate_run_id();
    let _span = info_span!("run", run_id = %run_id).entered();

    let options = ConfigOptions {
        config_path: cli.global.config.clone(),
        min_age_secs: cli.process.min_age,
        proc_root: cli.process.proc_root.clone(),
        listing_timeout_ms: cli.process.ps_timeout_ms,
        timestamp_format: cli.process.timestamp_format.clone(),
    };
    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rkscan: {} error: {}", ErrorCategory::Config, e);
            std::process::exit(config_exit_code(&e).as_i32());
        }
    };

    let mut report = ScanReport::new(run_id);
    if plan.kernel {
        report.kernel = Some(run_kernel(&config, plan.kernel_advisory));
    }
    if plan.preload {
        report.preload = Some(run_preload(&config));
    }
    if plan.processes {
        report.processes = Some(run_processes(&config));
    }

    let exit_code = emit(&cli.global, &report);
    info!(exit_code = %exit_code, "run finished");
    std::process::exit(exit_code.as_i32());
}

/// Which checks a subcommand runs, in report order.
#[derive(Debug, Default)]
struct CheckPlan {
    kernel: bool,
    /// `all` keeps going when the kernel module is not loaded.
    kernel_advisory: bool,
    preload: bool,
    processes: bool,
}

fn config_exit_code(err: &ConfigError) -> ExitCode {
    match err {
        ConfigError::Io { .. } => ExitCode::IoError,
        ConfigError::NotFound { .. } | ConfigError::Parse { .. } | ConfigError::Invalid(_) => {
            ExitCode::ArgsError
        }
    }
}

// ============================================================================
// Checks
// ============================================================================

fn run_kernel(config: &ScanConfig, advisory: bool) -> CheckResult<KernelStatus> {
    let result = read_kernel_status(&config.kernel.status_path);
    if let Err(e) = &result {
        if advisory {
            warn!(error = %e, "kernel module status unavailable");
        } else {
            error!(error = %e, "kernel module check failed");
        }
    }
    CheckResult::from_result(result, advisory)
}

fn run_preload(config: &ScanConfig) -> CheckResult<PreloadReport> {
    let env_value = std::env::var("LD_PRELOAD").ok();
    CheckResult::Completed {
        result: check_preload(&config.preload, env_value.as_deref()),
    }
}

fn run_processes(config: &ScanConfig) -> CheckResult<ProcessCheckOutcome> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        warn!("not running as root; processes with unreadable records will be skipped");
    }

    let check = match ProcessCheck::from_config(config) {
        Ok(check) => check,
        Err(e) => {
            error!(error = %e, "invalid process check configuration");
            return CheckResult::Failed {
                error: e.to_string(),
                category: ErrorCategory::Config,
                remediation: "Fix the [listing] section of the config file.".to_string(),
                advisory: false,
                exit_code: ExitCode::ArgsError,
            };
        }
    };

    let result = check.run();
    if let Err(e) = &result {
        error!(error = %e, exit_code = %e.exit_code(), "hidden process check failed");
    }
    CheckResult::from_result(result, false)
}

// ============================================================================
// Output
// ============================================================================

fn emit(global: &GlobalOpts, report: &ScanReport) -> ExitCode {
    let exit_code = report.exit_code();
    match global.format {
        OutputFormat::Json => match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("rkscan: {} error: failed to serialize report: {}", ErrorCategory::Io, e);
                return ExitCode::IoError;
            }
        },
        OutputFormat::Human => print!("{}", report.render_human(!global.no_banner)),
    }
    exit_code
}

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json => {
            let version_info = serde_json::json!({
                "rkscan_version": env!("CARGO_PKG_VERSION"),
                "report_schema_version": REPORT_SCHEMA_VERSION,
                "rust_version": env!("CARGO_PKG_RUST_VERSION"),
            });
            println!("{version_info:#}");
        }
        OutputFormat::Human => {
            println!("rkscan {}", env!("CARGO_PKG_VERSION"));
            println!("report schema version: {}", REPORT_SCHEMA_VERSION);
        }
    }
}
