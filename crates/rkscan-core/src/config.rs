//! Scan configuration loading and validation.
//!
//! Resolution order (highest to lowest priority):
//! 1. Explicit CLI flags
//! 2. Environment variables (`RKSCAN_CONFIG`, `RKSCAN_MIN_AGE`,
//!    `RKSCAN_PROC_ROOT`), bound through clap so they arrive as flags
//! 3. TOML config file
//! 4. Built-in defaults
//!
//! Every section and key is optional; anything missing takes its default.

use crate::collect::{
    TimestampLayout, ToolConfig, ToolSpec, DEFAULT_LISTING_ARGS, DEFAULT_LISTING_COMMAND,
    DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_MS, DEFAULT_TIMESTAMP_FORMAT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default minimum process age before a process is compared.
pub const DEFAULT_MIN_AGE_SECS: u64 = 60;

/// Default procfs mount point.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Default kernel module status file.
pub const DEFAULT_KERNEL_STATUS_PATH: &str = "/proc/rsc_lkm";

/// Default global preload list.
pub const DEFAULT_PRELOAD_FILE: &str = "/etc/ld.so.preload";

/// Default dynamic linker config directory.
pub const DEFAULT_LD_CONF_DIR: &str = "/etc/ld.so.conf.d";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Full scanner configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub scan: ScanSection,
    pub listing: ListingSection,
    pub kernel: KernelSection,
    pub preload: PreloadSection,
}

/// `[scan]`: hidden-process check parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    /// Processes younger than this are not compared.
    pub min_age_secs: u64,
    pub proc_root: PathBuf,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            min_age_secs: DEFAULT_MIN_AGE_SECS,
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
        }
    }
}

/// `[listing]`: the external process listing tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSection {
    pub command: String,
    pub args: Vec<String>,
    /// chrono layout of the start-time column.
    pub timestamp_format: String,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl Default for ListingSection {
    fn default() -> Self {
        Self {
            command: DEFAULT_LISTING_COMMAND.to_string(),
            args: DEFAULT_LISTING_ARGS.iter().map(|s| s.to_string()).collect(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// `[kernel]`: kernel module status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSection {
    pub status_path: PathBuf,
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            status_path: PathBuf::from(DEFAULT_KERNEL_STATUS_PATH),
        }
    }
}

/// `[preload]`: dynamic linker preload locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadSection {
    pub preload_file: PathBuf,
    pub conf_dir: PathBuf,
}

impl Default for PreloadSection {
    fn default() -> Self {
        Self {
            preload_file: PathBuf::from(DEFAULT_PRELOAD_FILE),
            conf_dir: PathBuf::from(DEFAULT_LD_CONF_DIR),
        }
    }
}

/// Overrides collected from CLI flags and their bound env vars.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Explicit config file; must exist when given.
    pub config_path: Option<PathBuf>,
    pub min_age_secs: Option<u64>,
    pub proc_root: Option<PathBuf>,
    pub listing_timeout_ms: Option<u64>,
    pub timestamp_format: Option<String>,
}

impl ScanConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Layer CLI/env overrides on top of this config.
    pub fn apply(&mut self, options: &ConfigOptions) {
        if let Some(secs) = options.min_age_secs {
            self.scan.min_age_secs = secs;
        }
        if let Some(root) = &options.proc_root {
            self.scan.proc_root = root.clone();
        }
        if let Some(ms) = options.listing_timeout_ms {
            self.listing.timeout_ms = ms;
        }
        if let Some(format) = &options.timestamp_format {
            self.listing.timestamp_format = format.clone();
        }
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listing.command.trim().is_empty() {
            return Err(ConfigError::Invalid("listing.command is empty".into()));
        }
        if self.listing.timeout_ms == 0 {
            return Err(ConfigError::Invalid("listing.timeout_ms must be positive".into()));
        }
        if self.listing.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "listing.max_output_bytes must be positive".into(),
            ));
        }
        self.timestamp_layout().map(|_| ())
    }

    pub fn min_age(&self) -> Duration {
        Duration::from_secs(self.scan.min_age_secs)
    }

    /// Timestamp layout for the listing collector.
    pub fn timestamp_layout(&self) -> Result<TimestampLayout, ConfigError> {
        TimestampLayout::new(self.listing.timestamp_format.as_str())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "listing.timestamp_format {:?} is not a usable date layout",
                    self.listing.timestamp_format
                ))
            })
    }

    /// Tool runner limits for the listing command.
    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            default_timeout: Duration::from_millis(self.listing.timeout_ms),
            max_output_bytes: self.listing.max_output_bytes,
        }
    }

    /// Invocation of the listing command.
    pub fn listing_spec(&self) -> ToolSpec {
        ToolSpec::new(self.listing.command.clone(), self.listing.args.clone())
    }
}

/// Load configuration with the standard resolution order and validate it.
pub fn load_config(options: &ConfigOptions) -> Result<ScanConfig, ConfigError> {
    let mut config = match &options.config_path {
        Some(path) => ScanConfig::from_file(path)?,
        None => ScanConfig::default(),
    };
    config.apply(options);
    config.validate()?;
    Ok(config)
}
