//! Configuration management for PowerMap
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The configuration is read once at start-up
//! and never mutated afterwards.

use crate::error::{PowerMapError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod defaults;

/// Literal token in a source URL that is replaced with the local `YYYYMMDD` date
pub const DATE_PLACEHOLDER: &str = "[yyyyMMdd]";

/// Environment variable that points at an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "POWERMAP_CONFIG";

fn default_encoding() -> String {
    "shift_jis".to_string()
}

fn default_peak_header() -> String {
    "ピーク時供給力".to_string()
}

fn default_usage_header() -> String {
    "DATE,TIME,".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IANA timezone that defines "today", local midnight and row timestamps
    pub timezone: String,

    /// HTTP retrieval behaviour
    pub fetch: FetchConfig,

    /// Adaptive re-poll thresholds
    pub schedule: ScheduleConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Ordered list of upstream demand feeds
    pub sources: Vec<SourceConfig>,
}

/// HTTP retrieval parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Overall deadline spanning every attempt, in seconds
    pub timeout_secs: u64,

    /// Total number of attempts (first try included)
    pub max_attempts: u32,

    /// Wait between attempts, in seconds
    pub retry_delay_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

/// Re-poll schedule thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Consecutive empty fetches before backing off
    pub failure_limit: u32,

    /// Consecutive cycles without a fresh reading before backing off
    pub no_data_limit: u32,

    /// Backed-off re-poll delay in minutes (capped at next local midnight)
    pub backoff_minutes: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level; defaults to `level`
    pub console_level: Option<String>,

    /// Optional file-specific level; defaults to `level`
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to write the rotated log file; console-only when false
    pub file_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// One upstream demand feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display name of the utility
    pub name: String,

    /// CSV URL; may contain `[yyyyMMdd]`
    pub url: String,

    /// Publication interval of the feed in minutes
    pub interval_minutes: u32,

    /// Character encoding label of the response body
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Latitude of the head office
    pub latitude: f64,

    /// Longitude of the head office
    pub longitude: f64,

    /// Leading text of the peak-capacity header row
    #[serde(default = "default_peak_header")]
    pub peak_header: String,

    /// Leading text of the usage table header row (last occurrence is used)
    #[serde(default = "default_usage_header")]
    pub usage_header: String,
}

impl SourceConfig {
    /// Convenience constructor using the default encoding and header markers
    pub fn new(name: &str, url: &str, interval_minutes: u32, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            interval_minutes,
            encoding: default_encoding(),
            latitude,
            longitude,
            peak_header: default_peak_header(),
            usage_header: default_usage_header(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first location that exists
    pub fn load() -> Result<Self> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR)
            && !explicit.trim().is_empty()
        {
            return Self::from_file(explicit.trim());
        }

        let default_paths = ["powermap.yaml", "/etc/powermap/config.yaml"];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            PowerMapError::validation("timezone", format!("Unknown timezone '{}'", self.timezone))
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.tz()?;

        if self.fetch.timeout_secs == 0 {
            return Err(PowerMapError::validation(
                "fetch.timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.fetch.max_attempts == 0 {
            return Err(PowerMapError::validation(
                "fetch.max_attempts",
                "Must be greater than 0",
            ));
        }

        if self.schedule.backoff_minutes == 0 {
            return Err(PowerMapError::validation(
                "schedule.backoff_minutes",
                "Must be greater than 0",
            ));
        }

        if self.sources.is_empty() {
            return Err(PowerMapError::validation(
                "sources",
                "At least one source must be configured",
            ));
        }

        let mut seen = HashSet::new();
        for (idx, source) in self.sources.iter().enumerate() {
            let field = |name: &str| format!("sources[{}].{}", idx, name);

            if source.name.trim().is_empty() {
                return Err(PowerMapError::validation(field("name"), "Cannot be empty"));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(PowerMapError::validation(
                    field("name"),
                    format!("Duplicate source name '{}'", source.name),
                ));
            }

            let probe = source.url.replace(DATE_PLACEHOLDER, "20240101");
            match reqwest::Url::parse(&probe) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => {
                    return Err(PowerMapError::validation(
                        field("url"),
                        format!("Unsupported scheme '{}'", url.scheme()),
                    ));
                }
                Err(e) => {
                    return Err(PowerMapError::validation(
                        field("url"),
                        format!("Invalid URL: {}", e),
                    ));
                }
            }

            if source.interval_minutes == 0 {
                return Err(PowerMapError::validation(
                    field("interval_minutes"),
                    "Must be greater than 0",
                ));
            }

            if encoding_rs::Encoding::for_label(source.encoding.trim().as_bytes()).is_none() {
                return Err(PowerMapError::validation(
                    field("encoding"),
                    format!("Unknown encoding label '{}'", source.encoding),
                ));
            }

            if !(-90.0..=90.0).contains(&source.latitude) {
                return Err(PowerMapError::validation(field("latitude"), "Out of range"));
            }
            if !(-180.0..=180.0).contains(&source.longitude) {
                return Err(PowerMapError::validation(field("longitude"), "Out of range"));
            }

            if source.peak_header.is_empty() || source.usage_header.is_empty() {
                return Err(PowerMapError::validation(
                    field("peak_header/usage_header"),
                    "Header markers cannot be empty",
                ));
            }
        }

        Ok(())
    }
}
