//! Runtime settings and probe file loading

use crate::cli::Cli;
use crate::errors::{MonitorError, Result};
use crate::executor::{LATENCY_THRESHOLD, REQUEST_TIMEOUT};
use crate::probe::ProbeDefinition;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Probe file used when none is given on the command line
pub const DEFAULT_PROBES_PATH: &str = "./monitors.yaml";

/// Time between the starts of two consecutive rounds
pub const ROUND_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path to the YAML probe file
    pub probes_path: PathBuf,

    /// Time between the starts of two rounds
    pub round_interval: Duration,

    /// Network timeout for a single attempt
    pub request_timeout: Duration,

    /// Responses at or above this time to first byte count as failures
    pub latency_threshold: Duration,

    /// Maximum attempts in flight within a round
    pub max_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probes_path: PathBuf::from(DEFAULT_PROBES_PATH),
            round_interval: ROUND_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
            latency_threshold: LATENCY_THRESHOLD,
            max_concurrency: 16,
        }
    }
}

impl Config {
    /// Build the configuration from parsed arguments.
    ///
    /// clap has already folded in `MONITOR_CONFIG` and `MAX_CONCURRENCY`.
    /// Timing values are fixed; only the probe file and fan-out width can be tuned.
    pub fn from_cli(cli: Cli) -> Self {
        let mut config = Config::default();

        if let Some(path) = cli.config {
            config.probes_path = path;
        }

        if let Some(max_concurrency) = cli.max_concurrency {
            config.max_concurrency = max_concurrency;
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.round_interval.is_zero() {
            return Err("round_interval must be greater than 0".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than 0".to_string());
        }

        if self.latency_threshold.is_zero() {
            return Err("latency_threshold must be greater than 0".to_string());
        }

        if self.latency_threshold >= self.request_timeout {
            return Err("latency_threshold must be shorter than request_timeout".to_string());
        }

        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Read and parse the probe file.
///
/// The file is a YAML sequence of `{name, url, method?, headers?, body?}`.
pub fn load_probe_definitions(path: &Path) -> Result<Vec<ProbeDefinition>> {
    info!("Loading probes from {}", path.display());

    let content = std::fs::read_to_string(path)?;
    parse_probe_definitions(&content)
}

pub fn parse_probe_definitions(content: &str) -> Result<Vec<ProbeDefinition>> {
    let definitions: Vec<ProbeDefinition> = serde_yaml::from_str(content)?;

    if definitions.is_empty() {
        return Err(MonitorError::Config("probe file declares no probes".to_string()));
    }

    Ok(definitions)
}
