//! Command line arguments

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "availability_monitor",
    version,
    about = "Periodically probes HTTP endpoints and reports availability per domain"
)]
pub struct Cli {
    /// YAML file listing the probes (defaults to ./monitors.yaml)
    #[arg(value_name = "CONFIG", env = "MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum number of probe requests in flight at once
    #[arg(long, value_name = "N", env = "MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_config_path() {
        let cli = Cli::try_parse_from(["availability_monitor", "probes.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("probes.yaml")));
    }

    #[test]
    fn test_max_concurrency_flag() {
        let cli = Cli::try_parse_from(["availability_monitor", "--max-concurrency", "4"]).unwrap();
        assert_eq!(cli.max_concurrency, Some(4));
    }

    #[test]
    fn test_rejects_extra_positionals() {
        assert!(Cli::try_parse_from(["availability_monitor", "a.yaml", "b.yaml"]).is_err());
    }
}
