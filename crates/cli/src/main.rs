//! # lidar-sim
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading and validation
//! - A simulated run of the scan pipeline with sink fan-out
//! - Single-shot PCD export

mod cli;
mod commands;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_export, run_info, run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(observability_config(&cli))?;

    info!(version = env!("CARGO_PKG_VERSION"), "lidar-sim starting");

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Export(args) => run_export(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Map global CLI flags onto the observability settings
fn observability_config(cli: &Cli) -> observability::ObservabilityConfig {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: cli.metrics_port.filter(|&port| port != 0),
        default_log_level: default_log_level.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_maps_to_level() {
        let cli = Cli::parse_from(["lidar-sim", "-vv", "validate"]);
        assert_eq!(observability_config(&cli).default_log_level, "trace");

        let cli = Cli::parse_from(["lidar-sim", "-q", "validate"]);
        assert_eq!(observability_config(&cli).default_log_level, "warn");
    }

    #[test]
    fn test_metrics_port_zero_disables_exporter() {
        let cli = Cli::parse_from(["lidar-sim", "--metrics-port", "0", "info"]);
        assert_eq!(observability_config(&cli).metrics_port, None);

        let cli = Cli::parse_from(["lidar-sim", "--metrics-port", "9100", "info"]);
        assert_eq!(observability_config(&cli).metrics_port, Some(9100));
    }
}
