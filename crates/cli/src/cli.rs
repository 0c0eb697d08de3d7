//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// lidar-sim - simulated spinning LiDAR driven by an analytic scene
#[derive(Parser, Debug)]
#[command(
    name = "lidar-sim",
    author,
    version,
    about = "Simulated rotating LiDAR scan pipeline",
    long_about = "Simulates a rotating multi-beam LiDAR.\n\n\
                  Loads a sensor, scene and motion description, ticks the scan \n\
                  pipeline against a CPU ray-cast device and dispatches every \n\
                  finished revolution to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LIDAR_SIM_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "LIDAR_SIM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Prometheus exporter port (0 or unset = disabled)
    #[arg(long, global = true, env = "LIDAR_SIM_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scan pipeline for the configured duration
    Run(RunArgs),

    /// Capture one revolution synchronously and write it as PCD
    Export(ExportArgs),

    /// Validate a configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "LIDAR_SIM_CONFIG")]
    pub config: PathBuf,

    /// Override the simulated duration in seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Override the tick rate in Hz
    #[arg(long)]
    pub tick_hz: Option<f64>,

    /// Wall-clock timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "LIDAR_SIM_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Revolutions buffered between the sensor and the dispatcher
    #[arg(long, default_value = "8", env = "LIDAR_SIM_BUFFER_SIZE")]
    pub buffer_size: usize,
}

/// Arguments for the `export` command
#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "LIDAR_SIM_CONFIG")]
    pub config: PathBuf,

    /// Output PCD file
    #[arg(short, long, default_value = "scan.pcd")]
    pub output: PathBuf,

    /// Simulated seconds after start at which the sensor pose is taken
    #[arg(long, default_value = "0")]
    pub at: f64,

    /// Output frame (defaults to the sensor's configured frame)
    #[arg(long, value_enum)]
    pub frame: Option<FrameArg>,

    /// Write an ASCII DATA section instead of binary
    #[arg(long)]
    pub ascii: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List the vertical angle of every laser
    #[arg(long)]
    pub lasers: bool,

    /// Show scene primitives
    #[arg(long)]
    pub scene: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

/// Frame exported points are expressed in
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FrameArg {
    World,
    Sensor,
}

impl From<FrameArg> for contracts::OutputFrame {
    fn from(frame: FrameArg) -> Self {
        match frame {
            FrameArg::World => contracts::OutputFrame::World,
            FrameArg::Sensor => contracts::OutputFrame::Sensor,
        }
    }
}
