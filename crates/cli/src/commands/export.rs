//! `export` command implementation.

use anyhow::{Context, Result};
use contracts::pcd::PcdEncoding;
use scan_engine::LidarSensor;
use sim_device::{Scene, SimDevice};
use tracing::info;

use crate::cli::ExportArgs;

/// Execute the `export` command
///
/// The capture blocks on every transfer and decode, so it runs on a
/// blocking thread.
pub async fn run_export(args: &ExportArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let args = args.clone();
    let output = args.output.clone();
    let written = tokio::task::spawn_blocking(move || -> Result<usize> {
        let sensor_pose = blueprint.motion.pose_at(args.at);
        let sim_time = blueprint.run.start_time_s + args.at;
        let encoding = if args.ascii {
            PcdEncoding::Ascii
        } else {
            PcdEncoding::Binary
        };

        let mut device = SimDevice::new(Scene::from_config(&blueprint.scene));
        let mut sensor = LidarSensor::<SimDevice>::new(blueprint.resolved_sensor_config())
            .context("Failed to create lidar sensor")?;

        let result = sensor.try_export_pcd(
            &mut device,
            &args.output,
            &sensor_pose,
            sim_time,
            args.frame.map(Into::into),
            encoding,
        );
        sensor.shutdown(&mut device);
        result.with_context(|| format!("Failed to export to {}", args.output.display()))
    })
    .await
    .context("Export task panicked")??;

    println!("Wrote {} points to {}", written, output.display());
    Ok(())
}
