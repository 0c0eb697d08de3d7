//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if let Some(duration) = args.duration {
        info!(duration, "Overriding run duration from CLI");
        blueprint.run.duration_s = duration;
    }
    if let Some(tick_hz) = args.tick_hz {
        info!(tick_hz, "Overriding tick rate from CLI");
        blueprint.run.tick_hz = tick_hz;
    }
    if args.duration.is_some() || args.tick_hz.is_some() {
        config_loader::ConfigLoader::validate(&blueprint)
            .context("CLI overrides produced an invalid configuration")?;
    }

    let sensor = blueprint.resolved_sensor_config();
    info!(
        sensor = %sensor.sensor_id,
        lasers = sensor.effective_laser_count(),
        mpr = sensor.measurements_per_revolution,
        rotation_hz = sensor.rotation_frequency_hz,
        primitives = blueprint.scene.primitives.len(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
    });

    let stop = Arc::new(AtomicBool::new(false));
    let run = pipeline.run(Arc::clone(&stop));
    tokio::pin!(run);

    info!("Starting pipeline...");

    let result = tokio::select! {
        result = &mut run => result,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping pipeline...");
            stop.store(true, Ordering::Relaxed);
            run.await
        }
    };

    let stats = result.context("Pipeline execution failed")?;
    info!(
        revolutions = stats.scan.revolutions_published,
        ticks = stats.ticks,
        duration_secs = stats.duration.as_secs_f64(),
        realtime_factor = format!("{:.2}", stats.realtime_factor()),
        "Pipeline completed"
    );
    stats.print_summary();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::SimulationBlueprint) {
    let sensor = blueprint.resolved_sensor_config();

    println!("\n=== Configuration Summary ===\n");
    println!("Sensor: {}", sensor.sensor_id);
    if let Some(preset) = blueprint.preset {
        println!("  Preset: {:?}", preset);
    }
    println!(
        "  Lasers: {}, {} measurements/rev at {} Hz",
        sensor.effective_laser_count(),
        sensor.measurements_per_revolution,
        sensor.rotation_frequency_hz
    );
    println!(
        "  Range: {} - {} m, output frame {:?}",
        sensor.min_distance_m,
        sensor.max_distance_m,
        sensor.output_frame()
    );
    println!(
        "  Window: {} deg ({} slots, {} windows/rev)",
        sensor.window_angle_deg,
        sensor.slots_per_window(),
        sensor.windows_per_revolution()
    );

    println!("\nScene: {} primitives", blueprint.scene.primitives.len());
    println!(
        "Run: {} s at {} Hz, readback latency {} frames",
        blueprint.run.duration_s, blueprint.run.tick_hz, blueprint.run.readback_latency_frames
    );

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
