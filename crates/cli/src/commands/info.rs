//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{PrimitiveConfig, SimulationBlueprint};
use scan_engine::{LayoutMode, ScanGeometry};

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    preset: Option<String>,
    sensor: SensorInfo,
    run: RunInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    scene: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SensorInfo {
    id: String,
    layout: String,
    laser_count: usize,
    vertical_bounds_deg: (f32, f32),
    range_m: (f32, f32),
    rotation_frequency_hz: f32,
    measurements_per_revolution: u32,
    slots_per_window: usize,
    windows_per_revolution: usize,
    output_frame: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    elevations_deg: Vec<f32>,
}

#[derive(Serialize)]
struct RunInfo {
    tick_hz: f64,
    duration_s: f64,
    readback_latency_frames: u64,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn describe_primitive(primitive: &PrimitiveConfig) -> String {
    match primitive {
        PrimitiveConfig::Plane {
            normal,
            offset,
            reflectivity,
        } => format!("plane n={normal:?} d={offset} r={reflectivity}"),
        PrimitiveConfig::Sphere {
            center,
            radius,
            reflectivity,
        } => format!("sphere c={center:?} radius={radius} r={reflectivity}"),
        PrimitiveConfig::Box {
            min,
            max,
            reflectivity,
        } => format!("box {min:?}..{max:?} r={reflectivity}"),
    }
}

fn build_config_info(blueprint: &SimulationBlueprint, args: &InfoArgs) -> ConfigInfo {
    let config = blueprint.resolved_sensor_config();
    let geometry = ScanGeometry::from_config(&config);

    let layout = match geometry.mode {
        LayoutMode::Uniform => "uniform",
        LayoutMode::Explicit => "explicit",
    };

    let sensor = SensorInfo {
        id: config.sensor_id.clone(),
        layout: layout.to_string(),
        laser_count: geometry.laser_count,
        vertical_bounds_deg: geometry.vertical_bounds_deg,
        range_m: (config.min_distance_m, config.max_distance_m),
        rotation_frequency_hz: config.rotation_frequency_hz,
        measurements_per_revolution: config.measurements_per_revolution,
        slots_per_window: geometry.slots_per_window,
        windows_per_revolution: config.windows_per_revolution(),
        output_frame: format!("{:?}", config.output_frame()),
        elevations_deg: if args.lasers {
            geometry.elevations_deg.clone()
        } else {
            Vec::new()
        },
    };

    let scene = if args.scene {
        blueprint
            .scene
            .primitives
            .iter()
            .map(describe_primitive)
            .collect()
    } else {
        Vec::new()
    };

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        preset: blueprint.preset.map(|p| format!("{:?}", p)),
        sensor,
        run: RunInfo {
            tick_hz: blueprint.run.tick_hz,
            duration_s: blueprint.run.duration_s,
            readback_latency_frames: blueprint.run.readback_latency_frames,
        },
        scene,
        sinks,
    }
}

fn print_config_info(info: &ConfigInfo) {
    let sensor = &info.sensor;

    println!("=== lidar-sim configuration ===\n");

    println!("Sensor {}", sensor.id);
    println!("   ├─ Version: {}", info.version);
    if let Some(ref preset) = info.preset {
        println!("   ├─ Preset: {}", preset);
    }
    println!("   ├─ Layout: {} ({} lasers)", sensor.layout, sensor.laser_count);
    println!(
        "   ├─ Vertical bounds: {:.2}° .. {:.2}°",
        sensor.vertical_bounds_deg.0, sensor.vertical_bounds_deg.1
    );
    println!("   ├─ Range: {} - {} m", sensor.range_m.0, sensor.range_m.1);
    println!(
        "   ├─ Rotation: {} Hz, {} measurements/rev",
        sensor.rotation_frequency_hz, sensor.measurements_per_revolution
    );
    println!(
        "   ├─ Windows: {} slots each, {} per revolution",
        sensor.slots_per_window, sensor.windows_per_revolution
    );
    println!("   └─ Output frame: {}", sensor.output_frame);

    if !sensor.elevations_deg.is_empty() {
        println!("\nLasers");
        for (i, elevation) in sensor.elevations_deg.iter().enumerate() {
            let prefix = if i + 1 == sensor.elevations_deg.len() {
                "└─"
            } else {
                "├─"
            };
            println!("   {} #{:02}: {:+.3}°", prefix, i, elevation);
        }
    }

    println!("\nRun");
    println!("   ├─ Tick rate: {} Hz", info.run.tick_hz);
    println!("   ├─ Duration: {} s", info.run.duration_s);
    println!(
        "   └─ Readback latency: {} frames",
        info.run.readback_latency_frames
    );

    if !info.scene.is_empty() {
        println!("\nScene ({})", info.scene.len());
        for (i, primitive) in info.scene.iter().enumerate() {
            let prefix = if i + 1 == info.scene.len() { "└─" } else { "├─" };
            println!("   {} {}", prefix, primitive);
        }
    }

    if !info.sinks.is_empty() {
        println!("\nSinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let prefix = if i + 1 == info.sinks.len() { "└─" } else { "├─" };
            println!(
                "   {} {} ({}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
}
