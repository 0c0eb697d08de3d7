//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::SimulationBlueprint;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    sensor_id: String,
    laser_count: usize,
    measurements_per_revolution: u32,
    windows_per_revolution: usize,
    primitive_count: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            let sensor = blueprint.resolved_sensor_config();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    sensor_id: sensor.sensor_id.clone(),
                    laser_count: sensor.effective_laser_count(),
                    measurements_per_revolution: sensor.measurements_per_revolution,
                    windows_per_revolution: sensor.windows_per_revolution(),
                    primitive_count: blueprint.scene.primitives.len(),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Legal but suspicious settings
fn collect_warnings(blueprint: &SimulationBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let sensor = blueprint.resolved_sensor_config();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - revolutions will only be counted".to_string());
    }

    if blueprint.scene.primitives.is_empty() {
        warnings.push("Scene is empty - every point will be a sentinel".to_string());
    }

    if sensor.slots_per_window() == 0 {
        warnings.push(format!(
            "window_angle_deg {} is narrower than one slot ({:.4} deg) - nothing will be captured",
            sensor.window_angle_deg,
            sensor.slot_angle_deg()
        ));
    }

    let degrees_per_tick =
        sensor.rotation_frequency_hz as f64 * 360.0 / blueprint.run.tick_hz.max(f64::EPSILON);
    let windows_per_tick = (degrees_per_tick / sensor.window_angle_deg as f64).ceil() as usize;
    let in_flight = windows_per_tick * (blueprint.run.readback_latency_frames as usize + 1);
    if in_flight > sensor.max_in_flight_readbacks {
        warnings.push(format!(
            "about {} readbacks in flight exceed max_in_flight_readbacks {} - windows will be skipped",
            in_flight, sensor.max_in_flight_readbacks
        ));
    }

    if blueprint.run.duration_s * (sensor.rotation_frequency_hz as f64) < 1.0 {
        warnings.push("Run is shorter than one revolution - nothing will be published".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Sensor: {}", summary.sensor_id);
            println!("  Lasers: {}", summary.laser_count);
            println!(
                "  Measurements/rev: {} ({} windows)",
                summary.measurements_per_revolution, summary.windows_per_revolution
            );
            println!("  Scene primitives: {}", summary.primitive_count);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
