//! Blueprint validation
//!
//! Rules:
//! - sensor field ranges (`validator` derive on `LidarConfig`)
//! - min_distance_m < max_distance_m
//! - explicit vertical angles finite and within (-90, 90)
//! - run tick rate > 0, duration >= 0
//! - scene primitives geometrically sane, reflectivity in [0, 1]
//! - sink names non-empty and unique, file sinks carry a `base_path`
//!
//! Combinations that are legal but capture nothing (a slot wider than the
//! window) pass; the sensor reports them at runtime.

use std::collections::HashSet;

use contracts::pcd::PcdEncoding;
use contracts::{ContractError, LidarConfig, PrimitiveConfig, SimulationBlueprint, SinkType};
use validator::Validate;

/// Validate a blueprint, returning the first error found
pub fn validate(blueprint: &SimulationBlueprint) -> Result<(), ContractError> {
    let sensor = blueprint.resolved_sensor_config();
    validate_sensor_fields(&sensor)?;
    validate_sensor_ranges(&sensor)?;
    validate_vertical_angles(&sensor)?;
    validate_run(blueprint)?;
    validate_scene(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// Field-level range checks
fn validate_sensor_fields(sensor: &LidarConfig) -> Result<(), ContractError> {
    let Err(errors) = sensor.validate() else {
        return Ok(());
    };

    let explicit = !sensor.vertical_angles_deg.is_empty();
    let mut fields: Vec<_> = errors
        .field_errors()
        .into_iter()
        // laser_count is derived from the list in explicit mode
        .filter(|(field, _)| !(explicit && field.as_ref() == "laser_count"))
        .collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    match fields.first() {
        Some((field, field_errors)) => {
            let message = field_errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "invalid value".to_string());
            Err(ContractError::config_validation(
                format!("sensor.{field}"),
                message,
            ))
        }
        None => Ok(()),
    }
}

fn validate_sensor_ranges(sensor: &LidarConfig) -> Result<(), ContractError> {
    if sensor.min_distance_m >= sensor.max_distance_m {
        return Err(ContractError::config_validation(
            "sensor.min_distance_m / sensor.max_distance_m",
            format!(
                "min_distance_m ({}) must be < max_distance_m ({})",
                sensor.min_distance_m, sensor.max_distance_m
            ),
        ));
    }
    Ok(())
}

fn validate_vertical_angles(sensor: &LidarConfig) -> Result<(), ContractError> {
    for (idx, angle) in sensor.vertical_angles_deg.iter().enumerate() {
        if !angle.is_finite() || angle.abs() >= 90.0 {
            return Err(ContractError::config_validation(
                format!("sensor.vertical_angles_deg[{idx}]"),
                format!("angle must be within (-90, 90), got {angle}"),
            ));
        }
    }
    Ok(())
}

fn validate_run(blueprint: &SimulationBlueprint) -> Result<(), ContractError> {
    let run = &blueprint.run;
    if !(run.tick_hz > 0.0) {
        return Err(ContractError::config_validation(
            "run.tick_hz",
            format!("tick_hz must be > 0, got {}", run.tick_hz),
        ));
    }
    if !(run.duration_s >= 0.0) {
        return Err(ContractError::config_validation(
            "run.duration_s",
            format!("duration_s must be >= 0, got {}", run.duration_s),
        ));
    }
    Ok(())
}

fn validate_scene(blueprint: &SimulationBlueprint) -> Result<(), ContractError> {
    for (idx, primitive) in blueprint.scene.primitives.iter().enumerate() {
        let field = |name: &str| format!("scene.primitives[{idx}].{name}");
        let reflectivity = match primitive {
            PrimitiveConfig::Plane {
                normal,
                reflectivity,
                ..
            } => {
                if normal.iter().all(|c| *c == 0.0) {
                    return Err(ContractError::config_validation(
                        field("normal"),
                        "plane normal cannot be zero",
                    ));
                }
                *reflectivity
            }
            PrimitiveConfig::Sphere {
                radius,
                reflectivity,
                ..
            } => {
                if !(*radius > 0.0) {
                    return Err(ContractError::config_validation(
                        field("radius"),
                        format!("radius must be > 0, got {radius}"),
                    ));
                }
                *reflectivity
            }
            PrimitiveConfig::Box {
                min,
                max,
                reflectivity,
            } => {
                if min.iter().zip(max).any(|(lo, hi)| lo > hi) {
                    return Err(ContractError::config_validation(
                        field("min"),
                        "box min must be <= max on every axis",
                    ));
                }
                *reflectivity
            }
        };

        if !(0.0..=1.0).contains(&reflectivity) {
            return Err(ContractError::config_validation(
                field("reflectivity"),
                format!("reflectivity must be within [0, 1], got {reflectivity}"),
            ));
        }
    }
    Ok(())
}

fn validate_sinks(blueprint: &SimulationBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", idx),
                "queue_capacity must be > 0",
            ));
        }
        if sink.sink_type == SinkType::File {
            if !sink.params.contains_key("base_path") {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params.base_path", idx),
                    "file sink requires a base_path",
                ));
            }
            if let Some(encoding) = sink.params.get("encoding") {
                if PcdEncoding::from_name(encoding).is_none() {
                    return Err(ContractError::config_validation(
                        format!("sinks[{}].params.encoding", idx),
                        format!("unknown encoding '{encoding}', expected ascii or binary"),
                    ));
                }
            }
        }
    }
    Ok(())
}
