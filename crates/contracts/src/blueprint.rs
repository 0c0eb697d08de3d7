//! SimulationBlueprint - Config Loader output
//!
//! Describes a complete simulation: sensor, scene, sensor motion, run
//! settings and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::{LidarConfig, LidarPreset};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete simulation blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Hardware preset applied over the sensor section (geometry fields only)
    #[serde(default)]
    pub preset: Option<LidarPreset>,

    /// Sensor configuration
    #[serde(default)]
    pub sensor: LidarConfig,

    /// Scene description
    #[serde(default)]
    pub scene: SceneConfig,

    /// Sensor mount pose and motion
    #[serde(default)]
    pub motion: MotionConfig,

    /// Run settings
    #[serde(default)]
    pub run: RunConfig,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

impl SimulationBlueprint {
    /// Sensor configuration with the preset (if any) applied
    pub fn resolved_sensor_config(&self) -> LidarConfig {
        match self.preset {
            Some(preset) => preset.apply_to(&self.sensor),
            None => self.sensor.clone(),
        }
    }
}

/// 3D transform: location + rotation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Transform {
    /// Location (x, y, z) in meters
    pub location: Location,

    /// Rotation (pitch, yaw, roll) in degrees
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Transform {
    /// Convert to an isometry (rotation order: yaw about z, pitch about y, roll about x)
    pub fn to_isometry(&self) -> Isometry3<f32> {
        let rotation = UnitQuaternion::from_euler_angles(
            self.rotation.roll.to_radians() as f32,
            self.rotation.pitch.to_radians() as f32,
            self.rotation.yaw.to_radians() as f32,
        );
        Isometry3::from_parts(
            Translation3::new(
                self.location.x as f32,
                self.location.y as f32,
                self.location.z as f32,
            ),
            rotation,
        )
    }
}

/// Analytic scene
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Scene primitives
    #[serde(default)]
    pub primitives: Vec<PrimitiveConfig>,
}

/// One scene primitive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrimitiveConfig {
    /// Infinite plane `normal · p = offset`
    Plane {
        normal: [f32; 3],
        offset: f32,
        #[serde(default = "default_reflectivity")]
        reflectivity: f32,
    },
    /// Sphere (hit from outside or inside)
    Sphere {
        center: [f32; 3],
        radius: f32,
        #[serde(default = "default_reflectivity")]
        reflectivity: f32,
    },
    /// Axis-aligned box
    Box {
        min: [f32; 3],
        max: [f32; 3],
        #[serde(default = "default_reflectivity")]
        reflectivity: f32,
    },
}

fn default_reflectivity() -> f32 {
    0.5
}

/// Sensor mount pose and constant motion
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Initial sensor pose in world
    #[serde(default)]
    pub mount: Transform,

    /// Linear velocity in world (m/s)
    #[serde(default)]
    pub velocity: [f64; 3],

    /// Yaw rate (deg/s)
    #[serde(default)]
    pub yaw_rate_deg_s: f64,
}

impl MotionConfig {
    /// Sensor pose after `elapsed` seconds of constant motion
    pub fn pose_at(&self, elapsed: f64) -> Isometry3<f32> {
        let mount = self.mount.to_isometry();
        let offset = Vector3::new(
            (self.velocity[0] * elapsed) as f32,
            (self.velocity[1] * elapsed) as f32,
            (self.velocity[2] * elapsed) as f32,
        );
        let yaw = UnitQuaternion::from_axis_angle(
            &Vector3::z_axis(),
            (self.yaw_rate_deg_s * elapsed).to_radians() as f32,
        );
        Isometry3::from_parts(
            Translation3::from(mount.translation.vector + offset),
            yaw * mount.rotation,
        )
    }
}

/// Run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Simulation ticks per second
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,

    /// Simulated duration (seconds)
    #[serde(default = "default_duration_s")]
    pub duration_s: f64,

    /// Simulation clock origin (seconds), feeds hour-wrapped timestamps
    #[serde(default)]
    pub start_time_s: f64,

    /// Device frames a readback takes to complete
    #[serde(default = "default_readback_latency")]
    pub readback_latency_frames: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            duration_s: default_duration_s(),
            start_time_s: 0.0,
            readback_latency_frames: default_readback_latency(),
        }
    }
}

fn default_tick_hz() -> f64 {
    60.0
}

fn default_duration_s() -> f64 {
    1.0
}

fn default_readback_latency() -> u64 {
    1
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    16
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// One PCD file per revolution
    File,
}
