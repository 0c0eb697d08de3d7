//! LidarConfig - scan configuration contract
//!
//! Every field participates in value comparison: the engine caches a snapshot
//! and performs a full reset whenever the live configuration differs from it.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::OutputFrame;

/// Rotating LiDAR configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LidarConfig {
    /// Sensor ID (used as frame tag and log field)
    #[validate(length(min = 1))]
    pub sensor_id: String,

    /// Laser (ray) count, ignored when `vertical_angles_deg` is non-empty
    #[validate(range(min = 1, max = 1024))]
    pub laser_count: u32,

    /// Vertical field of view (degrees)
    #[validate(range(min = 0.0, max = 178.0))]
    pub field_of_view_deg: f32,

    /// Tilt of the field of view center above the horizon (degrees)
    #[validate(range(min = -89.0, max = 89.0))]
    pub center_angle_deg: f32,

    /// Explicit per-ray elevation angles (degrees); overrides the scalar layout
    pub vertical_angles_deg: Vec<f32>,

    /// Minimum valid range (meters, inclusive)
    #[validate(range(min = 0.0))]
    pub min_distance_m: f32,

    /// Maximum valid range (meters, inclusive)
    #[validate(range(exclusive_min = 0.0))]
    pub max_distance_m: f32,

    /// Revolutions per second
    #[validate(range(exclusive_min = 0.0, max = 100.0))]
    pub rotation_frequency_hz: f32,

    /// Angular slots per revolution
    #[validate(range(min = 1, max = 100000))]
    pub measurements_per_revolution: u32,

    /// true: points stay in world frame; false: points are sensor-local
    pub compensated: bool,

    /// Horizontal angle captured by one render + readback (degrees)
    #[validate(range(exclusive_min = 0.0, max = 180.0))]
    pub window_angle_deg: f32,

    /// Submission blackout after a failed readback (seconds)
    #[validate(range(min = 0.0))]
    pub readback_error_cooldown_s: f32,

    /// Capacity of the outstanding readback FIFO
    #[validate(range(min = 1, max = 4096))]
    pub max_in_flight_readbacks: usize,

    /// Decode worker threads (0 = one per logical CPU)
    pub decode_threads: usize,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            sensor_id: "lidar".to_string(),
            laser_count: 32,
            field_of_view_deg: 40.0,
            center_angle_deg: -10.0,
            vertical_angles_deg: Vec::new(),
            min_distance_m: 0.5,
            max_distance_m: 100.0,
            rotation_frequency_hz: 10.0,
            measurements_per_revolution: 1500,
            compensated: true,
            window_angle_deg: 15.0,
            readback_error_cooldown_s: 1.0,
            max_in_flight_readbacks: 64,
            decode_threads: 0,
        }
    }
}

impl LidarConfig {
    /// Ray count actually scanned
    ///
    /// A non-empty explicit angle list defines the count.
    pub fn effective_laser_count(&self) -> usize {
        if self.vertical_angles_deg.is_empty() {
            self.laser_count as usize
        } else {
            self.vertical_angles_deg.len()
        }
    }

    /// Output frame selected by the compensation flag
    pub fn output_frame(&self) -> OutputFrame {
        if self.compensated {
            OutputFrame::World
        } else {
            OutputFrame::Sensor
        }
    }

    /// Angular width of one slot (degrees)
    pub fn slot_angle_deg(&self) -> f64 {
        360.0 / self.measurements_per_revolution.max(1) as f64
    }

    /// Slots covered by one capture window (0 for degenerate layouts)
    pub fn slots_per_window(&self) -> usize {
        if self.measurements_per_revolution == 0 || !(self.window_angle_deg > 0.0) {
            return 0;
        }
        let slots = self.window_angle_deg as f64 / self.slot_angle_deg();
        // tolerate float noise such as 74.99999 for an exact 75
        (slots + 1e-6).floor() as usize
    }

    /// Windows needed to cover one revolution
    pub fn windows_per_revolution(&self) -> usize {
        let slots = self.slots_per_window();
        if slots == 0 {
            return 0;
        }
        (self.measurements_per_revolution as usize).div_ceil(slots)
    }

    /// Point buffer length: rays × slots per revolution
    pub fn point_capacity(&self) -> usize {
        self.effective_laser_count() * self.measurements_per_revolution as usize
    }

    /// Range limits usable for decoding
    pub fn has_usable_range(&self) -> bool {
        self.min_distance_m >= 0.0 && self.max_distance_m > 0.0 && self.min_distance_m <= self.max_distance_m
    }
}

/// Known hardware layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LidarPreset {
    /// Velodyne Puck: 16 lasers, ±15°
    Vlp16,
    /// Velodyne HDL-32E: 32 lasers, -30.67° .. +10.67°
    Hdl32e,
    /// Velodyne Ultra Puck: 32 lasers, non-uniform layout
    Vlp32c,
}

/// VLP-32C laser elevations in firing order (degrees)
const VLP32C_ANGLES: [f32; 32] = [
    -25.0, -1.0, -1.667, -15.639, -11.31, 0.0, -0.667, -8.843, -7.254, 0.333, -0.333, -6.148,
    -5.333, 1.333, 0.667, -4.0, -4.667, 1.667, 1.0, -3.667, -3.333, 3.333, 2.333, -2.667, -3.0,
    7.0, 4.667, -2.333, -2.0, 15.0, 10.333, -1.333,
];

impl LidarPreset {
    /// Preset configuration at 10 Hz
    pub fn config(self) -> LidarConfig {
        let base = LidarConfig::default();
        match self {
            LidarPreset::Vlp16 => LidarConfig {
                sensor_id: "vlp16".to_string(),
                laser_count: 16,
                field_of_view_deg: 30.0,
                center_angle_deg: 0.0,
                min_distance_m: 0.5,
                max_distance_m: 100.0,
                measurements_per_revolution: 1800,
                ..base
            },
            LidarPreset::Hdl32e => LidarConfig {
                sensor_id: "hdl32e".to_string(),
                laser_count: 32,
                field_of_view_deg: 41.34,
                center_angle_deg: -10.0,
                min_distance_m: 1.0,
                max_distance_m: 100.0,
                measurements_per_revolution: 2160,
                ..base
            },
            LidarPreset::Vlp32c => LidarConfig {
                sensor_id: "vlp32c".to_string(),
                laser_count: 32,
                vertical_angles_deg: VLP32C_ANGLES.to_vec(),
                min_distance_m: 0.5,
                max_distance_m: 200.0,
                measurements_per_revolution: 1800,
                ..base
            },
        }
    }

    /// Geometry fields of the preset applied over `config`
    ///
    /// Timing, identity and output settings of `config` are kept.
    pub fn apply_to(self, config: &LidarConfig) -> LidarConfig {
        let preset = self.config();
        LidarConfig {
            laser_count: preset.laser_count,
            field_of_view_deg: preset.field_of_view_deg,
            center_angle_deg: preset.center_angle_deg,
            vertical_angles_deg: preset.vertical_angles_deg,
            min_distance_m: preset.min_distance_m,
            max_distance_m: preset.max_distance_m,
            measurements_per_revolution: preset.measurements_per_revolution,
            ..config.clone()
        }
    }
}
