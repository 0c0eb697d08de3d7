//! ScanPoint / PointCloudFrame - scan engine output
//!
//! Dense per-revolution point cloud structure.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use crate::pcd::{write_pcd, PcdEncoding};

/// Milliseconds in one hour
const MS_PER_HOUR: u64 = 3_600_000;

/// One slot of the point buffer
///
/// The all-zero value is the sentinel for "no valid return".
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Pod, Zeroable)]
pub struct ScanPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Return weight (reflectivity, 0-1)
    pub weight: f32,
}

impl ScanPoint {
    /// Sentinel point
    pub const SENTINEL: ScanPoint = ScanPoint {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        weight: 0.0,
    };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32, weight: f32) -> Self {
        Self { x, y, z, weight }
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    /// Distance from the frame origin
    #[inline]
    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Frame points are expressed in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFrame {
    /// World frame (motion compensated)
    #[default]
    World,
    /// Sensor-local frame
    Sensor,
}

/// Point cloud of one full revolution
///
/// `points` is dense: index = slot × laser_count + ray, sentinels included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudFrame {
    /// Sensor ID
    pub sensor_id: String,

    /// Publication sequence number (monotonically increasing)
    pub sequence: u64,

    /// Simulation time of the closing window (seconds)
    pub sim_time: f64,

    /// Milliseconds since the top of the current hour
    pub timestamp_ms: u32,

    /// Frame the points are expressed in
    pub frame: OutputFrame,

    /// Sensor pose in world at publication (frame transform metadata)
    pub sensor_pose: Isometry3<f32>,

    /// Rays per slot
    pub laser_count: u32,

    /// Slots per revolution
    pub measurements_per_revolution: u32,

    /// Dense point array
    pub points: Arc<[ScanPoint]>,
}

impl PointCloudFrame {
    /// Hardware style timestamp: ms since the top of the hour, wrapping hourly
    pub fn hour_timestamp_ms(sim_time_s: f64) -> u32 {
        if !(sim_time_s > 0.0) {
            return 0;
        }
        let total_ms = (sim_time_s * 1000.0) as u64;
        (total_ms % MS_PER_HOUR) as u32
    }

    /// Non-sentinel points
    pub fn valid_points(&self) -> impl Iterator<Item = &ScanPoint> {
        self.points.iter().filter(|p| !p.is_sentinel())
    }

    /// Count of non-sentinel points
    pub fn valid_count(&self) -> usize {
        self.valid_points().count()
    }

    /// Points of one angular slot (all rays), `None` past the last slot
    pub fn slot(&self, slot: usize) -> Option<&[ScanPoint]> {
        let lasers = self.laser_count as usize;
        let start = slot.checked_mul(lasers)?;
        self.points.get(start..start.checked_add(lasers)?)
    }

    /// Encode the valid points as a PCD document
    ///
    /// World frame clouds record the sensor pose as the viewpoint.
    pub fn to_pcd_bytes(&self, encoding: PcdEncoding) -> Vec<u8> {
        let viewpoint = match self.frame {
            OutputFrame::World => Some(&self.sensor_pose),
            OutputFrame::Sensor => None,
        };
        let mut out = Vec::with_capacity(256 + self.points.len() * 16);
        // writing into a Vec cannot fail
        let _ = write_pcd(&mut out, &self.points, encoding, viewpoint);
        out
    }
}
