//! Scan geometry derived from a `LidarConfig`.
//!
//! Pure function of the configuration. Recomputed entirely on every reset and
//! shared read-only (behind `Arc`) with capture passes and decode tasks.

use std::sync::Arc;

use contracts::{CapturePass, LidarConfig};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

/// Elevations are clamped to stay clear of the poles
const MAX_ELEVATION_DEG: f32 = 89.0;

/// Vertical layout source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    /// Evenly spaced rays from field of view + center tilt
    Uniform,
    /// Rays taken from the explicit elevation list
    Explicit,
}

/// Read-only scan geometry of one configuration epoch
#[derive(Debug, Clone, PartialEq)]
pub struct ScanGeometry {
    pub mode: LayoutMode,
    pub laser_count: usize,
    /// Per-ray elevation above the horizon (degrees)
    pub elevations_deg: Vec<f32>,
    /// Vertical field of view (an output in explicit mode)
    pub field_of_view_deg: f32,
    /// Field of view center (an output in explicit mode)
    pub center_angle_deg: f32,
    /// Latitude (polar angle from up) of the highest ray
    pub start_latitude_deg: f32,
    /// Latitude of the lowest ray
    pub end_latitude_deg: f32,
    /// Vertical half angle of the capture frustum, hyperbola corrected
    pub max_angle_deg: f32,
    /// Capture frustum vertical bounds biased toward the tilt: (bottom, top)
    pub vertical_bounds_deg: (f32, f32),
    /// Per-ray sin of latitude
    pub sin_latitude: Arc<[f32]>,
    /// Per-ray cos of latitude
    pub cos_latitude: Arc<[f32]>,
    /// Horizontal angle of one window (degrees)
    pub window_angle_deg: f32,
    /// Angular width of one slot (degrees)
    pub slot_angle_deg: f32,
    /// Columns per window
    pub slots_per_window: usize,
    /// Near-plane half width at unit distance: tan(window / 2)
    pub horizontal_scale: f32,
    /// Pixels per unit of near-plane width
    pub texture_scale: f32,
}

impl ScanGeometry {
    /// Derive geometry from a configuration
    ///
    /// Assumes validated input: no error path exists here.
    pub fn from_config(config: &LidarConfig) -> Self {
        let (mode, elevations) = if config.vertical_angles_deg.is_empty() {
            (LayoutMode::Uniform, uniform_elevations(config))
        } else {
            (LayoutMode::Explicit, config.vertical_angles_deg.clone())
        };

        let (lowest, highest) = elevations
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &e| {
                (lo.min(e), hi.max(e))
            });
        let (lowest, highest) = if elevations.is_empty() {
            (config.center_angle_deg, config.center_angle_deg)
        } else {
            (lowest, highest)
        };

        let (field_of_view_deg, center_angle_deg, bottom, top) = match mode {
            LayoutMode::Uniform => {
                let half = config.field_of_view_deg * 0.5;
                (
                    config.field_of_view_deg,
                    config.center_angle_deg,
                    config.center_angle_deg - half,
                    config.center_angle_deg + half,
                )
            }
            LayoutMode::Explicit => (
                highest - lowest,
                (highest + lowest) * 0.5,
                lowest,
                highest,
            ),
        };

        let half_window = config.window_angle_deg * 0.5;
        let nominal_half = center_angle_deg.abs() + field_of_view_deg * 0.5;
        let max_angle_deg = corrected_half_angle(nominal_half, half_window);
        let vertical_bounds_deg = (
            -corrected_half_angle(-bottom, half_window),
            corrected_half_angle(top, half_window),
        );

        let (sin_latitude, cos_latitude): (Vec<f32>, Vec<f32>) = elevations
            .iter()
            .map(|&e| {
                let latitude = (90.0 - e).to_radians();
                latitude.sin_cos()
            })
            .unzip();

        let slots_per_window = config.slots_per_window();
        let horizontal_scale = half_window.to_radians().tan();
        let texture_scale = if horizontal_scale > 0.0 {
            slots_per_window as f32 / (2.0 * horizontal_scale)
        } else {
            0.0
        };

        Self {
            mode,
            laser_count: elevations.len(),
            start_latitude_deg: 90.0 - highest,
            end_latitude_deg: 90.0 - lowest,
            elevations_deg: elevations,
            field_of_view_deg,
            center_angle_deg,
            max_angle_deg,
            vertical_bounds_deg,
            sin_latitude: sin_latitude.into(),
            cos_latitude: cos_latitude.into(),
            window_angle_deg: config.window_angle_deg,
            slot_angle_deg: config.slot_angle_deg() as f32,
            slots_per_window,
            horizontal_scale,
            texture_scale,
        }
    }

    /// Azimuth of a slot index (degrees)
    pub fn slot_azimuth_deg(&self, slot: usize) -> f32 {
        (slot as f64 * self.slot_angle_deg as f64) as f32
    }

    /// Capture camera pose for a window: yawed to the window center and
    /// pitched to the middle of the vertical frustum bounds
    pub fn camera_pose(
        &self,
        sensor_pose: &Isometry3<f32>,
        start_slot: usize,
        slot_count: usize,
    ) -> Isometry3<f32> {
        let center_az = self.slot_azimuth_deg(start_slot)
            + 0.5 * slot_count.saturating_sub(1) as f32 * self.slot_angle_deg;
        let (bottom, top) = self.vertical_bounds_deg;
        let pitch = -0.5 * (bottom + top);
        let look = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), center_az.to_radians())
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), pitch.to_radians());
        sensor_pose * Isometry3::from_parts(Translation3::identity(), look)
    }

    /// Draw description of one capture window
    pub fn capture_pass(
        &self,
        sensor_pose: &Isometry3<f32>,
        start_slot: usize,
        slot_count: usize,
        near_clip: f32,
        far_clip: f32,
    ) -> CapturePass {
        CapturePass {
            sensor_pose: *sensor_pose,
            camera_pose: self.camera_pose(sensor_pose, start_slot, slot_count),
            start_azimuth_deg: self.slot_azimuth_deg(start_slot),
            azimuth_step_deg: self.slot_angle_deg,
            sin_latitude: Arc::clone(&self.sin_latitude),
            cos_latitude: Arc::clone(&self.cos_latitude),
            vertical_bounds_deg: self.vertical_bounds_deg,
            max_half_angle_deg: self.max_angle_deg,
            horizontal_half_angle_deg: self.window_angle_deg * 0.5,
            near_plane_half_width: self.horizontal_scale,
            pixels_per_unit: self.texture_scale,
            near_clip,
            far_clip,
        }
    }
}

/// Ray elevations for uniform mode, highest ray first
fn uniform_elevations(config: &LidarConfig) -> Vec<f32> {
    let count = config.laser_count as usize;
    let top = config.center_angle_deg + config.field_of_view_deg * 0.5;
    match count {
        0 => Vec::new(),
        1 => vec![config.center_angle_deg],
        _ => {
            let step = config.field_of_view_deg / (count - 1) as f32;
            (0..count).map(|i| top - step * i as f32).collect()
        }
    }
}

/// Frustum half angle needed to keep a ray of `elevation_deg` inside the
/// window at every longitude.
///
/// A ray swept across the window traces a hyperbola on the capture plane:
/// at longitude φ from the principal axis its near-plane height is
/// tan(e) / cos(φ). The extreme sits at the window edge; the center value is
/// kept when larger (negative elevations).
fn corrected_half_angle(elevation_deg: f32, half_window_deg: f32) -> f32 {
    let e = elevation_deg.clamp(-MAX_ELEVATION_DEG, MAX_ELEVATION_DEG);
    let edge_cos = half_window_deg.to_radians().cos().max(1e-6);
    let at_edge = (e.to_radians().tan() / edge_cos).atan().to_degrees();
    at_edge.max(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn uniform(fov: f32, center: f32) -> LidarConfig {
        LidarConfig {
            laser_count: 16,
            field_of_view_deg: fov,
            center_angle_deg: center,
            vertical_angles_deg: Vec::new(),
            ..Default::default()
        }
    }

    #[test]
    fn test_uniform_layout() {
        let geometry = ScanGeometry::from_config(&uniform(30.0, 0.0));
        assert_eq!(geometry.mode, LayoutMode::Uniform);
        assert_eq!(geometry.laser_count, 16);
        assert_abs_diff_eq!(geometry.elevations_deg[0], 15.0, epsilon = 1e-5);
        assert_abs_diff_eq!(geometry.elevations_deg[15], -15.0, epsilon = 1e-5);
        assert_abs_diff_eq!(geometry.start_latitude_deg, 75.0, epsilon = 1e-5);
        assert_abs_diff_eq!(geometry.end_latitude_deg, 105.0, epsilon = 1e-5);
        assert_eq!(geometry.sin_latitude.len(), 16);
        assert_eq!(geometry.cos_latitude.len(), 16);
    }

    #[test]
    fn test_latitude_tables() {
        let geometry = ScanGeometry::from_config(&uniform(30.0, 0.0));
        for (i, e) in geometry.elevations_deg.iter().enumerate() {
            // sin(latitude) = cos(elevation), cos(latitude) = sin(elevation)
            assert_abs_diff_eq!(geometry.sin_latitude[i], e.to_radians().cos(), epsilon = 1e-5);
            assert_abs_diff_eq!(geometry.cos_latitude[i], e.to_radians().sin(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_max_angle_exceeds_nominal() {
        let geometry = ScanGeometry::from_config(&uniform(30.0, -10.0));
        // nominal |center| + fov/2 = 25°
        assert!(geometry.max_angle_deg > 25.0);
        let expected = ((25f32).to_radians().tan() / (7.5f32).to_radians().cos())
            .atan()
            .to_degrees();
        assert_abs_diff_eq!(geometry.max_angle_deg, expected, epsilon = 1e-4);
    }

    #[test]
    fn test_tilted_bounds_biased() {
        let geometry = ScanGeometry::from_config(&uniform(20.0, -20.0));
        let (bottom, top) = geometry.vertical_bounds_deg;
        assert!(bottom < -30.0);
        assert!(top < 0.0, "frustum follows the tilt, top = {top}");
        assert_abs_diff_eq!(-bottom, geometry.max_angle_deg, epsilon = 1e-4);
    }

    #[test]
    fn test_max_angle_monotone_in_fov() {
        let mut previous = f32::NEG_INFINITY;
        for step in 0..=170 {
            let fov = step as f32;
            let geometry = ScanGeometry::from_config(&uniform(fov, 5.0));
            assert!(geometry.max_angle_deg >= previous, "fov {fov}");
            previous = geometry.max_angle_deg;
        }
    }

    #[test]
    fn test_max_angle_monotone_in_center() {
        for sign in [1.0f32, -1.0] {
            let mut previous = f32::NEG_INFINITY;
            for step in 0..=80 {
                let center = sign * step as f32;
                let geometry = ScanGeometry::from_config(&uniform(20.0, center));
                assert!(geometry.max_angle_deg >= previous, "center {center}");
                previous = geometry.max_angle_deg;
            }
        }
    }

    #[test]
    fn test_explicit_layout_overrides_scalars() {
        let config = LidarConfig {
            laser_count: 99,
            field_of_view_deg: 1.0,
            center_angle_deg: 40.0,
            vertical_angles_deg: vec![-25.0, 5.0, -3.0, 15.0],
            ..Default::default()
        };
        let geometry = ScanGeometry::from_config(&config);
        assert_eq!(geometry.mode, LayoutMode::Explicit);
        assert_eq!(geometry.laser_count, 4);
        assert_abs_diff_eq!(geometry.field_of_view_deg, 40.0, epsilon = 1e-5);
        assert_abs_diff_eq!(geometry.center_angle_deg, -5.0, epsilon = 1e-5);
        // latitude = 90° - declared angle, in list order
        assert_abs_diff_eq!(geometry.cos_latitude[1], (5f32).to_radians().sin(), epsilon = 1e-6);
        assert_abs_diff_eq!(geometry.start_latitude_deg, 75.0, epsilon = 1e-5);
        assert_abs_diff_eq!(geometry.end_latitude_deg, 115.0, epsilon = 1e-5);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let config = uniform(26.8, -7.0);
        assert_eq!(
            ScanGeometry::from_config(&config),
            ScanGeometry::from_config(&config)
        );
    }

    #[test]
    fn test_single_laser() {
        let config = LidarConfig {
            laser_count: 1,
            center_angle_deg: -2.0,
            ..Default::default()
        };
        let geometry = ScanGeometry::from_config(&config);
        assert_eq!(geometry.elevations_deg, vec![-2.0]);
    }

    #[test]
    fn test_horizontal_scales() {
        let config = LidarConfig {
            measurements_per_revolution: 360,
            window_angle_deg: 90.0,
            ..Default::default()
        };
        let geometry = ScanGeometry::from_config(&config);
        assert_eq!(geometry.slots_per_window, 90);
        assert_abs_diff_eq!(geometry.horizontal_scale, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(geometry.texture_scale, 45.0, epsilon = 1e-3);
        assert_abs_diff_eq!(geometry.slot_azimuth_deg(45), 45.0, epsilon = 1e-5);
    }

    #[test]
    fn test_capture_pass_faces_window_center() {
        let geometry = ScanGeometry::from_config(&LidarConfig {
            laser_count: 4,
            field_of_view_deg: 20.0,
            center_angle_deg: 0.0,
            measurements_per_revolution: 360,
            window_angle_deg: 15.0,
            ..Default::default()
        });
        let pass = geometry.capture_pass(&Isometry3::identity(), 83, 15, 0.5, 100.0);

        assert_abs_diff_eq!(pass.start_azimuth_deg, 83.0, epsilon = 1e-4);
        assert_abs_diff_eq!(pass.azimuth_step_deg, 1.0, epsilon = 1e-6);
        let forward = pass.camera_pose * Vector3::x();
        // window spans 83..=97, center 90 looks along +y
        assert_abs_diff_eq!(forward.y, 1.0, epsilon = 1e-5);
        assert_eq!(pass.sin_latitude.len(), 4);
        assert_eq!(pass.far_clip, 100.0);
    }

    #[test]
    fn test_capture_pass_frustum_covers_every_ray() {
        let configs = [
            uniform(30.0, -12.0),
            LidarConfig {
                vertical_angles_deg: vec![-25.0, -8.0, 0.0, 3.5, 15.0],
                ..Default::default()
            },
        ];
        for config in configs {
            let geometry = ScanGeometry::from_config(&config);
            let slots = geometry.slots_per_window;
            let pass = geometry.capture_pass(&Isometry3::identity(), 0, slots, 0.5, 100.0);

            assert_eq!(pass.footprint_columns() as usize, slots);
            assert!(pass.max_half_angle_deg >= pass.vertical_bounds_deg.1);
            assert!(pass.max_half_angle_deg >= -pass.vertical_bounds_deg.0);
            for column in 0..slots as u32 {
                for ray in 0..geometry.laser_count {
                    let dir = pass.sensor_direction(column, ray);
                    assert!(pass.in_vertical_frustum(&dir), "column {column} ray {ray}");
                }
            }
        }
    }
}
