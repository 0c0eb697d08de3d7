//! Rendering and asynchronous transfer collaborators
//!
//! The scan engine never touches a graphics API directly. A host renderer
//! implements [`SceneRenderer`] and [`ReadbackDevice`]; the engine only calls
//! the operations below and polls the returned [`ReadbackRequest`].

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use nalgebra::Isometry3;

/// Bytes per readback pixel
pub const SAMPLE_STRIDE: usize = std::mem::size_of::<PackedSample>();

/// Readback pixel layout of the color target
///
/// Row = ray, column = angular slot within the window:
/// pixel (column, ray) lives at `ray * width + column`.
/// A range of 0 means the ray hit nothing.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PackedSample {
    /// Distance along the ray (meters)
    pub range: f32,
    /// Return weight (0-1)
    pub weight: f32,
}

/// Handle to a paired color + depth render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetPair {
    /// Renderer-assigned handle
    pub id: u64,
    /// Width in pixels (slots per window)
    pub width: u32,
    /// Height in pixels (rays)
    pub height: u32,
}

impl RenderTargetPair {
    /// Readback size of the color surface in bytes
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * SAMPLE_STRIDE
    }
}

const FRUSTUM_EPSILON_DEG: f32 = 1e-3;

/// Draw description handed to the renderer for one capture window
///
/// The renderer invokes its custom pass with this description: cull against
/// `far_clip`, clear the pair, draw the scene into color + depth and resample
/// it into the packed layout. Hosts may run the pass zero or more times per
/// request; the engine only consumes whatever the readback returns.
#[derive(Debug, Clone)]
pub struct CapturePass {
    /// Sensor pose in world at capture time
    pub sensor_pose: Isometry3<f32>,
    /// Capture camera pose in world (looking at the window center)
    pub camera_pose: Isometry3<f32>,
    /// Azimuth of column 0 in the sensor frame (degrees)
    pub start_azimuth_deg: f32,
    /// Azimuth increment per column (degrees)
    pub azimuth_step_deg: f32,
    /// Sine of each ray's latitude (polar angle from the sensor up axis)
    pub sin_latitude: Arc<[f32]>,
    /// Cosine of each ray's latitude
    pub cos_latitude: Arc<[f32]>,
    /// Vertical frustum bounds as elevations (degrees): (bottom, top)
    ///
    /// Each side is already widened for the hyperbola a ray sweeps across
    /// the window, so rays at the window edges are not clipped.
    pub vertical_bounds_deg: (f32, f32),
    /// Symmetric vertical half angle (degrees) covering every ray at every
    /// column of the window, with the same edge correction
    pub max_half_angle_deg: f32,
    /// Horizontal frustum half angle (degrees)
    pub horizontal_half_angle_deg: f32,
    /// Near-plane half width at unit distance
    pub near_plane_half_width: f32,
    /// Target pixels per unit of near-plane width
    pub pixels_per_unit: f32,
    /// Near clip distance (meters)
    pub near_clip: f32,
    /// Far clip / cull distance (meters)
    pub far_clip: f32,
}

impl CapturePass {
    /// Pixel columns the window covers on the near plane
    pub fn footprint_columns(&self) -> u32 {
        (2.0 * self.near_plane_half_width * self.pixels_per_unit).round() as u32
    }

    /// Whether a sensor-frame direction lies inside the vertical frustum
    pub fn in_vertical_frustum(&self, direction: &nalgebra::Vector3<f32>) -> bool {
        let norm = direction.norm();
        if norm <= 0.0 {
            return false;
        }
        let elevation = (direction.z / norm).clamp(-1.0, 1.0).asin().to_degrees();
        elevation.abs() <= self.max_half_angle_deg + FRUSTUM_EPSILON_DEG
    }

    /// Ray direction in the sensor frame for (column, ray)
    pub fn sensor_direction(&self, column: u32, ray: usize) -> nalgebra::Vector3<f32> {
        let azimuth = (self.start_azimuth_deg + column as f32 * self.azimuth_step_deg).to_radians();
        let (sin_az, cos_az) = azimuth.sin_cos();
        let sin_lat = self.sin_latitude[ray];
        let cos_lat = self.cos_latitude[ray];
        nalgebra::Vector3::new(sin_lat * cos_az, sin_lat * sin_az, cos_lat)
    }
}

/// Scene rendering collaborator
pub trait SceneRenderer {
    /// Allocate a fresh color + depth pair
    fn create_target(&mut self, width: u32, height: u32) -> RenderTargetPair;

    /// Liveness check; false after device / display resets
    fn is_target_valid(&self, target: &RenderTargetPair) -> bool;

    /// Release the device surfaces of a pair
    fn destroy_target(&mut self, target: RenderTargetPair);

    /// Orient the capture camera
    fn orient_camera(&mut self, pose: &Isometry3<f32>);

    /// Render the scene into `target` using the capture pass
    fn render(&mut self, target: &RenderTargetPair, pass: &CapturePass);
}

/// Asynchronous device-to-host transfer collaborator
pub trait ReadbackDevice {
    /// In-flight transfer handle
    type Request: ReadbackRequest;

    /// Request a host-readable copy of the color surface of `target`
    fn request_readback(&mut self, target: &RenderTargetPair) -> Self::Request;
}

/// One asynchronous transfer
pub trait ReadbackRequest {
    /// Transfer finished (successfully or not)
    fn is_done(&self) -> bool;

    /// Transfer finished with an error
    fn has_error(&self) -> bool;

    /// Block until the transfer finishes
    fn wait(&mut self);

    /// Raw bytes of a finished transfer (empty if not done or failed)
    fn data(&self) -> Bytes;
}
