//! Simulated rendering device
//!
//! Implements `SceneRenderer` + `ReadbackDevice` on the CPU. Render targets
//! live in a surface table keyed by handle; a device generation counter
//! models resource loss. Readbacks snapshot the surface at request time and
//! complete once the shared [`FrameClock`] has advanced by the configured
//! latency.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use contracts::{
    CapturePass, PackedSample, ReadbackDevice, ReadbackRequest, RenderTargetPair, SceneRenderer,
};
use nalgebra::{Isometry3, Point3};
use tracing::{debug, trace, warn};

use crate::Scene;

/// Shared device frame counter
///
/// The host advances it once per engine tick; readbacks compare against it.
#[derive(Debug, Clone, Default)]
pub struct FrameClock(Arc<AtomicU64>);

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current frame
    pub fn now(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Advance by one frame, returns the new frame
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Device activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub targets_created: u64,
    pub targets_destroyed: u64,
    pub renders: u64,
    pub readbacks: u64,
    pub failed_readbacks: u64,
}

#[derive(Debug)]
struct Surface {
    generation: u64,
    samples: Vec<PackedSample>,
}

/// CPU device
#[derive(Debug)]
pub struct SimDevice {
    scene: Arc<Scene>,
    surfaces: HashMap<u64, Surface>,
    next_target_id: u64,
    generation: u64,
    camera_pose: Isometry3<f32>,
    clock: FrameClock,
    latency_frames: u64,
    readback_index: u64,
    failing_readbacks: HashSet<u64>,
    stats: DeviceStats,
}

impl SimDevice {
    /// Create a device rendering `scene`
    pub fn new(scene: Scene) -> Self {
        Self {
            scene: Arc::new(scene),
            surfaces: HashMap::new(),
            next_target_id: 1,
            generation: 0,
            camera_pose: Isometry3::identity(),
            clock: FrameClock::new(),
            latency_frames: 0,
            readback_index: 0,
            failing_readbacks: HashSet::new(),
            stats: DeviceStats::default(),
        }
    }

    /// Readbacks complete `frames` clock ticks after being requested
    pub fn with_latency(mut self, frames: u64) -> Self {
        self.latency_frames = frames;
        self
    }

    /// Handle to the frame clock
    pub fn clock(&self) -> FrameClock {
        self.clock.clone()
    }

    /// Advance the frame clock by one
    pub fn advance_frame(&self) -> u64 {
        self.clock.advance()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn set_scene(&mut self, scene: Scene) {
        self.scene = Arc::new(scene);
    }

    /// Make the `index`-th readback (zero based, counted over the device
    /// lifetime) fail
    pub fn fail_readback(&mut self, index: u64) {
        self.failing_readbacks.insert(index);
    }

    /// Invalidate every live surface, as a display / device reset would
    pub fn lose_device(&mut self) {
        self.generation += 1;
        warn!(generation = self.generation, "simulated device loss");
    }

    /// Number of readbacks requested so far
    pub fn readback_count(&self) -> u64 {
        self.readback_index
    }

    /// Surfaces currently allocated (valid or not)
    pub fn live_targets(&self) -> usize {
        self.surfaces.len()
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    /// Last camera pose set by the engine
    pub fn camera_pose(&self) -> &Isometry3<f32> {
        &self.camera_pose
    }
}

impl SceneRenderer for SimDevice {
    fn create_target(&mut self, width: u32, height: u32) -> RenderTargetPair {
        let id = self.next_target_id;
        self.next_target_id += 1;
        self.surfaces.insert(
            id,
            Surface {
                generation: self.generation,
                samples: vec![PackedSample::default(); width as usize * height as usize],
            },
        );
        self.stats.targets_created += 1;
        trace!(id, width, height, "target created");
        RenderTargetPair { id, width, height }
    }

    fn is_target_valid(&self, target: &RenderTargetPair) -> bool {
        self.surfaces
            .get(&target.id)
            .is_some_and(|s| s.generation == self.generation)
    }

    fn destroy_target(&mut self, target: RenderTargetPair) {
        if self.surfaces.remove(&target.id).is_some() {
            self.stats.targets_destroyed += 1;
        }
    }

    fn orient_camera(&mut self, pose: &Isometry3<f32>) {
        self.camera_pose = *pose;
    }

    fn render(&mut self, target: &RenderTargetPair, pass: &CapturePass) {
        if !self.is_target_valid(target) {
            debug!(id = target.id, "render into invalid target skipped");
            return;
        }
        let scene = Arc::clone(&self.scene);
        let Some(surface) = self.surfaces.get_mut(&target.id) else {
            return;
        };

        let origin = Point3::from(pass.sensor_pose.translation.vector);
        let width = target.width as usize;
        let columns = width.min(pass.footprint_columns() as usize);
        let rays = (target.height as usize).min(pass.sin_latitude.len());

        // clear
        surface.samples.fill(PackedSample::default());

        for ray in 0..rays {
            for column in 0..columns {
                let local = pass.sensor_direction(column as u32, ray);
                if !pass.in_vertical_frustum(&local) {
                    continue;
                }
                let dir = pass.sensor_pose.rotation * local;
                if let Some(hit) = scene.raycast(&origin, &dir, pass.far_clip) {
                    if hit.distance >= pass.near_clip {
                        surface.samples[ray * width + column] = PackedSample {
                            range: hit.distance,
                            weight: hit.reflectivity,
                        };
                    }
                }
            }
        }
        self.stats.renders += 1;
    }
}

impl ReadbackDevice for SimDevice {
    type Request = SimReadback;

    fn request_readback(&mut self, target: &RenderTargetPair) -> SimReadback {
        let index = self.readback_index;
        self.readback_index += 1;
        self.stats.readbacks += 1;

        let valid = self.is_target_valid(target);
        let failed = !valid || self.failing_readbacks.remove(&index);
        if failed {
            self.stats.failed_readbacks += 1;
        }

        let data = match (failed, self.surfaces.get(&target.id)) {
            (false, Some(surface)) => {
                Bytes::copy_from_slice(bytemuck::cast_slice(&surface.samples))
            }
            _ => Bytes::new(),
        };

        SimReadback {
            data,
            failed,
            ready_at: self.clock.now() + self.latency_frames,
            clock: self.clock.clone(),
            waited: false,
        }
    }
}

/// In-flight simulated transfer
#[derive(Debug)]
pub struct SimReadback {
    data: Bytes,
    failed: bool,
    ready_at: u64,
    clock: FrameClock,
    waited: bool,
}

impl ReadbackRequest for SimReadback {
    fn is_done(&self) -> bool {
        self.waited || self.clock.now() >= self.ready_at
    }

    fn has_error(&self) -> bool {
        self.is_done() && self.failed
    }

    fn wait(&mut self) {
        self.waited = true;
    }

    fn data(&self) -> Bytes {
        if self.is_done() && !self.failed {
            self.data.clone()
        } else {
            Bytes::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Primitive;
    use contracts::SAMPLE_STRIDE;

    fn pass_for(rays: usize) -> CapturePass {
        // all rays on the horizon
        CapturePass {
            sensor_pose: Isometry3::identity(),
            camera_pose: Isometry3::identity(),
            start_azimuth_deg: -10.0,
            azimuth_step_deg: 10.0,
            sin_latitude: vec![1.0; rays].into(),
            cos_latitude: vec![0.0; rays].into(),
            vertical_bounds_deg: (-1.0, 1.0),
            max_half_angle_deg: 1.0,
            horizontal_half_angle_deg: 15.0,
            near_plane_half_width: 15f32.to_radians().tan(),
            pixels_per_unit: 3.0 / (2.0 * 15f32.to_radians().tan()),
            near_clip: 0.1,
            far_clip: 100.0,
        }
    }

    #[test]
    fn test_render_and_readback_latency() {
        let scene = Scene::new(vec![Primitive::sphere(Point3::origin(), 7.0, 0.25)]);
        let mut device = SimDevice::new(scene).with_latency(2);
        let target = device.create_target(3, 2);
        device.render(&target, &pass_for(2));

        let request = device.request_readback(&target);
        assert!(!request.is_done());
        device.advance_frame();
        assert!(!request.is_done());
        device.advance_frame();
        assert!(request.is_done());
        assert!(!request.has_error());

        let data = request.data();
        assert_eq!(data.len(), 3 * 2 * SAMPLE_STRIDE);
        let samples: Vec<PackedSample> = data
            .chunks_exact(SAMPLE_STRIDE)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert!(samples.iter().all(|s| (s.range - 7.0).abs() < 1e-4));
        assert!(samples.iter().all(|s| s.weight == 0.25));
    }

    #[test]
    fn test_render_clips_to_frustum_and_footprint() {
        let scene = Scene::new(vec![Primitive::sphere(Point3::origin(), 7.0, 0.25)]);
        let mut device = SimDevice::new(scene);
        let target = device.create_target(4, 2);

        // second ray points 30 degrees up, outside a 1 degree half angle;
        // the pass covers 3 of the 4 columns
        let mut pass = pass_for(2);
        let up = 60f32.to_radians();
        pass.sin_latitude = vec![1.0, up.sin()].into();
        pass.cos_latitude = vec![0.0, up.cos()].into();
        assert_eq!(pass.footprint_columns(), 3);
        device.render(&target, &pass);

        let data = device.request_readback(&target).data();
        let samples: Vec<PackedSample> = data
            .chunks_exact(SAMPLE_STRIDE)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        let hit: Vec<bool> = samples.iter().map(|s| s.range > 0.0).collect();
        assert_eq!(hit, vec![true, true, true, false, false, false, false, false]);
    }

    #[test]
    fn test_wait_completes_immediately() {
        let mut device = SimDevice::new(Scene::default()).with_latency(10);
        let target = device.create_target(1, 1);
        let mut request = device.request_readback(&target);
        assert!(!request.is_done());
        request.wait();
        assert!(request.is_done());
    }

    #[test]
    fn test_forced_failure() {
        let mut device = SimDevice::new(Scene::default());
        device.fail_readback(1);
        let target = device.create_target(1, 1);

        let ok = device.request_readback(&target);
        let bad = device.request_readback(&target);
        assert!(!ok.has_error());
        assert!(bad.has_error());
        assert!(bad.data().is_empty());
        assert_eq!(device.stats().failed_readbacks, 1);
    }

    #[test]
    fn test_device_loss_invalidates_targets() {
        let mut device = SimDevice::new(Scene::default());
        let old = device.create_target(4, 4);
        device.lose_device();
        assert!(!device.is_target_valid(&old));

        let fresh = device.create_target(4, 4);
        assert!(device.is_target_valid(&fresh));
        assert!(device.request_readback(&old).has_error());

        device.destroy_target(old);
        assert_eq!(device.live_targets(), 1);
    }
}
