//! Rotating LiDAR sensor
//!
//! `LidarSensor` owns the per-sensor state (configuration snapshot, cursor,
//! cooldown, pools, point buffer) and advances it one tick at a time. The
//! ticking path only polls; `flush`, `capture_snapshot` and the export
//! operations block on the device and on the decode pool. A reset waits out
//! outstanding work the same way, which is safe on any thread.

use std::path::Path;
use std::sync::Arc;

use contracts::pcd::{write_pcd_file, PcdEncoding};
use contracts::{
    ContractError, LidarConfig, OutputFrame, PointCloudFrame, PointCloudPublisher,
    ReadbackDevice, ReadbackRequest, ScanPoint, SceneRenderer,
};
use nalgebra::Isometry3;
use observability::SkipReason;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::{CaptureScheduler, WindowMeta, WindowPlan};
use crate::decode::{DecodeParams, Decoder};
use crate::error::{Result, ScanError};
use crate::geometry::ScanGeometry;
use crate::pipeline::{CaptureRequest, DrainContext, ReadbackPipeline, TransferMode};
use crate::pool::{RenderTargetPool, StagingPool};
use crate::stats::ScanStats;

/// Host-provided input of one simulation tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    /// Simulated seconds since the previous tick
    pub dt: f64,
    /// Simulation time at the end of this tick (seconds)
    pub sim_time: f64,
    /// Sensor pose in world
    pub sensor_pose: Isometry3<f32>,
}

/// Simulated spinning LiDAR
pub struct LidarSensor<B: ReadbackDevice> {
    /// Live configuration, compared against `snapshot` each tick
    config: LidarConfig,
    /// Configuration of the current epoch
    snapshot: LidarConfig,
    geometry: Arc<ScanGeometry>,
    params: DecodeParams,
    scheduler: CaptureScheduler,
    pipeline: ReadbackPipeline<B::Request>,
    targets: RenderTargetPool,
    staging: StagingPool,
    decoder: Decoder,
    decoder_threads: usize,
    points: Vec<ScanPoint>,
    sequence: u64,
    tick: u64,
    stats: ScanStats,
}

impl<B: ReadbackDevice> std::fmt::Debug for LidarSensor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LidarSensor")
            .field("sensor_id", &self.snapshot.sensor_id)
            .field("cursor", &self.scheduler.cursor())
            .field("pipeline", &self.pipeline)
            .field("sequence", &self.sequence)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<B> LidarSensor<B>
where
    B: SceneRenderer + ReadbackDevice,
{
    /// Build a sensor for `config`
    ///
    /// Fails only when the decode worker pool cannot be created.
    pub fn new(config: LidarConfig) -> Result<Self> {
        let decoder = Decoder::new(config.decode_threads)?;
        let geometry = Arc::new(ScanGeometry::from_config(&config));
        warn_if_degenerate(&config, &geometry);

        info!(
            sensor = %config.sensor_id,
            lasers = geometry.laser_count,
            mpr = config.measurements_per_revolution,
            slots_per_window = geometry.slots_per_window,
            decode_threads = decoder.threads(),
            "lidar sensor created"
        );

        Ok(Self {
            params: DecodeParams::from_config(&config),
            scheduler: CaptureScheduler::new(&config),
            pipeline: ReadbackPipeline::new(config.max_in_flight_readbacks),
            targets: RenderTargetPool::new(),
            staging: StagingPool::new(),
            decoder_threads: config.decode_threads,
            decoder,
            points: vec![ScanPoint::SENTINEL; config.point_capacity()],
            geometry,
            snapshot: config.clone(),
            config,
            sequence: 0,
            tick: 0,
            stats: ScanStats::default(),
        })
    }

    /// Live configuration
    pub fn config(&self) -> &LidarConfig {
        &self.config
    }

    /// Replace the live configuration; the next tick resets if it differs
    pub fn set_config(&mut self, config: LidarConfig) {
        self.config = config;
    }

    /// Geometry of the current epoch
    pub fn geometry(&self) -> &ScanGeometry {
        &self.geometry
    }

    /// Point buffer as decoded so far
    ///
    /// Mid-revolution the buffer mixes the current and previous revolution.
    pub fn points(&self) -> &[ScanPoint] {
        &self.points
    }

    pub fn valid_point_count(&self) -> usize {
        self.points.iter().filter(|p| !p.is_sentinel()).count()
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Next slot to be captured
    pub fn cursor(&self) -> usize {
        self.scheduler.cursor()
    }

    /// Sequence number the next published revolution will carry
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_cooling_down(&self) -> bool {
        self.scheduler.is_cooling_down()
    }

    /// Transfers and decodes still outstanding
    pub fn in_flight(&self) -> (usize, usize) {
        (
            self.pipeline.pending_readbacks(),
            self.pipeline.pending_decodes(),
        )
    }

    /// Advance the sensor by one simulation tick
    ///
    /// Never blocks and never fails: transfer errors, device loss and
    /// decode failures degrade the affected windows only.
    #[instrument(
        level = "trace",
        skip_all,
        fields(sensor = %self.snapshot.sensor_id, tick = self.tick + 1)
    )]
    pub fn tick<P>(&mut self, backend: &mut B, publisher: &mut P, input: TickInput)
    where
        P: PointCloudPublisher + ?Sized,
    {
        self.tick += 1;

        if self.config != self.snapshot {
            info!(sensor = %self.config.sensor_id, "configuration changed, resetting");
            self.reset(backend);
        }

        self.drain_readbacks(backend, TransferMode::Poll);
        self.complete_decodes(publisher, TransferMode::Poll);
        self.schedule(backend, &input);
        self.scheduler.decay_cooldown(input.dt);
    }

    /// Block until every outstanding transfer and decode has resolved,
    /// publishing any revolution that closes on the way
    pub fn flush<P>(&mut self, backend: &mut B, publisher: &mut P)
    where
        P: PointCloudPublisher + ?Sized,
    {
        while !self.pipeline.is_idle() {
            self.drain_readbacks(backend, TransferMode::Block);
            self.complete_decodes(publisher, TransferMode::Block);
        }
    }

    /// Tear the pipeline down and rebuild it from the live configuration
    ///
    /// Outstanding transfers and decodes are waited out and dropped, pooled
    /// targets destroyed, geometry recomputed and the point buffer
    /// reallocated.
    #[instrument(skip_all, fields(sensor = %self.config.sensor_id))]
    pub fn reset(&mut self, backend: &mut B) {
        let dropped = self
            .pipeline
            .cancel_all(backend, &mut self.targets, &mut self.staging);
        self.targets.clear(backend);
        self.staging.clear();

        if self.config.decode_threads != self.decoder_threads {
            match Decoder::new(self.config.decode_threads) {
                Ok(decoder) => {
                    self.decoder = decoder;
                    self.decoder_threads = self.config.decode_threads;
                }
                Err(e) => warn!(error = %e, "keeping previous decode pool"),
            }
        }

        self.snapshot = self.config.clone();
        self.geometry = Arc::new(ScanGeometry::from_config(&self.snapshot));
        self.params = DecodeParams::from_config(&self.snapshot);
        self.scheduler = CaptureScheduler::new(&self.snapshot);
        self.pipeline = ReadbackPipeline::new(self.snapshot.max_in_flight_readbacks);
        self.points = vec![ScanPoint::SENTINEL; self.snapshot.point_capacity()];
        self.stats.resets += 1;

        warn_if_degenerate(&self.snapshot, &self.geometry);
        debug!(
            dropped,
            lasers = self.geometry.laser_count,
            capacity = self.points.len(),
            "pipeline reset"
        );
    }

    /// Wait out all outstanding work and release device resources
    pub fn shutdown(&mut self, backend: &mut B) {
        let dropped = self
            .pipeline
            .cancel_all(backend, &mut self.targets, &mut self.staging);
        self.targets.clear(backend);
        self.staging.clear();
        info!(
            sensor = %self.snapshot.sensor_id,
            dropped,
            stats = %self.stats,
            "lidar sensor shut down"
        );
    }

    /// Capture one full revolution synchronously at a fixed pose
    ///
    /// Uses a private queue and buffer so the ticking pipeline is left
    /// untouched; transfer errors drop their window but arm no cooldown.
    /// `frame` overrides the configured output frame.
    #[instrument(skip_all, fields(sensor = %self.config.sensor_id))]
    pub fn capture_snapshot(
        &mut self,
        backend: &mut B,
        sensor_pose: &Isometry3<f32>,
        sim_time: f64,
        frame: Option<OutputFrame>,
    ) -> Result<PointCloudFrame> {
        if self.config != self.snapshot {
            self.reset(backend);
        }

        let lasers = self.geometry.laser_count;
        let mpr = self.snapshot.measurements_per_revolution as usize;
        let slots_per_window = self.geometry.slots_per_window;
        if lasers == 0 || mpr == 0 || slots_per_window == 0 {
            return Err(ScanError::degenerate(format!(
                "{lasers} lasers, {mpr} measurements, {slots_per_window} slots per window"
            )));
        }
        if !self.snapshot.has_usable_range() {
            return Err(ScanError::degenerate(format!(
                "range [{}, {}] is unusable",
                self.snapshot.min_distance_m, self.snapshot.max_distance_m
            )));
        }

        let frame = frame.unwrap_or(self.params.frame);
        let params = self.params.with_frame(frame);
        let mut pipeline = ReadbackPipeline::<B::Request>::new(1);
        let mut buffer = vec![ScanPoint::SENTINEL; self.points.len()];
        let mut windows = 0usize;

        for (index, start_slot) in (0..mpr).step_by(slots_per_window).enumerate() {
            let slot_count = slots_per_window.min(mpr - start_slot);
            let meta = WindowMeta {
                index: index as u64,
                start_slot,
                slot_count,
                sim_time,
                sensor_pose: *sensor_pose,
                closes_revolution: start_slot + slot_count >= mpr,
                submitted_tick: self.tick,
            };
            let request = submit_capture(
                backend,
                &mut self.targets,
                &self.geometry,
                &self.snapshot,
                meta,
            );
            if let Err(mut rejected) = pipeline.submit(request) {
                rejected.transfer.wait();
                self.targets.release(rejected.target);
                continue;
            }

            let mut ctx = DrainContext {
                renderer: &mut *backend,
                targets: &mut self.targets,
                staging: &mut self.staging,
                decoder: &self.decoder,
                geometry: &self.geometry,
                params,
                tick: self.tick,
            };
            let report = pipeline.drain_readbacks(TransferMode::Block, &mut ctx);
            self.stats.readback_errors += report.transfer_errors as u64;
            self.stats.device_losses += report.device_losses as u64;
            windows += report.decodes_launched;
        }

        let report = pipeline.complete_decodes(
            TransferMode::Block,
            &mut self.staging,
            &mut buffer,
            lasers,
            |_, _| {},
        );
        self.stats.decode_failures += report.failures as u64;

        let cloud = PointCloudFrame {
            sensor_id: self.snapshot.sensor_id.clone(),
            sequence: self.sequence,
            sim_time,
            timestamp_ms: PointCloudFrame::hour_timestamp_ms(sim_time),
            frame,
            sensor_pose: *sensor_pose,
            laser_count: lasers as u32,
            measurements_per_revolution: mpr as u32,
            points: buffer.into(),
        };
        info!(
            windows,
            committed = report.committed,
            valid = cloud.valid_count(),
            "snapshot captured"
        );
        Ok(cloud)
    }

    /// Capture a snapshot and write its valid points to a PCD file
    ///
    /// Returns the number of points written.
    pub fn try_export_pcd(
        &mut self,
        backend: &mut B,
        path: &Path,
        sensor_pose: &Isometry3<f32>,
        sim_time: f64,
        frame: Option<OutputFrame>,
        encoding: PcdEncoding,
    ) -> Result<usize> {
        let cloud = self.capture_snapshot(backend, sensor_pose, sim_time, frame)?;
        let viewpoint = match cloud.frame {
            OutputFrame::World => Some(&cloud.sensor_pose),
            OutputFrame::Sensor => None,
        };
        let written = write_pcd_file(path, &cloud.points, encoding, viewpoint)
            .map_err(|e| ContractError::export(path.display().to_string(), e.to_string()))?;
        info!(path = %path.display(), points = written, "point cloud exported");
        Ok(written)
    }

    /// Boolean variant of [`try_export_pcd`](Self::try_export_pcd); failures
    /// are logged
    pub fn export_pcd(
        &mut self,
        backend: &mut B,
        path: &Path,
        sensor_pose: &Isometry3<f32>,
        sim_time: f64,
        frame: Option<OutputFrame>,
        encoding: PcdEncoding,
    ) -> bool {
        match self.try_export_pcd(backend, path, sensor_pose, sim_time, frame, encoding) {
            Ok(_) => true,
            Err(e) => {
                error!(path = %path.display(), error = %e, "point cloud export failed");
                false
            }
        }
    }

    fn drain_readbacks(&mut self, backend: &mut B, mode: TransferMode) {
        let mut ctx = DrainContext {
            renderer: backend,
            targets: &mut self.targets,
            staging: &mut self.staging,
            decoder: &self.decoder,
            geometry: &self.geometry,
            params: self.params,
            tick: self.tick,
        };
        let report = self.pipeline.drain_readbacks(mode, &mut ctx);

        let sensor_id = self.snapshot.sensor_id.as_str();
        for &latency in &report.latencies {
            observability::record_readback_latency(sensor_id, latency);
        }
        for _ in 0..report.device_losses {
            observability::record_device_loss(sensor_id);
        }
        self.stats.device_losses += report.device_losses as u64;

        if report.transfer_errors > 0 {
            for _ in 0..report.transfer_errors {
                observability::record_readback_error(sensor_id);
            }
            self.stats.readback_errors += report.transfer_errors as u64;
            self.scheduler.arm_cooldown();
            warn!(
                sensor = sensor_id,
                errors = report.transfer_errors,
                cooldown_s = self.scheduler.cooldown_remaining_s(),
                "readback error, capture suspended"
            );
        }
    }

    fn complete_decodes<P>(&mut self, publisher: &mut P, mode: TransferMode)
    where
        P: PointCloudPublisher + ?Sized,
    {
        let lasers = self.geometry.laser_count;
        let snapshot = &self.snapshot;
        let frame = self.params.frame;
        let sequence = &mut self.sequence;
        let stats = &mut self.stats;

        let report = self.pipeline.complete_decodes(
            mode,
            &mut self.staging,
            &mut self.points,
            lasers,
            |meta, points| {
                if !meta.closes_revolution {
                    return;
                }
                let cloud = assemble_revolution(snapshot, frame, *sequence, meta, points);
                observability::record_revolution_published(&cloud);
                debug!(
                    sensor = %cloud.sensor_id,
                    revolution = cloud.sequence,
                    sim_time = cloud.sim_time,
                    "revolution published"
                );
                publisher.publish(cloud);
                *sequence += 1;
                stats.revolutions_published += 1;
            },
        );

        self.stats.windows_decoded += report.committed as u64;
        if report.failures > 0 {
            for _ in 0..report.failures {
                observability::record_decode_failure(&self.snapshot.sensor_id);
            }
            self.stats.decode_failures += report.failures as u64;
        }
    }

    fn schedule(&mut self, backend: &mut B, input: &TickInput) {
        self.scheduler.accumulate(input.dt);
        let degenerate = self.geometry.laser_count == 0 || !self.snapshot.has_usable_range();

        while let Some(plan) = self.scheduler.next_window() {
            let skip = if plan.slot_count == 0 || degenerate {
                Some(SkipReason::Degenerate)
            } else if self.scheduler.is_cooling_down() {
                Some(SkipReason::Cooldown)
            } else if !self.pipeline.has_capacity() {
                Some(SkipReason::QueueFull)
            } else {
                None
            };

            if let Some(reason) = skip {
                self.skip_window(&plan, reason);
                continue;
            }

            let meta = WindowMeta {
                index: plan.index,
                start_slot: plan.start_slot,
                slot_count: plan.slot_count,
                sim_time: input.sim_time - plan.time_offset_s,
                sensor_pose: input.sensor_pose,
                closes_revolution: plan.closes_revolution,
                submitted_tick: self.tick,
            };
            let request = submit_capture(
                backend,
                &mut self.targets,
                &self.geometry,
                &self.snapshot,
                meta,
            );
            if let Err(mut rejected) = self.pipeline.submit(request) {
                rejected.transfer.wait();
                self.targets.release(rejected.target);
                self.skip_window(&plan, SkipReason::QueueFull);
                continue;
            }

            self.stats.windows_submitted += 1;
            observability::record_window_submitted(&self.snapshot.sensor_id);
        }
    }

    fn skip_window(&mut self, plan: &WindowPlan, reason: SkipReason) {
        self.stats.windows_skipped += 1;
        observability::record_window_skipped(&self.snapshot.sensor_id, reason);
        match reason {
            SkipReason::QueueFull => warn!(
                window = plan.index,
                slot = plan.start_slot,
                "readback queue full, window skipped"
            ),
            _ => debug!(
                window = plan.index,
                slot = plan.start_slot,
                reason = reason.as_str(),
                "window skipped"
            ),
        }
    }
}

/// Acquire a target, render the window into it and request its readback
fn submit_capture<B>(
    backend: &mut B,
    targets: &mut RenderTargetPool,
    geometry: &ScanGeometry,
    config: &LidarConfig,
    meta: WindowMeta,
) -> CaptureRequest<B::Request>
where
    B: SceneRenderer + ReadbackDevice,
{
    let target = targets.acquire(
        backend,
        geometry.slots_per_window as u32,
        geometry.laser_count as u32,
    );
    let pass = geometry.capture_pass(
        &meta.sensor_pose,
        meta.start_slot,
        meta.slot_count,
        config.min_distance_m,
        config.max_distance_m,
    );
    backend.orient_camera(&pass.camera_pose);
    backend.render(&target, &pass);
    let transfer = backend.request_readback(&target);

    CaptureRequest {
        meta,
        target,
        transfer,
    }
}

/// Frame for a revolution closed by `meta`
fn assemble_revolution(
    config: &LidarConfig,
    frame: OutputFrame,
    sequence: u64,
    meta: &WindowMeta,
    points: &[ScanPoint],
) -> PointCloudFrame {
    PointCloudFrame {
        sensor_id: config.sensor_id.clone(),
        sequence,
        sim_time: meta.sim_time,
        timestamp_ms: PointCloudFrame::hour_timestamp_ms(meta.sim_time),
        frame,
        sensor_pose: meta.sensor_pose,
        laser_count: config.effective_laser_count() as u32,
        measurements_per_revolution: config.measurements_per_revolution,
        points: Arc::from(points),
    }
}

fn warn_if_degenerate(config: &LidarConfig, geometry: &ScanGeometry) {
    if geometry.laser_count == 0 || geometry.slots_per_window == 0 || !config.has_usable_range() {
        warn!(
            sensor = %config.sensor_id,
            lasers = geometry.laser_count,
            slots_per_window = geometry.slots_per_window,
            min_distance_m = config.min_distance_m,
            max_distance_m = config.max_distance_m,
            "configuration produces no capture windows"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use sim_device::{Primitive, Scene, SimDevice};

    const DT: f64 = 1.0 / 120.0;

    fn config() -> LidarConfig {
        LidarConfig {
            sensor_id: "test_lidar".to_string(),
            laser_count: 8,
            field_of_view_deg: 20.0,
            center_angle_deg: 0.0,
            min_distance_m: 0.5,
            max_distance_m: 100.0,
            rotation_frequency_hz: 5.0,
            measurements_per_revolution: 360,
            window_angle_deg: 15.0,
            readback_error_cooldown_s: 0.02,
            decode_threads: 2,
            ..Default::default()
        }
    }

    fn device() -> SimDevice {
        SimDevice::new(Scene::new(vec![Primitive::sphere(
            Point3::origin(),
            20.0,
            0.6,
        )]))
    }

    struct Run {
        device: SimDevice,
        sensor: LidarSensor<SimDevice>,
        frames: Vec<PointCloudFrame>,
        time: f64,
    }

    impl Run {
        fn new(config: LidarConfig) -> Self {
            Self {
                device: device(),
                sensor: LidarSensor::new(config).unwrap(),
                frames: Vec::new(),
                time: 0.0,
            }
        }

        fn ticks(&mut self, n: usize) {
            for _ in 0..n {
                self.device.advance_frame();
                self.time += DT;
                let input = TickInput {
                    dt: DT,
                    sim_time: self.time,
                    sensor_pose: Isometry3::identity(),
                };
                self.sensor.tick(&mut self.device, &mut self.frames, input);
            }
        }

        fn flush(&mut self) {
            self.sensor.flush(&mut self.device, &mut self.frames);
        }
    }

    #[test]
    fn test_revolutions_carry_sequence_and_time() {
        let mut run = Run::new(config());
        run.ticks(48);
        run.flush();

        assert_eq!(run.frames.len(), 2);
        assert_eq!(run.frames[0].sequence, 0);
        assert_eq!(run.frames[1].sequence, 1);
        assert!((run.frames[0].sim_time - 0.2).abs() < 1e-9);
        assert!((199..=200).contains(&run.frames[0].timestamp_ms));
        assert_eq!(run.frames[0].points.len(), 360 * 8);
        assert_eq!(run.frames[0].frame, OutputFrame::World);

        let stats = run.sensor.stats();
        assert_eq!(stats.windows_submitted, 48);
        assert_eq!(stats.windows_decoded, 48);
        assert_eq!(stats.revolutions_published, 2);
        assert_eq!(run.sensor.sequence(), 2);
    }

    #[test]
    fn test_degenerate_config_issues_no_requests() {
        // 120 degree slots never fit a 15 degree window
        let mut run = Run::new(LidarConfig {
            measurements_per_revolution: 3,
            ..config()
        });
        run.ticks(24);

        assert_eq!(run.device.readback_count(), 0);
        assert_eq!(run.sensor.stats().windows_submitted, 0);
        assert_eq!(run.sensor.stats().windows_skipped, 24);
        assert!(run.frames.is_empty());
    }

    #[test]
    fn test_unusable_range_issues_no_requests() {
        let mut run = Run::new(LidarConfig {
            min_distance_m: 10.0,
            max_distance_m: 5.0,
            ..config()
        });
        run.ticks(12);
        assert_eq!(run.device.readback_count(), 0);

        let err = run
            .sensor
            .capture_snapshot(&mut run.device, &Isometry3::identity(), 0.0, None)
            .unwrap_err();
        assert!(matches!(err, ScanError::DegenerateConfig { .. }));
    }

    #[test]
    fn test_reconfiguration_resets_pipeline() {
        let mut run = Run::new(config());
        run.ticks(6);

        // unchanged values do not reset
        run.sensor.set_config(config());
        run.ticks(1);
        assert_eq!(run.sensor.stats().resets, 0);

        run.sensor.set_config(LidarConfig {
            laser_count: 16,
            ..config()
        });
        run.ticks(1);

        assert_eq!(run.sensor.stats().resets, 1);
        assert_eq!(run.sensor.geometry().laser_count, 16);
        assert_eq!(run.sensor.points().len(), 360 * 16);
        // reset restarts the revolution; one window went out this tick
        assert_eq!(run.sensor.cursor(), 15);
    }

    #[test]
    fn test_reset_twice_yields_identical_geometry() {
        let mut run = Run::new(LidarConfig {
            vertical_angles_deg: vec![-15.0, -7.5, 0.0, 4.0, 11.0],
            ..config()
        });
        run.sensor.reset(&mut run.device);
        let first = run.sensor.geometry().clone();
        run.sensor.reset(&mut run.device);

        assert_eq!(&first, run.sensor.geometry());
        assert_eq!(first.laser_count, 5);
    }

    #[test]
    fn test_snapshot_leaves_live_state_alone() {
        let mut run = Run::new(config());
        run.device.fail_readback(0);

        let cloud = run
            .sensor
            .capture_snapshot(
                &mut run.device,
                &Isometry3::identity(),
                1.0,
                Some(OutputFrame::Sensor),
            )
            .unwrap();

        // first window failed, the other 23 are complete
        assert_eq!(cloud.valid_count(), 23 * 15 * 8);
        assert!(cloud.slot(0).unwrap().iter().all(ScanPoint::is_sentinel));
        assert_eq!(cloud.frame, OutputFrame::Sensor);
        assert!(!run.sensor.is_cooling_down());
        assert_eq!(run.sensor.valid_point_count(), 0);
        assert_eq!(run.sensor.stats().readback_errors, 1);
        // one pair recycled across all windows
        assert_eq!(run.device.stats().targets_created, 1);
    }

    #[test]
    fn test_export_failure_is_boolean() {
        let dir = tempfile::tempdir().unwrap();
        let mut run = Run::new(config());
        let pose = Isometry3::identity();

        let missing = dir.path().join("missing").join("scan.pcd");
        assert!(!run.sensor.export_pcd(
            &mut run.device,
            &missing,
            &pose,
            0.0,
            None,
            PcdEncoding::Binary
        ));

        let path = dir.path().join("scan.pcd");
        assert!(run
            .sensor
            .export_pcd(&mut run.device, &path, &pose, 0.0, None, PcdEncoding::Ascii));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(&format!("POINTS {}", 360 * 8)));
    }

    #[tokio::test]
    async fn test_reconfigure_with_work_in_flight_inside_runtime() {
        let mut run = Run::new(config());
        for _ in 0..48 {
            run.ticks(1);
            if run.sensor.in_flight().1 > 0 {
                break;
            }
        }
        assert_ne!(run.sensor.in_flight(), (0, 0));

        run.sensor.set_config(LidarConfig {
            laser_count: 16,
            ..config()
        });
        run.ticks(1);

        assert_eq!(run.sensor.stats().resets, 1);
        assert_eq!(run.sensor.points().len(), 360 * 16);
        run.sensor.shutdown(&mut run.device);
        assert_eq!(run.sensor.in_flight(), (0, 0));
    }

    #[test]
    fn test_shutdown_releases_targets() {
        let mut run = Run::new(config());
        run.ticks(10);
        assert!(run.device.live_targets() > 0);

        run.sensor.shutdown(&mut run.device);
        assert_eq!(run.sensor.in_flight(), (0, 0));
        assert_eq!(run.device.live_targets(), 0);
    }
}
