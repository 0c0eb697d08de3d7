//! Pipeline orchestrator - ticks the sensor against the simulated device and
//! feeds the dispatcher.
//!
//! The tick loop is synchronous and runs on a blocking thread; finished
//! revolutions cross into the async side through a bounded channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{PointCloudFrame, PointCloudPublisher, SimulationBlueprint};
use dispatcher::ChannelPublisher;
use observability::ScanMetricsAggregator;
use scan_engine::{LidarSensor, TickInput};
use sim_device::{Scene, SimDevice};
use tracing::{debug, info, warn};

use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub blueprint: SimulationBlueprint,

    /// Wall-clock limit for the tick loop (None = run the full duration)
    pub timeout: Option<Duration>,

    /// Revolutions buffered between the sensor and the dispatcher
    pub buffer_size: usize,
}

/// Runs one simulation described by a blueprint
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run to completion, or until `stop` is raised
    pub async fn run(self, stop: Arc<AtomicBool>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = self.config.blueprint;

        let (channel, frame_rx) = ChannelPublisher::channel(self.config.buffer_size);

        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - revolutions will only be counted");
        }
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), frame_rx)
            .await
            .context("Failed to create dispatcher")?;
        let active_sinks = blueprint.sinks.len();
        let dispatcher_handle = dispatcher.spawn();
        info!(active_sinks, "Dispatcher started");

        if let Some(timeout) = self.config.timeout {
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if !stop.swap(true, Ordering::Relaxed) {
                    warn!(timeout_secs = timeout.as_secs(), "Pipeline timed out");
                }
            });
        }

        let mut stats = tokio::task::spawn_blocking(move || simulate(&blueprint, channel, &stop))
            .await
            .context("Tick loop panicked")??;

        // the publisher was dropped with the tick loop, so the dispatcher drains and exits
        match tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await {
            Ok(Ok(sinks)) => stats.sinks = sinks,
            Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!("Dispatcher did not drain within 5s"),
        }

        stats.active_sinks = active_sinks;
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            revolutions = stats.scan.revolutions_published,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Publisher used by the run loop: folds each revolution into the run
/// metrics before handing it to the dispatcher channel
struct RunPublisher {
    channel: ChannelPublisher,
    metrics: ScanMetricsAggregator,
}

impl PointCloudPublisher for RunPublisher {
    fn publish(&mut self, frame: PointCloudFrame) {
        self.metrics.update(&frame);
        debug!(
            sequence = frame.sequence,
            sim_time = frame.sim_time,
            valid = frame.valid_count(),
            "Revolution published"
        );
        self.channel.publish(frame);
    }
}

/// Tick loop
fn simulate(
    blueprint: &SimulationBlueprint,
    channel: ChannelPublisher,
    stop: &AtomicBool,
) -> Result<PipelineStats> {
    let run = &blueprint.run;
    let sensor_config = blueprint.resolved_sensor_config();

    let scene = Scene::from_config(&blueprint.scene);
    info!(
        primitives = scene.len(),
        latency_frames = run.readback_latency_frames,
        "Simulated device ready"
    );
    let mut device = SimDevice::new(scene).with_latency(run.readback_latency_frames);
    let mut sensor =
        LidarSensor::<SimDevice>::new(sensor_config).context("Failed to create lidar sensor")?;
    let mut publisher = RunPublisher {
        channel,
        metrics: ScanMetricsAggregator::new(),
    };

    let dt = 1.0 / run.tick_hz;
    let total_ticks = (run.duration_s * run.tick_hz).round() as u64;
    info!(
        sensor = %sensor.config().sensor_id,
        tick_hz = run.tick_hz,
        ticks = total_ticks,
        "Tick loop running"
    );

    let mut ticks = 0u64;
    for tick in 1..=total_ticks {
        if stop.load(Ordering::Relaxed) {
            info!(tick, "Stop requested");
            break;
        }
        device.advance_frame();
        let elapsed = tick as f64 * dt;
        sensor.tick(
            &mut device,
            &mut publisher,
            TickInput {
                dt,
                sim_time: run.start_time_s + elapsed,
                sensor_pose: blueprint.motion.pose_at(elapsed),
            },
        );
        ticks = tick;
    }

    sensor.flush(&mut device, &mut publisher);
    sensor.shutdown(&mut device);

    let dropped = publisher.channel.dropped();
    publisher.metrics.record_dropped(dropped);

    Ok(PipelineStats {
        ticks,
        sim_seconds: ticks as f64 * dt,
        scan: sensor.stats(),
        device: device.stats(),
        metrics: publisher.metrics,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{PrimitiveConfig, SinkConfig, SinkType};
    use std::collections::HashMap;

    fn blueprint(base_path: &std::path::Path) -> SimulationBlueprint {
        let mut blueprint: SimulationBlueprint = serde_json::from_str("{}").unwrap();
        blueprint.sensor.sensor_id = "roof".to_string();
        blueprint.sensor.laser_count = 4;
        blueprint.sensor.vertical_angles_deg.clear();
        blueprint.sensor.field_of_view_deg = 20.0;
        blueprint.sensor.center_angle_deg = 0.0;
        blueprint.sensor.rotation_frequency_hz = 10.0;
        blueprint.sensor.measurements_per_revolution = 360;
        blueprint.sensor.decode_threads = 2;
        blueprint.scene.primitives.push(PrimitiveConfig::Sphere {
            center: [0.0, 0.0, 0.0],
            radius: 15.0,
            reflectivity: 0.8,
        });
        blueprint.run.tick_hz = 120.0;
        blueprint.run.duration_s = 0.25;

        let mut params = HashMap::new();
        params.insert(
            "base_path".to_string(),
            base_path.to_string_lossy().to_string(),
        );
        blueprint.sinks.push(SinkConfig {
            name: "disk".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 8,
            params,
        });
        blueprint
    }

    #[tokio::test]
    async fn test_pipeline_writes_revolutions() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig {
            blueprint: blueprint(dir.path()),
            timeout: None,
            buffer_size: 8,
        });

        let stats = pipeline.run(Arc::new(AtomicBool::new(false))).await.unwrap();

        assert_eq!(stats.ticks, 30);
        assert!(stats.scan.revolutions_published >= 2);
        assert_eq!(stats.metrics.revolutions, stats.scan.revolutions_published);
        assert_eq!(stats.sinks.len(), 1);
        assert_eq!(
            stats.sinks[0].1.write_count,
            stats.scan.revolutions_published
        );
        assert!(dir.path().join("roof").join("000000.pcd").exists());
    }

    #[tokio::test]
    async fn test_pipeline_honours_stop_flag() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig {
            blueprint: blueprint(dir.path()),
            timeout: None,
            buffer_size: 8,
        });

        let stats = pipeline.run(Arc::new(AtomicBool::new(true))).await.unwrap();
        assert_eq!(stats.ticks, 0);
        assert_eq!(stats.scan.revolutions_published, 0);
    }
}
