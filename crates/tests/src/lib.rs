//! # Integration Tests
//!
//! Cross-crate scenarios driving `LidarSensor` against the simulated device.
//!
//! Covers:
//! - Full-revolution capture, transfer error cooldown, flat-plane export
//! - Device loss and reconfiguration mid-revolution
//! - Config file to sensor, sensor to dispatcher sinks

#[cfg(test)]
mod harness {
    use contracts::{LidarConfig, PointCloudFrame};
    use nalgebra::{Isometry3, Point3};
    use scan_engine::{LidarSensor, TickInput};
    use sim_device::{Primitive, Scene, SimDevice};

    /// 5 Hz at 120 ticks/s: one 15 degree window per tick, 24 per revolution
    pub const DT: f64 = 1.0 / 120.0;

    pub fn scan_config() -> LidarConfig {
        LidarConfig {
            sensor_id: "e2e_lidar".to_string(),
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

    pub fn sphere_scene(radius: f32) -> Scene {
        Scene::new(vec![Primitive::sphere(Point3::origin(), radius, 0.6)])
    }

    /// Sensor + device + collected revolutions, ticked like a host would
    pub struct Rig {
        pub device: SimDevice,
        pub sensor: LidarSensor<SimDevice>,
        pub frames: Vec<PointCloudFrame>,
        pub ticks: u64,
    }

    impl Rig {
        pub fn new(config: LidarConfig, scene: Scene) -> Self {
            Self {
                device: SimDevice::new(scene),
                sensor: LidarSensor::new(config).expect("sensor"),
                frames: Vec::new(),
                ticks: 0,
            }
        }

        pub fn tick(&mut self) {
            self.ticks += 1;
            self.device.advance_frame();
            let input = TickInput {
                dt: DT,
                sim_time: self.ticks as f64 * DT,
                sensor_pose: Isometry3::identity(),
            };
            self.sensor.tick(&mut self.device, &mut self.frames, input);
        }

        pub fn run(&mut self, ticks: usize) {
            for _ in 0..ticks {
                self.tick();
            }
        }

        pub fn flush(&mut self) {
            self.sensor.flush(&mut self.device, &mut self.frames);
        }
    }

    /// Points of the `DATA ascii` section as (x, y, z, intensity)
    pub fn parse_ascii_pcd(text: &str) -> Vec<[f32; 4]> {
        text.lines()
            .skip_while(|line| !line.starts_with("DATA"))
            .skip(1)
            .map(|line| {
                let mut values = line.split_whitespace().map(|v| v.parse::<f32>().unwrap());
                [
                    values.next().unwrap(),
                    values.next().unwrap(),
                    values.next().unwrap(),
                    values.next().unwrap(),
                ]
            })
            .collect()
    }

    /// Header of a PCD file (everything up to and including the DATA line)
    pub fn pcd_header(bytes: &[u8]) -> String {
        let end = bytes
            .windows(5)
            .position(|w| w == b"DATA ")
            .and_then(|start| {
                bytes[start..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map(|nl| start + nl)
            })
            .expect("DATA line");
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::harness::*;
    use contracts::pcd::PcdEncoding;
    use nalgebra::{Isometry3, Point3, Vector3};
    use sim_device::{Primitive, Scene};

    /// Unit sphere of 20 m around the sensor: one clean revolution
    #[test]
    fn test_full_revolution_has_no_sentinels() {
        let mut rig = Rig::new(scan_config(), sphere_scene(20.0));
        rig.run(24);
        rig.flush();

        assert_eq!(rig.frames.len(), 1);
        let frame = &rig.frames[0];
        assert_eq!(frame.points.len(), 8 * 360);
        assert_eq!(frame.valid_count(), 8 * 360);
        for point in frame.points.iter() {
            assert!((point.norm() - 20.0).abs() < 1e-3, "norm {}", point.norm());
            assert!((point.weight - 0.6).abs() < 1e-6);
        }

        let stats = rig.sensor.stats();
        assert_eq!(stats.windows_submitted, 24);
        assert_eq!(stats.readback_errors, 0);
        assert_eq!(stats.revolutions_published, 1);
    }

    /// Transfer error on window 3 arms a 20 ms cooldown: windows 3..=6 stay
    /// empty and no request is issued while cooling down
    #[test]
    fn test_transfer_error_cooldown() {
        let mut rig = Rig::new(scan_config(), sphere_scene(20.0));
        rig.device.fail_readback(3);

        rig.run(4);
        assert_eq!(rig.device.readback_count(), 4);

        for _ in 5..=7 {
            rig.tick();
            assert_eq!(rig.device.readback_count(), 4, "tick {}", rig.ticks);
            assert!(rig.sensor.is_cooling_down() || rig.ticks == 7);
        }

        rig.tick();
        assert_eq!(rig.device.readback_count(), 5);

        rig.run(16);
        rig.flush();

        assert_eq!(rig.frames.len(), 1);
        let frame = &rig.frames[0];
        for slot in 0..360 {
            let empty = frame.slot(slot).unwrap().iter().all(|p| p.is_sentinel());
            assert_eq!(empty, (45..105).contains(&slot), "slot {slot}");
        }

        let stats = rig.sensor.stats();
        assert_eq!(stats.readback_errors, 1);
        assert_eq!(stats.windows_skipped, 3);
        assert_eq!(stats.windows_submitted, 21);
    }

    /// Flat ground 3 m below a down-tilted sensor: every ray lands on it
    #[test]
    fn test_export_flat_plane() {
        const D: f32 = 3.0;
        let scene = Scene::new(vec![Primitive::plane(
            Vector3::z(),
            Point3::new(0.0, 0.0, -D),
            0.4,
        )]);
        let mut rig = Rig::new(
            contracts::LidarConfig {
                center_angle_deg: -20.0,
                ..scan_config()
            },
            scene,
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plane.pcd");
        assert!(rig.sensor.export_pcd(
            &mut rig.device,
            &path,
            &Isometry3::identity(),
            1.0,
            None,
            PcdEncoding::Ascii,
        ));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(&format!("POINTS {}", 8 * 360)));
        let points = parse_ascii_pcd(&text);
        assert_eq!(points.len(), 8 * 360);
        for [_, _, z, intensity] in points {
            assert!((z + D).abs() < 1e-2, "z {z}");
            assert!((intensity - 0.4).abs() < 1e-6);
        }

        // the ticking pipeline was not touched
        assert_eq!(rig.sensor.cursor(), 0);
        assert!(rig.frames.is_empty());
    }

    #[test]
    fn test_export_to_missing_directory_reports_failure() {
        let mut rig = Rig::new(scan_config(), sphere_scene(20.0));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("scan.pcd");

        assert!(!rig.sensor.export_pcd(
            &mut rig.device,
            &path,
            &Isometry3::identity(),
            0.0,
            None,
            PcdEncoding::Binary,
        ));
        assert!(!path.exists());
    }

    /// Losing the device drops the in-flight window only; the pool replaces
    /// the dead target and capture carries on
    #[test]
    fn test_device_loss_mid_revolution() {
        let mut rig = Rig::new(scan_config(), sphere_scene(20.0));
        rig.run(5);
        // window 4 (slots 60..75) is in flight
        rig.device.lose_device();
        rig.run(19);
        rig.flush();

        let stats = rig.sensor.stats();
        assert_eq!(stats.device_losses, 1);
        assert_eq!(stats.readback_errors, 0);
        assert!(!rig.sensor.is_cooling_down());

        assert_eq!(rig.frames.len(), 1);
        let frame = &rig.frames[0];
        assert_eq!(frame.valid_count(), 8 * (360 - 15));
        assert!(frame.slot(60).unwrap().iter().all(|p| p.is_sentinel()));
        assert!(frame.slot(75).unwrap().iter().all(|p| !p.is_sentinel()));
        assert!(rig.device.stats().targets_created >= 2);
    }

    /// Changing the slot count mid-revolution restarts the revolution with
    /// the new layout; publication numbering carries on
    #[test]
    fn test_reconfiguration_mid_revolution() {
        let mut rig = Rig::new(scan_config(), sphere_scene(20.0));
        rig.run(10);

        rig.sensor.set_config(contracts::LidarConfig {
            measurements_per_revolution: 720,
            ..scan_config()
        });
        rig.run(24);
        rig.flush();

        assert_eq!(rig.sensor.stats().resets, 1);
        assert_eq!(rig.frames.len(), 1);
        let frame = &rig.frames[0];
        assert_eq!(frame.measurements_per_revolution, 720);
        assert_eq!(frame.points.len(), 8 * 720);
        assert_eq!(frame.valid_count(), 8 * 720);
        assert_eq!(frame.sequence, 0);
    }
}

#[cfg(test)]
mod config_tests {
    use super::harness::DT;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::PointCloudFrame;
    use nalgebra::Point3;
    use observability::ScanMetricsAggregator;
    use scan_engine::{LidarSensor, TickInput};
    use sim_device::{Scene, SimDevice};

    const SCENARIO_TOML: &str = r#"
[sensor]
sensor_id = "mast"
laser_count = 16
field_of_view_deg = 30.0
center_angle_deg = 0.0
rotation_frequency_hz = 10.0
measurements_per_revolution = 720
window_angle_deg = 15.0
decode_threads = 2

[[scene.primitives]]
kind = "sphere"
center = [0.0, 0.0, 1.8]
radius = 10.0
reflectivity = 0.7

[motion.mount.location]
x = 0.0
y = 0.0
z = 1.8
[motion.mount.rotation]
pitch = 0.0
yaw = 0.0
roll = 0.0

[run]
tick_hz = 240.0
duration_s = 0.25
"#;

    #[test]
    fn test_blueprint_drives_sensor() {
        let blueprint = ConfigLoader::load_from_str(SCENARIO_TOML, ConfigFormat::Toml).unwrap();
        let config = blueprint.resolved_sensor_config();
        assert_eq!(config.slots_per_window(), 30);
        assert_eq!(config.windows_per_revolution(), 24);

        let mut device = SimDevice::new(Scene::from_config(&blueprint.scene))
            .with_latency(blueprint.run.readback_latency_frames);
        let mut sensor = LidarSensor::<SimDevice>::new(config).unwrap();
        let mut frames: Vec<PointCloudFrame> = Vec::new();

        let dt = 1.0 / blueprint.run.tick_hz;
        assert!((dt - DT / 2.0).abs() < 1e-12);
        let ticks = (blueprint.run.duration_s * blueprint.run.tick_hz).round() as u64;
        for tick in 1..=ticks {
            device.advance_frame();
            let elapsed = tick as f64 * dt;
            sensor.tick(
                &mut device,
                &mut frames,
                TickInput {
                    dt,
                    sim_time: elapsed,
                    sensor_pose: blueprint.motion.pose_at(elapsed),
                },
            );
        }
        sensor.flush(&mut device, &mut frames);

        assert_eq!(frames.len(), 2);
        let center = Point3::new(0.0, 0.0, 1.8);
        let mut metrics = ScanMetricsAggregator::new();
        for frame in &frames {
            assert_eq!(frame.sensor_id, "mast");
            assert_eq!(frame.valid_count(), 16 * 720);
            for p in frame.valid_points() {
                let distance = (Point3::new(p.x, p.y, p.z) - center).norm();
                assert!((distance - 10.0).abs() < 1e-2);
            }
            metrics.update(frame);
        }

        let summary = metrics.summary();
        assert_eq!(summary.revolutions, 2);
        assert!((summary.revolution_period_s.mean - 0.1).abs() < 1e-6);
        assert_eq!(summary.sentinel_ratio.max, 0.0);
    }

    #[test]
    fn test_invalid_blueprint_rejected() {
        let broken = SCENARIO_TOML.replace("radius = 10.0", "radius = -1.0");
        assert!(ConfigLoader::load_from_str(&broken, ConfigFormat::Toml).is_err());
    }
}

#[cfg(test)]
mod dispatch_tests {
    use std::collections::HashMap;

    use contracts::{SinkConfig, SinkType};
    use dispatcher::{create_dispatcher, ChannelPublisher};
    use nalgebra::Isometry3;
    use scan_engine::{LidarSensor, TickInput};
    use sim_device::SimDevice;

    use super::harness::*;

    /// Tick loop on a blocking thread -> channel -> dispatcher -> PCD files
    #[tokio::test]
    async fn test_sensor_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = HashMap::new();
        params.insert(
            "base_path".to_string(),
            dir.path().to_string_lossy().to_string(),
        );
        let sinks = vec![
            SinkConfig {
                name: "disk".to_string(),
                sink_type: SinkType::File,
                queue_capacity: 4,
                params,
            },
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 4,
                params: HashMap::new(),
            },
        ];

        let (publisher, rx) = ChannelPublisher::channel(4);
        let dispatcher = create_dispatcher(sinks, rx).await.unwrap();
        let dispatcher_handle = dispatcher.spawn();

        let dropped = tokio::task::spawn_blocking(move || {
            let mut publisher = publisher;
            let mut device = SimDevice::new(sphere_scene(20.0));
            let mut sensor = LidarSensor::<SimDevice>::new(scan_config()).unwrap();
            for tick in 1..=48u64 {
                device.advance_frame();
                sensor.tick(
                    &mut device,
                    &mut publisher,
                    TickInput {
                        dt: DT,
                        sim_time: tick as f64 * DT,
                        sensor_pose: Isometry3::identity(),
                    },
                );
            }
            sensor.flush(&mut device, &mut publisher);
            sensor.shutdown(&mut device);
            publisher.dropped()
        })
        .await
        .unwrap();
        assert_eq!(dropped, 0);

        let report = dispatcher_handle.await.unwrap();
        for (name, snapshot) in &report {
            assert_eq!(snapshot.write_count, 2, "sink {name}");
            assert_eq!(snapshot.last_sequence, Some(1));
        }

        for sequence in 0..2 {
            let path = dir
                .path()
                .join("e2e_lidar")
                .join(format!("{sequence:06}.pcd"));
            let bytes = std::fs::read(&path).unwrap();
            let header = pcd_header(&bytes);
            assert!(header.contains("POINTS 2880"));
            assert!(header.ends_with("DATA binary"));
            assert_eq!(bytes.len(), header.len() + 1 + 2880 * 16);
        }
    }
}
