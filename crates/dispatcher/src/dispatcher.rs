//! Dispatcher - fans published revolutions out to sinks

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{PointCloudFrame, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<PointCloudFrame>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<PointCloudFrame>) -> Self {
        Self { config, input_rx }
    }

    /// Create every configured sink and start its worker
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut handles = Vec::with_capacity(self.config.sinks.len());
        for sink_config in &self.config.sinks {
            handles.push(create_sink_handle(sink_config)?);
        }

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }
}

#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Fans every revolution received on the input channel out to all sinks
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<PointCloudFrame>,
}

impl Dispatcher {
    /// Create a dispatcher around prebuilt sink handles
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: mpsc::Receiver<PointCloudFrame>,
    ) -> Self {
        Self { handles, input_rx }
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run until the input channel closes, then drain and close every sink
    ///
    /// Returns the final per-sink metrics.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> Vec<(String, MetricsSnapshot)> {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut frame_count: u64 = 0;

        while let Some(frame) = self.input_rx.recv().await {
            frame_count += 1;
            self.dispatch_frame(frame);

            if frame_count.is_multiple_of(100) {
                debug!(frames = frame_count, "Dispatcher progress");
            }
        }

        info!(
            frames = frame_count,
            "Dispatcher input closed, shutting down"
        );

        let mut report = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let metrics = std::sync::Arc::clone(handle.metrics());
            let name = handle.name().to_string();
            handle.shutdown().await;
            report.push((name, metrics.snapshot()));
        }

        info!("Dispatcher shutdown complete");
        report
    }

    pub fn spawn(self) -> JoinHandle<Vec<(String, MetricsSnapshot)>> {
        tokio::spawn(self.run())
    }

    fn dispatch_frame(&self, frame: PointCloudFrame) {
        // points are shared, cloning per sink only bumps a refcount
        for handle in &self.handles {
            // rejections are already counted and logged by the handle
            let _ = handle.try_send(frame.clone());
        }
    }
}

/// Build a dispatcher straight from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<PointCloudFrame>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{OutputFrame, ScanPoint};
    use nalgebra::Isometry3;
    use std::collections::HashMap;

    fn revolution(sequence: u64) -> PointCloudFrame {
        PointCloudFrame {
            sensor_id: "roof".to_string(),
            sequence,
            sim_time: 0.2 * (sequence + 1) as f64,
            timestamp_ms: 0,
            frame: OutputFrame::World,
            sensor_pose: Isometry3::identity(),
            laser_count: 1,
            measurements_per_revolution: 3,
            points: vec![
                ScanPoint::new(1.0, 0.0, 0.0, 0.5),
                ScanPoint::default(),
                ScanPoint::new(0.0, 1.0, 0.0, 0.5),
            ]
            .into(),
        }
    }

    #[tokio::test]
    async fn test_dispatcher_fanout() {
        let (input_tx, input_rx) = mpsc::channel(10);

        let handles = vec![
            SinkHandle::spawn(LogSink::new("sink1"), 10),
            SinkHandle::spawn(LogSink::new("sink2"), 10),
        ];

        let handle = Dispatcher::with_handles(handles, input_rx).spawn();

        for i in 0..5 {
            input_tx.send(revolution(i)).await.unwrap();
        }
        drop(input_tx);

        let report = handle.await.unwrap();
        assert_eq!(report.len(), 2);
        for (_, snapshot) in report {
            assert_eq!(snapshot.write_count, 5);
            assert_eq!(snapshot.last_sequence, Some(4));
        }
    }

    #[tokio::test]
    async fn test_create_dispatcher_from_config() {
        let (input_tx, input_rx) = mpsc::channel(10);

        let configs = vec![SinkConfig {
            name: "test_log".to_string(),
            sink_type: SinkType::Log,
            queue_capacity: 50,
            params: HashMap::new(),
        }];

        let dispatcher = create_dispatcher(configs, input_rx).await.unwrap();
        assert_eq!(dispatcher.metrics()[0].0, "test_log");
        let handle = dispatcher.spawn();

        input_tx.send(revolution(0)).await.unwrap();
        drop(input_tx);

        let report = handle.await.unwrap();
        assert_eq!(report[0].1.write_count, 1);
    }

    #[tokio::test]
    async fn test_create_dispatcher_rejects_bad_encoding() {
        let (_input_tx, input_rx) = mpsc::channel(1);
        let dir = tempfile::tempdir().unwrap();

        let mut params = HashMap::new();
        params.insert(
            "base_path".to_string(),
            dir.path().to_string_lossy().to_string(),
        );
        params.insert("encoding".to_string(), "zstd".to_string());

        let configs = vec![SinkConfig {
            name: "disk".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 4,
            params,
        }];

        let err = create_dispatcher(configs, input_rx).await.err().unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { .. }));
    }
}
