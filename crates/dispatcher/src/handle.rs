//! SinkHandle - one sink behind its own bounded queue and worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{DataSink, PointCloudFrame};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<PointCloudFrame>,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker task for `sink` with a queue of `queue_capacity` revolutions
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = SinkWorker {
            sink,
            metrics: Arc::clone(&metrics),
            name: name.clone(),
        };
        let worker_handle = tokio::spawn(worker.run(rx));

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a revolution without waiting
    ///
    /// A full queue drops the revolution; the sensor side is never slowed
    /// down by a sink.
    pub fn try_send(&self, frame: PointCloudFrame) -> Result<(), DispatcherError> {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(f)) => {
                self.metrics.inc_dropped_count();
                observability::record_frame_dispatched(&self.name, false);
                warn!(
                    sink = %self.name,
                    sensor = %f.sensor_id,
                    sequence = f.sequence,
                    "Queue full, revolution dropped"
                );
                Err(DispatcherError::QueueFull {
                    sink_name: self.name.clone(),
                    sequence: f.sequence,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                Err(DispatcherError::SinkClosed {
                    sink_name: self.name.clone(),
                })
            }
        }
    }

    /// Close the queue and wait for the worker to drain it
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Task-side half of a [`SinkHandle`]
struct SinkWorker<S> {
    sink: S,
    metrics: Arc<SinkMetrics>,
    name: String,
}

impl<S: DataSink> SinkWorker<S> {
    #[instrument(name = "sink_worker_loop", skip_all, fields(sink = %self.name))]
    async fn run(mut self, mut rx: mpsc::Receiver<PointCloudFrame>) {
        debug!("Sink worker started");

        while let Some(frame) = rx.recv().await {
            self.metrics.set_queue_len(rx.len());
            self.write_one(&frame).await;
        }

        self.finish().await;
        debug!("Sink worker stopped");
    }

    async fn write_one(&mut self, frame: &PointCloudFrame) {
        match self.sink.write(frame).await {
            Ok(()) => {
                self.metrics.record_write(frame.sequence);
                observability::record_frame_dispatched(&self.name, true);
            }
            Err(e) => {
                // one failed write never stops the worker
                self.metrics.inc_failure_count();
                observability::record_frame_dispatched(&self.name, false);
                error!(
                    sink = %self.name,
                    sequence = frame.sequence,
                    error = %e,
                    "Write failed"
                );
            }
        }
    }

    async fn finish(&mut self) {
        if let Err(e) = self.sink.flush().await {
            error!(sink = %self.name, error = %e, "Flush failed on shutdown");
        }
        if let Err(e) = self.sink.close().await {
            error!(sink = %self.name, error = %e, "Close failed on shutdown");
        }
    }
}
