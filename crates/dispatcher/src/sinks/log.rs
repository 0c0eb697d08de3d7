//! LogSink - logs a revolution summary via tracing

use contracts::{ContractError, DataSink, PointCloudFrame};
use tracing::{info, instrument};

/// Sink that logs one line per revolution
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_frame_summary(&self, frame: &PointCloudFrame) {
        let total = frame.points.len();
        let valid = frame.valid_count();

        info!(
            sink = %self.name,
            sensor = %frame.sensor_id,
            sequence = frame.sequence,
            sim_time = frame.sim_time,
            timestamp_ms = frame.timestamp_ms,
            frame = ?frame.frame,
            valid,
            sentinel = total - valid,
            "Revolution received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, frame),
        fields(sink = %self.name, sequence = frame.sequence)
    )]
    async fn write(&mut self, frame: &PointCloudFrame) -> Result<(), ContractError> {
        self.log_frame_summary(frame);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
