//! Scan pipeline metrics
//!
//! Thin recorders over the `metrics` facade plus an in-process aggregator for
//! run summaries. Recorders are no-ops until a recorder is installed.

use contracts::PointCloudFrame;
use metrics::{counter, gauge, histogram};

/// Why a due window produced no capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Readback error cooldown active
    Cooldown,
    /// Configuration yields no slots or no usable range
    Degenerate,
    /// Readback FIFO full
    QueueFull,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Cooldown => "cooldown",
            SkipReason::Degenerate => "degenerate",
            SkipReason::QueueFull => "queue_full",
        }
    }
}

/// Record a submitted capture window
pub fn record_window_submitted(sensor_id: &str) {
    counter!(
        "lidar_sim_windows_submitted_total",
        "sensor_id" => sensor_id.to_string()
    )
    .increment(1);
}

/// Record a window that was due but not captured
pub fn record_window_skipped(sensor_id: &str, reason: SkipReason) {
    counter!(
        "lidar_sim_windows_skipped_total",
        "sensor_id" => sensor_id.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a failed transfer
pub fn record_readback_error(sensor_id: &str) {
    counter!(
        "lidar_sim_readback_errors_total",
        "sensor_id" => sensor_id.to_string()
    )
    .increment(1);
}

/// Record a request discarded because its render target was lost
pub fn record_device_loss(sensor_id: &str) {
    counter!(
        "lidar_sim_device_losses_total",
        "sensor_id" => sensor_id.to_string()
    )
    .increment(1);
}

/// Record a decode that failed or vanished
pub fn record_decode_failure(sensor_id: &str) {
    counter!(
        "lidar_sim_decode_failures_total",
        "sensor_id" => sensor_id.to_string()
    )
    .increment(1);
}

/// Ticks between submission and drain of a readback
pub fn record_readback_latency(sensor_id: &str, ticks: u64) {
    histogram!(
        "lidar_sim_readback_latency_ticks",
        "sensor_id" => sensor_id.to_string()
    )
    .record(ticks as f64);
}

/// Record a published revolution
pub fn record_revolution_published(frame: &PointCloudFrame) {
    counter!(
        "lidar_sim_revolutions_published_total",
        "sensor_id" => frame.sensor_id.clone()
    )
    .increment(1);
    gauge!(
        "lidar_sim_valid_points",
        "sensor_id" => frame.sensor_id.clone()
    )
    .set(frame.valid_count() as f64);
}

/// Record a frame handed to a sink
pub fn record_frame_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "lidar_sim_frames_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a frame dropped before reaching the dispatcher
pub fn record_frame_dropped(sensor_id: &str) {
    counter!(
        "lidar_sim_frames_dropped_total",
        "sensor_id" => sensor_id.to_string()
    )
    .increment(1);
}

/// Per-run aggregation of published revolutions
#[derive(Debug, Clone, Default)]
pub struct ScanMetricsAggregator {
    /// Revolutions observed
    pub revolutions: u64,

    /// Frames dropped before dispatch
    pub dropped: u64,

    /// Valid points per revolution
    pub valid_points: RunningStats,

    /// Fraction of sentinel slots per revolution (percent)
    pub sentinel_ratio: RunningStats,

    /// Simulated seconds between consecutive revolutions
    pub revolution_period: RunningStats,

    last_sim_time: Option<f64>,
}

impl ScanMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one published revolution into the totals
    pub fn update(&mut self, frame: &PointCloudFrame) {
        self.revolutions += 1;

        let valid = frame.valid_count();
        self.valid_points.push(valid as f64);
        if !frame.points.is_empty() {
            let sentinels = frame.points.len() - valid;
            self.sentinel_ratio
                .push(sentinels as f64 / frame.points.len() as f64 * 100.0);
        }

        if let Some(last) = self.last_sim_time {
            self.revolution_period.push(frame.sim_time - last);
        }
        self.last_sim_time = Some(frame.sim_time);
    }

    pub fn record_dropped(&mut self, count: u64) {
        self.dropped += count;
    }

    /// Snapshot of the aggregated values
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            revolutions: self.revolutions,
            dropped: self.dropped,
            valid_points: StatsSummary::from(&self.valid_points),
            sentinel_ratio: StatsSummary::from(&self.sentinel_ratio),
            revolution_period_s: StatsSummary::from(&self.revolution_period),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Aggregated run summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub revolutions: u64,
    pub dropped: u64,
    pub valid_points: StatsSummary,
    pub sentinel_ratio: StatsSummary,
    pub revolution_period_s: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Scan Metrics Summary ===")?;
        writeln!(f, "Revolutions: {}", self.revolutions)?;
        writeln!(f, "Dropped frames: {}", self.dropped)?;
        writeln!(f, "Valid points: {}", self.valid_points)?;
        writeln!(f, "Sentinel ratio (%): {}", self.sentinel_ratio)?;
        writeln!(f, "Revolution period (s): {}", self.revolution_period_s)?;
        Ok(())
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean / variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
