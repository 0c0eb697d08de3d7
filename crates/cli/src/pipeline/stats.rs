//! Run statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::ScanMetricsAggregator;
use scan_engine::ScanStats;
use sim_device::DeviceStats;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Ticks executed
    pub ticks: u64,

    /// Simulated time covered by those ticks (seconds)
    pub sim_seconds: f64,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Sensor counters
    pub scan: ScanStats,

    /// Simulated device counters
    pub device: DeviceStats,

    /// Aggregated per-revolution metrics
    pub metrics: ScanMetricsAggregator,

    /// Sinks configured for the run
    pub active_sinks: usize,

    /// Final per-sink delivery counters
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

impl PipelineStats {
    /// Simulated seconds per wall-clock second
    pub fn realtime_factor(&self) -> f64 {
        let wall = self.duration.as_secs_f64();
        if wall > 0.0 {
            self.sim_seconds / wall
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n=== Run Summary ===\n");

        println!("Overview");
        println!("   ├─ Ticks: {}", self.ticks);
        println!("   ├─ Simulated: {:.3}s", self.sim_seconds);
        println!("   ├─ Wall clock: {:.3}s", self.duration.as_secs_f64());
        println!("   ├─ Realtime factor: {:.2}x", self.realtime_factor());
        println!("   └─ Active sinks: {}", self.active_sinks);

        println!("\nScan Engine");
        println!("   ├─ Windows submitted: {}", self.scan.windows_submitted);
        println!("   ├─ Windows skipped: {}", self.scan.windows_skipped);
        println!("   ├─ Windows decoded: {}", self.scan.windows_decoded);
        println!("   ├─ Readback errors: {}", self.scan.readback_errors);
        println!("   ├─ Device losses: {}", self.scan.device_losses);
        println!("   ├─ Decode failures: {}", self.scan.decode_failures);
        println!(
            "   └─ Revolutions published: {}",
            self.scan.revolutions_published
        );

        println!("\nDevice");
        println!("   ├─ Renders: {}", self.device.renders);
        println!(
            "   ├─ Readbacks: {} ({} failed)",
            self.device.readbacks, self.device.failed_readbacks
        );
        println!(
            "   └─ Targets created/destroyed: {}/{}",
            self.device.targets_created, self.device.targets_destroyed
        );

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for (i, (name, snapshot)) in self.sinks.iter().enumerate() {
                let prefix = if i + 1 == self.sinks.len() { "└─" } else { "├─" };
                println!("   {} {}: {}", prefix, name, snapshot);
            }
        }

        println!("\n{}", self.metrics.summary());
    }
}
