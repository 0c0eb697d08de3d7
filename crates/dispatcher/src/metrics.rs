//! Per-sink delivery counters

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for a single sink, shared between its handle and worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    queue_len: AtomicUsize,
    write_count: AtomicU64,
    failure_count: AtomicU64,
    dropped_count: AtomicU64,
    /// Sequence of the newest revolution written, plus one (0 = none yet)
    last_sequence: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Count a successful write of revolution `sequence`
    pub fn record_write(&self, sequence: u64) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.last_sequence
            .fetch_max(sequence.saturating_add(1), Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Newest revolution sequence written, if any
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence.load(Ordering::Relaxed).checked_sub(1)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
            last_sequence: self.last_sequence(),
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub last_sequence: Option<u64>,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "written={} failed={} dropped={} queued={}",
            self.write_count, self.failure_count, self.dropped_count, self.queue_len
        )?;
        match self.last_sequence {
            Some(seq) => write!(f, " last_seq={seq}"),
            None => write!(f, " last_seq=-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_sequence_tracks_maximum() {
        let metrics = SinkMetrics::new();
        assert_eq!(metrics.last_sequence(), None);

        metrics.record_write(0);
        assert_eq!(metrics.last_sequence(), Some(0));
        metrics.record_write(4);
        metrics.record_write(2);
        assert_eq!(metrics.last_sequence(), Some(4));
        assert_eq!(metrics.write_count(), 3);
    }

    #[test]
    fn test_snapshot_display() {
        let metrics = SinkMetrics::new();
        metrics.inc_dropped_count();
        let text = metrics.snapshot().to_string();
        assert_eq!(text, "written=0 failed=0 dropped=1 queued=0 last_seq=-");
    }
}
