//! ChannelPublisher - hands revolutions from the tick loop to the dispatcher

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use contracts::{PointCloudFrame, PointCloudPublisher};

/// Publisher backed by a bounded tokio channel
///
/// Never blocks the tick loop: when the channel is full the revolution is
/// dropped and counted.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<PointCloudFrame>,
    dropped: Arc<AtomicU64>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiver the dispatcher consumes
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PointCloudFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn new(tx: mpsc::Sender<PointCloudFrame>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Revolutions dropped because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl PointCloudPublisher for ChannelPublisher {
    fn publish(&mut self, frame: PointCloudFrame) {
        let Err(e) = self.tx.try_send(frame) else {
            return;
        };
        self.dropped.fetch_add(1, Ordering::Relaxed);
        let (reason, frame) = match e {
            mpsc::error::TrySendError::Full(f) => ("channel full", f),
            mpsc::error::TrySendError::Closed(f) => ("channel closed", f),
        };
        observability::record_frame_dropped(&frame.sensor_id);
        warn!(
            sensor = %frame.sensor_id,
            sequence = frame.sequence,
            reason,
            "Revolution dropped before dispatch"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::OutputFrame;
    use nalgebra::Isometry3;

    fn empty_revolution(sequence: u64) -> PointCloudFrame {
        PointCloudFrame {
            sensor_id: "lidar".to_string(),
            sequence,
            sim_time: 0.0,
            timestamp_ms: 0,
            frame: OutputFrame::Sensor,
            sensor_pose: Isometry3::identity(),
            laser_count: 0,
            measurements_per_revolution: 0,
            points: Vec::new().into(),
        }
    }

    #[tokio::test]
    async fn test_publish_delivers_in_order() {
        let (mut publisher, mut rx) = ChannelPublisher::channel(4);
        publisher.publish(empty_revolution(0));
        publisher.publish(empty_revolution(1));

        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(publisher.dropped(), 0);
    }

    #[test]
    fn test_publish_drops_when_full() {
        let (mut publisher, mut rx) = ChannelPublisher::channel(1);
        publisher.publish(empty_revolution(0));
        publisher.publish(empty_revolution(1));
        assert_eq!(publisher.dropped(), 1);

        assert_eq!(rx.try_recv().unwrap().sequence, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_after_receiver_dropped() {
        let (mut publisher, rx) = ChannelPublisher::channel(2);
        drop(rx);
        publisher.publish(empty_revolution(0));
        assert_eq!(publisher.dropped(), 1);
    }
}
