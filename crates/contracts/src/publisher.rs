//! PointCloudPublisher - scan engine output seam
//!
//! Synchronous because publication happens inside the cooperative tick loop.
//! Transport implementations must not block; bridging to async sinks is the
//! dispatcher's job.

use crate::PointCloudFrame;

/// Receives every finished revolution
pub trait PointCloudPublisher {
    /// Publish a finished point cloud
    fn publish(&mut self, frame: PointCloudFrame);
}

/// Collecting publisher, handy for tests and snapshot tooling
impl PointCloudPublisher for Vec<PointCloudFrame> {
    fn publish(&mut self, frame: PointCloudFrame) {
        self.push(frame);
    }
}
