//! Render-target and staging buffer pools.
//!
//! Both pools are touched only from the tick thread and need no locking.
//! Idle entries are never validated proactively; a stale render target is
//! discarded when `acquire` pops it.

use contracts::{RenderTargetPair, SceneRenderer, ScanPoint};
use tracing::debug;

/// Free stack of color + depth target pairs
#[derive(Debug, Default)]
pub struct RenderTargetPool {
    free: Vec<RenderTargetPair>,
    created: u64,
    discarded: u64,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop a pair from the free stack, allocating when the stack is empty or
    /// the popped pair is no longer backed by live device surfaces
    pub fn acquire<R: SceneRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        width: u32,
        height: u32,
    ) -> RenderTargetPair {
        if let Some(pair) = self.free.pop() {
            if pair.width == width && pair.height == height && renderer.is_target_valid(&pair) {
                return pair;
            }
            debug!(id = pair.id, "discarding stale render target");
            renderer.destroy_target(pair);
            self.discarded += 1;
        }
        self.created += 1;
        renderer.create_target(width, height)
    }

    /// Return a pair without destroying it
    pub fn release(&mut self, pair: RenderTargetPair) {
        self.free.push(pair);
    }

    /// Destroy every idle pair
    pub fn clear<R: SceneRenderer + ?Sized>(&mut self, renderer: &mut R) {
        for pair in self.free.drain(..) {
            renderer.destroy_target(pair);
        }
    }

    /// Idle pairs
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Pairs allocated over the pool lifetime
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Stale pairs dropped on acquire
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

/// Free stack of host-side window buffers
///
/// Decode tasks write into these before the tick thread commits them.
#[derive(Debug, Default)]
pub struct StagingPool {
    free: Vec<Vec<ScanPoint>>,
}

impl StagingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer of exactly `len` sentinel points
    pub fn acquire(&mut self, len: usize) -> Vec<ScanPoint> {
        let mut buffer = self.free.pop().unwrap_or_default();
        buffer.clear();
        buffer.resize(len, ScanPoint::SENTINEL);
        buffer
    }

    pub fn release(&mut self, buffer: Vec<ScanPoint>) {
        self.free.push(buffer);
    }

    pub fn clear(&mut self) {
        self.free.clear();
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }
}
