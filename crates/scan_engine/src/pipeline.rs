//! Readback / decode pipeline
//!
//! Three typed stages: submitted transfers (slab records addressed through a
//! bounded FIFO of keys), running decodes (FIFO of task handles), and the
//! point buffer commit. Both FIFOs are drained strictly from the front.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use contracts::{ReadbackRequest, RenderTargetPair, ScanPoint, SceneRenderer};
use ringbuf::{traits::*, HeapRb};
use slab::Slab;
use tracing::{debug, warn};

use crate::capture::WindowMeta;
use crate::decode::{DecodeInput, DecodeParams, DecodeTask, Decoder};
use crate::geometry::ScanGeometry;
use crate::pool::{RenderTargetPool, StagingPool};

/// How a drain treats unfinished work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Stop at the first unfinished entry
    Poll,
    /// Wait on each entry in turn
    Block,
}

/// One in-flight capture window
#[derive(Debug)]
pub struct CaptureRequest<Q> {
    pub meta: WindowMeta,
    pub target: RenderTargetPair,
    pub transfer: Q,
}

/// Collaborators a readback drain needs
pub struct DrainContext<'a, R: ?Sized> {
    pub renderer: &'a mut R,
    pub targets: &'a mut RenderTargetPool,
    pub staging: &'a mut StagingPool,
    pub decoder: &'a Decoder,
    pub geometry: &'a Arc<ScanGeometry>,
    pub params: DecodeParams,
    /// Current tick, for latency accounting
    pub tick: u64,
}

/// Outcome of one readback drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Transfers handed to the decoder
    pub decodes_launched: usize,
    /// Transfers that completed with an error
    pub transfer_errors: usize,
    /// Requests discarded because their target was lost
    pub device_losses: usize,
    /// Submission-to-drain latency of each launched decode (ticks)
    pub latencies: Vec<u64>,
}

/// Outcome of one decode completion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// Windows committed into the point buffer
    pub committed: usize,
    /// Decodes that failed or vanished
    pub failures: usize,
}

/// Queues of one sensor (or one snapshot)
pub struct ReadbackPipeline<Q> {
    requests: Slab<CaptureRequest<Q>>,
    fifo: HeapRb<usize>,
    decodes: VecDeque<DecodeTask>,
    capacity: usize,
}

impl<Q> fmt::Debug for ReadbackPipeline<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadbackPipeline")
            .field("readbacks", &self.fifo.occupied_len())
            .field("decodes", &self.decodes.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<Q: ReadbackRequest> ReadbackPipeline<Q> {
    /// Pipeline holding at most `capacity` outstanding transfers
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            requests: Slab::with_capacity(capacity),
            fifo: HeapRb::new(capacity),
            decodes: VecDeque::new(),
            capacity,
        }
    }

    /// Room for another transfer
    pub fn has_capacity(&self) -> bool {
        !self.fifo.is_full()
    }

    /// Outstanding transfers
    pub fn pending_readbacks(&self) -> usize {
        self.fifo.occupied_len()
    }

    /// Running decodes
    pub fn pending_decodes(&self) -> usize {
        self.decodes.len()
    }

    pub fn is_idle(&self) -> bool {
        self.fifo.is_empty() && self.decodes.is_empty()
    }

    /// Append a submitted transfer; hands the request back when full
    pub fn submit(&mut self, request: CaptureRequest<Q>) -> Result<(), CaptureRequest<Q>> {
        if self.fifo.is_full() {
            return Err(request);
        }
        let key = self.requests.insert(request);
        if self.fifo.try_push(key).is_err() {
            return Err(self.requests.remove(key));
        }
        Ok(())
    }

    /// Resolve transfers from the front of the FIFO
    ///
    /// Lost targets are waited out and discarded, failed transfers are
    /// discarded, finished ones launch a decode. In `Poll` mode the first
    /// unfinished transfer stops the drain.
    pub fn drain_readbacks<R>(
        &mut self,
        mode: TransferMode,
        ctx: &mut DrainContext<'_, R>,
    ) -> DrainReport
    where
        R: SceneRenderer + ?Sized,
    {
        let mut report = DrainReport::default();

        loop {
            let Some(key) = self.fifo.iter().next().copied() else {
                break;
            };
            let Some(request) = self.requests.get_mut(key) else {
                // key without a record; nothing to release
                let _ = self.fifo.try_pop();
                continue;
            };

            if !ctx.renderer.is_target_valid(&request.target) {
                request.transfer.wait();
                let _ = self.fifo.try_pop();
                let request = self.requests.remove(key);
                warn!(
                    window = request.meta.index,
                    slot = request.meta.start_slot,
                    "render target lost, window dropped"
                );
                // the pool replaces it on the next acquire
                ctx.targets.release(request.target);
                report.device_losses += 1;
                continue;
            }

            if !request.transfer.is_done() {
                match mode {
                    TransferMode::Poll => break,
                    TransferMode::Block => request.transfer.wait(),
                }
            }

            let _ = self.fifo.try_pop();
            let request = self.requests.remove(key);

            if request.transfer.has_error() {
                warn!(
                    window = request.meta.index,
                    slot = request.meta.start_slot,
                    "readback failed, window dropped"
                );
                ctx.targets.release(request.target);
                report.transfer_errors += 1;
                continue;
            }

            let input = DecodeInput {
                start_slot: request.meta.start_slot,
                slot_count: request.meta.slot_count,
                width: request.target.width as usize,
                sensor_pose: request.meta.sensor_pose,
                data: request.transfer.data(),
            };
            ctx.targets.release(request.target);

            report
                .latencies
                .push(ctx.tick.saturating_sub(request.meta.submitted_tick));

            let buffer = ctx
                .staging
                .acquire(request.meta.slot_count * ctx.geometry.laser_count);
            let task = ctx.decoder.spawn(
                Arc::clone(ctx.geometry),
                ctx.params,
                request.meta,
                input,
                buffer,
            );
            self.decodes.push_back(task);
            report.decodes_launched += 1;
        }

        report
    }

    /// Commit finished decodes from the front of the decode FIFO
    ///
    /// `on_commit` runs after each window is resolved, with the point buffer
    /// as it stands at that moment. Failed decodes leave their slots as they
    /// were and still report through `on_commit`.
    pub fn complete_decodes<F>(
        &mut self,
        mode: TransferMode,
        staging: &mut StagingPool,
        points: &mut [ScanPoint],
        laser_count: usize,
        mut on_commit: F,
    ) -> CompletionReport
    where
        F: FnMut(&WindowMeta, &[ScanPoint]),
    {
        let mut report = CompletionReport::default();

        loop {
            let (meta, completed) = match mode {
                TransferMode::Poll => {
                    let Some(task) = self.decodes.front_mut() else {
                        break;
                    };
                    let Some(completed) = task.try_complete() else {
                        break;
                    };
                    let meta = task.meta().clone();
                    self.decodes.pop_front();
                    (meta, completed)
                }
                TransferMode::Block => {
                    let Some(task) = self.decodes.pop_front() else {
                        break;
                    };
                    let meta = task.meta().clone();
                    (meta, task.wait())
                }
            };

            match completed {
                Ok(outcome) => {
                    match outcome.result {
                        Ok(valid) => {
                            if commit(points, &outcome.buffer, &meta, laser_count) {
                                debug!(
                                    window = meta.index,
                                    slot = meta.start_slot,
                                    valid,
                                    "window committed"
                                );
                                report.committed += 1;
                            } else {
                                warn!(
                                    window = meta.index,
                                    slot = meta.start_slot,
                                    "window outside point buffer"
                                );
                                report.failures += 1;
                            }
                        }
                        Err(e) => {
                            warn!(window = meta.index, error = %e, "decode failed");
                            report.failures += 1;
                        }
                    }
                    staging.release(outcome.buffer);
                }
                Err(e) => {
                    warn!(window = meta.index, error = %e, "decode lost");
                    report.failures += 1;
                }
            }

            on_commit(&meta, points);
        }

        report
    }

    /// Wait out every transfer and decode without committing anything
    ///
    /// Targets go back to `targets`; returns the number of windows dropped.
    pub fn cancel_all<R>(
        &mut self,
        renderer: &mut R,
        targets: &mut RenderTargetPool,
        staging: &mut StagingPool,
    ) -> usize
    where
        R: SceneRenderer + ?Sized,
    {
        let mut dropped = 0;

        while let Some(key) = self.fifo.try_pop() {
            if let Some(mut request) = self.requests.try_remove(key) {
                request.transfer.wait();
                if renderer.is_target_valid(&request.target) {
                    targets.release(request.target);
                } else {
                    renderer.destroy_target(request.target);
                }
                dropped += 1;
            }
        }
        self.requests.clear();

        while let Some(task) = self.decodes.pop_front() {
            if let Ok(outcome) = task.wait() {
                staging.release(outcome.buffer);
            }
            dropped += 1;
        }

        if dropped > 0 {
            debug!(dropped, "pipeline cancelled");
        }
        dropped
    }
}

/// Copy a decoded window into its slot range
fn commit(
    points: &mut [ScanPoint],
    window: &[ScanPoint],
    meta: &WindowMeta,
    laser_count: usize,
) -> bool {
    let start = meta.start_slot * laser_count;
    let len = meta.slot_count * laser_count;
    match (points.get_mut(start..start + len), window.get(..len)) {
        (Some(dst), Some(src)) => {
            dst.copy_from_slice(src);
            true
        }
        _ => false,
    }
}
