//! Window decode
//!
//! Converts one window's packed readback into points. The numeric kernel
//! ([`decode_window`]) is shared by the ticking and snapshot paths; the
//! [`Decoder`] runs it on the sensor's worker pool and reports through a
//! single-slot channel that can be waited on from any thread, async
//! runtime workers included.

use std::borrow::Cow;
use std::sync::Arc;

use bytes::Bytes;
use contracts::{ContractError, LidarConfig, OutputFrame, PackedSample, ScanPoint, SAMPLE_STRIDE};
use nalgebra::{Isometry3, Point3, Vector3};
use rayon::prelude::*;
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::trace;

use crate::capture::WindowMeta;
use crate::error::{Result, ScanError};
use crate::geometry::ScanGeometry;

/// Range filter and output frame of one configuration epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub min_distance: f32,
    pub max_distance: f32,
    pub frame: OutputFrame,
}

impl DecodeParams {
    pub fn from_config(config: &LidarConfig) -> Self {
        Self {
            min_distance: config.min_distance_m,
            max_distance: config.max_distance_m,
            frame: config.output_frame(),
        }
    }

    /// Same filter, different output frame
    pub fn with_frame(mut self, frame: OutputFrame) -> Self {
        self.frame = frame;
        self
    }

    /// Inclusive range check; rejects misses (0) and NaN
    #[inline]
    pub fn accepts(&self, range: f32) -> bool {
        range > 0.0 && range >= self.min_distance && range <= self.max_distance
    }
}

/// Raw input of one window
#[derive(Debug, Clone)]
pub struct DecodeInput {
    /// First slot of the window
    pub start_slot: usize,
    /// Columns to decode
    pub slot_count: usize,
    /// Pixel width of the readback (may exceed `slot_count` on the last window)
    pub width: usize,
    /// Sensor pose in world at capture time
    pub sensor_pose: Isometry3<f32>,
    /// Packed samples, row = ray
    pub data: Bytes,
}

/// Decode `input` into `out` (`slot_count * laser_count` points, slot major)
///
/// Returns the number of valid points written. Rejected samples are written
/// as sentinels so `out` is fully defined on success.
pub fn decode_window(
    geometry: &ScanGeometry,
    params: &DecodeParams,
    input: &DecodeInput,
    out: &mut [ScanPoint],
) -> Result<usize> {
    let lasers = geometry.laser_count;
    let expected_points = input.slot_count * lasers;
    if out.len() != expected_points {
        return Err(ContractError::readback_payload(
            input.start_slot,
            format!("output holds {} points, window needs {expected_points}", out.len()),
        )
        .into());
    }
    if lasers == 0 || input.slot_count == 0 {
        return Ok(0);
    }
    if input.width < input.slot_count {
        return Err(ContractError::readback_payload(
            input.start_slot,
            format!("width {} narrower than {} slots", input.width, input.slot_count),
        )
        .into());
    }

    let needed = input.width * lasers * SAMPLE_STRIDE;
    if input.data.len() < needed {
        return Err(ContractError::readback_payload(
            input.start_slot,
            format!("payload is {} bytes, expected {needed}", input.data.len()),
        )
        .into());
    }

    // transfers are not guaranteed to be aligned for PackedSample
    let raw = &input.data[..needed];
    let samples: Cow<'_, [PackedSample]> = match bytemuck::try_cast_slice(raw) {
        Ok(samples) => Cow::Borrowed(samples),
        Err(_) => {
            let mut owned = vec![PackedSample::default(); input.width * lasers];
            bytemuck::cast_slice_mut::<PackedSample, u8>(&mut owned).copy_from_slice(raw);
            Cow::Owned(owned)
        }
    };

    let pose = input.sensor_pose;
    let width = input.width;
    let sin_lat = &geometry.sin_latitude;
    let cos_lat = &geometry.cos_latitude;

    let valid = out
        .par_chunks_mut(lasers)
        .enumerate()
        .map(|(column, slot_points)| {
            let azimuth = geometry
                .slot_azimuth_deg(input.start_slot + column)
                .to_radians();
            let (sin_az, cos_az) = azimuth.sin_cos();
            let mut valid = 0usize;

            for (ray, point) in slot_points.iter_mut().enumerate() {
                let sample = samples[ray * width + column];
                if !params.accepts(sample.range) {
                    *point = ScanPoint::SENTINEL;
                    continue;
                }
                let direction = Vector3::new(
                    sin_lat[ray] * cos_az,
                    sin_lat[ray] * sin_az,
                    cos_lat[ray],
                );
                let world = pose * Point3::from(direction * sample.range);
                let p = match params.frame {
                    OutputFrame::World => world,
                    OutputFrame::Sensor => pose.inverse_transform_point(&world),
                };
                *point = ScanPoint::new(p.x, p.y, p.z, sample.weight.clamp(0.0, 1.0));
                valid += 1;
            }
            valid
        })
        .sum();

    Ok(valid)
}

/// Result of one decode task, handed back to the tick thread
#[derive(Debug)]
pub struct DecodeOutcome {
    pub meta: WindowMeta,
    /// Staging buffer holding the decoded window
    pub buffer: Vec<ScanPoint>,
    /// Valid point count, or the decode failure
    pub result: Result<usize>,
}

/// Handle to a decode running on the worker pool
#[derive(Debug)]
pub struct DecodeTask {
    meta: WindowMeta,
    rx: Receiver<DecodeOutcome>,
}

impl DecodeTask {
    pub fn meta(&self) -> &WindowMeta {
        &self.meta
    }

    /// Non-blocking completion check
    ///
    /// `None` while the worker is still running.
    pub fn try_complete(&mut self) -> Option<Result<DecodeOutcome>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ScanError::DecodeDropped {
                start_slot: self.meta.start_slot,
            })),
        }
    }

    /// Block until the worker reports
    pub fn wait(self) -> Result<DecodeOutcome> {
        let start_slot = self.meta.start_slot;
        self.rx
            .recv()
            .map_err(|_| ScanError::DecodeDropped { start_slot })
    }
}

/// Worker pool running decode tasks
#[derive(Debug, Clone)]
pub struct Decoder {
    pool: Arc<rayon::ThreadPool>,
}

impl Decoder {
    /// Pool with `threads` workers (0 = logical CPUs)
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lidar-decode-{i}"))
            .build()?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Launch a decode of `input` into `buffer`
    pub fn spawn(
        &self,
        geometry: Arc<ScanGeometry>,
        params: DecodeParams,
        meta: WindowMeta,
        input: DecodeInput,
        mut buffer: Vec<ScanPoint>,
    ) -> DecodeTask {
        let (tx, rx) = bounded(1);
        let task_meta = meta.clone();

        self.pool.spawn(move || {
            buffer.resize(input.slot_count * geometry.laser_count, ScanPoint::SENTINEL);
            let result = decode_window(&geometry, &params, &input, &mut buffer);
            trace!(window = meta.index, slot = meta.start_slot, "window decoded");
            // receiver gone means the sensor was torn down
            let _ = tx.send(DecodeOutcome {
                meta,
                buffer,
                result,
            });
        });

        DecodeTask {
            meta: task_meta,
            rx,
        }
    }
}
