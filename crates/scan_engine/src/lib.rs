//! # Scan Engine
//!
//! Scan-and-readback pipeline of a simulated spinning LiDAR.
//!
//! Each tick the [`LidarSensor`] turns elapsed time into angular capture
//! windows, renders and reads each window back through the host's
//! [`contracts::SceneRenderer`] / [`contracts::ReadbackDevice`], decodes
//! finished readbacks on a worker pool and publishes the point buffer when a
//! revolution closes.
//!
//! ## Stages
//!
//! ```text
//! CaptureScheduler -> RenderTargetPool -> ReadbackPipeline (FIFO of transfers)
//!                                           -> Decoder (FIFO of decode tasks)
//!                                           -> point buffer -> publisher
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut sensor = LidarSensor::new(config)?;
//! loop {
//!     sensor.tick(&mut device, &mut publisher, TickInput { dt, sim_time, sensor_pose });
//! }
//! ```
//!
//! The point buffer is overwritten window by window and is never double
//! buffered: a reader in the middle of a revolution sees a mix of two
//! revolutions. Published frames are copies taken when a revolution closes.

mod capture;
mod decode;
mod error;
mod geometry;
mod pipeline;
mod pool;
mod sensor;
mod stats;

pub use capture::{CaptureScheduler, WindowMeta, WindowPlan};
pub use decode::{decode_window, DecodeInput, DecodeOutcome, DecodeParams, DecodeTask, Decoder};
pub use error::{Result, ScanError};
pub use geometry::{LayoutMode, ScanGeometry};
pub use pipeline::{
    CaptureRequest, CompletionReport, DrainContext, DrainReport, ReadbackPipeline, TransferMode,
};
pub use pool::{RenderTargetPool, StagingPool};
pub use sensor::{LidarSensor, TickInput};
pub use stats::ScanStats;
