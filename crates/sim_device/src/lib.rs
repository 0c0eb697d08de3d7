//! # Sim Device
//!
//! CPU reference implementation of the rendering and asynchronous transfer
//! collaborators.
//!
//! Responsibilities:
//! - Ray cast an analytic scene into packed range/weight render targets
//! - Model readback latency with a shared frame clock
//! - Inject faults: failed transfers and device resource loss
//!
//! Used by tests and by the CLI when no GPU host is attached.

mod device;
mod scene;

pub use device::{DeviceStats, FrameClock, SimDevice, SimReadback};
pub use scene::{Hit, Primitive, Scene};
