//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the LiDAR simulator.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Simulation timestamp (seconds, f64) is the primary clock
//! - Published frames additionally carry milliseconds since the top of the
//!   current hour, wrapping hourly like physical sensors do
//!
//! ## Coordinate Model
//! - Sensor frame: x forward, y left, z up; azimuth grows counter-clockwise
//!   seen from above
//! - Poses are `nalgebra::Isometry3<f32>` mapping sensor frame into world frame

mod blueprint;
mod device;
mod error;
mod lidar_config;
pub mod pcd;
mod point;
mod publisher;
mod sink;

pub use blueprint::*;
pub use device::*;
pub use error::*;
pub use lidar_config::*;
pub use point::*;
pub use publisher::PointCloudPublisher;
pub use sink::*;
