//! # Dispatcher
//!
//! Point cloud output transport.
//!
//! Responsibilities:
//! - Bridge the synchronous tick loop to async consumers (`ChannelPublisher`)
//! - Fan out every `PointCloudFrame` to the configured sinks
//! - Isolate slow sinks so they never stall the sensor

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod publisher;
pub mod sinks;

pub use contracts::{DataSink, PointCloudFrame};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use publisher::ChannelPublisher;
pub use sinks::{FileSink, FileSinkConfig, LogSink};
