//! Dispatcher errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A configured sink could not be built
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// A sink parameter is missing a usable value
    #[error("invalid sink parameter '{param}': {message}")]
    InvalidParam { param: String, message: String },

    /// Bounded queue full, the revolution was dropped
    #[error("queue full for sink '{sink_name}', revolution {sequence} dropped")]
    QueueFull { sink_name: String, sequence: u64 },

    /// Worker already stopped
    #[error("sink '{sink_name}' worker is closed")]
    SinkClosed { sink_name: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_param(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            param: param.into(),
            message: message.into(),
        }
    }
}
