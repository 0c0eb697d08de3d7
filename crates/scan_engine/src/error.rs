//! Scan engine error types

use thiserror::Error;

/// Scan engine errors
///
/// Only the export path and construction surface these; the tick loop
/// degrades to incomplete windows instead.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Configuration cannot produce capture windows
    #[error("degenerate configuration: {message}")]
    DegenerateConfig { message: String },

    /// Decode worker pool could not be created
    #[error("failed to build decode pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Decode worker went away before reporting
    #[error("decode task for slot {start_slot} dropped without a result")]
    DecodeDropped { start_slot: usize },

    /// Contract level error (payload, export, io)
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),
}

impl ScanError {
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateConfig {
            message: message.into(),
        }
    }
}

/// Scan engine Result alias
pub type Result<T> = std::result::Result<T, ScanError>;
