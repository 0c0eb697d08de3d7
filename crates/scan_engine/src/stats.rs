//! Per-sensor activity counters

use std::fmt;

/// Counters since sensor construction (not cleared by reconfiguration)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Capture requests issued
    pub windows_submitted: u64,
    /// Due windows not captured (cooldown, degenerate config, full FIFO)
    pub windows_skipped: u64,
    /// Transfers that completed with an error
    pub readback_errors: u64,
    /// Requests dropped because their render target was lost
    pub device_losses: u64,
    /// Decodes that failed or never reported
    pub decode_failures: u64,
    /// Windows whose points reached the point buffer
    pub windows_decoded: u64,
    /// Full revolutions handed to the publisher
    pub revolutions_published: u64,
    /// Pipeline resets (construction excluded)
    pub resets: u64,
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted={} skipped={} decoded={} readback_errors={} device_losses={} \
             decode_failures={} revolutions={} resets={}",
            self.windows_submitted,
            self.windows_skipped,
            self.windows_decoded,
            self.readback_errors,
            self.device_losses,
            self.decode_failures,
            self.revolutions_published,
            self.resets
        )
    }
}
