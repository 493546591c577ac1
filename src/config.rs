//! # Poll Configuration
//!
//! Timing of the round-robin poll scheduler.
//!
//! ## Timing Model
//!
//! - **Poll interval**: a new round over all registered inverters starts at
//!   most once per interval, measured from the start of the previous round.
//! - **Pacing gap**: minimum spacing between two consecutive STATUS commands.
//!   The RF link is half-duplex and shared, so a second command must not go
//!   out while the previous inverter may still be answering.
//!
//! A round over `n` inverters needs roughly `n * pacing_gap` when replies are
//! slow; if that exceeds the interval the next round starts right after the
//! current one ends.

use crate::constants::MESSAGE_TIMEOUT_MS;

/// Default poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 2000;

/// Default minimum spacing between two sends (message timeout plus margin).
pub const DEFAULT_PACING_GAP_MS: u32 = MESSAGE_TIMEOUT_MS + 10;

/// Poll scheduler timing.
///
/// # Example
///
/// ```rust
/// use voltage_netsgp::PollConfig;
///
/// let config = PollConfig::new()
///     .with_interval_secs(10)
///     .with_pacing_gap_ms(500);
///
/// assert_eq!(config.interval_ms, 10_000);
/// assert!(config.rounds_fit_interval(20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Minimum time between the starts of two rounds (milliseconds).
    pub interval_ms: u32,
    /// Minimum time between two consecutive sends (milliseconds).
    pub pacing_gap_ms: u32,
}

impl PollConfig {
    /// Create a configuration with default timing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval in milliseconds.
    pub fn with_interval_ms(mut self, interval_ms: u32) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Set the poll interval in seconds.
    pub fn with_interval_secs(mut self, secs: u32) -> Self {
        self.interval_ms = secs.saturating_mul(1000);
        self
    }

    /// Set the pacing gap in milliseconds.
    pub fn with_pacing_gap_ms(mut self, gap_ms: u32) -> Self {
        self.pacing_gap_ms = gap_ms;
        self
    }

    /// Worst-case duration of one round over `device_count` inverters.
    pub fn round_duration_ms(&self, device_count: usize) -> u64 {
        device_count as u64 * u64::from(self.pacing_gap_ms)
    }

    /// Check if a worst-case round fits into one poll interval.
    pub fn rounds_fit_interval(&self, device_count: usize) -> bool {
        self.round_duration_ms(device_count) <= u64::from(self.interval_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            pacing_gap_ms: DEFAULT_PACING_GAP_MS,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
