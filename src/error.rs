//! Error types for inverter and bridge transactions
//!
//! Every failure in this crate is scoped to a single transaction: a timed-out
//! poll, a corrupted reply or an unacknowledged command never poisons the
//! client. Callers that only care about "did it work" can collapse any result
//! with `is_ok()`.
//!
//! `thiserror` is only available with the `std` feature. In `no_std` builds the
//! error still implements `Debug` (and `defmt::Format` with the `defmt`
//! feature).

use alloc::string::String;

/// Result alias used throughout the crate.
pub type NetsgpResult<T> = core::result::Result<T, NetsgpError>;

/// Error raised by a protocol transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetsgpError {
    /// No (complete) reply arrived within the window
    #[cfg_attr(feature = "std", error("Timeout: {operation} after {timeout_ms} ms"))]
    Timeout {
        operation: &'static str,
        timeout_ms: u32,
    },

    /// The channel delivered fewer bytes than the frame requires
    #[cfg_attr(
        feature = "std",
        error("Short read: expected {expected} bytes, got {actual}")
    )]
    ShortRead { expected: usize, actual: usize },

    /// Additive checksum did not match the received checksum byte
    #[cfg_attr(
        feature = "std",
        error("Checksum mismatch: computed 0x{expected:02X}, received 0x{actual:02X}")
    )]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// CONTROL / POWER_GRADE reply echoed a different value than the one sent
    #[cfg_attr(
        feature = "std",
        error("Value echo mismatch: sent 0x{sent:02X}, device echoed 0x{echoed:02X}")
    )]
    ValueEchoMismatch { sent: u8, echoed: u8 },

    /// No magic + command byte pair found in the scanned bytes
    #[cfg_attr(feature = "std", error("Header {header:02X?} not found in channel"))]
    HeaderNotFound { header: [u8; 2] },

    /// Bridge answered with an unexpected response header
    #[cfg_attr(
        feature = "std",
        error("Unexpected header: expected {expected:02X?}, got {actual:02X?}")
    )]
    UnexpectedHeader { expected: [u8; 2], actual: [u8; 2] },

    /// Caller supplied a value outside the protocol range
    #[cfg_attr(feature = "std", error("Invalid value: {message}"))]
    InvalidValue { message: String },

    /// Received data could not be interpreted
    #[cfg_attr(feature = "std", error("Invalid data: {message}"))]
    InvalidData { message: String },

    /// Underlying channel or pin failure
    #[cfg_attr(feature = "std", error("I/O error: {message}"))]
    Io { message: String },
}

impl NetsgpError {
    /// Create a timeout error
    pub fn timeout(operation: &'static str, timeout_ms: u32) -> Self {
        Self::Timeout {
            operation,
            timeout_ms,
        }
    }

    /// Create a short read error
    pub fn short_read(expected: usize, actual: usize) -> Self {
        Self::ShortRead { expected, actual }
    }

    /// Create an invalid value error
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// True for [`NetsgpError::Timeout`] and [`NetsgpError::ShortRead`], which
    /// both mean the reply did not (fully) arrive in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ShortRead { .. })
    }

    /// True when a reply arrived but was corrupted, misframed or not
    /// acknowledged.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. }
                | Self::ValueEchoMismatch { .. }
                | Self::HeaderNotFound { .. }
                | Self::UnexpectedHeader { .. }
                | Self::InvalidData { .. }
        )
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for NetsgpError {
    fn from(err: std::io::Error) -> Self {
        NetsgpError::io(err.to_string())
    }
}
