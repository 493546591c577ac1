//! # Voltage NETSGP - Polling Engine for NETSGP Micro-Inverters
//!
//! **Author:** Evan Liu <liuyifanz.1996@gmail.com>
//! **License:** MIT
//!
//! Talks to NETSGP solar micro-inverters through an LC12S 2.4 GHz RF bridge
//! attached to a serial port or a microcontroller UART.
//!
//! ## Features
//!
//! - **Frame codec**: fixed-size stack frames, additive checksum, big-endian ids
//! - **Transactor**: blocking request/reply with explicit timeouts
//! - **Bridge configuration**: read/write LC12S radio settings with the
//!   programming-line timing the module needs
//! - **Poll scheduler**: non-blocking, paced round-robin polling driven from
//!   the host's main loop
//! - **no_std**: the core only needs `alloc`; `embedded-io` / `embedded-hal`
//!   adapters behind the `embedded` feature
//!
//! ## Supported Commands
//!
//! | Code | Command | Reply |
//! |------|---------|-------|
//! | 0xC0 | Status | 27-byte reading |
//! | 0xC1 | Control (activate / deactivate / reboot) | 15-byte echo |
//! | 0xC3 | Power grade (0-100 %) | 15-byte echo |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # fn main() -> voltage_netsgp::NetsgpResult<()> {
//! use std::time::Duration;
//! use voltage_netsgp::{NetsgpClient, PollConfig, PollScheduler, SerialChannel, SystemClock};
//!
//! let channel = SerialChannel::open("/dev/ttyUSB0", 9600, Duration::from_millis(100))?;
//! let pin = channel.program_line()?;
//! let mut client = NetsgpClient::new(channel, pin, SystemClock::new())?;
//! client.ensure_default_bridge_settings()?;
//!
//! let mut scheduler = PollScheduler::new(client, PollConfig::default());
//! scheduler.set_status_callback(|status| {
//!     println!("{:08X}: {:.1} W", status.device_id, status.ac_power);
//! });
//! scheduler.register_inverter(0x11223344);
//!
//! loop {
//!     scheduler.tick()?;
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! # }
//! # #[cfg(not(feature = "serial"))]
//! # fn main() {}
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// NETSGP and LC12S protocol constants
pub mod constants;

/// Command frames and checksum
pub mod frame;

/// STATUS reply decoding
pub mod status;

/// Byte stream abstraction
pub mod channel;

/// Programming line and clock traits
pub mod hal;

/// Request/reply transactor
pub mod client;

/// LC12S bridge configuration
pub mod bridge;

/// Poll timing configuration
pub mod config;

/// Round-robin poll scheduler
pub mod scheduler;

// ============================================================================
// Transport adapters
// ============================================================================

/// Host serial port adapter
#[cfg(feature = "serial")]
#[cfg_attr(docsrs, doc(cfg(feature = "serial")))]
pub mod serial;

/// Microcontroller adapters
#[cfg(feature = "embedded")]
#[cfg_attr(docsrs, doc(cfg(feature = "embedded")))]
pub mod embedded;

#[cfg(all(test, feature = "std"))]
mod testing;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Core client API ===
pub use client::{ClientStats, NetsgpClient, ReplyMode};
pub use scheduler::{PollScheduler, PollState, StatusCallback};

// === Error handling ===
pub use error::{NetsgpError, NetsgpResult};

// === Core types ===
pub use bridge::{Baudrate, BridgeSettings, RfPower};
pub use config::PollConfig;
pub use frame::{Command, CommandFrame, ControlAction, DeviceId, PowerGrade};
pub use status::InverterStatus;

// === I/O seams ===
pub use channel::ByteChannel;
pub use hal::{Clock, NoPin, ProgramPin};

#[cfg(feature = "std")]
pub use channel::MemoryChannel;
#[cfg(feature = "std")]
pub use hal::SystemClock;

#[cfg(feature = "serial")]
pub use serial::{DtrLine, SerialChannel};

#[cfg(feature = "embedded")]
pub use embedded::{DelayClock, EmbeddedChannel, HalPin};

// === Timing defaults ===
pub use config::{DEFAULT_PACING_GAP_MS, DEFAULT_POLL_INTERVAL_MS};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> alloc::string::String {
    alloc::format!(
        "Voltage NETSGP v{} - NETSGP micro-inverter polling engine by Evan Liu",
        VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_mentions_version() {
        assert!(info().contains(VERSION));
    }
}
