//! NETSGP and LC12S protocol constants
//!
//! The inverter protocol is undocumented; every value here was taken from
//! captured traffic of the vendor data box and must stay bit-exact.
//! - Inverter frames start with a magic byte followed by the command byte
//! - All multi-byte integers are big-endian
//! - Error detection is a plain 8-bit additive checksum

// ============================================================================
// Inverter Frame Constants
// ============================================================================

/// Magic byte at the start of every inverter command and reply
pub const MAGIC_BYTE: u8 = 0x43;

/// Length of the reply header: magic byte + command byte
pub const HEADER_LEN: usize = 2;

/// Command frame length
/// Format: Magic(1) + Command(1) + Reserved(4) + DeviceID(4) + Reserved(3) + Value(1) + Checksum(1)
pub const COMMAND_FRAME_LEN: usize = 15;

/// STATUS reply length
/// Format: Header(15, same layout as a command with the total power in 10..14)
/// + DC V(2) + DC I(2) + AC V(2) + AC I(2) + Unknown(2) + State(1) + Temperature(1)
pub const STATUS_REPLY_LEN: usize = 27;

/// CONTROL / POWER_GRADE reply length (same layout as the command frame)
pub const ACK_REPLY_LEN: usize = 15;

/// Offset of the checksum byte in commands and replies
pub const CHECKSUM_OFFSET: usize = 14;

/// Offset of the value byte in commands and its echo in acknowledgements
pub const VALUE_OFFSET: usize = 13;

/// Offset of the big-endian device identifier
pub const DEVICE_ID_OFFSET: usize = 6;

/// Size of the client's reusable frame buffer
pub const FRAME_BUFFER_SIZE: usize = 32;

// ============================================================================
// Inverter Command Codes
// ============================================================================

/// Get status (0xC0)
pub const CMD_STATUS: u8 = 0xC0;

/// Control: activate / deactivate / reboot (0xC1)
pub const CMD_CONTROL: u8 = 0xC1;

/// Set power grade (0xC3)
pub const CMD_POWER_GRADE: u8 = 0xC3;

/// CONTROL value: activate inverter
pub const CONTROL_ACTIVATE: u8 = 0x01;

/// CONTROL value: deactivate inverter
pub const CONTROL_DEACTIVATE: u8 = 0x02;

/// CONTROL value: reboot inverter
pub const CONTROL_REBOOT: u8 = 0x03;

/// Highest accepted power grade (percent)
pub const MAX_POWER_GRADE: u8 = 100;

// ============================================================================
// Transaction Timing (milliseconds)
// ============================================================================

/// Reply window of the flush-mode `get_status`
pub const REPLY_TIMEOUT_MS: u32 = 100;

/// Window for "any data available" before a header search
pub const MESSAGE_TIMEOUT_MS: u32 = 1000;

/// Poll step while waiting for data
pub const POLL_STEP_MS: u32 = 1;

// ============================================================================
// LC12S Bridge Constants
// ============================================================================

/// Bridge configuration frame length, both directions
pub const BRIDGE_FRAME_LEN: usize = 18;

/// First byte of every bridge configuration frame
pub const BRIDGE_PREFIX: u8 = 0xAA;

/// Write settings request (0xAA 0x5A)
pub const BRIDGE_CMD_WRITE: u8 = 0x5A;

/// Write settings response (0xAA 0x5B)
pub const BRIDGE_RESP_WRITE: u8 = 0x5B;

/// Read settings request (0xAA 0x5C)
pub const BRIDGE_CMD_READ: u8 = 0x5C;

/// Read settings response (0xAA 0x5D)
pub const BRIDGE_RESP_READ: u8 = 0x5D;

/// Value of the length byte at offset 15
pub const BRIDGE_LENGTH_BYTE: u8 = 0x12;

/// Highest RF channel the bridge accepts
pub const MAX_RF_CHANNEL: u8 = 127;

/// Line settle time after pulling the programming pin low.
/// The bridge misreads the frame if bytes arrive earlier.
pub const PROGRAM_ENTER_SETTLE_MS: u32 = 400;

/// Line settle time after releasing the programming pin
pub const PROGRAM_EXIT_SETTLE_MS: u32 = 10;

/// Reply window of a bridge configuration exchange
pub const BRIDGE_REPLY_TIMEOUT_MS: u32 = 1000;
