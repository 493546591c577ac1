//! Inverter command/reply framing
//!
//! Every inverter frame is a fixed-length stack array. Commands and the
//! CONTROL / POWER_GRADE acknowledgements share one 15-byte layout:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | Magic byte `0x43` |
//! | 1 | 1 | Command code |
//! | 2 | 4 | Reserved (data box id, zero) |
//! | 6 | 4 | Device id, big-endian |
//! | 10 | 3 | Reserved |
//! | 13 | 1 | Value |
//! | 14 | 1 | Checksum over bytes 0..14 |

use core::fmt;

use tracing::debug;

use crate::constants::{
    ACK_REPLY_LEN, CHECKSUM_OFFSET, CMD_CONTROL, CMD_POWER_GRADE, CMD_STATUS, COMMAND_FRAME_LEN,
    CONTROL_ACTIVATE, CONTROL_DEACTIVATE, CONTROL_REBOOT, DEVICE_ID_OFFSET, MAGIC_BYTE,
    MAX_POWER_GRADE, STATUS_REPLY_LEN, VALUE_OFFSET,
};
use crate::error::{NetsgpError, NetsgpResult};

/// Unique inverter identifier
pub type DeviceId = u32;

/// Additive 8-bit checksum over `data`.
///
/// Carries are dropped beyond 8 bits; this must match the inverter firmware
/// exactly, so it is intentionally not a CRC.
#[inline]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Check `data` against a received checksum byte.
#[inline]
pub fn validate_checksum(data: &[u8], expected: u8) -> bool {
    checksum(data) == expected
}

/// Inverter command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Get status (0xC0)
    Status,
    /// Activate / deactivate / reboot (0xC1)
    Control,
    /// Set power grade (0xC3)
    PowerGrade,
}

impl Command {
    /// Wire code of the command
    #[inline]
    pub fn to_u8(self) -> u8 {
        match self {
            Command::Status => CMD_STATUS,
            Command::Control => CMD_CONTROL,
            Command::PowerGrade => CMD_POWER_GRADE,
        }
    }

    /// Parse a wire code
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            CMD_STATUS => Some(Command::Status),
            CMD_CONTROL => Some(Command::Control),
            CMD_POWER_GRADE => Some(Command::PowerGrade),
            _ => None,
        }
    }

    /// Total length of the reply to this command, header included
    #[inline]
    pub fn reply_len(self) -> usize {
        match self {
            Command::Status => STATUS_REPLY_LEN,
            Command::Control | Command::PowerGrade => ACK_REPLY_LEN,
        }
    }

    /// Reply header: magic byte followed by the command code
    #[inline]
    pub fn reply_header(self) -> [u8; 2] {
        [MAGIC_BYTE, self.to_u8()]
    }

    /// Human-readable name
    pub fn description(self) -> &'static str {
        match self {
            Command::Status => "Status",
            Command::Control => "Control",
            Command::PowerGrade => "Power Grade",
        }
    }
}

/// Values accepted by the CONTROL command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlAction {
    Activate,
    Deactivate,
    Reboot,
}

impl ControlAction {
    /// Value byte sent with CONTROL
    #[inline]
    pub fn to_u8(self) -> u8 {
        match self {
            ControlAction::Activate => CONTROL_ACTIVATE,
            ControlAction::Deactivate => CONTROL_DEACTIVATE,
            ControlAction::Reboot => CONTROL_REBOOT,
        }
    }
}

/// Inverter output limit in percent (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerGrade(u8);

impl PowerGrade {
    /// Full output
    pub const MAX: PowerGrade = PowerGrade(MAX_POWER_GRADE);

    /// Create a power grade, `None` above 100 %
    pub fn new(percent: u8) -> Option<Self> {
        (percent <= MAX_POWER_GRADE).then_some(Self(percent))
    }

    /// Percentage value, also the wire value
    #[inline]
    pub fn percent(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for PowerGrade {
    type Error = NetsgpError;

    fn try_from(percent: u8) -> NetsgpResult<Self> {
        PowerGrade::new(percent).ok_or_else(|| {
            NetsgpError::invalid_value(alloc::format!(
                "power grade {}% exceeds {}%",
                percent,
                MAX_POWER_GRADE
            ))
        })
    }
}

/// Encode a command frame into its 15-byte wire form.
pub fn encode_command(device_id: DeviceId, command: Command, value: u8) -> [u8; COMMAND_FRAME_LEN] {
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    frame[0] = MAGIC_BYTE;
    frame[1] = command.to_u8();
    // 2..6 data box id, left zero
    frame[DEVICE_ID_OFFSET..DEVICE_ID_OFFSET + 4].copy_from_slice(&device_id.to_be_bytes());
    frame[VALUE_OFFSET] = value;
    frame[CHECKSUM_OFFSET] = checksum(&frame[..CHECKSUM_OFFSET]);
    frame
}

/// Read the big-endian device id of a command or reply
#[inline]
pub fn device_id_of(frame: &[u8]) -> Option<DeviceId> {
    let bytes = frame.get(DEVICE_ID_OFFSET..DEVICE_ID_OFFSET + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decoded command frame (also the layout of CONTROL / POWER_GRADE replies)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandFrame {
    pub command: Command,
    pub device_id: DeviceId,
    pub value: u8,
}

impl CommandFrame {
    /// Create a frame
    #[inline]
    pub fn new(device_id: DeviceId, command: Command, value: u8) -> Self {
        Self {
            command,
            device_id,
            value,
        }
    }

    /// Wire bytes of this frame
    #[inline]
    pub fn encode(&self) -> [u8; COMMAND_FRAME_LEN] {
        encode_command(self.device_id, self.command, self.value)
    }

    /// Parse and validate a 15-byte command or acknowledgement frame
    pub fn parse(data: &[u8]) -> NetsgpResult<Self> {
        debug!("Parsing command frame from slice: {} bytes", data.len());

        if data.len() < COMMAND_FRAME_LEN {
            return Err(NetsgpError::short_read(COMMAND_FRAME_LEN, data.len()));
        }
        if data[0] != MAGIC_BYTE {
            return Err(NetsgpError::invalid_data(alloc::format!(
                "bad magic byte 0x{:02X}",
                data[0]
            )));
        }
        let command = Command::from_u8(data[1]).ok_or_else(|| {
            NetsgpError::invalid_data(alloc::format!("unknown command 0x{:02X}", data[1]))
        })?;

        let expected = checksum(&data[..CHECKSUM_OFFSET]);
        if expected != data[CHECKSUM_OFFSET] {
            return Err(NetsgpError::ChecksumMismatch {
                expected,
                actual: data[CHECKSUM_OFFSET],
            });
        }

        let frame = Self {
            command,
            device_id: device_id_of(data).unwrap_or_default(),
            value: data[VALUE_OFFSET],
        };
        debug!(
            "Command frame parsed: CMD={:02X} ({}), device={:08X}, value={:02X}",
            frame.command.to_u8(),
            frame.command.description(),
            frame.device_id,
            frame.value
        );
        Ok(frame)
    }
}

/// Uppercase hex rendering of a byte slice without allocating, for trace logs
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}
