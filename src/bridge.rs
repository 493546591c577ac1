//! LC12S RF bridge configuration
//!
//! The bridge is configured in-band: while its SET line is held low it stops
//! relaying radio traffic and instead answers 18-byte configuration frames on
//! the same serial stream.
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0..2 | `AA 5A` write, `AA 5C` read (`AA 5B` / `AA 5D` in responses) |
//! | 2..4 | Module id, big-endian |
//! | 4..6 | Network id, big-endian |
//! | 7 | RF power code |
//! | 9 | Baudrate code |
//! | 11 | RF channel (0-127) |
//! | 15 | Length `0x12` |
//! | 17 | Checksum over bytes 0..17 |
//!
//! All other bytes are zero. The programming line must settle for 400 ms
//! after going low and 10 ms after going high; shorter waits make the bridge
//! drop or misread the frame.

use tracing::{debug, info, trace};

use crate::channel::ByteChannel;
use crate::client::NetsgpClient;
use crate::constants::{
    BRIDGE_CMD_READ, BRIDGE_CMD_WRITE, BRIDGE_FRAME_LEN, BRIDGE_LENGTH_BYTE, BRIDGE_PREFIX,
    BRIDGE_REPLY_TIMEOUT_MS, BRIDGE_RESP_READ, BRIDGE_RESP_WRITE, MAX_RF_CHANNEL,
    PROGRAM_ENTER_SETTLE_MS, PROGRAM_EXIT_SETTLE_MS,
};
use crate::error::{NetsgpError, NetsgpResult};
use crate::frame::{checksum, HexBytes};
use crate::hal::{Clock, ProgramPin};

const MODULE_ID_OFFSET: usize = 2;
const NETWORK_ID_OFFSET: usize = 4;
const RF_POWER_OFFSET: usize = 7;
const BAUDRATE_OFFSET: usize = 9;
const RF_CHANNEL_OFFSET: usize = 11;
const LENGTH_OFFSET: usize = 15;
const BRIDGE_CHECKSUM_OFFSET: usize = BRIDGE_FRAME_LEN - 1;

/// Transmit power of the bridge radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RfPower {
    Dbm12,
    Dbm10,
    Dbm9,
    Dbm8,
    Dbm6,
    Dbm3,
    Dbm0,
    DbmMinus2,
    DbmMinus5,
    DbmMinus10,
    DbmMinus15,
    DbmMinus20,
    DbmMinus25,
    DbmMinus30,
    DbmMinus35,
}

impl RfPower {
    const ALL: [RfPower; 15] = [
        RfPower::Dbm12,
        RfPower::Dbm10,
        RfPower::Dbm9,
        RfPower::Dbm8,
        RfPower::Dbm6,
        RfPower::Dbm3,
        RfPower::Dbm0,
        RfPower::DbmMinus2,
        RfPower::DbmMinus5,
        RfPower::DbmMinus10,
        RfPower::DbmMinus15,
        RfPower::DbmMinus20,
        RfPower::DbmMinus25,
        RfPower::DbmMinus30,
        RfPower::DbmMinus35,
    ];

    /// Configuration code (0 = strongest)
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Output power in dBm
    pub fn dbm(self) -> i8 {
        match self {
            RfPower::Dbm12 => 12,
            RfPower::Dbm10 => 10,
            RfPower::Dbm9 => 9,
            RfPower::Dbm8 => 8,
            RfPower::Dbm6 => 6,
            RfPower::Dbm3 => 3,
            RfPower::Dbm0 => 0,
            RfPower::DbmMinus2 => -2,
            RfPower::DbmMinus5 => -5,
            RfPower::DbmMinus10 => -10,
            RfPower::DbmMinus15 => -15,
            RfPower::DbmMinus20 => -20,
            RfPower::DbmMinus25 => -25,
            RfPower::DbmMinus30 => -30,
            RfPower::DbmMinus35 => -35,
        }
    }
}

impl TryFrom<u8> for RfPower {
    type Error = NetsgpError;

    fn try_from(code: u8) -> NetsgpResult<Self> {
        RfPower::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| {
                NetsgpError::invalid_data(alloc::format!("unknown RF power code {}", code))
            })
    }
}

/// Serial baudrate between host and bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Baudrate {
    Bps600,
    Bps1200,
    Bps2400,
    Bps4800,
    Bps9600,
    Bps19200,
    Bps38400,
}

impl Baudrate {
    const ALL: [Baudrate; 7] = [
        Baudrate::Bps600,
        Baudrate::Bps1200,
        Baudrate::Bps2400,
        Baudrate::Bps4800,
        Baudrate::Bps9600,
        Baudrate::Bps19200,
        Baudrate::Bps38400,
    ];

    /// Configuration code
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Bits per second
    pub fn bps(self) -> u32 {
        600 << self.code()
    }
}

impl TryFrom<u8> for Baudrate {
    type Error = NetsgpError;

    fn try_from(code: u8) -> NetsgpResult<Self> {
        Baudrate::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| {
                NetsgpError::invalid_data(alloc::format!("unknown baudrate code {}", code))
            })
    }
}

/// Radio settings of an LC12S bridge.
///
/// Two settings compare equal when everything except `module_id` matches;
/// the module id is unique per bridge and never part of a profile.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeSettings {
    /// Factory-assigned module identifier
    pub module_id: u16,
    /// Network identifier shared with the inverters
    pub network_id: u16,
    pub rf_power: RfPower,
    pub baudrate: Baudrate,
    /// RF channel, 0-127
    pub rf_channel: u8,
}

impl BridgeSettings {
    /// Profile the inverters expect
    pub const DEFAULT: BridgeSettings = BridgeSettings {
        module_id: 0x58AF,
        network_id: 0x0000,
        rf_power: RfPower::Dbm12,
        baudrate: Baudrate::Bps9600,
        rf_channel: 0x64,
    };

    /// Same settings with another module id
    pub fn with_module_id(mut self, module_id: u16) -> Self {
        self.module_id = module_id;
        self
    }

    /// Encode as a write request
    pub fn encode_write(&self) -> NetsgpResult<[u8; BRIDGE_FRAME_LEN]> {
        if self.rf_channel > MAX_RF_CHANNEL {
            return Err(NetsgpError::invalid_value(alloc::format!(
                "RF channel {} exceeds {}",
                self.rf_channel,
                MAX_RF_CHANNEL
            )));
        }
        Ok(self.to_frame(BRIDGE_CMD_WRITE))
    }

    /// Encode with an arbitrary command byte; responses use the same layout
    pub fn to_frame(&self, command: u8) -> [u8; BRIDGE_FRAME_LEN] {
        let mut frame = [0u8; BRIDGE_FRAME_LEN];
        frame[0] = BRIDGE_PREFIX;
        frame[1] = command;
        frame[MODULE_ID_OFFSET..MODULE_ID_OFFSET + 2]
            .copy_from_slice(&self.module_id.to_be_bytes());
        frame[NETWORK_ID_OFFSET..NETWORK_ID_OFFSET + 2]
            .copy_from_slice(&self.network_id.to_be_bytes());
        frame[RF_POWER_OFFSET] = self.rf_power.code();
        frame[BAUDRATE_OFFSET] = self.baudrate.code();
        frame[RF_CHANNEL_OFFSET] = self.rf_channel;
        frame[LENGTH_OFFSET] = BRIDGE_LENGTH_BYTE;
        frame[BRIDGE_CHECKSUM_OFFSET] = checksum(&frame[..BRIDGE_CHECKSUM_OFFSET]);
        frame
    }

    /// Validate a bridge response and decode the settings it carries
    pub fn parse_response(raw: &[u8; BRIDGE_FRAME_LEN], response: u8) -> NetsgpResult<Self> {
        let expected_header = [BRIDGE_PREFIX, response];
        if raw[..2] != expected_header {
            return Err(NetsgpError::UnexpectedHeader {
                expected: expected_header,
                actual: [raw[0], raw[1]],
            });
        }

        let expected = checksum(&raw[..BRIDGE_CHECKSUM_OFFSET]);
        if expected != raw[BRIDGE_CHECKSUM_OFFSET] {
            return Err(NetsgpError::ChecksumMismatch {
                expected,
                actual: raw[BRIDGE_CHECKSUM_OFFSET],
            });
        }

        Ok(Self {
            module_id: u16::from_be_bytes([raw[MODULE_ID_OFFSET], raw[MODULE_ID_OFFSET + 1]]),
            network_id: u16::from_be_bytes([raw[NETWORK_ID_OFFSET], raw[NETWORK_ID_OFFSET + 1]]),
            rf_power: RfPower::try_from(raw[RF_POWER_OFFSET])?,
            baudrate: Baudrate::try_from(raw[BAUDRATE_OFFSET])?,
            rf_channel: raw[RF_CHANNEL_OFFSET],
        })
    }
}

impl PartialEq for BridgeSettings {
    fn eq(&self, other: &Self) -> bool {
        self.network_id == other.network_id
            && self.rf_power == other.rf_power
            && self.baudrate == other.baudrate
            && self.rf_channel == other.rf_channel
    }
}

impl Eq for BridgeSettings {}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Read request frame: `AA 5C`, zeros, length `0x12`, checksum `0x18`
pub fn read_query() -> [u8; BRIDGE_FRAME_LEN] {
    let mut frame = [0u8; BRIDGE_FRAME_LEN];
    frame[0] = BRIDGE_PREFIX;
    frame[1] = BRIDGE_CMD_READ;
    frame[LENGTH_OFFSET] = BRIDGE_LENGTH_BYTE;
    frame[BRIDGE_CHECKSUM_OFFSET] = checksum(&frame[..BRIDGE_CHECKSUM_OFFSET]);
    frame
}

impl<C: ByteChannel, P: ProgramPin, K: Clock> NetsgpClient<C, P, K> {
    /// Pull the programming line low and wait for the bridge to switch
    pub fn enter_programming_mode(&mut self) -> NetsgpResult<()> {
        self.pin.set_low()?;
        self.clock.delay_ms(PROGRAM_ENTER_SETTLE_MS);
        debug!("Bridge entered programming mode");
        Ok(())
    }

    /// Release the programming line and wait for normal operation
    pub fn exit_programming_mode(&mut self) -> NetsgpResult<()> {
        self.pin.set_high()?;
        self.clock.delay_ms(PROGRAM_EXIT_SETTLE_MS);
        debug!("Bridge left programming mode");
        Ok(())
    }

    /// Read the current bridge settings.
    pub fn read_bridge_settings(&mut self) -> NetsgpResult<BridgeSettings> {
        let raw = self.bridge_exchange(&read_query())?;
        let settings = BridgeSettings::parse_response(&raw, BRIDGE_RESP_READ)?;
        debug!(
            "Bridge settings: module={:04X} network={:04X} power={} dBm baud={} channel={}",
            settings.module_id,
            settings.network_id,
            settings.rf_power.dbm(),
            settings.baudrate.bps(),
            settings.rf_channel
        );
        Ok(settings)
    }

    /// Write new bridge settings and check the acknowledgement.
    pub fn write_bridge_settings(&mut self, settings: &BridgeSettings) -> NetsgpResult<()> {
        let frame = settings.encode_write()?;
        let raw = self.bridge_exchange(&frame)?;
        BridgeSettings::parse_response(&raw, BRIDGE_RESP_WRITE)?;
        info!(
            "Bridge settings written: network={:04X} power={} dBm baud={} channel={}",
            settings.network_id,
            settings.rf_power.dbm(),
            settings.baudrate.bps(),
            settings.rf_channel
        );
        Ok(())
    }

    /// Make sure the bridge runs the default profile.
    ///
    /// Reads the settings and, only if they differ from
    /// [`BridgeSettings::DEFAULT`], writes the default profile while keeping
    /// the bridge's own module id. Returns `true` when a write happened.
    pub fn ensure_default_bridge_settings(&mut self) -> NetsgpResult<bool> {
        let current = self.read_bridge_settings()?;
        if current == BridgeSettings::DEFAULT {
            debug!("Bridge already at default settings");
            return Ok(false);
        }

        info!("Bridge settings differ from default, rewriting");
        let target = BridgeSettings::DEFAULT.with_module_id(current.module_id);
        self.write_bridge_settings(&target)?;
        Ok(true)
    }

    /// One request/response in programming mode. The line is released even
    /// when the exchange fails.
    fn bridge_exchange(
        &mut self,
        request: &[u8; BRIDGE_FRAME_LEN],
    ) -> NetsgpResult<[u8; BRIDGE_FRAME_LEN]> {
        self.begin_transaction();
        self.enter_programming_mode()?;

        let result = self.bridge_round_trip(request);

        self.exit_programming_mode()?;
        result?;

        let mut raw = [0u8; BRIDGE_FRAME_LEN];
        raw.copy_from_slice(&self.buffer[..BRIDGE_FRAME_LEN]);
        Ok(raw)
    }

    /// Drop inverter traffic still buffered, send `request` and read the
    /// bridge's answer into the buffer.
    fn bridge_round_trip(&mut self, request: &[u8; BRIDGE_FRAME_LEN]) -> NetsgpResult<()> {
        let stale = self.channel.clear()?;
        if stale > 0 {
            trace!("Dropped {} stale bytes before bridge query", stale);
        }

        trace!("Bridge TX {}", HexBytes(request));
        self.channel.write_all(request)?;
        self.wait_for_data("bridge_exchange", BRIDGE_REPLY_TIMEOUT_MS)?;
        self.read_frame(0, BRIDGE_FRAME_LEN)
    }
}
