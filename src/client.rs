//! Request/reply transactor for NETSGP inverters
//!
//! [`NetsgpClient`] owns the byte channel to the RF bridge, the bridge's
//! programming line and a millisecond clock. It sends one command at a time
//! and waits for the matching reply with bounded, explicit timeouts.
//!
//! # Reply Modes
//!
//! | Mode | Before send | Waiting | Locating the reply |
//! |------|-------------|---------|--------------------|
//! | [`ReplyMode::Flush`] | drain stale bytes | 100 ms for the first byte | reply starts at the first byte |
//! | [`ReplyMode::HeaderSearch`] | nothing | 1 s for any data | scan for `43 <cmd>` |
//!
//! `get_status` follows the configured mode, header search by default.
//! CONTROL and POWER_GRADE always use header search and additionally require
//! the value echo.
//!
//! # Quick Start
//!
//! ```rust
//! use voltage_netsgp::{MemoryChannel, NetsgpClient, NoPin, PowerGrade, SystemClock};
//!
//! # fn main() -> voltage_netsgp::NetsgpResult<()> {
//! // Inverter simulator answering every command with its echo
//! let channel = MemoryChannel::with_responder(|frame| Some(frame.to_vec()));
//! let mut client = NetsgpClient::new(channel, NoPin, SystemClock::new())?;
//!
//! if let Some(grade) = PowerGrade::new(80) {
//!     client.set_power_grade(0x11223344, grade)?;
//! }
//! client.activate(0x11223344, true)?;
//! assert_eq!(client.stats().commands_sent, 2);
//! # Ok(())
//! # }
//! ```

use tracing::{debug, trace, warn};

use crate::channel::ByteChannel;
use crate::constants::{
    CHECKSUM_OFFSET, FRAME_BUFFER_SIZE, HEADER_LEN, MESSAGE_TIMEOUT_MS, POLL_STEP_MS,
    PROGRAM_EXIT_SETTLE_MS, REPLY_TIMEOUT_MS, STATUS_REPLY_LEN, VALUE_OFFSET,
};
use crate::error::{NetsgpError, NetsgpResult};
use crate::frame::{
    checksum, encode_command, Command, ControlAction, DeviceId, HexBytes, PowerGrade,
};
use crate::hal::{Clock, ProgramPin};
use crate::status::InverterStatus;

/// How `get_status` locates the STATUS reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyMode {
    /// Drain, send, wait 100 ms, read exactly 27 bytes
    Flush,
    /// Send, wait 1 s, search for the reply header
    #[default]
    HeaderSearch,
}

/// Transaction counters of a client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Command frames written
    pub commands_sent: u64,
    /// Replies that passed validation
    pub replies_decoded: u64,
    /// Waits that saw no data
    pub timeouts: u64,
    /// Replies that stopped short of their length
    pub short_reads: u64,
    /// Replies with a wrong checksum
    pub checksum_errors: u64,
    /// Acknowledgements echoing the wrong value
    pub echo_mismatches: u64,
    /// Data arrived but no reply header was found
    pub header_misses: u64,
}

/// Blocking transactor over a [`ByteChannel`].
///
/// Generic over the channel, the programming line and the clock so the same
/// code runs on a host and on a microcontroller.
pub struct NetsgpClient<C, P, K> {
    pub(crate) channel: C,
    pub(crate) pin: P,
    pub(crate) clock: K,
    reply_mode: ReplyMode,
    pub(crate) buffer: [u8; FRAME_BUFFER_SIZE],
    pub(crate) stats: ClientStats,
    /// Blocking transactions run so far, wrapping
    pub(crate) transactions: u32,
}

impl<C: ByteChannel, P: ProgramPin, K: Clock> NetsgpClient<C, P, K> {
    /// Create a client and put the bridge into normal (transparent) mode.
    ///
    /// Drives the programming line high and waits for it to settle.
    pub fn new(channel: C, mut pin: P, mut clock: K) -> NetsgpResult<Self> {
        pin.set_high()?;
        clock.delay_ms(PROGRAM_EXIT_SETTLE_MS);
        debug!("NETSGP client created, bridge in normal mode");

        Ok(Self {
            channel,
            pin,
            clock,
            reply_mode: ReplyMode::default(),
            buffer: [0u8; FRAME_BUFFER_SIZE],
            stats: ClientStats::default(),
            transactions: 0,
        })
    }

    /// Select how `get_status` waits for its reply
    pub fn with_reply_mode(mut self, mode: ReplyMode) -> Self {
        self.reply_mode = mode;
        self
    }

    /// Current reply mode
    pub fn reply_mode(&self) -> ReplyMode {
        self.reply_mode
    }

    /// Transaction counters
    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Reset transaction counters
    pub fn reset_stats(&mut self) {
        self.stats = ClientStats::default();
    }

    /// Get a reference to the underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Get a mutable reference to the underlying channel
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Get a reference to the clock
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Release channel, programming line and clock
    pub fn into_parts(self) -> (C, P, K) {
        (self.channel, self.pin, self.clock)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Write one command frame without waiting for a reply.
    pub fn send_command(
        &mut self,
        device_id: DeviceId,
        command: Command,
        value: u8,
    ) -> NetsgpResult<()> {
        let frame = encode_command(device_id, command, value);
        trace!("TX {}", HexBytes(&frame));
        self.channel.write_all(&frame)?;
        self.stats.commands_sent += 1;
        debug!(
            "Sent {} to {:08X}, value={:02X}",
            command.description(),
            device_id,
            value
        );
        Ok(())
    }

    /// Poll one inverter and decode its status.
    ///
    /// A reply with a wrong checksum is still returned, with `valid == false`.
    /// Missing, truncated or unlocatable replies are errors.
    pub fn get_status(&mut self, device_id: DeviceId) -> NetsgpResult<InverterStatus> {
        self.begin_transaction();
        match self.reply_mode {
            ReplyMode::Flush => {
                let stale = self.channel.clear()?;
                if stale > 0 {
                    trace!("Dropped {} stale bytes", stale);
                }
                self.send_command(device_id, Command::Status, 0)?;
                self.wait_for_data("get_status", REPLY_TIMEOUT_MS)?;
                self.read_frame(0, STATUS_REPLY_LEN)?;
                self.channel.clear()?;
            }
            ReplyMode::HeaderSearch => {
                self.send_command(device_id, Command::Status, 0)?;
                self.receive_reply(Command::Status)?;
            }
        }

        let mut raw = [0u8; STATUS_REPLY_LEN];
        raw.copy_from_slice(&self.buffer[..STATUS_REPLY_LEN]);
        let status = InverterStatus::decode(&raw);
        self.record_status(&status);
        if status.valid && status.device_id != device_id {
            debug!(
                "Status for {:08X} answered by {:08X}",
                device_id, status.device_id
            );
        }
        Ok(status)
    }

    /// Send a command and require an acknowledgement.
    ///
    /// The reply is located by header search and must carry a valid checksum.
    /// For CONTROL and POWER_GRADE the value at offset 13 must also echo
    /// `value`; STATUS replies carry power data there instead.
    pub fn send_command_and_validate(
        &mut self,
        device_id: DeviceId,
        command: Command,
        value: u8,
    ) -> NetsgpResult<()> {
        self.begin_transaction();
        self.send_command(device_id, command, value)?;
        let len = self.receive_reply(command)?;

        let expected = checksum(&self.buffer[..CHECKSUM_OFFSET]);
        let actual = self.buffer[CHECKSUM_OFFSET];
        if expected != actual {
            self.stats.checksum_errors += 1;
            warn!(
                "{} reply from {:08X}: checksum {:02X} != {:02X}",
                command.description(),
                device_id,
                expected,
                actual
            );
            return Err(NetsgpError::ChecksumMismatch { expected, actual });
        }

        if command != Command::Status {
            let echoed = self.buffer[VALUE_OFFSET];
            if echoed != value {
                self.stats.echo_mismatches += 1;
                warn!(
                    "{} reply from {:08X}: echoed {:02X}, sent {:02X}",
                    command.description(),
                    device_id,
                    echoed,
                    value
                );
                return Err(NetsgpError::ValueEchoMismatch {
                    sent: value,
                    echoed,
                });
            }
        }

        self.stats.replies_decoded += 1;
        debug!("{} acknowledged by {:08X} ({} bytes)", command.description(), device_id, len);
        Ok(())
    }

    /// Limit inverter output
    pub fn set_power_grade(&mut self, device_id: DeviceId, grade: PowerGrade) -> NetsgpResult<()> {
        self.send_command_and_validate(device_id, Command::PowerGrade, grade.percent())
    }

    /// Activate (`true`) or deactivate (`false`) an inverter
    pub fn activate(&mut self, device_id: DeviceId, active: bool) -> NetsgpResult<()> {
        let action = if active {
            ControlAction::Activate
        } else {
            ControlAction::Deactivate
        };
        self.control(device_id, action)
    }

    /// Reboot an inverter
    pub fn reboot(&mut self, device_id: DeviceId) -> NetsgpResult<()> {
        self.control(device_id, ControlAction::Reboot)
    }

    /// Send a CONTROL command
    pub fn control(&mut self, device_id: DeviceId, action: ControlAction) -> NetsgpResult<()> {
        self.send_command_and_validate(device_id, Command::Control, action.to_u8())
    }

    // ========================================================================
    // Receive primitives
    // ========================================================================

    /// Mark the start of a blocking transaction that reads from the channel
    pub(crate) fn begin_transaction(&mut self) {
        self.transactions = self.transactions.wrapping_add(1);
    }

    /// Wait until at least one byte is available.
    pub(crate) fn wait_for_data(
        &mut self,
        operation: &'static str,
        timeout_ms: u32,
    ) -> NetsgpResult<usize> {
        let start = self.clock.now_ms();
        loop {
            let available = self.channel.available()?;
            if available > 0 {
                return Ok(available);
            }
            if self.clock.elapsed_since(start) >= timeout_ms {
                self.stats.timeouts += 1;
                debug!("{}: no data within {} ms", operation, timeout_ms);
                return Err(NetsgpError::timeout(operation, timeout_ms));
            }
            self.clock.delay_ms(POLL_STEP_MS);
        }
    }

    /// Fill `buffer[start..end]` from the channel.
    pub(crate) fn read_frame(&mut self, start: usize, end: usize) -> NetsgpResult<()> {
        let mut filled = start;
        while filled < end {
            let n = self.channel.read(&mut self.buffer[filled..end])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < end {
            self.stats.short_reads += 1;
            debug!("Short read: {} of {} bytes", filled - start, end - start);
            return Err(NetsgpError::short_read(end - start, filled - start));
        }
        trace!("RX {}", HexBytes(&self.buffer[..end]));
        Ok(())
    }

    /// Wait for data, locate the reply header of `command` and read the
    /// rest of the reply into the buffer. Returns the reply length.
    fn receive_reply(&mut self, command: Command) -> NetsgpResult<usize> {
        self.wait_for_data("wait_for_message", MESSAGE_TIMEOUT_MS)?;

        let header = command.reply_header();
        if !self.channel.find(&header)? {
            self.stats.header_misses += 1;
            debug!("Reply header {:02X?} not found", header);
            return Err(NetsgpError::HeaderNotFound { header });
        }

        let len = command.reply_len();
        self.buffer[..HEADER_LEN].copy_from_slice(&header);
        self.read_frame(HEADER_LEN, len)?;
        Ok(len)
    }

    /// Count a decoded STATUS reply
    pub(crate) fn record_status(&mut self, status: &InverterStatus) {
        if status.valid {
            self.stats.replies_decoded += 1;
        } else {
            self.stats.checksum_errors += 1;
            warn!("Status from {:08X} failed checksum", status.device_id);
        }
    }
}

impl<C, P, K> core::fmt::Debug for NetsgpClient<C, P, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NetsgpClient")
            .field("reply_mode", &self.reply_mode)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
