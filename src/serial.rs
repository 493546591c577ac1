//! Host serial port adapter (feature `serial`)
//!
//! The LC12S bridge is usually attached through a USB-UART adapter. The
//! adapter's DTR output is wired to the bridge's SET pin, so the same port
//! provides both the [`ByteChannel`] and the [`ProgramPin`].

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tokio_serial::SerialPort;
use tracing::debug;

use crate::channel::ByteChannel;
use crate::error::{NetsgpError, NetsgpResult};
use crate::hal::ProgramPin;

/// Default read timeout of a serial channel
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

fn port_error(err: tokio_serial::Error) -> NetsgpError {
    NetsgpError::io(err.to_string())
}

/// Blocking serial port channel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Open `path` at `baud_rate`, 8N1.
    ///
    /// `read_timeout` bounds a single [`ByteChannel::read`].
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> NetsgpResult<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .timeout(read_timeout)
            .open()
            .map_err(port_error)?;
        debug!("Opened serial port {} at {} baud", path, baud_rate);
        Ok(Self { port })
    }

    /// Wrap an already opened port
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// DTR line of the same port, for bridge programming
    pub fn program_line(&self) -> NetsgpResult<DtrLine> {
        let port = self.port.try_clone().map_err(port_error)?;
        Ok(DtrLine { port })
    }

    /// Name of the underlying port, if known
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl ByteChannel for SerialChannel {
    fn available(&mut self) -> NetsgpResult<usize> {
        let pending = self.port.bytes_to_read().map_err(port_error)?;
        Ok(pending as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> NetsgpResult<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::TimedOut => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> NetsgpResult<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }
}

/// Bridge SET pin driven by the port's DTR output.
///
/// USB-UART adapters invert DTR: asserting it pulls the line low.
pub struct DtrLine {
    port: Box<dyn SerialPort>,
}

impl ProgramPin for DtrLine {
    fn set_low(&mut self) -> NetsgpResult<()> {
        self.port.write_data_terminal_ready(true).map_err(port_error)
    }

    fn set_high(&mut self) -> NetsgpResult<()> {
        self.port.write_data_terminal_ready(false).map_err(port_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails() {
        let result = SerialChannel::open("/dev/netsgp-missing-port", 9600, DEFAULT_READ_TIMEOUT);
        assert!(matches!(result, Err(NetsgpError::Io { .. })));
    }
}
