//! Microcontroller adapters (feature `embedded`)
//!
//! - [`EmbeddedChannel`]: UART implementing the blocking `embedded-io` traits,
//!   with a fixed-size receive queue so [`ByteChannel::available`] works on
//!   peripherals that only report "ready"
//! - [`HalPin`]: any `embedded-hal` output pin as the bridge SET line
//! - [`DelayClock`]: `embedded-hal` delay plus a millisecond counter
//!
//! Usage: `cargo build --no-default-features --features embedded`

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error as _, OutputPin};
use embedded_io::{Error as _, Read, ReadReady, Write};
use heapless::Deque;

use crate::channel::ByteChannel;
use crate::error::{NetsgpError, NetsgpResult};
use crate::hal::{Clock, ProgramPin};

/// Bytes moved from the UART per read call
const FILL_CHUNK: usize = 16;

fn uart_error<E: embedded_io::Error>(err: E) -> NetsgpError {
    NetsgpError::io(alloc::format!("uart: {:?}", err.kind()))
}

/// UART channel with an `N`-byte receive queue.
///
/// `N` must hold at least one STATUS reply (27 bytes); 64 is a good default.
pub struct EmbeddedChannel<T, D, const N: usize> {
    uart: T,
    delay: D,
    rx: Deque<u8, N>,
    read_timeout_ms: u32,
}

impl<T, D, const N: usize> EmbeddedChannel<T, D, N>
where
    T: Read + Write + ReadReady,
    D: DelayNs,
{
    /// Create a channel; `read_timeout_ms` bounds a single read
    pub fn new(uart: T, delay: D, read_timeout_ms: u32) -> Self {
        Self {
            uart,
            delay,
            rx: Deque::new(),
            read_timeout_ms,
        }
    }

    /// Release the UART and delay
    pub fn release(self) -> (T, D) {
        (self.uart, self.delay)
    }

    /// Move whatever the UART has ready into the queue
    fn fill(&mut self) -> NetsgpResult<()> {
        let mut chunk = [0u8; FILL_CHUNK];
        while !self.rx.is_full() && self.uart.read_ready().map_err(uart_error)? {
            let want = (N - self.rx.len()).min(FILL_CHUNK);
            let n = self.uart.read(&mut chunk[..want]).map_err(uart_error)?;
            if n == 0 {
                break;
            }
            for &byte in &chunk[..n] {
                // Cannot fail: `want` is bounded by the free space
                let _ = self.rx.push_back(byte);
            }
        }
        Ok(())
    }
}

impl<T, D, const N: usize> ByteChannel for EmbeddedChannel<T, D, N>
where
    T: Read + Write + ReadReady,
    D: DelayNs,
{
    fn available(&mut self) -> NetsgpResult<usize> {
        self.fill()?;
        Ok(self.rx.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> NetsgpResult<usize> {
        let mut waited = 0;
        loop {
            self.fill()?;
            if !self.rx.is_empty() || buf.is_empty() {
                break;
            }
            if waited >= self.read_timeout_ms {
                return Ok(0);
            }
            self.delay.delay_ms(1);
            waited += 1;
        }

        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> NetsgpResult<()> {
        self.uart.write_all(data).map_err(uart_error)?;
        self.uart.flush().map_err(uart_error)
    }
}

/// Bridge SET line on an `embedded-hal` output pin
pub struct HalPin<P>(pub P);

impl<P: OutputPin> ProgramPin for HalPin<P> {
    fn set_low(&mut self) -> NetsgpResult<()> {
        self.0
            .set_low()
            .map_err(|err| NetsgpError::io(alloc::format!("pin: {:?}", err.kind())))
    }

    fn set_high(&mut self) -> NetsgpResult<()> {
        self.0
            .set_high()
            .map_err(|err| NetsgpError::io(alloc::format!("pin: {:?}", err.kind())))
    }
}

/// Clock from an `embedded-hal` delay and a millisecond tick source,
/// e.g. a SysTick counter.
pub struct DelayClock<D, F> {
    delay: D,
    now: F,
}

impl<D: DelayNs, F: Fn() -> u32> DelayClock<D, F> {
    pub fn new(delay: D, now: F) -> Self {
        Self { delay, now }
    }
}

impl<D: DelayNs, F: Fn() -> u32> Clock for DelayClock<D, F> {
    fn now_ms(&self) -> u32 {
        (self.now)()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}
