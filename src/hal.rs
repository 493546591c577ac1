//! Hardware seams: the bridge programming line and the millisecond clock
//!
//! Both are traits so the protocol core runs unchanged on a host (serial port
//! DTR line, [`SystemClock`]) and on a microcontroller (`embedded-hal` GPIO and
//! delay, see the `embedded` module).

use crate::error::NetsgpResult;

/// Output line wired to the bridge's SET pin.
///
/// Low puts the bridge into programming mode, high returns it to transparent
/// radio operation.
pub trait ProgramPin {
    /// Drive the line low (programming enabled)
    fn set_low(&mut self) -> NetsgpResult<()>;

    /// Drive the line high (normal operation)
    fn set_high(&mut self) -> NetsgpResult<()>;
}

/// Monotonic millisecond time source.
///
/// `now_ms` wraps at `u32::MAX`; callers compare instants with
/// `wrapping_sub` only.
pub trait Clock {
    /// Current time in milliseconds
    fn now_ms(&self) -> u32;

    /// Block for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);

    /// Milliseconds elapsed since `since`, correct across a wrap
    #[inline]
    fn elapsed_since(&self, since: u32) -> u32 {
        self.now_ms().wrapping_sub(since)
    }
}

/// Programming line that is not connected.
///
/// Bridge configuration is unavailable in practice, but polling works; useful
/// for simulation and for boards with the SET pin strapped high.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPin;

impl ProgramPin for NoPin {
    fn set_low(&mut self) -> NetsgpResult<()> {
        Ok(())
    }

    fn set_high(&mut self) -> NetsgpResult<()> {
        Ok(())
    }
}

/// Host clock based on [`std::time::Instant`]
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// Clock starting at zero now
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap
        self.origin.elapsed().as_millis() as u32
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::testing::ManualClock;

    #[test]
    fn test_elapsed_across_wrap() {
        let clock = ManualClock::new(u32::MAX - 5);
        let start = clock.now_ms();
        clock.advance(10);
        assert_eq!(clock.now_ms(), 4);
        assert_eq!(clock.elapsed_since(start), 10);
    }

    #[test]
    fn test_system_clock_advances() {
        let mut clock = SystemClock::new();
        let start = clock.now_ms();
        clock.delay_ms(2);
        assert!(clock.elapsed_since(start) >= 2);
    }

    #[test]
    fn test_no_pin_is_infallible() {
        let mut pin = NoPin;
        assert!(pin.set_low().is_ok());
        assert!(pin.set_high().is_ok());
    }
}
