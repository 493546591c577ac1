//! Byte stream abstraction shared by the inverter link and the bridge
//!
//! The RF bridge is transparent: whatever the host writes is broadcast to the
//! inverters and whatever they answer shows up on the same stream. A
//! [`ByteChannel`] only needs the four primitives the protocol relies on;
//! pattern search and draining have default implementations on top of them.
//!
//! Available implementations:
//! - [`MemoryChannel`] (`std`): in-memory loopback with an optional responder
//! - `SerialChannel` (`serial`): host serial port
//! - `EmbeddedChannel` (`embedded`): `embedded-io` UART

use crate::error::NetsgpResult;

#[cfg(feature = "std")]
use bytes::{Buf, BytesMut};
#[cfg(feature = "std")]
use std::fmt;

/// Drain chunk size for [`ByteChannel::clear`]
const DRAIN_CHUNK: usize = 32;

/// Bidirectional byte stream to the RF bridge.
pub trait ByteChannel {
    /// Number of bytes that can be read without blocking
    fn available(&mut self) -> NetsgpResult<usize>;

    /// Read up to `buf.len()` bytes, blocking up to the channel's own timeout.
    ///
    /// Returns the number of bytes read; `0` means nothing arrived in time.
    fn read(&mut self, buf: &mut [u8]) -> NetsgpResult<usize>;

    /// Write the whole buffer
    fn write_all(&mut self, data: &[u8]) -> NetsgpResult<()>;

    /// Consume bytes until `pattern` has been read.
    ///
    /// Returns `false` once a read comes back empty. Bytes up to and including
    /// the pattern are consumed either way.
    fn find(&mut self, pattern: &[u8]) -> NetsgpResult<bool> {
        let mut matched = 0;
        let mut byte = [0u8; 1];
        while matched < pattern.len() {
            if self.read(&mut byte)? == 0 {
                return Ok(false);
            }
            matched = advance_match(pattern, matched, byte[0]);
        }
        Ok(true)
    }

    /// Discard everything currently buffered
    fn clear(&mut self) -> NetsgpResult<usize> {
        let mut scratch = [0u8; DRAIN_CHUNK];
        let mut dropped = 0;
        loop {
            let pending = self.available()?;
            if pending == 0 {
                return Ok(dropped);
            }
            let n = self.read(&mut scratch[..pending.min(DRAIN_CHUNK)])?;
            if n == 0 {
                return Ok(dropped);
            }
            dropped += n;
        }
    }
}

/// Feed one byte into a streaming pattern match.
///
/// `matched` is the length of the pattern prefix matched so far; the result is
/// the new prefix length. On a mismatch the match falls back to the longest
/// prefix that is also a suffix of what was seen, so overlapping starts such as
/// `43 43 C0` are still found.
pub fn advance_match(pattern: &[u8], mut matched: usize, byte: u8) -> usize {
    loop {
        if matched < pattern.len() && pattern[matched] == byte {
            return matched + 1;
        }
        if matched == 0 {
            return 0;
        }
        matched = border(pattern, matched);
    }
}

/// Longest proper prefix of `pattern[..len]` that is also its suffix
fn border(pattern: &[u8], len: usize) -> usize {
    (1..len)
        .rev()
        .find(|&k| pattern[..k] == pattern[len - k..len])
        .unwrap_or(0)
}

/// Non-blocking pattern search over already buffered bytes.
///
/// Reads one byte at a time only while [`ByteChannel::available`] reports
/// data. Progress is kept in `matched`, so a header split across two calls is
/// still recognised. Returns `true` with `matched == pattern.len()` once the
/// whole pattern was consumed; the caller resets `matched` afterwards.
pub fn seek_buffered<C: ByteChannel + ?Sized>(
    channel: &mut C,
    pattern: &[u8],
    matched: &mut usize,
) -> NetsgpResult<bool> {
    let mut byte = [0u8; 1];
    while *matched < pattern.len() && channel.available()? > 0 {
        if channel.read(&mut byte)? == 0 {
            break;
        }
        *matched = advance_match(pattern, *matched, byte[0]);
    }
    Ok(*matched == pattern.len())
}

/// Reply generator of a [`MemoryChannel`]: receives every written frame and
/// may return bytes to append to the receive buffer.
#[cfg(feature = "std")]
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>>>;

/// In-memory channel for simulation and tests.
///
/// Written frames are logged; if a responder is installed its output is queued
/// for reading immediately, which models an inverter answering within the
/// reply window.
#[cfg(feature = "std")]
#[derive(Default)]
pub struct MemoryChannel {
    rx: BytesMut,
    written: Vec<Vec<u8>>,
    responder: Option<Responder>,
}

#[cfg(feature = "std")]
impl MemoryChannel {
    /// Create an empty channel without responder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel whose writes are answered by `responder`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Replace the responder
    pub fn set_responder<F>(&mut self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + 'static,
    {
        self.responder = Some(Box::new(responder));
    }

    /// Queue bytes as if they had been received
    pub fn inject(&mut self, data: &[u8]) {
        self.rx.extend_from_slice(data);
    }

    /// Bytes queued but not yet read
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Every frame written so far, in order
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Take the write log, leaving it empty
    pub fn take_written(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.written)
    }
}

#[cfg(feature = "std")]
impl fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("pending", &self.rx.len())
            .field("written", &self.written.len())
            .field("responder", &self.responder.is_some())
            .finish()
    }
}

#[cfg(feature = "std")]
impl ByteChannel for MemoryChannel {
    fn available(&mut self) -> NetsgpResult<usize> {
        Ok(self.rx.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> NetsgpResult<usize> {
        let n = buf.len().min(self.rx.len());
        buf[..n].copy_from_slice(&self.rx[..n]);
        self.rx.advance(n);
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> NetsgpResult<()> {
        self.written.push(data.to_vec());
        if let Some(responder) = self.responder.as_mut() {
            if let Some(reply) = responder(data) {
                self.rx.extend_from_slice(&reply);
            }
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_memory_channel_read_and_available() {
        let mut channel = MemoryChannel::new();
        channel.inject(&[1, 2, 3, 4, 5]);
        assert_eq!(channel.available().unwrap(), 5);

        let mut buf = [0u8; 3];
        assert_eq!(channel.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(channel.available().unwrap(), 2);

        let mut buf = [0u8; 8];
        assert_eq!(channel.read(&mut buf).unwrap(), 2);
        assert_eq!(channel.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_responder_queues_reply() {
        let mut channel =
            MemoryChannel::with_responder(|frame| Some(frame.iter().rev().copied().collect()));
        channel.write_all(&[0xAA, 0xBB]).unwrap();
        assert_eq!(channel.written(), &[vec![0xAA, 0xBB]]);
        assert_eq!(channel.pending(), 2);

        let mut buf = [0u8; 2];
        channel.read(&mut buf).unwrap();
        assert_eq!(buf, [0xBB, 0xAA]);
    }

    #[test]
    fn test_find_skips_noise() {
        let mut channel = MemoryChannel::new();
        channel.inject(&[0x00, 0x43, 0x11, 0x43, 0xC0, 0x99]);
        assert!(channel.find(&[0x43, 0xC0]).unwrap());

        let mut rest = [0u8; 1];
        assert_eq!(channel.read(&mut rest).unwrap(), 1);
        assert_eq!(rest[0], 0x99);
    }

    #[test]
    fn test_find_overlapping_start() {
        let mut channel = MemoryChannel::new();
        channel.inject(&[0x43, 0x43, 0xC0]);
        assert!(channel.find(&[0x43, 0xC0]).unwrap());
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn test_find_exhausted() {
        let mut channel = MemoryChannel::new();
        channel.inject(&[0x01, 0x43]);
        assert!(!channel.find(&[0x43, 0xC0]).unwrap());
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn test_clear_drains_everything() {
        let mut channel = MemoryChannel::new();
        channel.inject(&[0u8; 70]);
        assert_eq!(channel.clear().unwrap(), 70);
        assert_eq!(channel.available().unwrap(), 0);
    }

    #[test]
    fn test_advance_match_fallback() {
        let pattern = [0xAA, 0xAA, 0x5D];
        let mut matched = 0;
        for byte in [0xAA, 0xAA, 0xAA, 0x5D] {
            matched = advance_match(&pattern, matched, byte);
        }
        assert_eq!(matched, 3);
        assert_eq!(advance_match(&pattern, 2, 0x00), 0);
    }

    #[test]
    fn test_seek_buffered_keeps_progress() {
        let mut channel = MemoryChannel::new();
        let mut matched = 0;

        channel.inject(&[0x10, 0x43]);
        assert!(!seek_buffered(&mut channel, &[0x43, 0xC0], &mut matched).unwrap());
        assert_eq!(matched, 1);

        channel.inject(&[0xC0, 0x01]);
        assert!(seek_buffered(&mut channel, &[0x43, 0xC0], &mut matched).unwrap());
        assert_eq!(channel.pending(), 1);
    }
}
