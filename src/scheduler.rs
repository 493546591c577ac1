//! # Round-Robin Poll Scheduler
//!
//! Polls a set of registered inverters from the host's main loop without ever
//! blocking it.
//!
//! ## How It Works
//!
//! Each call to [`PollScheduler::tick`]:
//! 1. Arms the scheduler when the poll interval has elapsed since the start
//!    of the last round.
//! 2. While armed and the pacing gap since the previous send has elapsed,
//!    sends STATUS to the next inverter in id order and waits for its reply.
//!    When every inverter has been polled the round ends and the scheduler
//!    idles until the interval elapses again.
//! 3. Drains every complete STATUS reply already buffered in the channel and
//!    invokes the status callback once per valid reply. A valid reply re-arms
//!    the scheduler; a missing one is given up on after the pacing gap.
//!
//! Only availability checks touch the channel before a read, so a tick never
//! waits for data. A reply header split across ticks is still found.
//!
//! ## Example
//!
//! ```rust
//! use voltage_netsgp::{
//!     InverterStatus, MemoryChannel, NetsgpClient, NoPin, PollConfig, PollScheduler, SystemClock,
//! };
//!
//! # fn main() -> voltage_netsgp::NetsgpResult<()> {
//! let client = NetsgpClient::new(MemoryChannel::new(), NoPin, SystemClock::new())?;
//! let mut scheduler = PollScheduler::new(client, PollConfig::new().with_interval_secs(5));
//!
//! scheduler.set_status_callback(|status: &InverterStatus| {
//!     println!("{:08X}: {:.1} W", status.device_id, status.ac_power);
//! });
//! scheduler.register_inverter(0x11223344);
//!
//! // Call from the main loop
//! scheduler.tick()?;
//! assert_eq!(scheduler.client().channel().written().len(), 1);
//! # Ok(())
//! # }
//! ```

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use core::ops::Bound::{Excluded, Unbounded};

use tracing::{debug, trace};

use crate::channel::{seek_buffered, ByteChannel};
use crate::client::NetsgpClient;
use crate::config::PollConfig;
use crate::constants::{HEADER_LEN, STATUS_REPLY_LEN};
use crate::error::NetsgpResult;
use crate::frame::{Command, DeviceId};
use crate::hal::{Clock, ProgramPin};
use crate::status::InverterStatus;

/// Callback receiving every valid status decoded by [`PollScheduler::tick`]
pub type StatusCallback = Box<dyn FnMut(&InverterStatus)>;

/// Send gate of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollState {
    /// Round finished, waiting for the poll interval
    Idle,
    /// Next inverter may be polled once the pacing gap has passed
    Armed,
    /// Command sent, waiting for the reply or the pacing gap
    AwaitingReply,
}

/// Cooperative round-robin poller over a [`NetsgpClient`].
pub struct PollScheduler<C, P, K> {
    client: NetsgpClient<C, P, K>,
    config: PollConfig,
    /// Registered inverters, iterated in id order
    devices: BTreeSet<DeviceId>,
    /// Last inverter polled in the current round
    cursor: Option<DeviceId>,
    state: PollState,
    last_send_ms: Option<u32>,
    /// Time of the first send of the current round
    last_update_ms: Option<u32>,
    /// Reply header bytes matched so far
    header_matched: usize,
    /// Client transaction count when `header_matched` was last updated
    seen_transactions: u32,
    callback: Option<StatusCallback>,
}

impl<C: ByteChannel, P: ProgramPin, K: Clock> PollScheduler<C, P, K> {
    /// Create a scheduler; the first tick starts a round immediately.
    pub fn new(client: NetsgpClient<C, P, K>, config: PollConfig) -> Self {
        Self {
            client,
            config,
            devices: BTreeSet::new(),
            cursor: None,
            state: PollState::Armed,
            last_send_ms: None,
            last_update_ms: None,
            header_matched: 0,
            seen_transactions: 0,
            callback: None,
        }
    }

    /// Set the callback invoked for every valid status
    pub fn set_status_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&InverterStatus) + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Add an inverter to the poll set. Returns `false` if already present.
    pub fn register_inverter(&mut self, device_id: DeviceId) -> bool {
        let added = self.devices.insert(device_id);
        if added {
            debug!("Registered inverter {:08X}", device_id);
        }
        added
    }

    /// Remove an inverter from the poll set. Returns `false` if unknown.
    ///
    /// Safe mid-round: polling continues with the next remaining inverter.
    pub fn deregister_inverter(&mut self, device_id: DeviceId) -> bool {
        let removed = self.devices.remove(&device_id);
        if removed {
            debug!("Deregistered inverter {:08X}", device_id);
        }
        removed
    }

    /// Check whether an inverter is registered
    pub fn is_registered(&self, device_id: DeviceId) -> bool {
        self.devices.contains(&device_id)
    }

    /// Registered inverters in poll order
    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().copied()
    }

    /// Current send gate
    #[inline]
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Poll timing
    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Get a reference to the client
    pub fn client(&self) -> &NetsgpClient<C, P, K> {
        &self.client
    }

    /// Get a mutable reference to the client, e.g. to send a command between
    /// ticks.
    ///
    /// A blocking transaction run here consumes stream bytes, so the next
    /// tick discards any reply header progress from earlier ticks.
    pub fn client_mut(&mut self) -> &mut NetsgpClient<C, P, K> {
        &mut self.client
    }

    /// Release the client
    pub fn into_client(self) -> NetsgpClient<C, P, K> {
        self.client
    }

    /// Advance the scheduler; call as often as possible.
    ///
    /// Returns the number of valid statuses delivered to the callback.
    /// Buffered replies are drained even when the send fails; the send error
    /// is then returned after the poll position has advanced, so a failing
    /// write does not stall the round.
    pub fn tick(&mut self) -> NetsgpResult<usize> {
        let now = self.client.clock.now_ms();

        if self.interval_elapsed(now) && self.state != PollState::Armed {
            trace!("Poll interval elapsed, arming");
            self.state = PollState::Armed;
        }
        if self.state == PollState::AwaitingReply && self.gap_elapsed(now) {
            trace!("No reply within pacing gap, re-arming");
            self.state = PollState::Armed;
        }
        let sent = if self.state == PollState::Armed && self.gap_elapsed(now) {
            self.poll_next(now)
        } else {
            Ok(())
        };

        let delivered = self.drain()?;
        sent.map(|()| delivered)
    }

    fn interval_elapsed(&self, now: u32) -> bool {
        self.last_update_ms
            .map_or(true, |start| now.wrapping_sub(start) >= self.config.interval_ms)
    }

    fn gap_elapsed(&self, now: u32) -> bool {
        self.last_send_ms
            .map_or(true, |sent| now.wrapping_sub(sent) >= self.config.pacing_gap_ms)
    }

    /// Inverter following the cursor, or the first one at round start
    fn next_device(&self) -> Option<DeviceId> {
        match self.cursor {
            None => self.devices.first().copied(),
            Some(last) => self.devices.range((Excluded(last), Unbounded)).next().copied(),
        }
    }

    fn poll_next(&mut self, now: u32) -> NetsgpResult<()> {
        let Some(device_id) = self.next_device() else {
            if self.cursor.is_some() {
                debug!("Poll round complete");
            }
            self.cursor = None;
            self.state = PollState::Idle;
            return Ok(());
        };

        if self.cursor.is_none() {
            self.last_update_ms = Some(now);
        }
        self.cursor = Some(device_id);
        self.last_send_ms = Some(now);
        self.state = PollState::AwaitingReply;
        self.client.send_command(device_id, Command::Status, 0)
    }

    /// Decode every complete STATUS reply already buffered.
    fn drain(&mut self) -> NetsgpResult<usize> {
        let header = Command::Status.reply_header();
        let mut delivered = 0;

        if self.client.transactions != self.seen_transactions {
            self.seen_transactions = self.client.transactions;
            self.header_matched = 0;
        }

        while seek_buffered(&mut self.client.channel, &header, &mut self.header_matched)? {
            if self.client.channel.available()? < STATUS_REPLY_LEN - HEADER_LEN {
                break;
            }
            self.header_matched = 0;

            self.client.buffer[..HEADER_LEN].copy_from_slice(&header);
            self.client.read_frame(HEADER_LEN, STATUS_REPLY_LEN)?;
            let mut raw = [0u8; STATUS_REPLY_LEN];
            raw.copy_from_slice(&self.client.buffer[..STATUS_REPLY_LEN]);

            let status = InverterStatus::decode(&raw);
            self.client.record_status(&status);
            if !status.valid {
                continue;
            }

            if let Some(callback) = self.callback.as_mut() {
                callback(&status);
            }
            if self.state == PollState::AwaitingReply {
                self.state = PollState::Armed;
            }
            delivered += 1;
        }

        Ok(delivered)
    }
}

impl<C, P, K> core::fmt::Debug for PollScheduler<C, P, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("config", &self.config)
            .field("devices", &self.devices)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .field("last_send_ms", &self.last_send_ms)
            .field("last_update_ms", &self.last_update_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::error::NetsgpError;
    use crate::frame::{device_id_of, CommandFrame, PowerGrade};
    use crate::hal::NoPin;
    use crate::testing::{status_reply, ManualClock};
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestScheduler = PollScheduler<MemoryChannel, NoPin, ManualClock>;

    fn scheduler(channel: MemoryChannel, clock: &ManualClock, config: PollConfig) -> TestScheduler {
        let client = NetsgpClient::new(channel, NoPin, clock.clone()).unwrap();
        PollScheduler::new(client, config)
    }

    fn collect_statuses(scheduler: &mut TestScheduler) -> Rc<RefCell<Vec<InverterStatus>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        scheduler.set_status_callback(move |status| sink.borrow_mut().push(*status));
        seen
    }

    /// Inverters answering immediately with a fixed reading
    fn answering_channel() -> MemoryChannel {
        MemoryChannel::with_responder(|frame| {
            let command = CommandFrame::parse(frame).ok()?;
            Some(status_reply(command.device_id, 1.0, [2400, 100, 23000, 100], 0, 30).to_vec())
        })
    }

    fn polled(scheduler: &TestScheduler) -> Vec<DeviceId> {
        scheduler
            .client()
            .channel()
            .written()
            .iter()
            .filter_map(|frame| device_id_of(frame))
            .collect()
    }

    #[test]
    fn test_end_to_end_single_inverter() {
        let clock = ManualClock::new(0);
        let mut scheduler = scheduler(MemoryChannel::new(), &clock, PollConfig::default());
        let seen = collect_statuses(&mut scheduler);
        scheduler.register_inverter(0x11223344);

        assert_eq!(scheduler.tick().unwrap(), 0);
        assert_eq!(scheduler.state(), PollState::AwaitingReply);
        assert_eq!(
            scheduler.client().channel().written()[0],
            crate::frame::encode_command(0x11223344, Command::Status, 0)
        );

        let reply = status_reply(0x11223344, 321.5, [0x0960, 250, 23100, 260], 3, 41);
        scheduler.client_mut().channel_mut().inject(&reply);
        clock.advance(50);
        assert_eq!(scheduler.tick().unwrap(), 1);
        assert_eq!(scheduler.tick().unwrap(), 0);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        let status = seen[0];
        assert_eq!(status.device_id, 0x11223344);
        assert_eq!(status.total_generated_power, 321.5);
        assert_eq!(status.dc_voltage, 24.0);
        assert_eq!(status.dc_current, 2.5);
        assert_eq!(status.dc_power, 60.0);
        assert_eq!(status.ac_voltage, 231.0);
        assert_eq!(status.state, 3);
        assert_eq!(status.temperature, 41);
        assert_eq!(scheduler.state(), PollState::Armed);
    }

    #[test]
    fn test_round_robin_fairness() {
        let clock = ManualClock::new(0);
        let mut scheduler = scheduler(answering_channel(), &clock, PollConfig::default());
        let seen = collect_statuses(&mut scheduler);
        for id in [30, 10, 20] {
            scheduler.register_inverter(id);
        }

        for _ in 0..24 {
            scheduler.tick().unwrap();
            clock.advance(1010);
        }

        let order = polled(&scheduler);
        assert!(order.len() >= 9);
        for round in order.chunks(3) {
            if round.len() == 3 {
                assert_eq!(round, &[10, 20, 30]);
            }
        }
        assert_eq!(seen.borrow().len(), order.len());
    }

    #[test]
    fn test_idle_until_interval() {
        let clock = ManualClock::new(0);
        let config = PollConfig::new().with_interval_ms(10_000).with_pacing_gap_ms(100);
        let mut scheduler = scheduler(answering_channel(), &clock, config);
        scheduler.register_inverter(1);
        scheduler.register_inverter(2);
        let round_start = clock.now_ms();

        scheduler.tick().unwrap();
        clock.advance(100);
        scheduler.tick().unwrap();
        clock.advance(100);
        scheduler.tick().unwrap();
        assert_eq!(scheduler.state(), PollState::Idle);
        assert_eq!(polled(&scheduler), vec![1, 2]);

        clock.set(round_start + 9_999);
        scheduler.tick().unwrap();
        assert_eq!(polled(&scheduler).len(), 2);

        clock.set(round_start + 10_000);
        scheduler.tick().unwrap();
        assert_eq!(polled(&scheduler), vec![1, 2, 1]);
    }

    #[test]
    fn test_missing_reply_falls_back_to_gap() {
        let clock = ManualClock::new(0);
        let mut scheduler = scheduler(MemoryChannel::new(), &clock, PollConfig::default());
        scheduler.register_inverter(1);
        scheduler.register_inverter(2);

        scheduler.tick().unwrap();
        clock.advance(1009);
        scheduler.tick().unwrap();
        assert_eq!(scheduler.state(), PollState::AwaitingReply);
        assert_eq!(polled(&scheduler), vec![1]);

        clock.advance(1);
        scheduler.tick().unwrap();
        assert_eq!(polled(&scheduler), vec![1, 2]);
    }

    #[test]
    fn test_deregister_mid_round() {
        let clock = ManualClock::new(0);
        let mut scheduler = scheduler(MemoryChannel::new(), &clock, PollConfig::default());
        for id in [1, 2, 3] {
            scheduler.register_inverter(id);
        }

        scheduler.tick().unwrap();
        assert!(scheduler.deregister_inverter(1));
        assert!(scheduler.deregister_inverter(2));
        assert!(!scheduler.deregister_inverter(2));

        clock.advance(1010);
        scheduler.tick().unwrap();
        assert_eq!(polled(&scheduler), vec![1, 3]);

        assert!(scheduler.deregister_inverter(3));
        clock.advance(1010);
        scheduler.tick().unwrap();
        assert_eq!(scheduler.state(), PollState::Idle);
        assert_eq!(polled(&scheduler).len(), 2);
    }

    #[test]
    fn test_register_is_a_set() {
        let clock = ManualClock::new(0);
        let mut scheduler = scheduler(MemoryChannel::new(), &clock, PollConfig::default());
        assert!(scheduler.register_inverter(7));
        assert!(!scheduler.register_inverter(7));
        assert!(scheduler.is_registered(7));
        assert_eq!(scheduler.devices().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_empty_set_goes_idle() {
        let clock = ManualClock::new(0);
        let mut scheduler = scheduler(MemoryChannel::new(), &clock, PollConfig::default());
        assert_eq!(scheduler.tick().unwrap(), 0);
        assert_eq!(scheduler.state(), PollState::Idle);
        assert!(scheduler.client().channel().written().is_empty());
    }

    #[test]
    fn test_clock_wraparound() {
        let clock = ManualClock::new(u32::MAX - 500);
        let mut scheduler = scheduler(MemoryChannel::new(), &clock, PollConfig::default());
        scheduler.register_inverter(1);
        scheduler.register_inverter(2);

        scheduler.tick().unwrap();
        clock.advance(600);
        scheduler.tick().unwrap();
        assert_eq!(polled(&scheduler), vec![1]);

        clock.advance(410);
        scheduler.tick().unwrap();
        assert_eq!(polled(&scheduler), vec![1, 2]);
    }

    #[test]
    fn test_partial_reply_across_ticks() {
        let clock = ManualClock::new(0);
        let mut scheduler = scheduler(MemoryChannel::new(), &clock, PollConfig::default());
        let seen = collect_statuses(&mut scheduler);
        scheduler.register_inverter(0xAB);
        scheduler.tick().unwrap();

        let reply = status_reply(0xAB, 0.0, [100, 100, 100, 100], 0, 0);
        scheduler.client_mut().channel_mut().inject(&[0x00, 0x43]);
        assert_eq!(scheduler.tick().unwrap(), 0);

        scheduler.client_mut().channel_mut().inject(&reply[1..12]);
        assert_eq!(scheduler.tick().unwrap(), 0);

        scheduler.client_mut().channel_mut().inject(&reply[12..]);
        assert_eq!(scheduler.tick().unwrap(), 1);
        assert_eq!(seen.borrow()[0].device_id, 0xAB);
    }

    /// Channel whose transmit side is down while received bytes still arrive
    struct DeadTxChannel(MemoryChannel);

    impl ByteChannel for DeadTxChannel {
        fn available(&mut self) -> NetsgpResult<usize> {
            self.0.available()
        }

        fn read(&mut self, buf: &mut [u8]) -> NetsgpResult<usize> {
            self.0.read(buf)
        }

        fn write_all(&mut self, _data: &[u8]) -> NetsgpResult<()> {
            Err(NetsgpError::io("tx down"))
        }
    }

    #[test]
    fn test_failed_send_still_drains_replies() {
        let clock = ManualClock::new(0);
        let mut channel = MemoryChannel::new();
        channel.inject(&status_reply(0x11223344, 2.0, [100; 4], 1, 30));
        let client = NetsgpClient::new(DeadTxChannel(channel), NoPin, clock.clone()).unwrap();
        let mut scheduler = PollScheduler::new(client, PollConfig::default());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        scheduler.set_status_callback(move |status| sink.borrow_mut().push(status.device_id));
        scheduler.register_inverter(0x11223344);

        assert_eq!(scheduler.tick().unwrap_err(), NetsgpError::io("tx down"));
        assert_eq!(*seen.borrow(), vec![0x11223344]);
        assert_eq!(scheduler.client().channel().0.pending(), 0);
        assert_eq!(scheduler.client().stats().commands_sent, 0);
    }

    #[test]
    fn test_blocking_transaction_resets_header_progress() {
        let clock = ManualClock::new(0);
        let channel = MemoryChannel::with_responder(|frame| Some(frame.to_vec()));
        let mut scheduler = scheduler(channel, &clock, PollConfig::default());
        let seen = collect_statuses(&mut scheduler);

        scheduler.client_mut().channel_mut().inject(&[0x43]);
        assert_eq!(scheduler.tick().unwrap(), 0);

        let grade = PowerGrade::new(50).unwrap();
        scheduler
            .client_mut()
            .set_power_grade(0x11223344, grade)
            .unwrap();

        // Without a reset the leading 0xC0 would complete the stale 0x43
        let mut stream = vec![0xC0];
        stream.extend_from_slice(&[0u8; 25]);
        stream.extend_from_slice(&status_reply(0x55, 0.0, [0; 4], 0, 0));
        scheduler.client_mut().channel_mut().inject(&stream);

        assert_eq!(scheduler.tick().unwrap(), 1);
        assert_eq!(seen.borrow()[0].device_id, 0x55);
        assert_eq!(scheduler.client().stats().checksum_errors, 0);
    }

    #[test]
    fn test_drains_all_buffered_replies() {
        let clock = ManualClock::new(0);
        let mut scheduler = scheduler(MemoryChannel::new(), &clock, PollConfig::default());
        let seen = collect_statuses(&mut scheduler);

        let channel = scheduler.client_mut().channel_mut();
        channel.inject(&[0x43, 0x99, 0x12]);
        channel.inject(&status_reply(1, 0.0, [0; 4], 0, 0));
        channel.inject(&status_reply(2, 0.0, [0; 4], 0, 0));

        assert_eq!(scheduler.tick().unwrap(), 2);
        let ids: Vec<DeviceId> = seen.borrow().iter().map(|s| s.device_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(scheduler.client().channel().pending(), 0);
    }

    #[test]
    fn test_corrupted_reply_is_dropped() {
        let clock = ManualClock::new(0);
        let mut scheduler = scheduler(MemoryChannel::new(), &clock, PollConfig::default());
        let seen = collect_statuses(&mut scheduler);
        scheduler.register_inverter(5);
        scheduler.tick().unwrap();

        let mut reply = status_reply(5, 0.0, [0; 4], 0, 0);
        reply[8] ^= 0x04;
        scheduler.client_mut().channel_mut().inject(&reply);

        assert_eq!(scheduler.tick().unwrap(), 0);
        assert!(seen.borrow().is_empty());
        assert_eq!(scheduler.state(), PollState::AwaitingReply);
        assert_eq!(scheduler.client().stats().checksum_errors, 1);
    }

    proptest! {
        #[test]
        fn prop_sends_respect_pacing_gap(
            steps in proptest::collection::vec(0u32..3000, 1..200),
            device_count in 1u32..6,
            gap in 1u32..2000,
            interval in 0u32..5000,
            answer in any::<bool>(),
        ) {
            let clock = ManualClock::new(u32::MAX - 20_000);
            let sends = Rc::new(RefCell::new(Vec::new()));
            let log = sends.clone();
            let responder_clock = clock.clone();
            let channel = MemoryChannel::with_responder(move |frame| {
                log.borrow_mut().push(responder_clock.now_ms());
                let device_id = device_id_of(frame)?;
                answer.then(|| status_reply(device_id, 0.0, [0; 4], 0, 0).to_vec())
            });
            let config = PollConfig::new().with_interval_ms(interval).with_pacing_gap_ms(gap);
            let mut scheduler = scheduler(channel, &clock, config);
            for id in 0..device_count {
                scheduler.register_inverter(id);
            }

            for step in steps {
                scheduler.tick().unwrap();
                clock.advance(step);
            }

            for pair in sends.borrow().windows(2) {
                prop_assert!(pair[1].wrapping_sub(pair[0]) >= gap);
            }
        }

        #[test]
        fn prop_no_device_repeats_within_round(
            device_count in 1u32..8,
            ticks in 1usize..100,
        ) {
            let clock = ManualClock::new(0);
            let mut scheduler = scheduler(answering_channel(), &clock, PollConfig::default());
            for id in 0..device_count {
                scheduler.register_inverter(id * 3);
            }
            for _ in 0..ticks {
                scheduler.tick().unwrap();
                clock.advance(1010);
            }

            let expected: Vec<DeviceId> = (0..device_count).map(|id| id * 3).collect();
            for round in polled(&scheduler).chunks(device_count as usize) {
                prop_assert_eq!(round, &expected[..round.len()]);
            }
        }
    }
}
