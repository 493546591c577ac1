//! Test doubles shared by the unit tests

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::constants::STATUS_REPLY_LEN;
use crate::error::NetsgpResult;
use crate::frame::DeviceId;
use crate::hal::{Clock, ProgramPin};
use crate::status::InverterStatus;

/// Hand-driven clock; clones share the same time.
///
/// `delay_ms` advances time, so blocking waits finish instantly.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms);
    }
}

/// Pin level change: `true` is high, with the time it happened
pub type PinEvent = (bool, u32);

/// Programming pin that records every level change
#[derive(Debug, Clone)]
pub struct RecordingPin {
    clock: ManualClock,
    events: Rc<RefCell<Vec<PinEvent>>>,
}

impl RecordingPin {
    pub fn new(clock: &ManualClock) -> Self {
        Self {
            clock: clock.clone(),
            events: Rc::default(),
        }
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl ProgramPin for RecordingPin {
    fn set_low(&mut self) -> NetsgpResult<()> {
        self.events.borrow_mut().push((false, self.clock.now_ms()));
        Ok(())
    }

    fn set_high(&mut self) -> NetsgpResult<()> {
        self.events.borrow_mut().push((true, self.clock.now_ms()));
        Ok(())
    }
}

/// Build a valid STATUS reply. `centi` holds DC V, DC I, AC V, AC I in
/// centi-units.
pub fn status_reply(
    device_id: DeviceId,
    total_power: f32,
    centi: [u16; 4],
    state: u8,
    temperature: u8,
) -> [u8; STATUS_REPLY_LEN] {
    let mut raw = InverterStatus {
        device_id,
        total_generated_power: total_power,
        state,
        temperature,
        ..Default::default()
    }
    .to_frame();
    for (i, value) in centi.iter().enumerate() {
        let offset = 15 + i * 2;
        raw[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }
    raw
}
