//! # Status Reply Decoding
//!
//! Maps a 27-byte STATUS reply to an [`InverterStatus`].
//!
//! | Offset | Size | Field | Decoding |
//! |--------|------|-------|----------|
//! | 6 | 4 | Device id | u32 BE |
//! | 10 | 4 | Total generated power | IEEE-754 f32 bit pattern, BE |
//! | 14 | 1 | Checksum | sum of bytes 0..14 |
//! | 15 | 2 | DC voltage | u16 BE / 100 |
//! | 17 | 2 | DC current | u16 BE / 100 |
//! | 19 | 2 | AC voltage | u16 BE / 100 |
//! | 21 | 2 | AC current | u16 BE / 100 |
//! | 25 | 1 | State | raw code |
//! | 26 | 1 | Temperature | raw code |
//!
//! Bytes 23..25 are not understood and ignored. State and temperature are kept
//! as raw codes; no scaling is known for them.

use crate::constants::{
    CHECKSUM_OFFSET, CMD_STATUS, DEVICE_ID_OFFSET, MAGIC_BYTE, STATUS_REPLY_LEN,
};
use crate::frame::{checksum, DeviceId};

/// Fixed-point scale of the voltage/current fields (centi-units)
const CENTI: f32 = 100.0;

const TOTAL_POWER_OFFSET: usize = 10;
const DC_VOLTAGE_OFFSET: usize = 15;
const DC_CURRENT_OFFSET: usize = 17;
const AC_VOLTAGE_OFFSET: usize = 19;
const AC_CURRENT_OFFSET: usize = 21;
const STATE_OFFSET: usize = 25;
const TEMPERATURE_OFFSET: usize = 26;

/// Status information of a single inverter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InverterStatus {
    /// Unique inverter identifier
    pub device_id: DeviceId,
    /// Inverter state, raw code
    pub state: u8,
    /// Inverter temperature, raw code
    pub temperature: u8,
    /// Checksum of the reply matched
    pub valid: bool,
    /// Total generated power (unit unknown, likely kWh)
    pub total_generated_power: f32,
    /// Panel voltage in volts
    pub dc_voltage: f32,
    /// Panel current in amperes
    pub dc_current: f32,
    /// Panel power in watts
    pub dc_power: f32,
    /// Grid voltage in volts
    pub ac_voltage: f32,
    /// Grid current in amperes
    pub ac_current: f32,
    /// Output power in watts
    pub ac_power: f32,
}

#[inline]
fn read_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([raw[offset], raw[offset + 1]])
}

#[inline]
fn read_u32(raw: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]])
}

#[inline]
fn to_centi(value: f32) -> u16 {
    // float -> int `as` saturates, so negative readings clamp to 0
    (value * CENTI + 0.5) as u16
}

impl InverterStatus {
    /// Decode a raw STATUS reply.
    ///
    /// Decoding always succeeds; `valid` reports whether the checksum at
    /// offset 14 matches bytes 0..14.
    ///
    /// # Example
    ///
    /// ```rust
    /// use voltage_netsgp::InverterStatus;
    ///
    /// let mut raw = [0u8; 27];
    /// raw[..10].copy_from_slice(&[0x43, 0xC0, 0, 0, 0, 0, 0x11, 0x22, 0x33, 0x44]);
    /// raw[15..17].copy_from_slice(&0x0960u16.to_be_bytes()); // 24.00 V
    /// raw[14] = voltage_netsgp::frame::checksum(&raw[..14]);
    ///
    /// let status = InverterStatus::decode(&raw);
    /// assert!(status.valid);
    /// assert_eq!(status.device_id, 0x11223344);
    /// assert_eq!(status.dc_voltage, 24.0);
    /// ```
    pub fn decode(raw: &[u8; STATUS_REPLY_LEN]) -> Self {
        let dc_voltage = read_u16(raw, DC_VOLTAGE_OFFSET) as f32 / CENTI;
        let dc_current = read_u16(raw, DC_CURRENT_OFFSET) as f32 / CENTI;
        let ac_voltage = read_u16(raw, AC_VOLTAGE_OFFSET) as f32 / CENTI;
        let ac_current = read_u16(raw, AC_CURRENT_OFFSET) as f32 / CENTI;

        Self {
            device_id: read_u32(raw, DEVICE_ID_OFFSET),
            state: raw[STATE_OFFSET],
            temperature: raw[TEMPERATURE_OFFSET],
            valid: checksum(&raw[..CHECKSUM_OFFSET]) == raw[CHECKSUM_OFFSET],
            // Bit pattern, not a numeric conversion
            total_generated_power: f32::from_bits(read_u32(raw, TOTAL_POWER_OFFSET)),
            dc_voltage,
            dc_current,
            dc_power: dc_voltage * dc_current,
            ac_voltage,
            ac_current,
            ac_power: ac_voltage * ac_current,
        }
    }

    /// Decode from a slice, `None` when it is shorter than a STATUS reply
    pub fn from_slice(raw: &[u8]) -> Option<Self> {
        let raw: &[u8; STATUS_REPLY_LEN] = raw.get(..STATUS_REPLY_LEN)?.try_into().ok()?;
        Some(Self::decode(raw))
    }

    /// Encode this status as the reply an inverter would send.
    ///
    /// Voltages and currents are rounded to centi-units; derived powers and
    /// `valid` are not transmitted. Used to simulate inverters.
    pub fn to_frame(&self) -> [u8; STATUS_REPLY_LEN] {
        let mut raw = [0u8; STATUS_REPLY_LEN];
        raw[0] = MAGIC_BYTE;
        raw[1] = CMD_STATUS;
        raw[DEVICE_ID_OFFSET..DEVICE_ID_OFFSET + 4].copy_from_slice(&self.device_id.to_be_bytes());
        raw[TOTAL_POWER_OFFSET..TOTAL_POWER_OFFSET + 4]
            .copy_from_slice(&self.total_generated_power.to_bits().to_be_bytes());
        raw[CHECKSUM_OFFSET] = checksum(&raw[..CHECKSUM_OFFSET]);

        for (offset, value) in [
            (DC_VOLTAGE_OFFSET, self.dc_voltage),
            (DC_CURRENT_OFFSET, self.dc_current),
            (AC_VOLTAGE_OFFSET, self.ac_voltage),
            (AC_CURRENT_OFFSET, self.ac_current),
        ] {
            raw[offset..offset + 2].copy_from_slice(&to_centi(value).to_be_bytes());
        }
        raw[STATE_OFFSET] = self.state;
        raw[TEMPERATURE_OFFSET] = self.temperature;
        raw
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::testing::status_reply;
    use proptest::prelude::*;

    #[test]
    fn test_decode_reference_reply() {
        let raw = status_reply(0x11223344, 1234.5, [2400, 150, 23012, 210], 0x02, 0x2F);
        let status = InverterStatus::decode(&raw);

        assert!(status.valid);
        assert_eq!(status.device_id, 0x11223344);
        assert_eq!(status.total_generated_power, 1234.5);
        assert_eq!(status.dc_voltage, 24.0);
        assert_eq!(status.dc_current, 1.5);
        assert_eq!(status.dc_power, 24.0 * 1.5);
        assert_eq!(status.ac_voltage, 230.12);
        assert_eq!(status.ac_current, 2.1);
        assert_eq!(status.ac_power, 230.12f32 * 2.1f32);
        assert_eq!(status.state, 0x02);
        assert_eq!(status.temperature, 0x2F);
    }

    #[test]
    fn test_total_power_is_bit_reinterpreted() {
        // 0x42C80000 is 100.0 as IEEE-754; a numeric cast would give 1120403456
        let mut raw = status_reply(1, 0.0, [0; 4], 0, 0);
        raw[10..14].copy_from_slice(&[0x42, 0xC8, 0x00, 0x00]);
        raw[14] = checksum(&raw[..14]);

        let status = InverterStatus::decode(&raw);
        assert!(status.valid);
        assert_eq!(status.total_generated_power, 100.0);
    }

    #[test]
    fn test_scaling_keeps_fraction() {
        let raw = status_reply(1, 0.0, [1, 99, 12345, 0xFFFF], 0, 0);
        let status = InverterStatus::decode(&raw);
        assert_eq!(status.dc_voltage, 0.01);
        assert_eq!(status.dc_current, 0.99);
        assert_eq!(status.ac_voltage, 123.45);
        assert_eq!(status.ac_current, 655.35);
    }

    #[test]
    fn test_payload_bytes_outside_checksum() {
        // Only bytes 0..14 are covered; payload corruption stays "valid"
        let mut raw = status_reply(7, 0.0, [100, 100, 100, 100], 0, 0);
        raw[16] ^= 0xFF;
        assert!(InverterStatus::decode(&raw).valid);
    }

    #[test]
    fn test_from_slice_length() {
        let raw = status_reply(7, 0.0, [0; 4], 0, 0);
        assert!(InverterStatus::from_slice(&raw[..26]).is_none());
        assert_eq!(
            InverterStatus::from_slice(&raw).map(|s| s.device_id),
            Some(7)
        );
    }

    #[test]
    fn test_to_frame_matches_decoder() {
        let status = InverterStatus {
            device_id: 0xA1B2C3D4,
            state: 1,
            temperature: 40,
            total_generated_power: 42.25,
            dc_voltage: 31.5,
            dc_current: 7.25,
            ac_voltage: 229.99,
            ac_current: 0.87,
            ..Default::default()
        };
        let decoded = InverterStatus::decode(&status.to_frame());
        assert!(decoded.valid);
        assert_eq!(decoded.device_id, status.device_id);
        assert_eq!(decoded.total_generated_power, 42.25);
        assert_eq!(decoded.dc_voltage, 31.5);
        assert_eq!(decoded.ac_voltage, 229.99);
        assert_eq!(decoded.ac_current, 0.87);
    }

    proptest! {
        #[test]
        fn prop_single_bit_flip_invalidates(byte in 0usize..14, bit in 0u8..8, id in any::<u32>()) {
            let mut raw = status_reply(id, 1.0, [2400, 100, 23000, 50], 0, 0);
            raw[byte] ^= 1 << bit;
            prop_assert!(!InverterStatus::decode(&raw).valid);
        }

        #[test]
        fn prop_decode_is_idempotent(raw in proptest::array::uniform27(any::<u8>())) {
            let first = InverterStatus::decode(&raw);
            let second = InverterStatus::decode(&raw);
            // bitwise comparison keeps NaN power readings comparable
            prop_assert_eq!(first.total_generated_power.to_bits(), second.total_generated_power.to_bits());
            prop_assert_eq!(first.device_id, second.device_id);
            prop_assert_eq!(first.valid, second.valid);
            prop_assert_eq!(first.dc_power.to_bits(), second.dc_power.to_bits());
            prop_assert_eq!(first.ac_power.to_bits(), second.ac_power.to_bits());
        }

        #[test]
        fn prop_scaling_law(value in any::<u16>()) {
            let raw = status_reply(1, 0.0, [value, value, value, value], 0, 0);
            let status = InverterStatus::decode(&raw);
            prop_assert_eq!(status.dc_voltage, value as f32 / 100.0);
            prop_assert_eq!(status.ac_current, value as f32 / 100.0);
        }
    }
}
