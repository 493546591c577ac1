#![no_main]

use libfuzzer_sys::fuzz_target;
use voltage_netsgp::frame::checksum;
use voltage_netsgp::InverterStatus;

fuzz_target!(|data: &[u8]| {
    let Some(status) = InverterStatus::from_slice(data) else {
        assert!(data.len() < 27);
        return;
    };

    assert_eq!(status.valid, checksum(&data[..14]) == data[14]);
    assert_eq!(status.device_id, u32::from_be_bytes([data[6], data[7], data[8], data[9]]));
    assert!(status.dc_voltage >= 0.0 && status.dc_voltage <= 655.35);
});
