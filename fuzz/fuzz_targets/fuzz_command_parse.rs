#![no_main]

use libfuzzer_sys::fuzz_target;
use voltage_netsgp::frame::validate_checksum;
use voltage_netsgp::CommandFrame;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = CommandFrame::parse(data) else {
        return;
    };

    // Reserved bytes are ignored; everything that is parsed must survive a re-encode
    assert!(validate_checksum(&data[..14], data[14]));
    let encoded = frame.encode();
    assert_eq!(encoded[1], data[1]);
    assert_eq!(&encoded[6..10], &data[6..10]);
    assert_eq!(encoded[13], data[13]);
    assert_eq!(CommandFrame::parse(&encoded), Ok(frame));
});
