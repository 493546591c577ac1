#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use voltage_netsgp::{MemoryChannel, NetsgpClient, NoPin, PollConfig, PollScheduler, SystemClock};

/// Received bytes split into the chunks seen by consecutive ticks
#[derive(Debug, Arbitrary)]
struct Input {
    devices: Vec<u32>,
    chunks: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let Ok(client) = NetsgpClient::new(MemoryChannel::new(), NoPin, SystemClock::new()) else {
        return;
    };
    let mut scheduler = PollScheduler::new(client, PollConfig::new().with_pacing_gap_ms(0));
    for id in input.devices.iter().take(16) {
        scheduler.register_inverter(*id);
    }

    let mut total = 0usize;
    for chunk in input.chunks.iter().take(64) {
        scheduler.client_mut().channel_mut().inject(chunk);
        total += chunk.len();
        let decoded = scheduler.tick().unwrap_or(0);
        // every delivered status consumed at least one full reply
        assert!(decoded * 27 <= total);
    }
});
