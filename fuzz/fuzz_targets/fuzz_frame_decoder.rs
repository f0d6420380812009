#![no_main]

use libfuzzer_sys::fuzz_target;
use rlbot_match_control::protocol::decode_packet;
use rlbot_match_control::transport::FrameDecoder;

fuzz_target!(|data: &[u8]| {
    // Feed the stream in uneven chunks, the way a socket would deliver it.
    let mut decoder = FrameDecoder::new();
    for chunk in data.chunks(7) {
        decoder.extend(chunk);
        while let Some(payload) = decoder.next_frame() {
            let _ = decode_packet(&payload);
        }
    }
});
