//! Fuzz target: `PacketDecoder::feed`
//!
//! Drives arbitrary broker bytes into the streaming MQTT decoder, both in
//! one piece and split at a data-chosen point, and asserts that it never
//! panics, always makes progress, and decodes the same packets either way.
//!
//! cargo fuzz run fuzz_packet_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use sorter::telemetry::codec::{Packet, PacketDecoder};

fn drain(decoder: &mut PacketDecoder, data: &[u8], out: &mut Vec<Packet>) {
    let mut offset = 0;
    while offset < data.len() {
        let (packet, used) = decoder.feed(&data[offset..]);
        assert!(used > 0, "decoder must consume input");
        assert!(offset + used <= data.len());
        offset += used;
        out.extend(packet);
    }
}

fuzz_target!(|data: &[u8]| {
    let mut whole = Vec::new();
    drain(&mut PacketDecoder::new(), data, &mut whole);

    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let mut decoder = PacketDecoder::new();
    let mut pieces = Vec::new();
    drain(&mut decoder, &data[..split], &mut pieces);
    drain(&mut decoder, &data[split..], &mut pieces);

    assert_eq!(whole, pieces, "chunking must not change decoding");

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    let _ = decoder.feed(data);
});
