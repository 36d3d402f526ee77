//! Property and scenario tests for SMP UART framing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use proptest::prelude::*;
use smp_uart::{
    max_message_data_size, FrameCodec, CONTINUATION_FRAME_MARKER, FIRST_FRAME_MARKER,
    FRAME_DATA_BUDGET, FRAME_TERMINATOR,
};

/// Decode the raw (pre-base64) contents of one on-wire frame.
fn frame_body(frame: &[u8]) -> Vec<u8> {
    assert_eq!(frame.last(), Some(&FRAME_TERMINATOR));
    STANDARD
        .decode(&frame[2..frame.len() - 1])
        .expect("frame should be valid base64")
}

/// Rebuild a frame around modified raw contents.
fn reframe(marker: &[u8], body: &[u8]) -> Vec<u8> {
    let mut frame = marker.to_vec();
    frame.extend_from_slice(STANDARD.encode(body).as_bytes());
    frame.push(FRAME_TERMINATOR);
    frame
}

/// Payload sized to fit a given MTU.
fn payload_for_mtu() -> impl Strategy<Value = (u16, Vec<u8>)> {
    (96u16..=4096).prop_flat_map(|mtu| {
        let max = max_message_data_size(mtu) as usize;
        (Just(mtu), prop::collection::vec(any::<u8>(), 0..=max))
    })
}

proptest! {
    /// Whatever fits the MTU comes back unchanged.
    #[test]
    fn prop_roundtrip((_mtu, payload) in payload_for_mtu()) {
        let frames = FrameCodec::encode(&payload);
        let mut codec = FrameCodec::new();

        let packets = codec.feed_packets(&frames.concat());
        prop_assert_eq!(packets, vec![payload]);
        prop_assert_eq!(codec.buffered_len(), 0);
        prop_assert!(!codec.is_awaiting_continuation());
    }

    /// Splitting the wire data at arbitrary points makes no difference.
    #[test]
    fn prop_roundtrip_split_reads(
        payload in prop::collection::vec(any::<u8>(), 0..600),
        split in 1usize..64,
    ) {
        let wire = FrameCodec::encode(&payload).concat();
        let mut codec = FrameCodec::new();
        let mut packets = Vec::new();

        for chunk in wire.chunks(split) {
            packets.extend(codec.feed_packets(chunk));
        }
        prop_assert_eq!(packets, vec![payload]);
    }

    /// No fragment ever exceeds the per-frame budget.
    #[test]
    fn prop_fragments_within_budget(payload in prop::collection::vec(any::<u8>(), 0..1200)) {
        let frames = FrameCodec::encode(&payload);
        for (i, frame) in frames.iter().enumerate() {
            let marker = if i == 0 { FIRST_FRAME_MARKER } else { CONTINUATION_FRAME_MARKER };
            prop_assert_eq!(&frame[..2], &marker[..]);
            prop_assert!(frame_body(frame).len() <= FRAME_DATA_BUDGET);
        }
    }

    /// A single flipped bit in the data or CRC drops the packet, and the
    /// next packet still decodes.
    #[test]
    fn prop_bit_flip_rejected(
        payload in prop::collection::vec(any::<u8>(), 1..400),
        bit in any::<prop::sample::Index>(),
    ) {
        let frames = FrameCodec::encode(&payload);

        // Collect the positions after the length prefix across all frames.
        let bodies: Vec<Vec<u8>> = frames.iter().map(|f| frame_body(f)).collect();
        let positions: Vec<(usize, usize)> = bodies
            .iter()
            .enumerate()
            .flat_map(|(f, body)| {
                let start = if f == 0 { 2 } else { 0 };
                (start..body.len()).map(move |b| (f, b))
            })
            .collect();

        let flat = bit.index(positions.len() * 8);
        let (f, b) = positions[flat / 8];
        let mut corrupted = bodies.clone();
        corrupted[f][b] ^= 1 << (flat % 8);

        let wire: Vec<u8> = corrupted
            .iter()
            .enumerate()
            .flat_map(|(i, body)| {
                let marker = if i == 0 { FIRST_FRAME_MARKER } else { CONTINUATION_FRAME_MARKER };
                reframe(&marker, body)
            })
            .collect();

        let mut codec = FrameCodec::new();
        prop_assert!(codec.feed_packets(&wire).is_empty());

        let packets = codec.feed_packets(&FrameCodec::encode(&[0xde, 0xad]).concat());
        prop_assert_eq!(packets, vec![vec![0xde, 0xad]]);
    }
}

#[test]
fn test_max_size_at_default_mtu_fits_budget() {
    let size = max_message_data_size(256) as usize;
    let frames = FrameCodec::encode(&vec![0x5a; size]);

    assert!(frames
        .iter()
        .all(|frame| frame_body(frame).len() <= FRAME_DATA_BUDGET));
    // Every frame fits the MTU once the markers and terminators are added.
    assert!(frames.concat().len() <= 256);
}

#[test]
fn test_garbage_then_valid_frame() {
    let mut codec = FrameCodec::new();
    assert!(codec.feed_packets(b"\x00\x01garbage\xff\xfe").is_empty());
    assert_eq!(codec.buffered_len(), 0);

    let packets = codec.feed_packets(&FrameCodec::encode(&[0x01, 0x02, 0x03]).concat());
    assert_eq!(packets, vec![vec![0x01, 0x02, 0x03]]);
}

#[test]
fn test_two_packets_in_one_read() {
    let mut wire = FrameCodec::encode(&[1; 150]).concat();
    wire.extend(FrameCodec::encode(&[2; 10]).concat());

    let mut codec = FrameCodec::new();
    assert_eq!(codec.feed_packets(&wire), vec![vec![1; 150], vec![2; 10]]);
}
