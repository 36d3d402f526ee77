//! Frame encoding/decoding for the SMP serial transport.
//!
//! Outbound packets are split into fragments of at most
//! [`FRAME_DATA_BUDGET`] raw bytes. The first fragment starts with the total
//! length and the last one ends with the CRC:
//!
//! ```text
//! +-----------+----------------------------------------------+------+
//! | 0x06 0x09 | base64( len(2) | data[0..91] )               | 0x0A |
//! +-----------+----------------------------------------------+------+
//! | 0x04 0x14 | base64( data[91..] | crc(2) )                  | 0x0A |
//! +-----------+----------------------------------------------+------+
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, BufMut, BytesMut};
use smp_protocol::Message;
use thiserror::Error;

use crate::crc16::crc16;

/// Marker starting the first fragment of a packet.
pub const FIRST_FRAME_MARKER: [u8; 2] = [0x06, 0x09];

/// Marker starting a continuation fragment.
pub const CONTINUATION_FRAME_MARKER: [u8; 2] = [0x04, 0x14];

/// Terminator ending every fragment.
pub const FRAME_TERMINATOR: u8 = 0x0a;

/// Raw (pre-base64) bytes carried by one fragment.
pub const FRAME_DATA_BUDGET: usize = 93;

/// Receive buffer size above which marker-less data is discarded.
pub const GARBAGE_THRESHOLD: usize = 10;

/// Reasons a received fragment or packet is dropped.
///
/// These never leave the codec; they are logged where they happen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
enum FrameError {
    #[error("failed decoding base64: {0}")]
    Base64(String),

    #[error("fragment decoded to no data")]
    Empty,

    #[error("packet too short for CRC: {0} bytes")]
    TooShort(usize),

    #[error("CRC failure, expected {expected:#06x} but got {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("invalid SMP packet: {0}")]
    Packet(#[from] smp_protocol::ProtocolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    First,
    Continuation,
}

/// A stateful codec turning a serial byte stream into SMP packets.
///
/// Bytes are fed in as they arrive; complete, CRC-checked packets come out in
/// the order they finished. Malformed fragments are dropped without
/// affecting the following ones.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Serial data not yet consumed as a fragment.
    buffer: BytesMut,
    /// Bytes of a packet whose continuation fragments are still expected.
    partial: BytesMut,
    /// Whether a continuation fragment is expected.
    awaiting_continuation: bool,
    /// Declared length (packet + CRC) of the packet being reassembled.
    expected_length: u16,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(4 * FRAME_DATA_BUDGET),
            partial: BytesMut::new(),
            awaiting_continuation: false,
            expected_length: 0,
        }
    }

    /// Feed received bytes and return every SMP message completed by them.
    ///
    /// Packets that are not valid SMP messages are logged and dropped.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Message> {
        self.feed_packets(data)
            .into_iter()
            .filter_map(|packet| match Message::from_bytes(&packet) {
                Ok(message) => Some(message),
                Err(e) => {
                    log::error!("{}", FrameError::from(e));
                    None
                }
            })
            .collect()
    }

    /// Feed received bytes and return the raw packets completed by them
    /// (length prefix and CRC removed).
    pub fn feed_packets(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();

        while let Some((kind, start, end)) = self.next_frame() {
            if start > 0 {
                log::trace!("Discarding {} bytes of non-SMP serial data", start);
            }

            // Consume everything up to and including the terminator.
            let frame = self.buffer.split_to(end + 1);
            let encoded = &frame[start + FIRST_FRAME_MARKER.len()..end];

            let packet = match kind {
                FrameKind::First => self.first_fragment(encoded),
                FrameKind::Continuation if self.awaiting_continuation => {
                    self.continuation_fragment(encoded)
                }
                FrameKind::Continuation => {
                    log::debug!("Ignoring continuation fragment with no packet in progress");
                    None
                }
            };

            packets.extend(packet);
        }

        if self.buffer.len() > GARBAGE_THRESHOLD
            && find(&self.buffer, &FIRST_FRAME_MARKER).is_none()
            && find(&self.buffer, &CONTINUATION_FRAME_MARKER).is_none()
        {
            log::error!("Cleared garbage data in UART SMP transport buffer");
            self.buffer.clear();
        }

        packets
    }

    /// Find the earliest complete fragment in the receive buffer.
    ///
    /// Returns the fragment kind, the marker position and the terminator
    /// position.
    fn next_frame(&self) -> Option<(FrameKind, usize, usize)> {
        let first = find(&self.buffer, &FIRST_FRAME_MARKER);
        let continuation = find(&self.buffer, &CONTINUATION_FRAME_MARKER);

        let (kind, start) = match (first, continuation) {
            (Some(f), Some(c)) if c < f => (FrameKind::Continuation, c),
            (Some(f), _) => (FrameKind::First, f),
            (None, Some(c)) => (FrameKind::Continuation, c),
            (None, None) => return None,
        };

        let body_start = start + FIRST_FRAME_MARKER.len();
        let end = self.buffer[body_start..]
            .iter()
            .position(|&b| b == FRAME_TERMINATOR)?;

        Some((kind, start, body_start + end))
    }

    fn first_fragment(&mut self, encoded: &[u8]) -> Option<Vec<u8>> {
        if self.awaiting_continuation {
            log::warn!(
                "New packet started, abandoning {} of {} bytes of the previous one",
                self.partial.len(),
                self.expected_length
            );
        }
        self.partial.clear();
        self.awaiting_continuation = false;

        let mut data = match decode_fragment(encoded) {
            Ok(data) => data,
            Err(e) => {
                log::error!("{}", e);
                return None;
            }
        };

        if data.len() < 3 {
            log::debug!("Ignoring first fragment of {} bytes", data.len());
            return None;
        }

        let declared = data.get_u16();

        if data.len() >= declared as usize {
            return self.complete(&data[..declared as usize]);
        }

        self.expected_length = declared;
        self.partial = data;
        self.awaiting_continuation = true;
        None
    }

    fn continuation_fragment(&mut self, encoded: &[u8]) -> Option<Vec<u8>> {
        let data = match decode_fragment(encoded) {
            Ok(data) => data,
            Err(e) => {
                log::error!("{}", e);
                return None;
            }
        };

        self.partial.extend_from_slice(&data);

        if self.partial.len() < self.expected_length as usize {
            return None;
        }

        let packet = self.partial.split();
        let declared = self.expected_length as usize;
        self.awaiting_continuation = false;
        self.expected_length = 0;
        self.complete(&packet[..declared])
    }

    /// Check the trailing CRC of a reassembled packet and strip it.
    ///
    /// `packet` is cut to the declared length; anything past it is dropped.
    fn complete(&self, packet: &[u8]) -> Option<Vec<u8>> {
        match check_crc(packet) {
            Ok(payload) => Some(payload.to_vec()),
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }

    /// Encode a packet into on-wire fragments, each terminated by a line feed.
    pub fn encode(packet: &[u8]) -> Vec<Vec<u8>> {
        if packet.len() + 2 > u16::MAX as usize {
            log::warn!(
                "SMP packet of {} bytes exceeds the serial length field",
                packet.len()
            );
        }

        let crc = crc16(packet);
        let mut frames = Vec::new();
        let mut chunk = Vec::with_capacity(FRAME_DATA_BUDGET);
        let mut marker = FIRST_FRAME_MARKER;
        let mut pos = 0;
        let mut crc_written = false;

        chunk.put_u16((packet.len() + 2) as u16);

        while !crc_written {
            let take = (FRAME_DATA_BUDGET - chunk.len()).min(packet.len() - pos);
            chunk.extend_from_slice(&packet[pos..pos + take]);
            pos += take;

            // The CRC only goes in when it leaves at least one spare byte.
            if pos == packet.len() && FRAME_DATA_BUDGET - chunk.len() > 2 {
                chunk.put_u16(crc);
                crc_written = true;
            }

            frames.push(frame(&marker, &chunk));
            chunk.clear();
            marker = CONTINUATION_FRAME_MARKER;
        }

        frames
    }

    /// Encode an SMP message into on-wire fragments.
    pub fn encode_message(message: &Message) -> Vec<Vec<u8>> {
        FrameCodec::encode(&message.to_bytes())
    }

    /// Get the number of buffered, not yet framed bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a multi-fragment packet is being reassembled.
    pub fn is_awaiting_continuation(&self) -> bool {
        self.awaiting_continuation
    }

    /// Clear all receive state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.partial.clear();
        self.awaiting_continuation = false;
        self.expected_length = 0;
    }
}

/// Largest SMP packet that fits a transport MTU once framed.
///
/// Accounts for base64 expansion, the length and CRC fields, three bytes of
/// marker and terminator per fragment and padding of narrow final fragments.
/// Device-side receive buffers are sized with the same arithmetic, so this
/// must not change.
pub fn max_message_data_size(mtu: u16) -> u16 {
    let mut available = mtu as f32;
    let frames = (available / 124.0).ceil();

    available = available * 3.0 / 4.0;
    available -= 4.0;
    available -= frames * 3.0;

    let remainder = (available as u16) % FRAME_DATA_BUDGET as u16;
    if remainder >= 91 {
        available -= 3.0;
    } else if remainder >= 88 {
        available -= 1.0;
    }

    available as u16
}

fn frame(marker: &[u8; 2], chunk: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 + chunk.len().div_ceil(3) * 4);
    out.extend_from_slice(marker);
    out.extend_from_slice(STANDARD.encode(chunk).as_bytes());
    out.push(FRAME_TERMINATOR);
    out
}

fn decode_fragment(encoded: &[u8]) -> Result<BytesMut, FrameError> {
    let data = STANDARD
        .decode(encoded)
        .map_err(|e| FrameError::Base64(e.to_string()))?;

    if data.is_empty() {
        return Err(FrameError::Empty);
    }

    Ok(BytesMut::from(&data[..]))
}

fn check_crc(packet: &[u8]) -> Result<&[u8], FrameError> {
    if packet.len() < 2 {
        return Err(FrameError::TooShort(packet.len()));
    }

    let (payload, trailer) = packet.split_at(packet.len() - 2);
    let expected = u16::from_be_bytes([trailer[0], trailer[1]]);
    let actual = crc16(payload);

    if expected != actual {
        return Err(FrameError::CrcMismatch { expected, actual });
    }

    Ok(payload)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
