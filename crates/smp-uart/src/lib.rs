//! SMP UART framing
//!
//! SMP packets sent over a serial line are wrapped in text frames so that
//! they can share the line with console output:
//!
//! ```text
//! first fragment:         0x06 0x09 base64(len_hi len_lo data...) 0x0A
//! continuation fragment:  0x04 0x14 base64(data... [crc_hi crc_lo]) 0x0A
//! ```
//!
//! The 16-bit big-endian length counts the packet plus its trailing CRC16
//! (XMODEM, big-endian). Each fragment carries at most
//! [`FRAME_DATA_BUDGET`] bytes before base64 encoding.
//!
//! # Example
//!
//! ```rust,ignore
//! use smp_uart::FrameCodec;
//!
//! let mut codec = FrameCodec::new();
//! for frame in FrameCodec::encode(&packet) {
//!     port.write_all(&frame)?;
//! }
//! let messages = codec.feed(&received_bytes);
//! ```

mod crc16;
mod frame;

pub use crc16::*;
pub use frame::*;
