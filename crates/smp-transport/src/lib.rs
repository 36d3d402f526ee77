//! SMP transports
//!
//! A [`Transport`] carries SMP messages to and from a device over one
//! physical medium. Sending is a plain call; everything the device sends
//! back arrives as a [`TransportEvent`] on the channel handed to the
//! transport when it is created:
//!
//! ```text
//!   Session ──send(&Message)──▶ Transport ──bytes──▶ device
//!      ▲                            │
//!      └──── TransportEvent ◀───────┘ (reader thread)
//! ```
//!
//! The UART transport wraps packets with [`smp_uart::FrameCodec`]; the UDP
//! transport sends one packet per datagram. Bluetooth and LoRaWAN accept and
//! validate their configuration but cannot be connected.

mod config;
mod error;
mod event;
mod uart;
mod udp;
mod unsupported;

pub use config::*;
pub use error::*;
pub use event::*;
pub use uart::UartTransport;
pub use udp::UdpTransport;
pub use unsupported::UnsupportedTransport;

use std::time::Duration;

use smp_protocol::Message;

/// Default number of retransmissions for a request.
pub const DEFAULT_RETRIES: u8 = 3;

/// Default time to wait for a response before retransmitting.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Connection to a device over one physical medium.
pub trait Transport: Send {
    /// Short name used in logs ("uart", "udp", ...).
    fn name(&self) -> &'static str;

    /// Open the connection.
    fn connect(&mut self) -> Result<()>;

    /// Close the connection. With `force`, closing an already closed
    /// transport is not an error.
    fn disconnect(&mut self, force: bool) -> Result<()>;

    /// Whether the connection is open.
    fn is_connected(&self) -> bool;

    /// Send one SMP message.
    fn send(&mut self, message: &Message) -> Result<()>;

    /// Largest SMP packet (header + body) that can be sent for `mtu`.
    fn max_message_data_size(&self, mtu: u16) -> u16;

    /// Retransmissions used when the caller does not override them.
    fn retries(&self) -> u8 {
        DEFAULT_RETRIES
    }

    /// Response timeout used when the caller does not override it.
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }
}
