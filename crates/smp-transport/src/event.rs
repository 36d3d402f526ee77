//! Notifications published by transports.

use smp_protocol::Message;
use tokio::sync::mpsc;

/// Something that happened on an open transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A complete SMP message was received.
    Message(Message),
    /// The transport hit an error; the string describes it.
    Error(String),
    /// The transport closed itself after an unrecoverable error.
    Disconnected,
}

/// Sending half of the transport event channel.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of the transport event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create a transport event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
