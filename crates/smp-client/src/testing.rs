//! Test doubles.
//!
//! [`MockTransport`] records every message sent through it and can answer
//! requests through a transport event channel, so group and session logic
//! can be exercised without a device.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use smp_protocol::{Body, Message};
use smp_transport::{
    EventSender, Result, Transport, TransportError, TransportEvent, DEFAULT_TIMEOUT,
};

type Responder = Box<dyn FnMut(&Message) -> Vec<TransportEvent> + Send>;

#[derive(Default)]
struct MockState {
    connected: bool,
    sent: Vec<Message>,
    fail_sends: bool,
    timeout: Option<Duration>,
    data_size: Option<fn(u16) -> u16>,
    events: Option<EventSender>,
    responder: Option<Responder>,
}

/// An in-memory transport. Clones share the same state.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A connected transport that answers nothing.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..MockState::default()
            })),
        }
    }

    /// A connected transport publishing responder output to `events`.
    pub fn with_events(events: EventSender) -> Self {
        let transport = MockTransport::new();
        transport.state.lock().events = Some(events);
        transport
    }

    /// Answer each sent message with the events returned by `responder`.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&Message) -> Vec<TransportEvent> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// Make every following send fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Response timeout reported to the session.
    pub fn set_timeout(&self, timeout: Duration) {
        self.state.lock().timeout = Some(timeout);
    }

    /// Size packets as another transport would, e.g. with UART framing.
    pub fn set_max_message_data_size(&self, data_size: fn(u16) -> u16) {
        self.state.lock().data_size = Some(data_size);
    }

    /// Messages sent so far, in order.
    pub fn sent(&self) -> Vec<Message> {
        self.state.lock().sent.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransport::new()
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.connected {
            return Err(TransportError::AlreadyConnected);
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected && !force {
            return Err(TransportError::NotConnected);
        }
        state.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_sends {
            return Err(TransportError::Io("mock send failure".to_string()));
        }
        state.sent.push(message.clone());

        let replies = match state.responder.as_mut() {
            Some(responder) => responder(message),
            None => Vec::new(),
        };
        if let Some(events) = state.events.as_ref() {
            for reply in replies {
                let _ = events.send(reply);
            }
        }
        Ok(())
    }

    fn max_message_data_size(&self, mtu: u16) -> u16 {
        match self.state.lock().data_size {
            Some(data_size) => data_size(mtu),
            None => mtu,
        }
    }

    fn timeout(&self) -> Duration {
        self.state.lock().timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// A response event answering `request` with `body`.
pub fn response_to(request: &Message, body: Body) -> TransportEvent {
    let mut response = Message::new(
        request.op().response(),
        request.version(),
        request.group(),
        request.command(),
        body.encode().unwrap_or_default(),
    );
    response.set_sequence(request.sequence());
    TransportEvent::Message(response)
}
