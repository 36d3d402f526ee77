//! Request/response correlation with timeout and retransmission.
//!
//! The [`Processor`] keeps at most one request outstanding. It is a plain
//! state machine: the caller supplies the current time and drives timeouts
//! by calling [`Processor::poll_timeout`] once [`Processor::deadline`] has
//! passed.
//!
//! ```text
//!            send_request
//!   Idle ─────────────────▶ AwaitingResponse ──┐ timeout, retries left:
//!    ▲                          │   ▲          │ resend same sequence
//!    │  response / final        │   └──────────┘
//!    └──── timeout / cancel ────┘
//! ```

use std::time::Duration;

use smp_protocol::{Message, Version};
use smp_transport::Transport;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::ProcessorError;

/// Per-request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestParams {
    /// Protocol version written into request headers.
    pub version: Version,
    /// Transport MTU used to size chunked transfers.
    pub mtu: u16,
    /// Retransmissions after the first send.
    pub retries: u8,
    /// Time to wait for a response to each send.
    pub timeout: Duration,
}

impl RequestParams {
    /// Parameters using the transport's default retries and timeout.
    pub fn for_transport(transport: &dyn Transport, version: Version, mtu: u16) -> Self {
        RequestParams {
            version,
            mtu,
            retries: transport.retries(),
            timeout: transport.timeout(),
        }
    }

    /// Raise the timeout to at least `timeout`. Never lowers it.
    pub fn with_timeout_at_least(mut self, timeout: Duration) -> Self {
        if timeout > self.timeout {
            self.timeout = timeout;
        }
        self
    }
}

/// How an outstanding request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The matching response arrived.
    Response(Message),
    /// No response after all retries.
    Timeout,
    /// A retransmission could not be sent.
    TransportFailed(String),
}

/// The single outstanding request.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub sequence: u8,
    pub group: u16,
    pub command: u8,
    /// Exact message sent, kept for retransmission.
    pub message: Message,
    pub deadline: Instant,
    pub retries_left: u8,
    timeout: Duration,
}

impl PendingRequest {
    fn matches(&self, response: &Message) -> bool {
        if response.op() != self.message.op().response() {
            return false;
        }
        if response.sequence() != self.sequence {
            return false;
        }
        match self.message.version() {
            Version::V1 => true,
            Version::V2 => response.group() == self.group && response.command() == self.command,
        }
    }
}

/// Correlates responses with the single outstanding request.
#[derive(Debug, Default)]
pub struct Processor {
    next_sequence: u8,
    pending: Option<PendingRequest>,
}

impl Processor {
    pub fn new() -> Self {
        Processor::default()
    }

    /// Whether a request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// The outstanding request, if any.
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// When the outstanding request times out.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Stamp `message` with the next sequence number and the requested
    /// version, send it and start waiting for its response.
    ///
    /// Returns the sequence number used.
    pub fn send_request(
        &mut self,
        transport: &mut dyn Transport,
        mut message: Message,
        params: &RequestParams,
        now: Instant,
    ) -> Result<u8, ProcessorError> {
        if self.pending.is_some() {
            warn!("Rejecting request while another is outstanding");
            return Err(ProcessorError::Busy);
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        message.set_sequence(sequence);
        message.set_version(params.version);

        debug!(
            "Sending request group {} command {} seq {} ({} bytes)",
            message.group(),
            message.command(),
            sequence,
            message.size()
        );
        transport.send(&message)?;

        self.pending = Some(PendingRequest {
            sequence,
            group: message.group(),
            command: message.command(),
            message,
            deadline: now + params.timeout,
            retries_left: params.retries,
            timeout: params.timeout,
        });

        Ok(sequence)
    }

    /// Offer a received message. Returns the outcome if it answers the
    /// outstanding request; anything else is discarded.
    pub fn message_received(&mut self, message: Message) -> Option<RequestOutcome> {
        let Some(pending) = self.pending.as_ref() else {
            debug!(
                "Discarding unsolicited message group {} command {} seq {}",
                message.group(),
                message.command(),
                message.sequence()
            );
            return None;
        };

        if !pending.matches(&message) {
            debug!(
                "Discarding message group {} command {} seq {} (waiting for group {} command {} seq {})",
                message.group(),
                message.command(),
                message.sequence(),
                pending.group,
                pending.command,
                pending.sequence
            );
            return None;
        }

        trace!("Response for seq {} received", pending.sequence);
        self.pending = None;
        Some(RequestOutcome::Response(message))
    }

    /// Handle an expired deadline: retransmit while retries remain, then
    /// report a timeout. Does nothing before the deadline.
    pub fn poll_timeout(
        &mut self,
        transport: &mut dyn Transport,
        now: Instant,
    ) -> Option<RequestOutcome> {
        let pending = self.pending.as_mut()?;
        if now < pending.deadline {
            return None;
        }

        if pending.retries_left == 0 {
            debug!("Request seq {} timed out", pending.sequence);
            self.pending = None;
            return Some(RequestOutcome::Timeout);
        }

        pending.retries_left -= 1;
        debug!(
            "Retransmitting seq {} ({} retries left)",
            pending.sequence, pending.retries_left
        );

        if let Err(e) = transport.send(&pending.message) {
            warn!("Retransmission of seq {} failed: {}", pending.sequence, e);
            self.pending = None;
            return Some(RequestOutcome::TransportFailed(e.to_string()));
        }

        pending.deadline = now + pending.timeout;
        None
    }

    /// Drop the outstanding request. Returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self.pending.take().is_some();
        if cancelled {
            debug!("Outstanding request cancelled");
        }
        cancelled
    }
}
