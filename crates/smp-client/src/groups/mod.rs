//! Management group state machines.
//!
//! Each group owns the state of the operation it is running. An operation
//! is started with one of the group's `start_*` methods, which sends the
//! first request through a [`Link`]. Every outcome of that request is then
//! handed to [`Group::receive`], which either sends the next request or
//! reports the operation finished.

use std::fmt;

use smp_protocol::{Body, Message, Op, ProtocolError, ResponseBody};
use smp_transport::Transport;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::output::GroupOutput;
use crate::processor::{Processor, RequestOutcome, RequestParams};

mod enum_mgmt;
mod fs;
mod img;
mod os;
mod settings;
mod shell;
mod stat;
mod zephyr;

pub use enum_mgmt::EnumGroup;
pub use fs::FsGroup;
pub use img::{ImageUpload, ImgGroup};
pub use os::OsGroup;
pub use settings::SettingsGroup;
pub use shell::ShellGroup;
pub use stat::StatGroup;
pub use zephyr::ZephyrGroup;

/// Final status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Complete,
    Error,
    Timeout,
    Cancelled,
    Unsupported,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusKind::Complete => "complete",
            StatusKind::Error => "error",
            StatusKind::Timeout => "timeout",
            StatusKind::Cancelled => "cancelled",
            StatusKind::Unsupported => "unsupported",
        };
        f.write_str(text)
    }
}

/// What a group did with a request outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupUpdate {
    /// Another request was sent; the operation is this far along.
    Progress(u8),
    /// The operation ended.
    Finished {
        status: StatusKind,
        message: Option<String>,
        output: GroupOutput,
    },
}

impl GroupUpdate {
    /// Successful end with `output`.
    pub fn complete(output: GroupOutput) -> Self {
        GroupUpdate::Finished {
            status: StatusKind::Complete,
            message: None,
            output,
        }
    }

    /// Failed end with a description.
    pub fn error(message: impl Into<String>) -> Self {
        GroupUpdate::Finished {
            status: StatusKind::Error,
            message: Some(message.into()),
            output: GroupOutput::None,
        }
    }

    fn finished(status: StatusKind, message: Option<String>) -> Self {
        GroupUpdate::Finished {
            status,
            message,
            output: GroupOutput::None,
        }
    }
}

/// A management group.
pub trait Group {
    /// Group identifier used in request headers.
    fn group_id(&self) -> u16;

    /// Handle the outcome of the request this group sent last.
    fn receive(&mut self, link: &mut Link<'_>, outcome: RequestOutcome) -> GroupUpdate;

    /// Forget the running operation.
    fn cancel(&mut self);
}

/// Everything a group needs to send a request.
pub struct Link<'a> {
    processor: &'a mut Processor,
    transport: &'a mut dyn Transport,
    params: RequestParams,
    now: Instant,
}

impl<'a> Link<'a> {
    pub fn new(
        processor: &'a mut Processor,
        transport: &'a mut dyn Transport,
        params: RequestParams,
        now: Instant,
    ) -> Self {
        Link {
            processor,
            transport,
            params,
            now,
        }
    }

    /// Parameters applied to requests sent through this link.
    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    /// Largest SMP packet the transport can carry at the configured MTU.
    pub fn max_packet_size(&self) -> usize {
        self.transport.max_message_data_size(self.params.mtu) as usize
    }

    /// Send a request with an already encoded body. Returns whether it was
    /// dispatched.
    pub fn send(&mut self, op: Op, group: u16, command: u8, body: Vec<u8>) -> bool {
        let message = Message::new(op, self.params.version, group, command, body);
        match self
            .processor
            .send_request(&mut *self.transport, message, &self.params, self.now)
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to send group {} command {}: {}", group, command, e);
                false
            }
        }
    }

    /// Encode `body` and send it.
    pub fn send_body(&mut self, op: Op, group: u16, command: u8, body: Body) -> bool {
        match body.encode() {
            Ok(encoded) => self.send(op, group, command, encoded),
            Err(e) => {
                warn!("Failed to encode group {} command {}: {}", group, command, e);
                false
            }
        }
    }
}

/// Turn a request outcome into a response body, or into the update that
/// ends the operation.
///
/// Device error codes end the operation: "not supported" as
/// [`StatusKind::Unsupported`], everything else as [`StatusKind::Error`].
pub(crate) fn response_body(outcome: RequestOutcome) -> Result<ResponseBody, GroupUpdate> {
    let message = match outcome {
        RequestOutcome::Response(message) => message,
        RequestOutcome::Timeout => return Err(GroupUpdate::finished(StatusKind::Timeout, None)),
        RequestOutcome::TransportFailed(e) => return Err(GroupUpdate::error(e)),
    };

    let body = ResponseBody::decode(message.body()).map_err(|e| {
        debug!("Undecodable response body: {}", e);
        GroupUpdate::error(format!("invalid response: {}", e))
    })?;

    if let Some(err) = body.device_error() {
        let status = if err.is_not_supported() {
            StatusKind::Unsupported
        } else {
            StatusKind::Error
        };
        return Err(GroupUpdate::finished(status, Some(err.to_string())));
    }

    Ok(body)
}

/// Map a malformed response to a finished update.
pub(crate) fn invalid(e: ProtocolError) -> GroupUpdate {
    GroupUpdate::error(format!("invalid response: {}", e))
}

/// Progress of `done` out of `total` as a percentage.
pub(crate) fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) * 100 / total) as u8
}
