//! SMP client
//!
//! Everything between a transport and a command line: the request
//! [`Processor`] that matches responses to requests and retransmits on
//! timeout, one state machine per management group, and the [`Session`]
//! that runs a [`Command`] to its final status.
//!
//! ```rust,ignore
//! use smp_client::{Command, Session, SessionConfig};
//! use smp_transport::{event_channel, UdpConfig, UdpTransport};
//!
//! let (tx, rx) = event_channel();
//! let mut transport = UdpTransport::new(tx);
//! transport.set_config(UdpConfig::new("192.0.2.1"))?;
//!
//! let mut session = Session::new(Box::new(transport), rx, SessionConfig::default());
//! session.connect()?;
//! let report = session.run(Command::Echo { text: "hello".into() }).await?;
//! ```

mod error;
pub mod groups;
pub mod image;
mod output;
mod processor;
mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::*;
pub use groups::{GroupUpdate, StatusKind};
pub use output::*;
pub use processor::{PendingRequest, Processor, RequestOutcome, RequestParams};
pub use session::{
    Action, ActiveGroup, Command, OperationReport, Session, SessionConfig, SessionEvent,
    UploadMode,
};
