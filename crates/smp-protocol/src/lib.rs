//! Simple Management Protocol (SMP)
//!
//! This crate provides the transport-independent part of SMP: the 8-byte
//! header, owned request/response messages, the management group and command
//! identifiers, and helpers for the CBOR maps carried in message bodies.
//!
//! # Protocol Overview
//!
//! Every SMP packet is a fixed header followed by a CBOR body:
//!
//! ```text
//! +---------------------+-------+--------+----------+-----+-----+-----------+
//! | res(3) ver(2) op(3) | flags | length | group id | seq | cmd | body ...  |
//! +---------------------+-------+--------+----------+-----+-----+-----------+
//!          1 byte         1 byte  2 (BE)    2 (BE)    1     1     length
//! ```
//!
//! - **Requests** (host → device) use the `Read` or `Write` op.
//! - **Responses** (device → host) use `ReadResponse` / `WriteResponse` and
//!   echo the group, command and sequence number of the request.
//!
//! # Example
//!
//! ```rust,ignore
//! use smp_protocol::{Body, Message, Op, Version, GROUP_OS, OS_CMD_ECHO};
//!
//! let body = Body::map().text("d", "hello").encode()?;
//! let request = Message::new(Op::Write, Version::V2, GROUP_OS, OS_CMD_ECHO, body);
//! let wire = request.to_bytes();
//! ```

mod body;
mod constants;
mod error;
mod message;

pub use body::*;
pub use constants::*;
pub use error::*;
pub use message::*;
