//! SMP header and message types.

use bytes::{Buf, BufMut};

use crate::constants::*;
use crate::error::ProtocolError;

/// SMP operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Read request.
    Read,
    /// Response to a read request.
    ReadResponse,
    /// Write request.
    Write,
    /// Response to a write request.
    WriteResponse,
}

impl Op {
    /// Whether this op is a response.
    pub fn is_response(&self) -> bool {
        matches!(self, Op::ReadResponse | Op::WriteResponse)
    }

    /// The response op matching this request op.
    pub fn response(&self) -> Op {
        match self {
            Op::Read | Op::ReadResponse => Op::ReadResponse,
            Op::Write | Op::WriteResponse => Op::WriteResponse,
        }
    }
}

impl From<Op> for u8 {
    fn from(op: Op) -> Self {
        match op {
            Op::Read => 0,
            Op::ReadResponse => 1,
            Op::Write => 2,
            Op::WriteResponse => 3,
        }
    }
}

impl TryFrom<u8> for Op {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Op::Read),
            1 => Ok(Op::ReadResponse),
            2 => Ok(Op::Write),
            3 => Ok(Op::WriteResponse),
            other => Err(ProtocolError::UnknownOp(other)),
        }
    }
}

/// SMP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    /// Legacy SMP (version field 0).
    V1,
    /// SMP v2 (version field 1), with group-based error responses.
    #[default]
    V2,
}

impl Version {
    /// Version field value as placed in the header.
    pub fn field(&self) -> u8 {
        match self {
            Version::V1 => SMP_VERSION_1,
            Version::V2 => SMP_VERSION_2,
        }
    }

    /// Parse the 2-bit header version field. Unknown values are treated as v2.
    pub fn from_field(field: u8) -> Version {
        match field & 0x03 {
            SMP_VERSION_1 => Version::V1,
            _ => Version::V2,
        }
    }
}

/// The fixed 8-byte SMP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Operation.
    pub op: Op,
    /// Protocol version.
    pub version: Version,
    /// Flags byte (unused by current devices, kept as received).
    pub flags: u8,
    /// Length of the body following the header.
    pub length: u16,
    /// Management group.
    pub group: u16,
    /// Sequence number used to correlate responses.
    pub sequence: u8,
    /// Command within the group.
    pub command: u8,
}

impl Header {
    /// Encode the header into its 8-byte wire form.
    pub fn encode(&self) -> [u8; SMP_HEADER_SIZE] {
        let mut buf = [0u8; SMP_HEADER_SIZE];
        let mut out = &mut buf[..];
        out.put_u8((self.version.field() << 3) | u8::from(self.op));
        out.put_u8(self.flags);
        out.put_u16(self.length);
        out.put_u16(self.group);
        out.put_u8(self.sequence);
        out.put_u8(self.command);
        buf
    }

    /// Decode a header from the first 8 bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Header, ProtocolError> {
        if data.len() < SMP_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: SMP_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut buf = &data[..SMP_HEADER_SIZE];
        let first = buf.get_u8();
        let op = Op::try_from(first & 0x07)?;
        let version = Version::from_field(first >> 3);

        Ok(Header {
            op,
            version,
            flags: buf.get_u8(),
            length: buf.get_u16(),
            group: buf.get_u16(),
            sequence: buf.get_u8(),
            command: buf.get_u8(),
        })
    }
}

/// One SMP request or response: header plus owned body bytes.
///
/// The header length field is always kept equal to the body length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    body: Vec<u8>,
}

impl Message {
    /// Create a new message. The sequence number starts at 0 and is assigned
    /// when the message is dispatched.
    pub fn new(op: Op, version: Version, group: u16, command: u8, body: Vec<u8>) -> Self {
        let mut message = Message {
            header: Header {
                op,
                version,
                flags: 0,
                length: 0,
                group,
                sequence: 0,
                command,
            },
            body: Vec::new(),
        };
        message.set_body(body);
        message
    }

    /// Parse a complete SMP packet.
    pub fn from_bytes(data: &[u8]) -> Result<Message, ProtocolError> {
        let header = Header::decode(data)?;
        let body = &data[SMP_HEADER_SIZE..];

        if body.len() != header.length as usize {
            return Err(ProtocolError::LengthMismatch {
                declared: header.length as usize,
                actual: body.len(),
            });
        }

        Ok(Message {
            header,
            body: body.to_vec(),
        })
    }

    /// Serialise header and body into one packet.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SMP_HEADER_SIZE + self.body.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Header of this message.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Body bytes of this message.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replace the body, keeping the length field in sync.
    ///
    /// Bodies longer than 65535 bytes are truncated to what the length
    /// field can describe; callers size bodies by the MTU long before that.
    pub fn set_body(&mut self, mut body: Vec<u8>) {
        if body.len() > u16::MAX as usize {
            log::warn!(
                "SMP body of {} bytes truncated to {}",
                body.len(),
                u16::MAX
            );
            body.truncate(u16::MAX as usize);
        }
        self.header.length = body.len() as u16;
        self.body = body;
    }

    /// Total size of the packet (header + body).
    pub fn size(&self) -> usize {
        SMP_HEADER_SIZE + self.body.len()
    }

    /// Operation.
    pub fn op(&self) -> Op {
        self.header.op
    }

    /// Protocol version.
    pub fn version(&self) -> Version {
        self.header.version
    }

    /// Management group.
    pub fn group(&self) -> u16 {
        self.header.group
    }

    /// Command within the group.
    pub fn command(&self) -> u8 {
        self.header.command
    }

    /// Sequence number.
    pub fn sequence(&self) -> u8 {
        self.header.sequence
    }

    /// Set the sequence number.
    pub fn set_sequence(&mut self, sequence: u8) {
        self.header.sequence = sequence;
    }

    /// Set the protocol version.
    pub fn set_version(&mut self, version: Version) {
        self.header.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut message = Message::new(Op::Write, Version::V2, GROUP_OS, OS_CMD_ECHO, vec![0xa0; 10]);
        message.set_sequence(5);

        let bytes = message.to_bytes();
        // op=2, version=1: (1 << 3) | 2
        assert_eq!(bytes[0], 10);
        assert_eq!(bytes[1], 0);
        // length big-endian
        assert_eq!(&bytes[2..4], &[0, 10]);
        // group big-endian
        assert_eq!(&bytes[4..6], &[0, 0]);
        assert_eq!(bytes[6], 5);
        assert_eq!(bytes[7], OS_CMD_ECHO);
        assert_eq!(bytes.len(), SMP_HEADER_SIZE + 10);
    }

    #[test]
    fn test_from_bytes() {
        let mut message = Message::new(Op::Read, Version::V1, GROUP_IMG, IMG_CMD_STATE, vec![1, 2, 3]);
        message.set_sequence(200);

        let parsed = Message::from_bytes(&message.to_bytes()).expect("should parse");
        assert_eq!(parsed, message);
        assert_eq!(parsed.version(), Version::V1);
        assert_eq!(parsed.group(), GROUP_IMG);
        assert_eq!(parsed.sequence(), 200);
    }

    #[test]
    fn test_from_bytes_length_mismatch() {
        let message = Message::new(Op::Read, Version::V2, GROUP_OS, OS_CMD_ECHO, vec![1, 2, 3]);
        let mut bytes = message.to_bytes();
        bytes.push(0xff);

        assert_eq!(
            Message::from_bytes(&bytes),
            Err(ProtocolError::LengthMismatch {
                declared: 3,
                actual: 4
            })
        );
        assert!(matches!(
            Message::from_bytes(&bytes[..5]),
            Err(ProtocolError::PacketTooShort { .. })
        ));
    }

    #[test]
    fn test_set_body_updates_length() {
        let mut message = Message::new(Op::Write, Version::V2, GROUP_FS, FS_CMD_FILE, Vec::new());
        assert_eq!(message.header().length, 0);
        message.set_body(vec![0; 42]);
        assert_eq!(message.header().length, 42);
        assert_eq!(message.size(), 50);
    }

    #[test]
    fn test_op_response() {
        assert_eq!(Op::Read.response(), Op::ReadResponse);
        assert_eq!(Op::Write.response(), Op::WriteResponse);
        assert!(Op::WriteResponse.is_response());
        assert!(!Op::Write.is_response());
        assert!(Op::try_from(7).is_err());
    }
}
