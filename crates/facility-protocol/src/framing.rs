//! Datagram envelopes.
//!
//! Requests carry an explicit body length; responses and pushes do not, the
//! body runs to the end of the datagram:
//!
//! ```text
//! request   +--------------+---------+--------------+--------------+
//!           | id (u32 BE)  | type u8 | len (u16 BE) | body         |
//!           +--------------+---------+--------------+--------------+
//! response  +--------------+---------+-----------------------------+
//!           | id (u32 BE)  | stat u8 | body ... end of datagram    |
//!           +--------------+---------+-----------------------------+
//! ```
//!
//! A response whose id is [`PUSH_REQUEST_ID`] is an unsolicited push.

use crate::error::{WireError, WireResult};
use crate::types::{MessageType, Status};
use crate::wire::{WireReader, WireWriter};

/// Request id reserved for server-initiated pushes.
pub const PUSH_REQUEST_ID: u32 = 0;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Bytes before the body in a request.
pub const REQUEST_HEADER_LEN: usize = 4 + 1 + 2;

/// Bytes before the body in a response or push.
pub const RESPONSE_HEADER_LEN: usize = 4 + 1;

/// Largest body a request can carry.
pub const MAX_REQUEST_BODY: usize = MAX_DATAGRAM_SIZE - REQUEST_HEADER_LEN;

/// A decoded request datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub request_id: u32,
    pub message_type: MessageType,
    pub body: Vec<u8>,
}

impl RequestEnvelope {
    pub fn new(request_id: u32, message_type: MessageType, body: Vec<u8>) -> Self {
        Self {
            request_id,
            message_type,
            body,
        }
    }

    /// Serializes the envelope with its body-length prefix.
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        encode_request(self.request_id, self.message_type, &self.body)
    }

    /// Parses a request datagram. Bytes past the declared body are ignored.
    pub fn decode(data: &[u8]) -> WireResult<Self> {
        let mut reader = WireReader::new(data);
        let request_id = reader.read_u32()?;
        let message_type = MessageType::try_from(reader.read_u8()?)?;
        let declared = reader.read_u16()? as usize;
        if declared > reader.remaining() {
            return Err(WireError::BodyLengthMismatch {
                declared,
                actual: reader.remaining(),
            });
        }
        let body = reader.read_rest()[..declared].to_vec();
        Ok(Self::new(request_id, message_type, body))
    }
}

/// A decoded response or push datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub request_id: u32,
    pub status: Status,
    pub body: Vec<u8>,
}

impl ResponseEnvelope {
    pub fn new(request_id: u32, status: Status, body: Vec<u8>) -> Self {
        Self {
            request_id,
            status,
            body,
        }
    }

    /// Creates a server push envelope.
    pub fn push(status: Status, body: Vec<u8>) -> Self {
        Self::new(PUSH_REQUEST_ID, status, body)
    }

    /// Returns true if this datagram was not a reply to any request.
    pub fn is_push(&self) -> bool {
        self.request_id == PUSH_REQUEST_ID
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_response(self.request_id, self.status, &self.body)
    }

    pub fn decode(data: &[u8]) -> WireResult<Self> {
        let mut reader = WireReader::new(data);
        let request_id = reader.read_u32()?;
        let status = Status::try_from(reader.read_u8()?)?;
        let body = reader.read_rest().to_vec();
        Ok(Self::new(request_id, status, body))
    }
}

/// Frames a request body.
pub fn encode_request(request_id: u32, message_type: MessageType, body: &[u8]) -> WireResult<Vec<u8>> {
    if body.len() > MAX_REQUEST_BODY {
        return Err(WireError::BodyTooLong {
            len: body.len(),
            max: MAX_REQUEST_BODY,
        });
    }
    let mut writer = WireWriter::with_capacity(REQUEST_HEADER_LEN + body.len());
    writer.write_u32(request_id);
    writer.write_u8(message_type.code());
    // Guarded above: MAX_REQUEST_BODY < u16::MAX.
    writer.write_u16(body.len() as u16);
    writer.write_bytes(body);
    Ok(writer.into_bytes())
}

/// Frames a response body.
pub fn encode_response(request_id: u32, status: Status, body: &[u8]) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(RESPONSE_HEADER_LEN + body.len());
    writer.write_u32(request_id);
    writer.write_u8(status.code());
    writer.write_bytes(body);
    writer.into_bytes()
}

/// Reads the request id of a response datagram without decoding the rest.
pub fn peek_request_id(data: &[u8]) -> WireResult<u32> {
    WireReader::new(data).read_u32()
}
