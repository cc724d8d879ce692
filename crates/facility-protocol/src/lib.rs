//! Binary wire codec for the facility booking protocol.
//!
//! Every request and response travels in a single UDP datagram. This crate
//! turns typed requests into datagrams and datagrams back into typed replies
//! and monitor pushes; it does no I/O.
//!
//! # Example
//!
//! ```rust
//! use facility_protocol::{MessageType, Request, RequestEnvelope};
//!
//! let request = Request::GetLastBookingTime { facility: "Lab_101".into() };
//! let frame = request.frame(1).unwrap();
//! let envelope = RequestEnvelope::decode(&frame).unwrap();
//! assert_eq!(envelope.message_type, MessageType::GetLastBookingTime);
//! ```

mod error;
mod framing;
mod types;
pub mod wire;

pub use error::{WireError, WireResult};
pub use framing::{
    MAX_DATAGRAM_SIZE, MAX_REQUEST_BODY, PUSH_REQUEST_ID, REQUEST_HEADER_LEN,
    RESPONSE_HEADER_LEN, RequestEnvelope, ResponseEnvelope, encode_request, encode_response,
    peek_request_id,
};
pub use types::{
    DedupKey, MessageType, MonitorUpdate, Operation, Reply, Request, Status, decode_error_body,
    encode_error_body,
};
pub use wire::{WireReader, WireWriter};
