//! Message types, request bodies and decoded replies.

use facility_core::{EpochSeconds, TimeSlot};
use serde::Serialize;

use crate::error::{WireError, WireResult};
use crate::framing::encode_request;
use crate::wire::{WireReader, WireWriter};

/// Request message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageType {
    QueryAvailability = 1,
    BookFacility = 2,
    ChangeBooking = 3,
    MonitorFacility = 4,
    GetLastBookingTime = 5,
    ExtendBooking = 6,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        Self::QueryAvailability,
        Self::BookFacility,
        Self::ChangeBooking,
        Self::MonitorFacility,
        Self::GetLastBookingTime,
        Self::ExtendBooking,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns true if re-executing the request on the server leaves the
    /// same state as executing it once.
    ///
    /// Retransmission of a non-idempotent request after a lost reply may
    /// apply it twice.
    pub const fn is_idempotent(self) -> bool {
        match self {
            Self::QueryAvailability | Self::MonitorFacility | Self::GetLastBookingTime => true,
            Self::BookFacility | Self::ChangeBooking | Self::ExtendBooking => false,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(code: u8) -> WireResult<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or(WireError::UnknownMessageType(code))
    }
}

/// Response status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Status {
    Success = 100,
    Error = 101,
}

impl Status {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = WireError;

    fn try_from(code: u8) -> WireResult<Self> {
        match code {
            100 => Ok(Self::Success),
            101 => Ok(Self::Error),
            other => Err(WireError::UnknownStatus(other)),
        }
    }
}

/// Kind of booking change carried in a monitor push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Operation {
    Book = 1,
    Change = 2,
    Extend = 3,
}

impl Operation {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Change and extend pushes also carry the slot before the change.
    pub const fn carries_previous(self) -> bool {
        match self {
            Self::Book => false,
            Self::Change | Self::Extend => true,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = WireError;

    fn try_from(code: u8) -> WireResult<Self> {
        match code {
            1 => Ok(Self::Book),
            2 => Ok(Self::Change),
            3 => Ok(Self::Extend),
            other => Err(WireError::UnknownOperation(other)),
        }
    }
}

/// A request the client can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Free slots on the given day offsets (0 = today).
    QueryAvailability { facility: String, days: Vec<u32> },
    BookFacility { facility: String, slot: TimeSlot },
    /// Shift a booking by a signed number of minutes.
    ChangeBooking { booking_id: u32, offset_minutes: i32 },
    /// Subscribe to pushes about a facility for `duration_secs`.
    MonitorFacility { facility: String, duration_secs: u32 },
    GetLastBookingTime { facility: String },
    ExtendBooking { booking_id: u32, minutes: u32 },
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::QueryAvailability { .. } => MessageType::QueryAvailability,
            Self::BookFacility { .. } => MessageType::BookFacility,
            Self::ChangeBooking { .. } => MessageType::ChangeBooking,
            Self::MonitorFacility { .. } => MessageType::MonitorFacility,
            Self::GetLastBookingTime { .. } => MessageType::GetLastBookingTime,
            Self::ExtendBooking { .. } => MessageType::ExtendBooking,
        }
    }

    /// Serializes the request body (without envelope).
    pub fn encode_body(&self) -> WireResult<Vec<u8>> {
        let mut w = WireWriter::new();
        match self {
            Self::QueryAvailability { facility, days } => {
                w.write_string(facility)?;
                w.write_count("days", days.len())?;
                for day in days {
                    w.write_u32(*day);
                }
            }
            Self::BookFacility { facility, slot } => {
                w.write_string(facility)?;
                w.write_slot(slot);
            }
            Self::ChangeBooking {
                booking_id,
                offset_minutes,
            } => {
                w.write_u32(*booking_id);
                // Two's complement on the wire.
                w.write_u32(*offset_minutes as u32);
            }
            Self::MonitorFacility {
                facility,
                duration_secs,
            } => {
                w.write_string(facility)?;
                w.write_u32(*duration_secs);
            }
            Self::GetLastBookingTime { facility } => {
                w.write_string(facility)?;
            }
            Self::ExtendBooking {
                booking_id,
                minutes,
            } => {
                w.write_u32(*booking_id);
                w.write_u32(*minutes);
            }
        }
        Ok(w.into_bytes())
    }

    /// Parses a request body of the given type.
    pub fn decode_body(message_type: MessageType, body: &[u8]) -> WireResult<Self> {
        let mut r = WireReader::new(body);
        let request = match message_type {
            MessageType::QueryAvailability => {
                let facility = r.read_string()?;
                let count = r.read_u16()?;
                let days = (0..count).map(|_| r.read_u32()).collect::<WireResult<_>>()?;
                Self::QueryAvailability { facility, days }
            }
            MessageType::BookFacility => Self::BookFacility {
                facility: r.read_string()?,
                slot: r.read_slot()?,
            },
            MessageType::ChangeBooking => Self::ChangeBooking {
                booking_id: r.read_u32()?,
                offset_minutes: r.read_u32()? as i32,
            },
            MessageType::MonitorFacility => Self::MonitorFacility {
                facility: r.read_string()?,
                duration_secs: r.read_u32()?,
            },
            MessageType::GetLastBookingTime => Self::GetLastBookingTime {
                facility: r.read_string()?,
            },
            MessageType::ExtendBooking => Self::ExtendBooking {
                booking_id: r.read_u32()?,
                minutes: r.read_u32()?,
            },
        };
        Ok(request)
    }

    /// Serializes the request into a complete datagram.
    pub fn frame(&self, request_id: u32) -> WireResult<Vec<u8>> {
        encode_request(request_id, self.message_type(), &self.encode_body()?)
    }
}

/// Decoded success body of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Availability { slots: Vec<TimeSlot> },
    Booked { booking_id: u32 },
    Changed { message: String },
    MonitorRegistered { message: String },
    /// `end` is `None` when the facility has no bookings.
    LastBookingTime {
        end: Option<EpochSeconds>,
        message: String,
    },
    Extended { new_end: EpochSeconds, message: String },
}

impl Reply {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Availability { .. } => MessageType::QueryAvailability,
            Self::Booked { .. } => MessageType::BookFacility,
            Self::Changed { .. } => MessageType::ChangeBooking,
            Self::MonitorRegistered { .. } => MessageType::MonitorFacility,
            Self::LastBookingTime { .. } => MessageType::GetLastBookingTime,
            Self::Extended { .. } => MessageType::ExtendBooking,
        }
    }

    /// Parses the success body of a reply to a request of `message_type`.
    pub fn decode_body(message_type: MessageType, body: &[u8]) -> WireResult<Self> {
        let reply = match message_type {
            MessageType::QueryAvailability => Self::Availability {
                slots: Self::decode_availability(body)?,
            },
            MessageType::BookFacility => Self::Booked {
                booking_id: Self::decode_booking_id(body)?,
            },
            MessageType::ChangeBooking => Self::Changed {
                message: Self::decode_message(body)?,
            },
            MessageType::MonitorFacility => Self::MonitorRegistered {
                message: Self::decode_message(body)?,
            },
            MessageType::GetLastBookingTime => {
                let (end, message) = Self::decode_last_booking(body)?;
                Self::LastBookingTime { end, message }
            }
            MessageType::ExtendBooking => {
                let (new_end, message) = Self::decode_extension(body)?;
                Self::Extended { new_end, message }
            }
        };
        Ok(reply)
    }

    /// Body of a `QueryAvailability` reply.
    pub fn decode_availability(body: &[u8]) -> WireResult<Vec<TimeSlot>> {
        WireReader::new(body).read_slots()
    }

    /// Body of a `BookFacility` reply.
    pub fn decode_booking_id(body: &[u8]) -> WireResult<u32> {
        WireReader::new(body).read_u32()
    }

    /// Body of a `ChangeBooking` or `MonitorFacility` reply.
    pub fn decode_message(body: &[u8]) -> WireResult<String> {
        WireReader::new(body).read_string()
    }

    /// Body of a `GetLastBookingTime` reply. An end of 0 means no bookings.
    pub fn decode_last_booking(body: &[u8]) -> WireResult<(Option<EpochSeconds>, String)> {
        let mut r = WireReader::new(body);
        let end = r.read_time()?;
        Ok(((end != 0).then_some(end), r.read_string()?))
    }

    /// Body of an `ExtendBooking` reply: the new end and the server's text.
    pub fn decode_extension(body: &[u8]) -> WireResult<(EpochSeconds, String)> {
        let mut r = WireReader::new(body);
        let new_end = r.read_time()?;
        Ok((new_end, r.read_string()?))
    }

    pub fn encode_body(&self) -> WireResult<Vec<u8>> {
        let mut w = WireWriter::new();
        match self {
            Self::Availability { slots } => {
                w.write_count("slots", slots.len())?;
                for slot in slots {
                    w.write_slot(slot);
                }
            }
            Self::Booked { booking_id } => w.write_u32(*booking_id),
            Self::Changed { message } | Self::MonitorRegistered { message } => {
                w.write_string(message)?;
            }
            Self::LastBookingTime { end, message } => {
                w.write_time(end.unwrap_or(0));
                w.write_string(message)?;
            }
            Self::Extended { new_end, message } => {
                w.write_time(*new_end);
                w.write_string(message)?;
            }
        }
        Ok(w.into_bytes())
    }
}

/// Parses the body of an error-status reply.
pub fn decode_error_body(body: &[u8]) -> WireResult<String> {
    WireReader::new(body).read_string()
}

pub fn encode_error_body(message: &str) -> WireResult<Vec<u8>> {
    let mut w = WireWriter::new();
    w.write_string(message)?;
    Ok(w.into_bytes())
}

/// Identity of a logically distinct monitor update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub booking_id: u32,
    pub operation: Operation,
    pub start: EpochSeconds,
    pub end: EpochSeconds,
}

/// A booking change pushed by the server to monitoring clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorUpdate {
    pub status: Status,
    pub message: String,
    pub operation: Operation,
    pub booking_id: u32,
    pub current: TimeSlot,
    /// Slot before the change; only for `Change` and `Extend`.
    pub previous: Option<TimeSlot>,
    /// Free slots for the coming week, when the server includes them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<Vec<TimeSlot>>,
}

impl MonitorUpdate {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            booking_id: self.booking_id,
            operation: self.operation,
            start: self.current.start(),
            end: self.current.end(),
        }
    }

    /// Parses a push body.
    pub fn decode_body(status: Status, body: &[u8]) -> WireResult<Self> {
        let mut r = WireReader::new(body);
        let message = r.read_string()?;
        let operation = Operation::try_from(r.read_u8()?)?;
        let booking_id = r.read_u32()?;
        let current = r.read_slot()?;
        let previous = if operation.carries_previous() {
            Some(r.read_slot()?)
        } else {
            None
        };
        let availability = if r.is_empty() {
            None
        } else {
            Some(r.read_slots()?)
        };
        Ok(Self {
            status,
            message,
            operation,
            booking_id,
            current,
            previous,
            availability,
        })
    }

    pub fn encode_body(&self) -> WireResult<Vec<u8>> {
        let mut w = WireWriter::new();
        w.write_string(&self.message)?;
        w.write_u8(self.operation.code());
        w.write_u32(self.booking_id);
        w.write_slot(&self.current);
        if self.operation.carries_previous() {
            // A missing previous slot is written as the current one so the
            // layout stays decodable.
            w.write_slot(self.previous.as_ref().unwrap_or(&self.current));
        }
        if let Some(ref slots) = self.availability {
            w.write_count("slots", slots.len())?;
            for slot in slots {
                w.write_slot(slot);
            }
        }
        Ok(w.into_bytes())
    }
}
