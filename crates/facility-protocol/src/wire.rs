//! Primitive field codec.
//!
//! All integers are big-endian (network order). Strings are UTF-8 prefixed
//! by a `u16` byte count. Times are `u32` epoch seconds.
//!
//! ```text
//! u8      [b0]
//! u16     [b1 b0]
//! u32     [b3 b2 b1 b0]
//! string  [len: u16][len bytes of UTF-8]
//! ```

use facility_core::{EpochSeconds, TimeSlot};

use crate::error::{WireError, WireResult};

/// Longest string a `u16` length prefix can describe.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Append-only encoder for datagram bodies.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes an epoch-seconds field.
    pub fn write_time(&mut self, value: EpochSeconds) {
        self.write_u32(value);
    }

    /// Writes a slot as two consecutive time fields.
    pub fn write_slot(&mut self, slot: &TimeSlot) {
        self.write_time(slot.start());
        self.write_time(slot.end());
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// Nothing is written when the string is too long.
    pub fn write_string(&mut self, value: &str) -> WireResult<()> {
        let bytes = value.as_bytes();
        let len = u16::try_from(bytes.len()).map_err(|_| WireError::StringTooLong {
            len: bytes.len(),
            max: MAX_STRING_LEN,
        })?;
        self.write_u16(len);
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes a `u16` item count, failing if `count` does not fit.
    pub fn write_count(&mut self, what: &'static str, count: usize) -> WireResult<()> {
        let count16 = u16::try_from(count).map_err(|_| WireError::TooManyItems {
            what,
            count,
            max: u16::MAX as usize,
        })?;
        self.write_u16(count16);
        Ok(())
    }

    /// Appends raw bytes without a prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an immutable datagram.
///
/// After any read returns an error the cursor position is unspecified and
/// the reader must be discarded.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> WireResult<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(WireError::underflow(n, remaining));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> WireResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> WireResult<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> WireResult<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_time(&mut self) -> WireResult<EpochSeconds> {
        self.read_u32()
    }

    /// Reads two time fields and validates them as a slot.
    pub fn read_slot(&mut self) -> WireResult<TimeSlot> {
        let start = self.read_time()?;
        let end = self.read_time()?;
        Ok(TimeSlot::new(start, end)?)
    }

    /// Reads a `u16`-counted list of slots.
    pub fn read_slots(&mut self) -> WireResult<Vec<TimeSlot>> {
        let count = self.read_u16()? as usize;
        // Each slot is 8 bytes; fail before allocating for a lying count.
        if count * 8 > self.remaining() {
            return Err(WireError::underflow(count * 8, self.remaining()));
        }
        (0..count).map(|_| self.read_slot()).collect()
    }

    pub fn read_string(&mut self) -> WireResult<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }

    /// Consumes everything left in the buffer.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}
