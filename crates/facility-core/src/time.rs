//! Epoch-second time slots.
//!
//! The booking service counts time as unsigned 32-bit seconds since the Unix
//! epoch. That representation wraps in early 2106; conversions here report
//! anything outside the `u32` range as [`TimeError::OutOfRange`] instead of
//! truncating.

use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use thiserror::Error;

/// Seconds since the Unix epoch, as carried on the wire.
pub type EpochSeconds = u32;

/// Format used when rendering or parsing a wall-clock minute.
pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Errors produced when building or converting time values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// A slot must start strictly before it ends.
    #[error("invalid time slot: start {start} is not before end {end}")]
    Inverted { start: EpochSeconds, end: EpochSeconds },

    /// The timestamp does not fit into 32-bit epoch seconds.
    #[error("timestamp {0} is outside the 32-bit epoch range")]
    OutOfRange(i64),

    /// A wall-clock string could not be parsed.
    #[error("cannot parse '{input}', expected YYYY-MM-DD HH:MM")]
    Parse { input: String },

    /// The local time does not exist or is ambiguous (DST transitions).
    #[error("local time '{0}' is ambiguous or does not exist")]
    AmbiguousLocal(String),
}

/// A half-open interval `[start, end)` of epoch seconds.
///
/// Construction enforces `start < end`; the fields are private so the
/// invariant cannot be broken afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimeSlot {
    start: EpochSeconds,
    end: EpochSeconds,
}

impl TimeSlot {
    /// Creates a slot, rejecting empty or inverted intervals.
    pub fn new(start: EpochSeconds, end: EpochSeconds) -> Result<Self, TimeError> {
        if start >= end {
            return Err(TimeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a slot starting at `start` and lasting `seconds`.
    pub fn starting_at(start: EpochSeconds, seconds: u32) -> Result<Self, TimeError> {
        let end = start
            .checked_add(seconds)
            .ok_or(TimeError::OutOfRange(i64::from(start) + i64::from(seconds)))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> EpochSeconds {
        self.start
    }

    pub fn end(&self) -> EpochSeconds {
        self.end
    }

    /// Length of the slot in seconds.
    pub fn duration_secs(&self) -> u32 {
        self.end - self.start
    }

    /// Renders the slot in the given timezone.
    ///
    /// The end date is omitted when both ends fall on the same day.
    pub fn format_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let start = tz.from_utc_datetime(&datetime_from_epoch(self.start).naive_utc());
        let end = tz.from_utc_datetime(&datetime_from_epoch(self.end).naive_utc());
        if start.date_naive() == end.date_naive() {
            format!("{} to {}", start.format(MINUTE_FORMAT), end.format("%H:%M"))
        } else {
            format!(
                "{} to {}",
                start.format(MINUTE_FORMAT),
                end.format(MINUTE_FORMAT)
            )
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_in(&Local))
    }
}

/// Converts a date-time to wire epoch seconds.
pub fn epoch_from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Result<EpochSeconds, TimeError> {
    let secs = dt.timestamp();
    EpochSeconds::try_from(secs).map_err(|_| TimeError::OutOfRange(secs))
}

/// Converts wire epoch seconds to a UTC date-time.
pub fn datetime_from_epoch(secs: EpochSeconds) -> DateTime<Utc> {
    // Every u32 value is a valid chrono timestamp.
    DateTime::<Utc>::from_timestamp(i64::from(secs), 0).unwrap_or_default()
}

/// Renders epoch seconds as a local wall-clock minute.
pub fn format_local(secs: EpochSeconds) -> String {
    datetime_from_epoch(secs)
        .with_timezone(&Local)
        .format(MINUTE_FORMAT)
        .to_string()
}

/// Parses a `YYYY-MM-DD HH:MM` string in the given timezone.
pub fn parse_minute_in<Tz: TimeZone>(input: &str, tz: &Tz) -> Result<EpochSeconds, TimeError> {
    let naive = NaiveDateTime::parse_from_str(input.trim(), MINUTE_FORMAT).map_err(|_| {
        TimeError::Parse {
            input: input.to_string(),
        }
    })?;
    let dt = tz
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| TimeError::AmbiguousLocal(input.to_string()))?;
    epoch_from_datetime(&dt)
}

/// Parses a `YYYY-MM-DD HH:MM` string in the local timezone.
pub fn parse_local_minute(input: &str) -> Result<EpochSeconds, TimeError> {
    parse_minute_in(input, &Local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_rejects_inverted_and_empty() {
        assert!(TimeSlot::new(10, 20).is_ok());
        assert_eq!(
            TimeSlot::new(20, 10),
            Err(TimeError::Inverted { start: 20, end: 10 })
        );
        assert!(TimeSlot::new(10, 10).is_err());
    }

    #[test]
    fn slot_starting_at_checks_overflow() {
        let slot = TimeSlot::starting_at(1_700_000_000, 3600).unwrap();
        assert_eq!(slot.end(), 1_700_003_600);
        assert_eq!(slot.duration_secs(), 3600);

        assert!(matches!(
            TimeSlot::starting_at(u32::MAX - 5, 10),
            Err(TimeError::OutOfRange(_))
        ));
    }

    #[test]
    fn format_same_day_in_utc() {
        let slot = TimeSlot::new(1_700_000_000, 1_700_003_600).unwrap();
        assert_eq!(slot.format_in(&Utc), "2023-11-14 22:13 to 23:13");
    }

    #[test]
    fn format_across_days_in_utc() {
        let slot = TimeSlot::new(1_700_000_000, 1_700_010_000).unwrap();
        assert_eq!(slot.format_in(&Utc), "2023-11-14 22:13 to 2023-11-15 01:00");
    }

    #[test]
    fn parse_minute_roundtrip_utc() {
        let secs = parse_minute_in("2023-11-14 22:13", &Utc).unwrap();
        assert_eq!(secs, 1_699_999_980);
        assert!(matches!(
            parse_minute_in("14/11/2023", &Utc),
            Err(TimeError::Parse { .. })
        ));
    }

    #[test]
    fn epoch_conversion_range() {
        let before_epoch = DateTime::<Utc>::from_timestamp(-1, 0).unwrap();
        assert_eq!(
            epoch_from_datetime(&before_epoch),
            Err(TimeError::OutOfRange(-1))
        );
        assert_eq!(datetime_from_epoch(0).timestamp(), 0);
    }

    #[test]
    fn slot_serializes_as_object() {
        let slot = TimeSlot::new(1, 2).unwrap();
        let json = serde_json::to_string(&slot).unwrap();
        assert_eq!(json, r#"{"start":1,"end":2}"#);
    }
}
