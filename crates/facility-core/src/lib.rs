//! Core types: epoch time slots and logging setup.

pub mod logging;
pub mod time;

pub use logging::{LogConfig, LogError, LogFormat, init_logging};
pub use time::{EpochSeconds, TimeError, TimeSlot};
