//! Client access layer for the facility booking service.
//!
//! [`RequestChannel`] turns an unreliable UDP socket into at-least-once
//! request delivery, [`MonitorSession`] listens for server pushes, and
//! [`FacilityClient`] offers one typed method per booking operation. The
//! `facility` binary is a thin operator harness over these.

pub mod channel;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod monitor;
pub mod transport;

pub use channel::{ChannelConfig, RequestChannel};
pub use cli::Cli;
pub use client::{Extension, FacilityClient, LastBooking, MonitorHandle};
pub use error::{ClientError, ClientResult};
pub use monitor::{MonitorConfig, MonitorEvent, MonitorReport, MonitorSession, MonitorState};
pub use transport::{DatagramTransport, UdpTransport};
