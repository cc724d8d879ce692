//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use facility_core::EpochSeconds;
use facility_core::time::parse_local_minute;

/// facility - talk to a facility booking server over UDP
#[derive(Debug, Parser)]
#[command(name = "facility")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FACILITY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    // --- Connection flags ---
    /// Server host name or address
    #[arg(long, short = 'H', env = "FACILITY_HOST")]
    pub host: Option<String>,

    /// Server UDP port
    #[arg(long, short, env = "FACILITY_PORT")]
    pub port: Option<u16>,

    /// Probability (0.0 to 1.0) of dropping each outgoing request
    #[arg(long, value_parser = parse_drop_rate)]
    pub drop_rate: Option<f64>,

    /// Attempts per request
    #[arg(long)]
    pub retries: Option<u32>,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Discard replies whose request id does not match the request
    #[arg(long)]
    pub match_request_id: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show free slots of a facility
    Query {
        facility: String,

        /// Day offsets to check (0 = today)
        #[arg(default_values_t = [0u32])]
        days: Vec<u32>,
    },

    /// Book a facility
    Book {
        facility: String,

        /// Start, as "YYYY-MM-DD HH:MM" local time
        #[arg(value_parser = parse_local_minute)]
        start: EpochSeconds,

        /// End, as "YYYY-MM-DD HH:MM" local time
        #[arg(value_parser = parse_local_minute)]
        end: EpochSeconds,
    },

    /// Shift a booking by a number of minutes (negative moves it earlier)
    Change {
        booking_id: u32,

        #[arg(allow_hyphen_values = true)]
        offset_minutes: i32,
    },

    /// Watch a facility for booking changes
    Monitor {
        facility: String,

        /// How long to listen, in seconds
        duration_secs: u32,
    },

    /// Show when the last booking of a facility ends
    LastBooking { facility: String },

    /// Extend a booking by a number of minutes
    Extend { booking_id: u32, minutes: u32 },

    /// Run a concurrent query/book load test
    Bench {
        /// Concurrent workers, each with its own socket
        #[arg(long, default_value_t = 50)]
        workers: usize,

        /// Operations per worker
        #[arg(long, default_value_t = 100)]
        ops: usize,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

/// Parses a drop probability, rejecting anything outside `[0, 1]`.
pub fn parse_drop_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("drop rate must be a number, got '{value}'"))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(format!("drop rate must be between 0.0 and 1.0, got {rate}"));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_rate_accepts_bounds() {
        assert_eq!(parse_drop_rate("0").unwrap(), 0.0);
        assert_eq!(parse_drop_rate("0.3").unwrap(), 0.3);
        assert_eq!(parse_drop_rate("1.0").unwrap(), 1.0);
    }

    #[test]
    fn drop_rate_rejects_out_of_range_and_garbage() {
        assert!(parse_drop_rate("1.01").unwrap_err().contains("between"));
        assert!(parse_drop_rate("-0.1").unwrap_err().contains("between"));
        assert!(parse_drop_rate("NaN").is_err());
        assert!(parse_drop_rate("lots").unwrap_err().contains("must be a number"));
    }

    #[test]
    fn cli_rejects_bad_drop_rate() {
        let result = Cli::try_parse_from(["facility", "--drop-rate", "2", "last-booking", "Lab_101"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_query_with_default_day() {
        let cli = Cli::try_parse_from(["facility", "query", "Conference_Room_A"]).unwrap();
        match cli.command {
            Command::Query { facility, days } => {
                assert_eq!(facility, "Conference_Room_A");
                assert_eq!(days, vec![0]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_negative_change_offset() {
        let cli = Cli::try_parse_from(["facility", "change", "7", "-30"]).unwrap();
        match cli.command {
            Command::Change {
                booking_id,
                offset_minutes,
            } => {
                assert_eq!(booking_id, 7);
                assert_eq!(offset_minutes, -30);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_connection_flags() {
        let cli = Cli::try_parse_from([
            "facility",
            "--host",
            "10.0.0.1",
            "--port",
            "9000",
            "--drop-rate",
            "0.5",
            "--json",
            "monitor",
            "Lab_101",
            "60",
        ])
        .unwrap();
        assert_eq!(cli.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.drop_rate, Some(0.5));
        assert!(cli.json);
    }

    #[test]
    fn book_rejects_malformed_time() {
        let result = Cli::try_parse_from(["facility", "book", "Lab_101", "tomorrow", "later"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
