//! facility CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use facility_core::{LogConfig, init_logging};

use facility_client::cli::{Cli, Command, ConfigAction};
use facility_client::client::FacilityClient;
use facility_client::commands::{bench, config as config_cmd, ops};
use facility_client::config::ClientConfig;
use facility_client::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig::harness(cli.debug)) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Loads the file configuration and applies command-line overrides.
fn effective_config(cli: &Cli) -> ClientResult<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(drop_rate) = cli.drop_rate {
        config.transport.drop_rate = drop_rate;
    }
    if let Some(retries) = cli.retries {
        config.transport.retries = retries;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.transport.timeout_ms = timeout_ms;
    }
    if cli.match_request_id {
        config.transport.match_request_id = true;
    }
    Ok(config)
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = effective_config(&cli)?;
    let json = cli.json;

    let command = match cli.command {
        Command::Config { action } => {
            return match action {
                ConfigAction::Dump => config_cmd::dump(&config),
                ConfigAction::Validate => config_cmd::validate(&config),
                ConfigAction::Path => config_cmd::path(),
            };
        }
        command => command,
    };

    config.validate()?;
    let server = config.server_addr();
    if config.transport.drop_rate > 0.0 {
        eprintln!("Packet drop rate: {}", config.transport.drop_rate);
    }

    if let Command::Bench { workers, ops } = command {
        let report = bench::run(&server, config.channel_config(), workers, ops).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            bench::print_text(&report);
        }
        return Ok(());
    }

    let mut client = FacilityClient::connect(&server, config.channel_config())
        .await?
        .with_monitor_config(config.monitor_config());
    tracing::debug!(%server, "client ready");

    match command {
        Command::Query { facility, days } => ops::query(&mut client, &facility, &days, json).await,
        Command::Book {
            facility,
            start,
            end,
        } => ops::book(&mut client, &facility, start, end, json).await,
        Command::Change {
            booking_id,
            offset_minutes,
        } => ops::change(&mut client, booking_id, offset_minutes, json).await,
        Command::Monitor {
            facility,
            duration_secs,
        } => ops::monitor(client, &facility, duration_secs, json).await,
        Command::LastBooking { facility } => ops::last_booking(&mut client, &facility, json).await,
        Command::Extend {
            booking_id,
            minutes,
        } => ops::extend(&mut client, booking_id, minutes, json).await,
        // Dispatched above.
        Command::Bench { .. } | Command::Config { .. } => Ok(()),
    }
}
