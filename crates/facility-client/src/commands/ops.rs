//! Booking commands: one request each, except `monitor`.

use std::time::Duration;

use facility_core::time::format_local;
use facility_core::{EpochSeconds, TimeSlot};
use facility_protocol::MonitorUpdate;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::client::FacilityClient;
use crate::error::{ClientError, ClientResult};
use crate::monitor::{MonitorEvent, MonitorReport};

fn print_json<T: Serialize + ?Sized>(value: &T) -> ClientResult<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub async fn query(
    client: &mut FacilityClient,
    facility: &str,
    days: &[u32],
    json: bool,
) -> ClientResult<()> {
    let slots = client.query_availability(facility, days).await?;
    if json {
        return print_json(&json!({ "facility": facility, "days": days, "slots": slots }));
    }
    if slots.is_empty() {
        println!("No available slots for {facility}.");
        return Ok(());
    }
    println!("Available slots for {facility}:");
    for (n, slot) in slots.iter().enumerate() {
        println!("  {:>2}. {}", n + 1, slot);
    }
    Ok(())
}

pub async fn book(
    client: &mut FacilityClient,
    facility: &str,
    start: EpochSeconds,
    end: EpochSeconds,
    json: bool,
) -> ClientResult<()> {
    let slot = TimeSlot::new(start, end).map_err(|e| ClientError::Config(e.to_string()))?;
    let booking_id = client.book(facility, slot).await?;
    if json {
        return print_json(&json!({ "booking_id": booking_id, "slot": slot }));
    }
    println!("Booked {facility} for {slot}. Booking ID: {booking_id}");
    Ok(())
}

pub async fn change(
    client: &mut FacilityClient,
    booking_id: u32,
    offset_minutes: i32,
    json: bool,
) -> ClientResult<()> {
    let message = client.change_booking(booking_id, offset_minutes).await?;
    if json {
        return print_json(&json!({ "booking_id": booking_id, "message": message }));
    }
    println!("{message}");
    Ok(())
}

pub async fn last_booking(client: &mut FacilityClient, facility: &str, json: bool) -> ClientResult<()> {
    let last = client.last_booking_time(facility).await?;
    if json {
        return print_json(&last);
    }
    match last.end {
        Some(end) => println!("{} (ends {})", last.message, format_local(end)),
        None => println!("{}", last.message),
    }
    Ok(())
}

pub async fn extend(
    client: &mut FacilityClient,
    booking_id: u32,
    minutes: u32,
    json: bool,
) -> ClientResult<()> {
    let extension = client.extend_booking(booking_id, minutes).await?;
    if json {
        return print_json(&extension);
    }
    println!(
        "{} New end: {}",
        extension.message,
        format_local(extension.new_end)
    );
    Ok(())
}

/// Listens until the duration elapses or Ctrl-C, printing each update.
pub async fn monitor(
    client: FacilityClient,
    facility: &str,
    duration_secs: u32,
    json: bool,
) -> ClientResult<()> {
    let duration = Duration::from_secs(u64::from(duration_secs));
    let mut handle = client.spawn_monitor(facility, duration);
    let mut updates = 0usize;

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                if matches!(event, MonitorEvent::Update(_)) {
                    updates += 1;
                }
                if json {
                    print_json(&event)?;
                } else {
                    render_event(&event, updates, duration_secs);
                }
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                info!("interrupted, cancelling monitor");
                handle.cancel();
            }
        }
    }

    let (_client, report) = handle.join().await?;
    let report = report?;
    if json {
        print_json(&json!({ "event": "closed", "report": report }))
    } else {
        render_report(&report);
        Ok(())
    }
}

fn render_event(event: &MonitorEvent, count: usize, duration_secs: u32) {
    match event {
        MonitorEvent::Registered { message } => {
            println!("{message}");
            println!("Monitoring for {duration_secs} seconds (Ctrl-C to stop)...");
        }
        MonitorEvent::Update(update) => render_update(update, count),
        MonitorEvent::Reregistered { acknowledged } => {
            if !acknowledged {
                eprintln!("warning: server did not answer re-registration");
            }
        }
    }
}

fn render_update(update: &MonitorUpdate, count: usize) {
    let rule = "=".repeat(60);
    let now = chrono::Local::now().format("%H:%M:%S");
    println!("{rule}");
    println!("[{now}] UPDATE #{count}: {}", update.message);
    println!("{rule}");
    println!("  Booking ID: {}", update.booking_id);
    println!("  Time Slot:  {}", update.current);
    if let Some(previous) = update.previous {
        println!("  Previous:   {previous}");
    }
    if let Some(ref slots) = update.availability {
        println!("  Free slots this week: {}", slots.len());
    }
}

fn render_report(report: &MonitorReport) {
    println!(
        "Monitoring ended ({:?}). Received {} update(s), {} duplicate(s) suppressed.",
        report.ended, report.delivered, report.duplicates
    );
    if report.malformed > 0 {
        println!("Skipped {} malformed datagram(s).", report.malformed);
    }
    if report.reregistrations > 0 {
        println!("Re-registered {} time(s).", report.reregistrations);
    }
}
