//! One-shot board commands: `board`, `move`, `edit`, `book`, `services`, `clients`.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use console::style;
use slotboard_common::{AppointmentPatch, AppointmentStatus, Client, NewAppointment, NewService};

use slotboard::board::{BoardColumn, MutationCoordinator, TransitionOutcome};
use slotboard::client::HttpBoardApi;
use slotboard::config::SlotboardConfig;

use super::super::ServicesCommands;

/// Coordinator over the configured backend, loaded with a first snapshot.
pub async fn connect(config: &SlotboardConfig) -> Result<Arc<MutationCoordinator>> {
    let api = HttpBoardApi::new(&config.server.api_url);
    let base_url = api.base_url().to_string();
    let coordinator = Arc::new(MutationCoordinator::new(Arc::new(api), config.status_model()));
    coordinator
        .refresh()
        .await
        .with_context(|| format!("Failed to load appointments from {}", base_url))?;
    Ok(coordinator)
}

pub fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid time '{}', expected RFC 3339 like 2024-05-01T09:00:00Z", text))
}

pub fn parse_booking(
    shop_id: i64,
    service_id: i64,
    start: &str,
    name: &str,
    phone: &str,
    telegram_id: Option<i64>,
) -> Result<NewAppointment> {
    Ok(NewAppointment {
        shop_id,
        service_id,
        start_time: parse_time(start)?,
        client_name: name.to_string(),
        client_phone: phone.to_string(),
        client_telegram_id: telegram_id,
    })
}

/// Render columns as plain text, one card per line.
pub fn render_board(columns: &[BoardColumn]) -> String {
    let mut out = String::new();
    for column in columns {
        out.push_str(&format!(
            "{} {}\n",
            style(column.status.title()).bold().cyan(),
            style(format!("({})", column.appointments.len())).dim()
        ));
        if column.appointments.is_empty() {
            out.push_str(&format!("  {}\n", style("-").dim()));
        }
        for appt in &column.appointments {
            out.push_str(&format!(
                "  #{:<5} {}-{}  service {}  client {}\n",
                appt.id,
                appt.start_time.format("%Y-%m-%d %H:%M"),
                appt.end_time.format("%H:%M"),
                appt.service_id,
                appt.client_id,
            ));
        }
    }
    out
}

pub async fn cmd_board(config: &SlotboardConfig, json: bool) -> Result<()> {
    let coordinator = connect(config).await?;
    let columns = coordinator.columns();
    if json {
        println!("{}", serde_json::to_string_pretty(&columns)?);
    } else {
        print!("{}", render_board(&columns));
    }
    Ok(())
}

pub async fn cmd_move(config: &SlotboardConfig, id: i64, status: &str) -> Result<()> {
    let target: AppointmentStatus = status.parse()?;
    let coordinator = connect(config).await?;

    match coordinator.request_status_change(id, target).await? {
        TransitionOutcome::NoOp => {
            println!("Appointment #{} is already {}", id, style(target).yellow());
        }
        TransitionOutcome::Confirmed { status } if status != target => {
            println!(
                "Appointment #{} moved to {} (backend chose it over {})",
                id,
                style(status).green(),
                target
            );
        }
        TransitionOutcome::Confirmed { status } => {
            println!("Appointment #{} moved to {}", id, style(status).green());
        }
        TransitionOutcome::Superseded => {
            println!("Appointment #{} was changed again before this move landed", id);
        }
    }
    Ok(())
}

pub async fn cmd_edit(
    config: &SlotboardConfig,
    id: i64,
    service: Option<i64>,
    start: Option<&str>,
) -> Result<()> {
    let patch = AppointmentPatch {
        service_id: service,
        start_time: start.map(parse_time).transpose()?,
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to change: pass --service and/or --start");
    }
    let coordinator = connect(config).await?;
    let updated = coordinator.update_appointment(id, patch).await?;
    println!(
        "Appointment #{} now {}-{} (service {})",
        updated.id,
        updated.start_time.format("%Y-%m-%d %H:%M"),
        updated.end_time.format("%H:%M"),
        updated.service_id
    );
    Ok(())
}

pub async fn cmd_book(config: &SlotboardConfig, booking: NewAppointment) -> Result<()> {
    let coordinator = connect(config).await?;
    let created = coordinator.book(booking).await?;
    println!(
        "{} #{} at {}",
        style("Booked").green(),
        created.id,
        created.start_time.format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

pub async fn cmd_services(config: &SlotboardConfig, command: Option<ServicesCommands>) -> Result<()> {
    let api = HttpBoardApi::new(&config.server.api_url);
    match command {
        None | Some(ServicesCommands::List) => {
            let services = api.list_services().await?;
            if services.is_empty() {
                println!("No services yet. Add one with 'slotboard services add'.");
            }
            for service in services {
                println!(
                    "#{:<4} {:<24} {:>4} min  {:>8.2}",
                    service.id, service.name, service.duration_minutes, service.base_price
                );
            }
        }
        Some(ServicesCommands::Add {
            name,
            duration,
            price,
        }) => {
            let service = api
                .create_service(&NewService {
                    name,
                    duration_minutes: duration,
                    base_price: price,
                })
                .await?;
            println!("{} service #{} {}", style("Added").green(), service.id, service.name);
        }
    }
    Ok(())
}

/// Render the client list as aligned text.
pub fn render_clients(clients: &[Client]) -> String {
    let mut out = String::new();
    for client in clients {
        let telegram = client
            .telegram_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "#{:<5} {:<24} {:<16} telegram {}\n",
            client.id, client.full_name, client.phone, telegram
        ));
    }
    out
}

pub async fn cmd_clients(
    config: &SlotboardConfig,
    skip: usize,
    limit: usize,
    json: bool,
) -> Result<()> {
    let api = HttpBoardApi::new(&config.server.api_url);
    let clients = api
        .list_clients(skip, limit)
        .await
        .with_context(|| format!("Failed to list clients from {}", api.base_url()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&clients)?);
    } else if clients.is_empty() {
        println!("No clients yet. Clients are created when they book.");
    } else {
        print!("{}", render_clients(&clients));
    }
    Ok(())
}
