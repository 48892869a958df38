use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{DispatchBackend, LocalBackend, RemoteDispatchClient};
use coordinator::RecordingSink;
use serde::de::DeserializeOwned;
use shared::{
    domain::{
        EquipmentId, EquipmentStatus, EquipmentType, Place, Priority, RequestId, StaffId,
        StaffStatus, TransportRequest,
    },
    protocol::{
        NewTransportRequest, Notification, NotificationLevel, PlacementSuggestion,
        RelocateEquipment,
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Dispatch console. Talks to a running server when `--server-url` is set,
/// otherwise runs each command against a fresh in-memory demo hospital.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DISPATCH_SERVER_URL")]
    server_url: Option<String>,
    #[arg(long, env = "DISPATCH_API_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// All transport requests.
    Requests,
    /// Pending requests in dispatch order.
    Queue,
    Staff,
    Equipment,
    Summary,
    CreateRequest {
        patient_name: String,
        #[arg(long, value_parser = token::<EquipmentType>)]
        equipment_type: EquipmentType,
        #[arg(long, default_value = "routine", value_parser = token::<Priority>)]
        priority: Priority,
        #[arg(long)]
        from_floor: u32,
        #[arg(long)]
        from_zone: String,
        #[arg(long)]
        to_floor: u32,
        #[arg(long)]
        to_zone: String,
        #[arg(long)]
        notes: Option<String>,
    },
    Assign {
        request_id: String,
        staff_id: String,
        equipment_id: String,
    },
    Cancel {
        request_id: String,
    },
    Start {
        request_id: String,
    },
    Complete {
        request_id: String,
    },
    /// Frees the staff member and unit still held by a cancelled request.
    Release {
        request_id: String,
    },
    StaffStatus {
        staff_id: String,
        #[arg(value_parser = token::<StaffStatus>)]
        status: StaffStatus,
    },
    EquipmentStatus {
        equipment_id: String,
        #[arg(value_parser = token::<EquipmentStatus>)]
        status: EquipmentStatus,
    },
    Relocate {
        equipment_id: String,
        zone: String,
        #[arg(long)]
        floor: Option<u32>,
    },
    Suggestions,
    /// Applies every current placement suggestion in priority order.
    ApplySuggestions,
    /// Streams server events; remote only.
    Watch {
        /// Only show events about this request.
        #[arg(long)]
        request_id: Option<String>,
    },
    /// Walks one request through its whole lifecycle.
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();

    if let Command::Watch { request_id } = &cli.command {
        let Some(server_url) = &cli.server_url else {
            bail!("watch needs --server-url");
        };
        let client = RemoteDispatchClient::new(server_url, cli.token.clone())?;
        return watch(&client, request_id.as_deref().map(RequestId::new)).await;
    }

    match &cli.server_url {
        Some(server_url) => {
            let client = RemoteDispatchClient::new(server_url, cli.token.clone())
                .with_context(|| format!("invalid server url {server_url}"))?;
            info!(base_url = %client.base_url(), "using remote dispatch server");
            run(&client, cli.command).await
        }
        None => {
            let sink = RecordingSink::new();
            let backend = LocalBackend::demo(Arc::new(sink.clone()));
            info!("using in-memory demo hospital");
            let result = run(&backend, cli.command).await;
            print_notifications(&sink.drain());
            result
        }
    }
}

async fn run(backend: &dyn DispatchBackend, command: Command) -> Result<()> {
    match command {
        Command::Requests => {
            for request in backend.snapshot().await?.requests {
                println!("{}", request_line(&request));
            }
        }
        Command::Queue => {
            for (position, request) in backend.pending_queue().await?.iter().enumerate() {
                println!("{:>2}. {}", position + 1, request_line(request));
            }
        }
        Command::Staff => {
            for staff in backend.snapshot().await?.staff {
                println!(
                    "{} {} ({}) {} workload={} at {}/{}",
                    staff.id,
                    staff.name,
                    staff.role,
                    staff.status,
                    staff.current_workload,
                    staff.location.floor,
                    staff.location.zone
                );
            }
        }
        Command::Equipment => {
            for unit in backend.snapshot().await?.equipment {
                println!(
                    "{} {} [{}] {} at {}/{} ({:.0}, {:.0})",
                    unit.id,
                    unit.name,
                    unit.equipment_type,
                    unit.status,
                    unit.location.floor,
                    unit.location.zone,
                    unit.location.x,
                    unit.location.y
                );
            }
        }
        Command::Summary => {
            println!("{}", serde_json::to_string_pretty(&backend.summary().await?)?);
        }
        Command::CreateRequest {
            patient_name,
            equipment_type,
            priority,
            from_floor,
            from_zone,
            to_floor,
            to_zone,
            notes,
        } => {
            let request = backend
                .create_request(NewTransportRequest {
                    patient_name,
                    priority,
                    equipment_type,
                    origin: place(from_floor, from_zone),
                    destination: place(to_floor, to_zone),
                    notes,
                })
                .await?;
            println!("created {}", request_line(&request));
        }
        Command::Assign {
            request_id,
            staff_id,
            equipment_id,
        } => {
            let outcome = backend
                .assign(
                    &RequestId::new(request_id),
                    &StaffId::new(staff_id),
                    &EquipmentId::new(equipment_id),
                )
                .await?;
            println!("{}", request_line(&outcome.request));
        }
        Command::Cancel { request_id } => {
            let request = backend.cancel(&RequestId::new(request_id)).await?;
            println!("{}", request_line(&request));
        }
        Command::Start { request_id } => {
            let request = backend.start_transport(&RequestId::new(request_id)).await?;
            println!("{}", request_line(&request));
        }
        Command::Complete { request_id } => {
            let request = backend.complete(&RequestId::new(request_id)).await?;
            println!("{}", request_line(&request));
        }
        Command::Release { request_id } => {
            let request = backend.release(&RequestId::new(request_id)).await?;
            println!("{}", request_line(&request));
        }
        Command::StaffStatus { staff_id, status } => {
            let staff = backend
                .set_staff_status(&StaffId::new(staff_id), status)
                .await?;
            println!("{} is now {}", staff.id, staff.status);
        }
        Command::EquipmentStatus {
            equipment_id,
            status,
        } => {
            let unit = backend
                .set_equipment_status(&EquipmentId::new(equipment_id), status)
                .await?;
            println!("{} is now {}", unit.id, unit.status);
        }
        Command::Relocate {
            equipment_id,
            zone,
            floor,
        } => {
            let unit = backend
                .relocate_equipment(
                    &EquipmentId::new(equipment_id),
                    RelocateEquipment {
                        floor,
                        zone,
                        position: None,
                    },
                )
                .await?;
            println!(
                "{} moved to {}/{}",
                unit.id, unit.location.floor, unit.location.zone
            );
        }
        Command::Suggestions => {
            for suggestion in backend.suggestions().await? {
                println!("{}", suggestion_line(&suggestion));
            }
        }
        Command::ApplySuggestions => {
            let suggestions = backend.suggestions().await?;
            if suggestions.is_empty() {
                println!("equipment is already where it is needed");
            }
            for suggestion in &suggestions {
                let unit = backend.apply_suggestion(suggestion).await?;
                println!("applied: {} now in {}", unit.id, unit.location.zone);
            }
        }
        Command::Watch { .. } => bail!("watch needs --server-url"),
        Command::Demo => demo(backend).await?,
    }
    Ok(())
}

/// Takes the most urgent pending request through assign, start and complete
/// with the first matching staff member and unit on hand.
async fn demo(backend: &dyn DispatchBackend) -> Result<()> {
    let queue = backend.pending_queue().await?;
    let Some(request) = queue.first() else {
        println!("nothing pending");
        return Ok(());
    };
    println!("dispatching {}", request_line(request));

    let snapshot = backend.snapshot().await?;
    let staff = snapshot
        .staff
        .iter()
        .find(|s| s.status == StaffStatus::Available)
        .context("no available staff")?;
    let unit = snapshot
        .equipment
        .iter()
        .find(|e| e.status == EquipmentStatus::Available && e.equipment_type == request.equipment_type)
        .with_context(|| format!("no available {}", request.equipment_type))?;

    let outcome = backend.assign(&request.id, &staff.id, &unit.id).await?;
    println!("  {}", request_line(&outcome.request));
    let started = backend.start_transport(&request.id).await?;
    println!("  {}", request_line(&started));
    let done = backend.complete(&request.id).await?;
    println!("  {}", request_line(&done));

    for suggestion in backend.suggestions().await? {
        println!("  suggestion: {}", suggestion_line(&suggestion));
    }
    Ok(())
}

async fn watch(client: &RemoteDispatchClient, only: Option<RequestId>) -> Result<()> {
    let mut events = client.subscribe_events().await?;
    info!("watching dispatch events");
    while let Some(event) = events.next().await {
        if let Some(only) = &only {
            if event.request_id() != Some(only) {
                continue;
            }
        }
        println!("{}", serde_json::to_string(&event)?);
    }
    println!("event stream closed");
    Ok(())
}

fn token<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
    serde_json::from_value(serde_json::Value::String(normalized))
        .map_err(|_| format!("unrecognised value '{raw}'"))
}

fn place(floor: u32, zone: String) -> Place {
    Place {
        floor,
        zone,
        room: None,
    }
}

fn request_line(request: &TransportRequest) -> String {
    let mut line = format!(
        "{} {:?} {} [{}] {} {}/{} -> {}/{}",
        request.id,
        request.priority,
        request.patient_name,
        request.equipment_type,
        request.status,
        request.origin.floor,
        request.origin.zone,
        request.destination.floor,
        request.destination.zone
    );
    if let (Some(staff), Some(unit)) = (&request.assigned_staff, &request.assigned_equipment) {
        line.push_str(&format!(" by {staff} with {unit}"));
    }
    line
}

fn suggestion_line(suggestion: &PlacementSuggestion) -> String {
    format!(
        "[{}] move {} from {} to {}: {}",
        suggestion.priority,
        suggestion.equipment_id,
        suggestion.current_zone,
        suggestion.suggested_zone,
        suggestion.reason
    )
}

fn print_notifications(notifications: &[Notification]) {
    for notification in notifications {
        let tag = match notification.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Error => "error",
            NotificationLevel::Info => "info",
        };
        eprintln!("[{tag}] {}", notification.message);
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
