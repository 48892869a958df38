use super::*;
use shared::domain::RequestStatus;

fn local() -> (LocalBackend, RecordingSink) {
    let sink = RecordingSink::new();
    (LocalBackend::demo(Arc::new(sink.clone())), sink)
}

#[test]
fn enum_arguments_accept_loose_spelling() {
    assert_eq!(token::<StaffStatus>("OFF_DUTY"), Ok(StaffStatus::OffDuty));
    assert_eq!(token::<EquipmentType>(" Wheelchair "), Ok(EquipmentType::Wheelchair));
    assert!(token::<Priority>("whenever").is_err());
}

#[test]
fn create_request_arguments_parse() {
    let cli = Cli::try_parse_from([
        "tools",
        "--server-url",
        "http://127.0.0.1:8080",
        "create-request",
        "Ada Lovelace",
        "--equipment-type",
        "stretcher",
        "--priority",
        "emergency",
        "--from-floor",
        "1",
        "--from-zone",
        "Emergency",
        "--to-floor",
        "2",
        "--to-zone",
        "ICU",
    ])
    .expect("parse");

    assert_eq!(cli.server_url.as_deref(), Some("http://127.0.0.1:8080"));
    let Command::CreateRequest {
        equipment_type,
        priority,
        to_zone,
        ..
    } = cli.command
    else {
        panic!("expected create-request");
    };
    assert_eq!(equipment_type, EquipmentType::Stretcher);
    assert_eq!(priority, Priority::Emergency);
    assert_eq!(to_zone, "ICU");
}

#[tokio::test]
async fn demo_walks_the_head_of_the_queue_to_completion() {
    let (backend, sink) = local();
    demo(&backend).await.expect("demo");

    let snapshot = backend.snapshot().await.expect("snapshot");
    let head = snapshot
        .requests
        .iter()
        .find(|r| r.id == RequestId::new("REQ-001"))
        .expect("REQ-001");
    assert_eq!(head.status, RequestStatus::Completed);
    assert!(sink
        .drain()
        .iter()
        .all(|n| n.level == NotificationLevel::Success));
}

#[tokio::test]
async fn rejected_commands_surface_as_errors() {
    let (backend, sink) = local();
    let err = run(
        &backend,
        Command::Start {
            request_id: "REQ-002".into(),
        },
    )
    .await
    .expect_err("pending request cannot start");
    assert!(err.to_string().contains("InvalidTransition"));

    let notifications = sink.drain();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Error);
}

#[test]
fn request_line_names_the_assignment() {
    let mut request = TransportRequest {
        id: RequestId::new("REQ-7"),
        patient_name: "Ada".into(),
        priority: Priority::Urgent,
        status: RequestStatus::Assigned,
        equipment_type: EquipmentType::Wheelchair,
        origin: place(1, "Lobby".into()),
        destination: place(3, "Cardiology".into()),
        notes: None,
        requested_at: chrono_now(),
        assigned_at: None,
        completed_at: None,
        assigned_staff: Some(StaffId::new("STF-2")),
        assigned_equipment: Some(EquipmentId::new("EQ-2")),
    };
    let line = request_line(&request);
    assert!(line.starts_with("REQ-7 Urgent Ada [wheelchair] assigned 1/Lobby -> 3/Cardiology"));
    assert!(line.ends_with("by STF-2 with EQ-2"));

    request.assigned_staff = None;
    assert!(!request_line(&request).contains(" by "));
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
