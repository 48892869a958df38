use std::sync::Arc;

use coordinator::{
    add_equipment, add_staff, assign, complete, create_request, placement_suggestions,
    start_transport, summary, ApiContext, RecordingSink,
};
use shared::{
    domain::{
        EquipmentStatus, EquipmentType, Place, Priority, RequestStatus, StaffStatus,
    },
    protocol::{NewEquipment, NewStaffMember, NewTransportRequest, NotificationLevel},
};
use storage::{seed::default_floor_plans, Storage};

fn place(floor: u32, zone: &str) -> Place {
    Place {
        floor,
        zone: zone.into(),
        room: None,
    }
}

#[tokio::test]
async fn stretcher_transport_from_emergency_to_surgery() {
    let sink = RecordingSink::new();
    let ctx = ApiContext::new(
        Storage::default(),
        default_floor_plans(),
        Arc::new(sink.clone()),
    );

    let porter = add_staff(
        &ctx,
        NewStaffMember {
            name: "Sam Okafor".into(),
            role: "porter".into(),
            floor: 1,
            zone: "Lobby".into(),
        },
    )
    .await
    .expect("add staff");
    let stretcher = add_equipment(
        &ctx,
        NewEquipment {
            name: "Stretcher A".into(),
            equipment_type: EquipmentType::Stretcher,
            floor: 1,
            zone: "Pharmacy".into(),
        },
    )
    .await
    .expect("add equipment");

    let request = create_request(
        &ctx,
        NewTransportRequest {
            patient_name: "Jane Doe".into(),
            priority: Priority::Emergency,
            equipment_type: EquipmentType::Stretcher,
            origin: place(1, "Emergency"),
            destination: place(2, "Surgery"),
            notes: Some("post-trauma".into()),
        },
    )
    .await
    .expect("create request");
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(summary(&ctx).await.pending_queue_len, 1);

    let outcome = assign(&ctx, &request.id, &porter.id, &stretcher.id)
        .await
        .expect("assign");
    assert_eq!(outcome.request.status, RequestStatus::Assigned);
    assert_eq!(outcome.staff.status, StaffStatus::Busy);
    assert_eq!(outcome.equipment.status, EquipmentStatus::InUse);
    assert_eq!(outcome.staff.location.zone, "Emergency");
    assert_eq!(outcome.equipment.location.zone, "Emergency");
    assert_eq!(
        (outcome.equipment.location.x, outcome.equipment.location.y),
        (200.0, 200.0)
    );

    start_transport(&ctx, &request.id).await.expect("start");
    let done = complete(&ctx, &request.id).await.expect("complete");
    assert_eq!(done.status, RequestStatus::Completed);

    let after = summary(&ctx).await;
    assert_eq!(after.pending_queue_len, 0);
    assert_eq!(after.requests_by_status.get(&RequestStatus::Completed), Some(&1));
    assert_eq!(after.staff_by_status.get(&StaffStatus::Available), Some(&1));
    assert_eq!(
        after.available_by_type.get(&EquipmentType::Stretcher),
        Some(&1)
    );
    assert!(placement_suggestions(&ctx).await.is_empty());

    let notes = sink.drain();
    assert_eq!(notes.len(), 6);
    assert!(notes.iter().all(|n| n.level == NotificationLevel::Success));
}
