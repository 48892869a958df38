use super::*;
use chrono::Utc;
use shared::domain::{EquipmentId, EquipmentType, Place, Position, Priority, RequestId};

fn request(id: &str, from: &str, to: &str, status: RequestStatus) -> TransportRequest {
    let place = |zone: &str| Place {
        floor: 1,
        zone: zone.into(),
        room: None,
    };
    TransportRequest {
        id: RequestId::new(id),
        patient_name: "Patient".into(),
        priority: Priority::Routine,
        status,
        equipment_type: EquipmentType::Stretcher,
        origin: place(from),
        destination: place(to),
        notes: None,
        requested_at: Utc::now(),
        assigned_at: None,
        completed_at: None,
        assigned_staff: None,
        assigned_equipment: None,
    }
}

fn unit(id: &str, zone: &str, status: EquipmentStatus) -> TransportEquipment {
    TransportEquipment {
        id: EquipmentId::new(id),
        name: id.into(),
        equipment_type: EquipmentType::Stretcher,
        status,
        location: Position {
            floor: 1,
            zone: zone.into(),
            x: 0.0,
            y: 0.0,
        },
        assigned_staff: None,
        current_request: None,
    }
}

#[test]
fn busy_zone_without_equipment_draws_an_idle_unit() {
    let requests = vec![
        request("R1", "ICU", "Cardiology", RequestStatus::Pending),
        request("R2", "Radiology", "ICU", RequestStatus::Pending),
    ];
    let equipment = vec![unit("E1", "Emergency", EquipmentStatus::Available)];

    let suggestions = suggest_placements(&requests, &equipment);
    assert_eq!(suggestions.len(), 1);
    let s = &suggestions[0];
    assert_eq!(s.equipment_id, EquipmentId::new("E1"));
    assert_eq!(s.current_zone, "Emergency");
    assert_eq!(s.suggested_zone, "ICU");
    assert_eq!(s.priority, 4);
    assert_eq!(s.suggested_position, Point { x: 525.0, y: 200.0 });
}

#[test]
fn only_open_requests_count_towards_demand() {
    let requests = vec![
        request("R1", "ICU", "Lobby", RequestStatus::Assigned),
        request("R2", "ICU", "Lobby", RequestStatus::Completed),
        request("R3", "ICU", "Lobby", RequestStatus::Cancelled),
        request("R4", "ICU", "Lobby", RequestStatus::InProgress),
    ];
    let demand = zone_demand(&requests);
    assert_eq!(demand.get("ICU"), Some(&1));
    assert_eq!(demand.get("Lobby"), Some(&1));
}

#[test]
fn zone_already_stocked_gets_nothing_but_surplus_is_rebalanced() {
    let requests = vec![
        request("R1", "ICU", "Surgery", RequestStatus::Pending),
        request("R2", "Recovery", "ICU", RequestStatus::Pending),
    ];
    let equipment = vec![
        unit("E-ICU", "ICU", EquipmentStatus::Available),
        unit("E-L1", "Lobby", EquipmentStatus::Available),
        unit("E-L2", "Lobby", EquipmentStatus::Available),
        unit("E-PH", "Pharmacy", EquipmentStatus::Available),
    ];

    let suggestions = suggest_placements(&requests, &equipment);
    assert_eq!(suggestions.len(), 1);
    let s = &suggestions[0];
    assert_eq!(s.equipment_id, EquipmentId::new("E-L1"));
    assert_eq!(s.current_zone, "Lobby");
    assert_eq!(s.suggested_zone, "ICU");
    assert_eq!(s.priority, REBALANCE_PRIORITY);
}

#[test]
fn priority_is_capped() {
    let requests: Vec<_> = (0..7)
        .map(|i| request(&format!("R{i}"), "Surgery", &format!("Ward {i}"), RequestStatus::Pending))
        .collect();
    let equipment = vec![unit("E1", "Lobby", EquipmentStatus::Available)];

    let suggestions = suggest_placements(&requests, &equipment);
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].priority, MAX_PRIORITY);
    assert_eq!(suggestions[0].suggested_position, Point { x: 200.0, y: 200.0 });
}

#[test]
fn every_short_zone_is_offered_the_first_available_unit() {
    let requests = vec![
        request("R1", "ICU", "Surgery", RequestStatus::Pending),
        request("R2", "ICU", "Surgery", RequestStatus::Pending),
    ];
    let equipment = vec![unit("E1", "Emergency", EquipmentStatus::Available)];

    let suggestions = suggest_placements(&requests, &equipment);
    let picked: Vec<(&str, &str, u8)> = suggestions
        .iter()
        .map(|s| (s.equipment_id.as_str(), s.suggested_zone.as_str(), s.priority))
        .collect();
    assert_eq!(picked, vec![("E1", "ICU", 4), ("E1", "Surgery", 4)]);
}

#[test]
fn surplus_zone_offers_its_first_unit_to_the_busiest_zone() {
    let requests = vec![
        request("R1", "ICU", "Surgery", RequestStatus::Pending),
        request("R2", "ICU", "Surgery", RequestStatus::Pending),
        request("R3", "ICU", "Pediatrics", RequestStatus::Pending),
    ];
    let equipment = vec![
        unit("E1", "Lobby", EquipmentStatus::Available),
        unit("E2", "Lobby", EquipmentStatus::Available),
        unit("E3", "Pharmacy", EquipmentStatus::Maintenance),
    ];

    let suggestions = suggest_placements(&requests, &equipment);
    let picked: Vec<(&str, &str, u8)> = suggestions
        .iter()
        .map(|s| (s.equipment_id.as_str(), s.suggested_zone.as_str(), s.priority))
        .collect();
    assert_eq!(
        picked,
        vec![("E1", "ICU", 6), ("E1", "Surgery", 4), ("E1", "ICU", REBALANCE_PRIORITY)]
    );
    assert_eq!(suggestions[2].current_zone, "Lobby");
}

#[test]
fn nothing_to_move_means_no_suggestions() {
    let requests = vec![
        request("R1", "ICU", "Surgery", RequestStatus::Pending),
        request("R2", "ICU", "Surgery", RequestStatus::Pending),
    ];
    let equipment = vec![unit("E1", "Lobby", EquipmentStatus::InUse)];
    assert!(suggest_placements(&requests, &equipment).is_empty());
    assert!(suggest_placements(&[], &equipment).is_empty());
}

#[test]
fn unknown_zone_uses_default_position() {
    assert_eq!(canonical_position("Oncology"), Point { x: 400.0, y: 300.0 });
    assert_eq!(canonical_position("General Ward"), Point { x: 350.0, y: 425.0 });
}
