//! Built-in hospital layout and demo collections used by the in-memory mode.

use chrono::{Duration, Utc};
use shared::domain::{
    AccessPoint, AccessPointStatus, EquipmentId, EquipmentStatus, EquipmentType, FloorPlan,
    Place, Position, Priority, Rect, RequestId, RequestStatus, StaffId, StaffMember,
    StaffStatus, TransportEquipment, TransportRequest, Zone,
};

use crate::DispatchState;

fn zone(name: &str, x: f64, y: f64, width: f64, height: f64, capacity: u32, color: &str) -> Zone {
    Zone {
        name: name.to_string(),
        bounds: Rect {
            x,
            y,
            width,
            height,
        },
        capacity,
        color: color.to_string(),
    }
}

fn access_point(id: &str, floor: u32, zone: &str, x: f64, y: f64) -> AccessPoint {
    AccessPoint {
        id: id.to_string(),
        name: format!("AP {id}"),
        floor,
        zone: Some(zone.to_string()),
        x,
        y,
        status: AccessPointStatus::Online,
    }
}

pub fn default_floor_plans() -> Vec<FloorPlan> {
    vec![
        FloorPlan {
            floor: 1,
            name: "Ground Floor".into(),
            zones: vec![
                zone("Emergency", 50.0, 100.0, 300.0, 200.0, 12, "#ef4444"),
                zone("Radiology", 400.0, 100.0, 250.0, 200.0, 6, "#3b82f6"),
                zone("Lobby", 50.0, 350.0, 300.0, 150.0, 20, "#a3a3a3"),
                zone("Pharmacy", 400.0, 350.0, 250.0, 150.0, 4, "#22c55e"),
            ],
            access_points: vec![
                access_point("AP-101", 1, "Emergency", 200.0, 150.0),
                access_point("AP-102", 1, "Radiology", 525.0, 150.0),
                access_point("AP-103", 1, "Lobby", 200.0, 425.0),
            ],
        },
        FloorPlan {
            floor: 2,
            name: "Surgical Floor".into(),
            zones: vec![
                zone("Surgery", 50.0, 100.0, 300.0, 200.0, 8, "#8b5cf6"),
                zone("ICU", 400.0, 100.0, 250.0, 200.0, 10, "#f97316"),
                zone("Recovery", 50.0, 350.0, 300.0, 150.0, 10, "#14b8a6"),
            ],
            access_points: vec![
                access_point("AP-201", 2, "Surgery", 200.0, 200.0),
                access_point("AP-202", 2, "ICU", 525.0, 200.0),
            ],
        },
        FloorPlan {
            floor: 3,
            name: "Inpatient Floor".into(),
            zones: vec![
                zone("Cardiology", 50.0, 100.0, 300.0, 200.0, 16, "#e11d48"),
                zone("Pediatrics", 400.0, 100.0, 250.0, 200.0, 14, "#eab308"),
                zone("General Ward", 50.0, 350.0, 600.0, 150.0, 30, "#64748b"),
            ],
            access_points: vec![access_point("AP-301", 3, "General Ward", 350.0, 425.0)],
        },
    ]
}

fn located(floors: &[FloorPlan], floor: u32, zone: &str) -> Position {
    let center = floors
        .iter()
        .find(|plan| plan.floor == floor)
        .and_then(|plan| plan.zone(zone))
        .map(|z| z.bounds.center());
    let (x, y) = center.map(|p| (p.x, p.y)).unwrap_or((0.0, 0.0));
    Position {
        floor,
        zone: zone.to_string(),
        x,
        y,
    }
}

fn place(floor: u32, zone: &str, room: &str) -> Place {
    Place {
        floor,
        zone: zone.to_string(),
        room: Some(room.to_string()),
    }
}

/// A small, internally consistent data set: two pending requests, one
/// transport under way and one finished.
pub fn demo_state() -> DispatchState {
    let floors = default_floor_plans();
    let now = Utc::now();

    let staff = vec![
        StaffMember {
            id: StaffId::new("STF-001"),
            name: "Maria Lopez".into(),
            role: "porter".into(),
            status: StaffStatus::Available,
            current_workload: 0,
            assigned_equipment: Vec::new(),
            location: located(&floors, 1, "Emergency"),
        },
        StaffMember {
            id: StaffId::new("STF-002"),
            name: "James Chen".into(),
            role: "nurse".into(),
            status: StaffStatus::Available,
            current_workload: 0,
            assigned_equipment: Vec::new(),
            location: located(&floors, 1, "Lobby"),
        },
        StaffMember {
            id: StaffId::new("STF-003"),
            name: "Aisha Patel".into(),
            role: "porter".into(),
            status: StaffStatus::OffDuty,
            current_workload: 0,
            assigned_equipment: Vec::new(),
            location: located(&floors, 2, "Recovery"),
        },
        StaffMember {
            id: StaffId::new("STF-004"),
            name: "Tom Becker".into(),
            role: "porter".into(),
            status: StaffStatus::Busy,
            current_workload: 1,
            assigned_equipment: vec![EquipmentId::new("EQ-003")],
            location: located(&floors, 2, "ICU"),
        },
    ];

    let equipment = vec![
        TransportEquipment {
            id: EquipmentId::new("EQ-001"),
            name: "Stretcher 1".into(),
            equipment_type: EquipmentType::Stretcher,
            status: EquipmentStatus::Available,
            location: located(&floors, 1, "Emergency"),
            assigned_staff: None,
            current_request: None,
        },
        TransportEquipment {
            id: EquipmentId::new("EQ-002"),
            name: "Wheelchair 1".into(),
            equipment_type: EquipmentType::Wheelchair,
            status: EquipmentStatus::Available,
            location: located(&floors, 1, "Lobby"),
            assigned_staff: None,
            current_request: None,
        },
        TransportEquipment {
            id: EquipmentId::new("EQ-003"),
            name: "Stretcher 2".into(),
            equipment_type: EquipmentType::Stretcher,
            status: EquipmentStatus::InUse,
            location: located(&floors, 2, "ICU"),
            assigned_staff: Some(StaffId::new("STF-004")),
            current_request: Some(RequestId::new("REQ-003")),
        },
        TransportEquipment {
            id: EquipmentId::new("EQ-004"),
            name: "Wheelchair 2".into(),
            equipment_type: EquipmentType::Wheelchair,
            status: EquipmentStatus::Maintenance,
            location: located(&floors, 1, "Radiology"),
            assigned_staff: None,
            current_request: None,
        },
        TransportEquipment {
            id: EquipmentId::new("EQ-005"),
            name: "Stretcher 3".into(),
            equipment_type: EquipmentType::Stretcher,
            status: EquipmentStatus::Available,
            location: located(&floors, 2, "Surgery"),
            assigned_staff: None,
            current_request: None,
        },
        TransportEquipment {
            id: EquipmentId::new("EQ-006"),
            name: "Wheelchair 3".into(),
            equipment_type: EquipmentType::Wheelchair,
            status: EquipmentStatus::Available,
            location: located(&floors, 1, "Lobby"),
            assigned_staff: None,
            current_request: None,
        },
    ];

    let requests = vec![
        TransportRequest {
            id: RequestId::new("REQ-001"),
            patient_name: "John Smith".into(),
            priority: Priority::Emergency,
            status: RequestStatus::Pending,
            equipment_type: EquipmentType::Stretcher,
            origin: place(1, "Emergency", "ER-3"),
            destination: place(2, "Surgery", "OR-1"),
            notes: Some("Trauma, keep supine".into()),
            requested_at: now - Duration::minutes(4),
            assigned_at: None,
            completed_at: None,
            assigned_staff: None,
            assigned_equipment: None,
        },
        TransportRequest {
            id: RequestId::new("REQ-002"),
            patient_name: "Emma Wilson".into(),
            priority: Priority::Routine,
            status: RequestStatus::Pending,
            equipment_type: EquipmentType::Wheelchair,
            origin: place(1, "Lobby", "Admissions"),
            destination: place(1, "Radiology", "XR-2"),
            notes: None,
            requested_at: now - Duration::minutes(12),
            assigned_at: None,
            completed_at: None,
            assigned_staff: None,
            assigned_equipment: None,
        },
        TransportRequest {
            id: RequestId::new("REQ-003"),
            patient_name: "Robert Brown".into(),
            priority: Priority::Urgent,
            status: RequestStatus::InProgress,
            equipment_type: EquipmentType::Stretcher,
            origin: place(2, "ICU", "ICU-7"),
            destination: place(1, "Radiology", "CT-1"),
            notes: None,
            requested_at: now - Duration::minutes(25),
            assigned_at: Some(now - Duration::minutes(20)),
            completed_at: None,
            assigned_staff: Some(StaffId::new("STF-004")),
            assigned_equipment: Some(EquipmentId::new("EQ-003")),
        },
        TransportRequest {
            id: RequestId::new("REQ-004"),
            patient_name: "Linda Garcia".into(),
            priority: Priority::Routine,
            status: RequestStatus::Completed,
            equipment_type: EquipmentType::Wheelchair,
            origin: place(3, "Cardiology", "C-12"),
            destination: place(1, "Pharmacy", "Counter"),
            notes: None,
            requested_at: now - Duration::minutes(90),
            assigned_at: Some(now - Duration::minutes(85)),
            completed_at: Some(now - Duration::minutes(60)),
            assigned_staff: Some(StaffId::new("STF-002")),
            assigned_equipment: Some(EquipmentId::new("EQ-002")),
        },
    ];

    DispatchState {
        requests,
        staff,
        equipment,
    }
}
