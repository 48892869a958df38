use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        EquipmentId, EquipmentStatus, EquipmentType, Place, Point, Priority, RequestId,
        RequestStatus, StaffId, StaffMember, StaffStatus, TransportEquipment, TransportRequest,
    },
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransportRequest {
    pub patient_name: String,
    #[serde(default)]
    pub priority: Priority,
    pub equipment_type: EquipmentType,
    pub origin: Place,
    pub destination: Place,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub staff_id: StaffId,
    pub equipment_id: EquipmentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub request: TransportRequest,
    pub staff: StaffMember,
    pub equipment: TransportEquipment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStaffMember {
    pub name: String,
    pub role: String,
    pub floor: u32,
    pub zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEquipment {
    pub name: String,
    pub equipment_type: EquipmentType,
    pub floor: u32,
    pub zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffStatusUpdate {
    pub status: StaffStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentStatusUpdate {
    pub status: EquipmentStatus,
}

/// Manual move of an equipment unit. `floor` defaults to the unit's current
/// floor and `position` to the centre of the target zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocateEquipment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<u32>,
    pub zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementSuggestion {
    pub equipment_id: EquipmentId,
    pub current_zone: String,
    pub suggested_zone: String,
    pub suggested_position: Point,
    pub priority: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSnapshot {
    pub revision: u64,
    pub requests: Vec<TransportRequest>,
    pub staff: Vec<StaffMember>,
    pub equipment: Vec<TransportEquipment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub revision: u64,
    pub requests_by_status: BTreeMap<RequestStatus, usize>,
    pub staff_by_status: BTreeMap<StaffStatus, usize>,
    pub equipment_by_status: BTreeMap<EquipmentStatus, usize>,
    pub available_by_type: BTreeMap<EquipmentType, usize>,
    pub pending_queue_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    RequestUpdated {
        request: TransportRequest,
    },
    StaffUpdated {
        staff: StaffMember,
    },
    StaffRemoved {
        staff_id: StaffId,
    },
    EquipmentUpdated {
        equipment: TransportEquipment,
    },
    EquipmentRemoved {
        equipment_id: EquipmentId,
    },
    PositionsMoved {
        revision: u64,
        moved: usize,
    },
    Notification(Notification),
    Error(ApiError),
}

impl ServerEvent {
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::RequestUpdated { request } => Some(&request.id),
            _ => None,
        }
    }
}
