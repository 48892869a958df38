use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Fresh identifier of the form `PREFIX-XXXXXXXX`.
            pub fn generate() -> Self {
                let raw = Uuid::new_v4().simple().to_string();
                Self(format!("{}-{}", $prefix, raw[..8].to_ascii_uppercase()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(RequestId, "REQ");
id_newtype!(StaffId, "STF");
id_newtype!(EquipmentId, "EQ");

/// Queue ordering is `Routine < Urgent < Emergency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    #[default]
    Routine,
    Urgent,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EquipmentType {
    Stretcher,
    Wheelchair,
}

impl fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stretcher => f.write_str("stretcher"),
            Self::Wheelchair => f.write_str("wheelchair"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaffStatus {
    Available,
    Busy,
    OffDuty,
}

impl fmt::Display for StaffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::OffDuty => "off-duty",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EquipmentStatus {
    Available,
    InUse,
    Requested,
    Maintenance,
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Available => "available",
            Self::InUse => "in-use",
            Self::Requested => "requested",
            Self::Maintenance => "maintenance",
        };
        f.write_str(label)
    }
}

/// Pickup or drop-off point of a transport request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub floor: u32,
    pub zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

/// Last known coordinates of a tracked staff member or equipment unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub floor: u32,
    pub zone: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportRequest {
    pub id: RequestId,
    pub patient_name: String,
    pub priority: Priority,
    pub status: RequestStatus,
    pub equipment_type: EquipmentType,
    pub origin: Place,
    pub destination: Place,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_staff: Option<StaffId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_equipment: Option<EquipmentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
    pub role: String,
    pub status: StaffStatus,
    pub current_workload: u32,
    #[serde(default)]
    pub assigned_equipment: Vec<EquipmentId>,
    pub location: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportEquipment {
    pub id: EquipmentId,
    pub name: String,
    pub equipment_type: EquipmentType,
    pub status: EquipmentStatus,
    pub location: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_staff: Option<StaffId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_request: Option<RequestId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    /// Pulls `point` inside the rectangle. A negative width or height spans
    /// backwards from the origin; non-finite edges leave that axis unbounded.
    pub fn clamp(&self, point: Point) -> Point {
        Point {
            x: clamp_axis(point.x, self.x, self.x + self.width),
            y: clamp_axis(point.y, self.y, self.y + self.height),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

fn clamp_axis(value: f64, a: f64, b: f64) -> f64 {
    // f64::min/max ignore a NaN operand, unlike f64::clamp which panics.
    value.max(a.min(b)).min(a.max(b))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub bounds: Rect,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPointStatus {
    Online,
    Offline,
}

/// Wireless access point used for indoor positioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub id: String,
    pub name: String,
    pub floor: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub x: f64,
    pub y: f64,
    pub status: AccessPointStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorPlan {
    pub floor: u32,
    pub name: String,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub access_points: Vec<AccessPoint>,
}

impl FloorPlan {
    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.name == name)
    }
}
