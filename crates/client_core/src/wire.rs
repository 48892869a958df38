//! Decoding of transport requests arriving over REST.
//!
//! Remote backends send requests in one of two shapes: the normalized one
//! produced by this workspace's server, or the hospital API's legacy shape
//! (`equipmentType`/`transport_type`, `pickup_location`/`dropoff_location`,
//! `staff_id`/`equipment_id`, snake_case or upper-case statuses). Both are
//! read into [`RemoteRequest`] and turned into a [`TransportRequest`] by
//! [`normalize_request`], so nothing past this module sees the difference.
//! Snapshots, assignment outcomes and request events embed requests and are
//! decoded through the same path.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use shared::{
    domain::{
        EquipmentId, EquipmentType, Place, Priority, RequestId, RequestStatus, StaffId,
        StaffMember, TransportEquipment, TransportRequest,
    },
    protocol::{AssignmentOutcome, DispatchSnapshot, ServerEvent},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed transport request: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown {field} '{value}'")]
    UnknownValue { field: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRequest {
    pub id: RequestId,
    #[serde(alias = "patientName")]
    pub patient_name: String,
    #[serde(default)]
    pub priority: Option<String>,
    pub status: String,
    #[serde(alias = "equipmentType", alias = "transport_type", alias = "transportType")]
    pub equipment_type: String,
    #[serde(alias = "pickup_location", alias = "pickupLocation")]
    pub origin: Place,
    #[serde(alias = "dropoff_location", alias = "dropoffLocation")]
    pub destination: Place,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(alias = "requestedAt", alias = "created_at", alias = "createdAt")]
    pub requested_at: DateTime<Utc>,
    #[serde(default, alias = "assignedAt")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "completedAt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "staff_id", alias = "assignedStaff")]
    pub assigned_staff: Option<StaffId>,
    #[serde(default, alias = "equipment_id", alias = "assignedEquipment")]
    pub assigned_equipment: Option<EquipmentId>,
}

pub fn normalize_request(raw: RemoteRequest) -> Result<TransportRequest, WireError> {
    let priority = match raw.priority.as_deref() {
        Some(value) if !value.trim().is_empty() => enum_token("priority", value)?,
        _ => Priority::default(),
    };
    Ok(TransportRequest {
        id: raw.id,
        patient_name: raw.patient_name,
        priority,
        status: enum_token::<RequestStatus>("status", &raw.status)?,
        equipment_type: enum_token::<EquipmentType>("equipment type", &raw.equipment_type)?,
        origin: raw.origin,
        destination: raw.destination,
        notes: raw.notes.filter(|n| !n.trim().is_empty()),
        requested_at: raw.requested_at,
        assigned_at: raw.assigned_at,
        completed_at: raw.completed_at,
        assigned_staff: raw.assigned_staff,
        assigned_equipment: raw.assigned_equipment,
    })
}

pub fn decode_request(value: Value) -> Result<TransportRequest, WireError> {
    normalize_request(serde_json::from_value(value)?)
}

pub fn decode_requests(values: Vec<Value>) -> Result<Vec<TransportRequest>, WireError> {
    values.into_iter().map(decode_request).collect()
}

#[derive(Debug, Deserialize)]
struct RemoteSnapshot {
    #[serde(default)]
    revision: u64,
    requests: Vec<Value>,
    staff: Vec<StaffMember>,
    equipment: Vec<TransportEquipment>,
}

pub fn decode_snapshot(value: Value) -> Result<DispatchSnapshot, WireError> {
    let raw: RemoteSnapshot = serde_json::from_value(value)?;
    Ok(DispatchSnapshot {
        revision: raw.revision,
        requests: decode_requests(raw.requests)?,
        staff: raw.staff,
        equipment: raw.equipment,
    })
}

#[derive(Debug, Deserialize)]
struct RemoteAssignment {
    request: Value,
    staff: StaffMember,
    equipment: TransportEquipment,
}

pub fn decode_assignment(value: Value) -> Result<AssignmentOutcome, WireError> {
    let raw: RemoteAssignment = serde_json::from_value(value)?;
    Ok(AssignmentOutcome {
        request: decode_request(raw.request)?,
        staff: raw.staff,
        equipment: raw.equipment,
    })
}

/// Only `request_updated` carries a request; every other event decodes as is.
pub fn decode_event(value: Value) -> Result<ServerEvent, WireError> {
    if value.get("type").and_then(Value::as_str) == Some("request_updated") {
        let request = value
            .get("payload")
            .and_then(|payload| payload.get("request"))
            .cloned()
            .unwrap_or(Value::Null);
        return Ok(ServerEvent::RequestUpdated {
            request: decode_request(request)?,
        });
    }
    Ok(serde_json::from_value(value)?)
}

/// `IN_PROGRESS`, `in_progress` and `in-progress` all read as the kebab-case
/// wire form of the target enum.
fn enum_token<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, WireError> {
    let token = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
    serde_json::from_value(Value::String(token)).map_err(|_| WireError::UnknownValue {
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
#[path = "tests/wire_tests.rs"]
mod tests;
