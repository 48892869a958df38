use chrono::{DateTime, Utc};
use shared::{
    domain::{
        EquipmentId, EquipmentStatus, FloorPlan, Position, RequestId, RequestStatus, StaffId,
        StaffStatus, TransportRequest,
    },
    error::{ApiError, ErrorCode},
    protocol::{AssignmentOutcome, NewTransportRequest},
};
use storage::DispatchState;
use tracing::info;

use crate::{invalid_transition, report, zones::position_at_center, ApiContext, CancelPolicy};

pub async fn create_request(
    ctx: &ApiContext,
    new_request: NewTransportRequest,
) -> Result<TransportRequest, ApiError> {
    let result = ctx
        .storage
        .transact(|state| apply_create(state, new_request, Utc::now()))
        .await;
    report(ctx, result, |request| {
        format!(
            "Transport request {} created for {}",
            request.id, request.patient_name
        )
    })
}

/// Links a pending request to an available staff member and a matching,
/// available equipment unit. All three records change in one commit or not
/// at all.
pub async fn assign(
    ctx: &ApiContext,
    request_id: &RequestId,
    staff_id: &StaffId,
    equipment_id: &EquipmentId,
) -> Result<AssignmentOutcome, ApiError> {
    let result = ctx
        .storage
        .transact(|state| {
            apply_assignment(
                state,
                &ctx.floors,
                request_id,
                staff_id,
                equipment_id,
                Utc::now(),
            )
        })
        .await;
    if let Ok(outcome) = &result {
        info!(
            request_id = %outcome.request.id,
            staff_id = %outcome.staff.id,
            equipment_id = %outcome.equipment.id,
            "transport request assigned"
        );
    }
    report(ctx, result, |outcome| {
        format!(
            "{} assigned to request {} with {}",
            outcome.staff.name, outcome.request.id, outcome.equipment.name
        )
    })
}

pub async fn cancel(ctx: &ApiContext, request_id: &RequestId) -> Result<TransportRequest, ApiError> {
    let policy = ctx.policy.cancel;
    let result = ctx
        .storage
        .transact(|state| apply_cancel(state, request_id, policy))
        .await;
    report(ctx, result, |request| {
        format!("Transport request {} cancelled", request.id)
    })
}

pub async fn start_transport(
    ctx: &ApiContext,
    request_id: &RequestId,
) -> Result<TransportRequest, ApiError> {
    let result = ctx
        .storage
        .transact(|state| -> Result<TransportRequest, ApiError> {
            let index = request_index(state, request_id)?;
            let request = &mut state.requests[index];
            if request.status != RequestStatus::Assigned {
                return Err(invalid_transition(format!(
                    "request {} is {} and cannot be started",
                    request.id, request.status
                )));
            }
            request.status = RequestStatus::InProgress;
            Ok(request.clone())
        })
        .await;
    report(ctx, result, |request| {
        format!("Transport {} is under way", request.id)
    })
}

pub async fn complete(
    ctx: &ApiContext,
    request_id: &RequestId,
) -> Result<TransportRequest, ApiError> {
    let result = ctx
        .storage
        .transact(|state| apply_complete(state, &ctx.floors, request_id, Utc::now()))
        .await;
    report(ctx, result, |request| {
        format!("Transport {} completed", request.id)
    })
}

/// Frees the staff member and equipment still held by a cancelled request.
pub async fn release(
    ctx: &ApiContext,
    request_id: &RequestId,
) -> Result<TransportRequest, ApiError> {
    let result = ctx
        .storage
        .transact(|state| -> Result<TransportRequest, ApiError> {
            let index = request_index(state, request_id)?;
            let request = state.requests[index].clone();
            if request.status != RequestStatus::Cancelled {
                return Err(invalid_transition(format!(
                    "request {} is {}; only cancelled requests can be released",
                    request.id, request.status
                )));
            }
            if !free_resources(state, &request, None) {
                return Err(invalid_transition(format!(
                    "request {} holds no staff or equipment",
                    request.id
                )));
            }
            Ok(detach(state, index))
        })
        .await;
    report(ctx, result, |request| {
        format!("Resources of request {} released", request.id)
    })
}

pub(crate) fn apply_create(
    state: &mut DispatchState,
    new_request: NewTransportRequest,
    now: DateTime<Utc>,
) -> Result<TransportRequest, ApiError> {
    if new_request.patient_name.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "patient name is required",
        ));
    }
    if new_request.origin.zone.trim().is_empty() || new_request.destination.zone.trim().is_empty()
    {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "origin and destination zones are required",
        ));
    }

    let request = TransportRequest {
        id: state.next_request_id(),
        patient_name: new_request.patient_name.trim().to_string(),
        priority: new_request.priority,
        status: RequestStatus::Pending,
        equipment_type: new_request.equipment_type,
        origin: new_request.origin,
        destination: new_request.destination,
        notes: new_request.notes,
        requested_at: now,
        assigned_at: None,
        completed_at: None,
        assigned_staff: None,
        assigned_equipment: None,
    };
    state.requests.push(request.clone());
    Ok(request)
}

pub(crate) fn apply_assignment(
    state: &mut DispatchState,
    floors: &[FloorPlan],
    request_id: &RequestId,
    staff_id: &StaffId,
    equipment_id: &EquipmentId,
    now: DateTime<Utc>,
) -> Result<AssignmentOutcome, ApiError> {
    let r = request_index(state, request_id)?;
    let s = state
        .staff_index(staff_id)
        .ok_or_else(|| ApiError::not_found("staff member", staff_id))?;
    let e = state
        .equipment_index(equipment_id)
        .ok_or_else(|| ApiError::not_found("equipment", equipment_id))?;

    let request = &state.requests[r];
    let staff = &state.staff[s];
    let equipment = &state.equipment[e];

    if staff.status != StaffStatus::Available {
        return Err(ApiError::new(
            ErrorCode::StaffUnavailable,
            format!("staff member {} is {}", staff.name, staff.status),
        ));
    }
    if equipment.status != EquipmentStatus::Available {
        return Err(ApiError::new(
            ErrorCode::EquipmentUnavailable,
            format!("equipment {} is {}", equipment.name, equipment.status),
        ));
    }
    if equipment.equipment_type != request.equipment_type {
        return Err(ApiError::new(
            ErrorCode::TypeMismatch,
            format!(
                "request {} needs a {}, but {} is a {}",
                request.id, request.equipment_type, equipment.name, equipment.equipment_type
            ),
        ));
    }
    if request.status != RequestStatus::Pending {
        return Err(invalid_transition(format!(
            "request {} is {} and cannot be assigned",
            request.id, request.status
        )));
    }

    let pickup = position_at_center(floors, request.origin.floor, &request.origin.zone);

    let request = &mut state.requests[r];
    request.status = RequestStatus::Assigned;
    request.assigned_staff = Some(staff_id.clone());
    request.assigned_equipment = Some(equipment_id.clone());
    request.assigned_at = Some(now);

    let staff = &mut state.staff[s];
    staff.status = StaffStatus::Busy;
    staff.assigned_equipment.push(equipment_id.clone());
    staff.current_workload = staff.assigned_equipment.len() as u32;
    if let Some(position) = &pickup {
        staff.location = position.clone();
    }

    let equipment = &mut state.equipment[e];
    equipment.status = EquipmentStatus::InUse;
    equipment.assigned_staff = Some(staff_id.clone());
    equipment.current_request = Some(request_id.clone());
    if let Some(position) = pickup {
        equipment.location = position;
    }

    Ok(AssignmentOutcome {
        request: state.requests[r].clone(),
        staff: state.staff[s].clone(),
        equipment: state.equipment[e].clone(),
    })
}

pub(crate) fn apply_cancel(
    state: &mut DispatchState,
    request_id: &RequestId,
    policy: CancelPolicy,
) -> Result<TransportRequest, ApiError> {
    let index = request_index(state, request_id)?;
    let request = &mut state.requests[index];
    if !matches!(
        request.status,
        RequestStatus::Pending | RequestStatus::Assigned
    ) {
        return Err(invalid_transition(format!(
            "request {} is {} and cannot be cancelled",
            request.id, request.status
        )));
    }
    request.status = RequestStatus::Cancelled;
    let request = request.clone();

    if policy == CancelPolicy::Release {
        free_resources(state, &request, None);
        return Ok(detach(state, index));
    }
    Ok(request)
}

pub(crate) fn apply_complete(
    state: &mut DispatchState,
    floors: &[FloorPlan],
    request_id: &RequestId,
    now: DateTime<Utc>,
) -> Result<TransportRequest, ApiError> {
    let index = request_index(state, request_id)?;
    let request = &mut state.requests[index];
    if request.status != RequestStatus::InProgress {
        return Err(invalid_transition(format!(
            "request {} is {} and cannot be completed",
            request.id, request.status
        )));
    }
    request.status = RequestStatus::Completed;
    request.completed_at = Some(now);
    let request = request.clone();

    let drop_off = position_at_center(
        floors,
        request.destination.floor,
        &request.destination.zone,
    );
    free_resources(state, &request, drop_off);
    Ok(request)
}

/// Returns the request's staff member and equipment unit to the available
/// pool. Only links that still point at `request` are undone. Returns whether
/// anything was freed.
fn free_resources(
    state: &mut DispatchState,
    request: &TransportRequest,
    drop_off: Option<Position>,
) -> bool {
    let mut freed = false;

    if let Some(equipment_id) = &request.assigned_equipment {
        if let Some(unit) = state.equipment_unit_mut(equipment_id) {
            if unit.current_request.as_ref() == Some(&request.id) {
                unit.status = EquipmentStatus::Available;
                unit.assigned_staff = None;
                unit.current_request = None;
                if let Some(position) = &drop_off {
                    unit.location = position.clone();
                }
                freed = true;
            }
        }
    }

    if let (Some(staff_id), Some(equipment_id)) =
        (&request.assigned_staff, &request.assigned_equipment)
    {
        if let Some(staff) = state.staff_member_mut(staff_id) {
            let before = staff.assigned_equipment.len();
            staff.assigned_equipment.retain(|id| id != equipment_id);
            if staff.assigned_equipment.len() != before {
                staff.current_workload = staff.assigned_equipment.len() as u32;
                if staff.current_workload == 0 && staff.status == StaffStatus::Busy {
                    staff.status = StaffStatus::Available;
                }
                if let Some(position) = drop_off {
                    staff.location = position;
                }
                freed = true;
            }
        }
    }

    freed
}

/// Drops a cancelled request's links to the staff member and unit it no
/// longer holds.
fn detach(state: &mut DispatchState, index: usize) -> TransportRequest {
    let request = &mut state.requests[index];
    request.assigned_staff = None;
    request.assigned_equipment = None;
    request.clone()
}

fn request_index(state: &DispatchState, request_id: &RequestId) -> Result<usize, ApiError> {
    state
        .request_index(request_id)
        .ok_or_else(|| ApiError::not_found("request", request_id))
}

#[cfg(test)]
#[path = "tests/requests_tests.rs"]
mod tests;
