use shared::{
    domain::{
        EquipmentId, EquipmentStatus, FloorPlan, Position, StaffId, StaffMember, StaffStatus,
        TransportEquipment,
    },
    error::{ApiError, ErrorCode},
    protocol::{NewEquipment, NewStaffMember, PlacementSuggestion, RelocateEquipment},
};
use storage::DispatchState;
use tracing::info;

use crate::{
    report,
    zones::{floor_for_zone, position_at_center},
    ApiContext,
};

pub async fn add_staff(
    ctx: &ApiContext,
    new_staff: NewStaffMember,
) -> Result<StaffMember, ApiError> {
    let result = ctx
        .storage
        .transact(|state| -> Result<StaffMember, ApiError> {
            let name = required("staff name", &new_staff.name)?;
            let location = registered_position(&ctx.floors, new_staff.floor, &new_staff.zone)?;
            let staff = StaffMember {
                id: state.next_staff_id(),
                name,
                role: new_staff.role.trim().to_string(),
                status: StaffStatus::Available,
                current_workload: 0,
                assigned_equipment: Vec::new(),
                location,
            };
            state.staff.push(staff.clone());
            Ok(staff)
        })
        .await;
    report(ctx, result, |staff| format!("{} joined the roster", staff.name))
}

pub async fn set_staff_status(
    ctx: &ApiContext,
    staff_id: &StaffId,
    status: StaffStatus,
) -> Result<StaffMember, ApiError> {
    let result = ctx
        .storage
        .transact(|state| -> Result<StaffMember, ApiError> {
            if status == StaffStatus::Busy {
                return Err(ApiError::new(
                    ErrorCode::Validation,
                    "busy is derived from assignments and cannot be set manually",
                ));
            }
            let staff = state
                .staff_member_mut(staff_id)
                .ok_or_else(|| ApiError::not_found("staff member", staff_id))?;
            if staff.current_workload > 0 {
                return Err(ApiError::new(
                    ErrorCode::ResourceInUse,
                    format!(
                        "{} still has {} active transport(s)",
                        staff.name, staff.current_workload
                    ),
                ));
            }
            staff.status = status;
            Ok(staff.clone())
        })
        .await;
    report(ctx, result, |staff| {
        format!("{} is now {}", staff.name, staff.status)
    })
}

/// Staff with active transports cannot be removed.
pub async fn remove_staff(ctx: &ApiContext, staff_id: &StaffId) -> Result<StaffMember, ApiError> {
    let result = ctx
        .storage
        .transact(|state| -> Result<StaffMember, ApiError> {
            let index = state
                .staff_index(staff_id)
                .ok_or_else(|| ApiError::not_found("staff member", staff_id))?;
            let staff = &state.staff[index];
            if staff.current_workload > 0 || !staff.assigned_equipment.is_empty() {
                return Err(ApiError::new(
                    ErrorCode::ResourceInUse,
                    format!("{} is assigned to an active transport", staff.name),
                ));
            }
            Ok(state.staff.remove(index))
        })
        .await;
    report(ctx, result, |staff| {
        format!("{} removed from the roster", staff.name)
    })
}

pub async fn add_equipment(
    ctx: &ApiContext,
    new_equipment: NewEquipment,
) -> Result<TransportEquipment, ApiError> {
    let result = ctx
        .storage
        .transact(|state| -> Result<TransportEquipment, ApiError> {
            let name = required("equipment name", &new_equipment.name)?;
            let location =
                registered_position(&ctx.floors, new_equipment.floor, &new_equipment.zone)?;
            let unit = TransportEquipment {
                id: state.next_equipment_id(),
                name,
                equipment_type: new_equipment.equipment_type,
                status: EquipmentStatus::Available,
                location,
                assigned_staff: None,
                current_request: None,
            };
            state.equipment.push(unit.clone());
            Ok(unit)
        })
        .await;
    report(ctx, result, |unit| format!("{} added to the fleet", unit.name))
}

pub async fn set_equipment_status(
    ctx: &ApiContext,
    equipment_id: &EquipmentId,
    status: EquipmentStatus,
) -> Result<TransportEquipment, ApiError> {
    let result = ctx
        .storage
        .transact(|state| -> Result<TransportEquipment, ApiError> {
            if status == EquipmentStatus::InUse {
                return Err(ApiError::new(
                    ErrorCode::Validation,
                    "in-use is derived from assignments and cannot be set manually",
                ));
            }
            let unit = idle_unit_mut(state, equipment_id)?;
            unit.status = status;
            Ok(unit.clone())
        })
        .await;
    report(ctx, result, |unit| format!("{} is now {}", unit.name, unit.status))
}

/// Units attached to a request cannot be removed.
pub async fn remove_equipment(
    ctx: &ApiContext,
    equipment_id: &EquipmentId,
) -> Result<TransportEquipment, ApiError> {
    let result = ctx
        .storage
        .transact(|state| -> Result<TransportEquipment, ApiError> {
            idle_unit_mut(state, equipment_id)?;
            let index = state
                .equipment_index(equipment_id)
                .ok_or_else(|| ApiError::not_found("equipment", equipment_id))?;
            Ok(state.equipment.remove(index))
        })
        .await;
    report(ctx, result, |unit| {
        format!("{} removed from the fleet", unit.name)
    })
}

pub async fn relocate_equipment(
    ctx: &ApiContext,
    equipment_id: &EquipmentId,
    target: RelocateEquipment,
) -> Result<TransportEquipment, ApiError> {
    let result = ctx
        .storage
        .transact(|state| apply_relocation(state, &ctx.floors, equipment_id, target))
        .await;
    if let Ok(unit) = &result {
        info!(
            equipment_id = %unit.id,
            floor = unit.location.floor,
            zone = %unit.location.zone,
            "equipment relocated"
        );
    }
    report(ctx, result, |unit| {
        format!("{} moved to {}", unit.name, unit.location.zone)
    })
}

/// Applies a placement suggestion as an ordinary relocation. The target floor
/// is the first one registering the suggested zone, else the unit's own.
pub async fn apply_suggestion(
    ctx: &ApiContext,
    suggestion: &PlacementSuggestion,
) -> Result<TransportEquipment, ApiError> {
    let target = RelocateEquipment {
        floor: floor_for_zone(&ctx.floors, &suggestion.suggested_zone),
        zone: suggestion.suggested_zone.clone(),
        position: Some(suggestion.suggested_position),
    };
    relocate_equipment(ctx, &suggestion.equipment_id, target).await
}

pub(crate) fn apply_relocation(
    state: &mut DispatchState,
    floors: &[FloorPlan],
    equipment_id: &EquipmentId,
    target: RelocateEquipment,
) -> Result<TransportEquipment, ApiError> {
    let unit = idle_unit_mut(state, equipment_id)?;
    let floor = target.floor.unwrap_or(unit.location.floor);
    let location = match target.position {
        Some(point) => Position {
            floor,
            zone: target.zone,
            x: point.x,
            y: point.y,
        },
        None => position_at_center(floors, floor, &target.zone).ok_or_else(|| {
            ApiError::new(
                ErrorCode::NotFound,
                format!("zone {} is not registered on floor {floor}", target.zone),
            )
        })?,
    };
    unit.location = location;
    Ok(unit.clone())
}

fn idle_unit_mut<'a>(
    state: &'a mut DispatchState,
    equipment_id: &EquipmentId,
) -> Result<&'a mut TransportEquipment, ApiError> {
    let unit = state
        .equipment_unit_mut(equipment_id)
        .ok_or_else(|| ApiError::not_found("equipment", equipment_id))?;
    if let Some(request_id) = &unit.current_request {
        return Err(ApiError::new(
            ErrorCode::ResourceInUse,
            format!("{} is attached to request {request_id}", unit.name),
        ));
    }
    Ok(unit)
}

fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{field} is required"),
        ));
    }
    Ok(value.to_string())
}

fn registered_position(floors: &[FloorPlan], floor: u32, zone: &str) -> Result<Position, ApiError> {
    position_at_center(floors, floor, zone).ok_or_else(|| {
        ApiError::new(
            ErrorCode::Validation,
            format!("zone {zone} is not registered on floor {floor}"),
        )
    })
}

#[cfg(test)]
#[path = "tests/resources_tests.rs"]
mod tests;
