//! Simulated movement of staff and equipment that are out on a transport.

use std::convert::Infallible;

use rand::Rng;
use shared::domain::{EquipmentStatus, FloorPlan, Point, Position, StaffStatus};
use storage::DispatchState;
use tracing::trace;

use crate::{zones::zone_bounds, ApiContext};

/// Nudges every busy staff member and in-use equipment unit by up to
/// `jitter` in each axis, staying inside the current zone when its bounds are
/// known. Zone, floor and status never change. Returns how many records moved.
pub fn jitter_positions<R: Rng>(
    state: &mut DispatchState,
    floors: &[FloorPlan],
    rng: &mut R,
    jitter: f64,
) -> usize {
    if !jitter.is_finite() || jitter <= 0.0 {
        return 0;
    }
    let mut moved = 0;
    for staff in state
        .staff
        .iter_mut()
        .filter(|s| s.status == StaffStatus::Busy)
    {
        nudge(&mut staff.location, floors, rng, jitter);
        moved += 1;
    }
    for unit in state
        .equipment
        .iter_mut()
        .filter(|e| e.status == EquipmentStatus::InUse)
    {
        nudge(&mut unit.location, floors, rng, jitter);
        moved += 1;
    }
    moved
}

fn nudge<R: Rng>(position: &mut Position, floors: &[FloorPlan], rng: &mut R, jitter: f64) {
    let mut next = Point {
        x: position.x + rng.gen_range(-jitter..=jitter),
        y: position.y + rng.gen_range(-jitter..=jitter),
    };
    if let Some(bounds) = zone_bounds(floors, position.floor, &position.zone) {
        next = bounds.clamp(next);
    }
    position.x = next.x;
    position.y = next.y;
}

/// One simulation tick, committed through the same transaction path as
/// assignments so the two never interleave.
pub async fn simulate_motion<R: Rng>(ctx: &ApiContext, rng: &mut R, jitter: f64) -> usize {
    let moved = ctx
        .storage
        .transact(|state| Ok::<_, Infallible>(jitter_positions(state, &ctx.floors, rng, jitter)))
        .await
        .unwrap_or_else(|never| match never {});
    trace!(moved, "motion tick");
    moved
}

#[cfg(test)]
#[path = "tests/motion_tests.rs"]
mod tests;
