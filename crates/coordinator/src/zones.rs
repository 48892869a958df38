use shared::domain::{FloorPlan, Point, Position, Rect};

pub fn zone_bounds(floors: &[FloorPlan], floor: u32, zone: &str) -> Option<Rect> {
    floors
        .iter()
        .find(|plan| plan.floor == floor)
        .and_then(|plan| plan.zone(zone))
        .map(|z| z.bounds)
}

/// Midpoint of the zone's rectangle, or `None` when the floor does not
/// register the zone.
pub fn zone_center(floors: &[FloorPlan], floor: u32, zone: &str) -> Option<Point> {
    zone_bounds(floors, floor, zone).map(|bounds| bounds.center())
}

pub fn position_at_center(floors: &[FloorPlan], floor: u32, zone: &str) -> Option<Position> {
    zone_center(floors, floor, zone).map(|center| Position {
        floor,
        zone: zone.to_string(),
        x: center.x,
        y: center.y,
    })
}

/// First floor that registers a zone with this name.
pub fn floor_for_zone(floors: &[FloorPlan], zone: &str) -> Option<u32> {
    floors
        .iter()
        .find(|plan| plan.zone(zone).is_some())
        .map(|plan| plan.floor)
}
