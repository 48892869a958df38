//! Demand-driven relocation hints for idle equipment.
//!
//! Suggestions are advisory: nothing here mutates state. Applying one goes
//! through [`crate::apply_suggestion`], the same path as a manual move.

use std::collections::BTreeMap;

use shared::{
    domain::{
        EquipmentStatus, Point, RequestStatus, TransportEquipment, TransportRequest,
    },
    protocol::PlacementSuggestion,
};

pub const HIGH_DEMAND_THRESHOLD: usize = 2;
pub const MAX_PRIORITY: u8 = 10;
pub const REBALANCE_PRIORITY: u8 = 6;

const DEFAULT_POSITION: Point = Point { x: 400.0, y: 300.0 };

/// Display coordinates for the zones the dashboard knows by name.
const CANONICAL_POSITIONS: &[(&str, f64, f64)] = &[
    ("Emergency", 200.0, 200.0),
    ("Radiology", 525.0, 200.0),
    ("Lobby", 200.0, 425.0),
    ("Pharmacy", 525.0, 425.0),
    ("Surgery", 200.0, 200.0),
    ("ICU", 525.0, 200.0),
    ("Recovery", 200.0, 425.0),
    ("Cardiology", 200.0, 200.0),
    ("Pediatrics", 525.0, 200.0),
    ("General Ward", 350.0, 425.0),
];

pub fn canonical_position(zone: &str) -> Point {
    CANONICAL_POSITIONS
        .iter()
        .find(|(name, _, _)| *name == zone)
        .map(|&(_, x, y)| Point { x, y })
        .unwrap_or(DEFAULT_POSITION)
}

/// Counts origin and destination zones of every pending or assigned request.
pub fn zone_demand(requests: &[TransportRequest]) -> BTreeMap<String, usize> {
    let mut demand = BTreeMap::new();
    for request in requests
        .iter()
        .filter(|r| matches!(r.status, RequestStatus::Pending | RequestStatus::Assigned))
    {
        for zone in [&request.origin.zone, &request.destination.zone] {
            *demand.entry(zone.clone()).or_insert(0) += 1;
        }
    }
    demand
}

pub fn suggest_placements(
    requests: &[TransportRequest],
    equipment: &[TransportEquipment],
) -> Vec<PlacementSuggestion> {
    let demand = zone_demand(requests);

    let mut hot_zones: Vec<(&str, usize)> = demand
        .iter()
        .filter(|(_, &count)| count >= HIGH_DEMAND_THRESHOLD)
        .map(|(zone, &count)| (zone.as_str(), count))
        .collect();
    hot_zones.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let available: Vec<&TransportEquipment> = equipment
        .iter()
        .filter(|unit| unit.status == EquipmentStatus::Available)
        .collect();
    let mut suggestions = Vec::new();

    // The same unit may be offered to several zones.
    for &(zone, count) in &hot_zones {
        if available.iter().any(|unit| unit.location.zone == zone) {
            continue;
        }
        let Some(unit) = available.first() else {
            break;
        };
        suggestions.push(PlacementSuggestion {
            equipment_id: unit.id.clone(),
            current_zone: unit.location.zone.clone(),
            suggested_zone: zone.to_string(),
            suggested_position: canonical_position(zone),
            priority: demand_priority(count),
            reason: format!("{zone} has {count} open requests and no available equipment"),
        });
    }

    let Some(&(top_zone, _)) = hot_zones.first() else {
        return suggestions;
    };

    let mut idle_zones: BTreeMap<&str, Vec<&TransportEquipment>> = BTreeMap::new();
    for &unit in &available {
        if !demand.contains_key(&unit.location.zone) {
            idle_zones
                .entry(unit.location.zone.as_str())
                .or_default()
                .push(unit);
        }
    }

    for (zone, units) in idle_zones {
        let [unit, _, ..] = units.as_slice() else {
            continue;
        };
        suggestions.push(PlacementSuggestion {
            equipment_id: unit.id.clone(),
            current_zone: zone.to_string(),
            suggested_zone: top_zone.to_string(),
            suggested_position: canonical_position(top_zone),
            priority: REBALANCE_PRIORITY,
            reason: format!(
                "{zone} has {} idle units and no demand; {top_zone} is busiest",
                units.len()
            ),
        });
    }

    suggestions
}

fn demand_priority(count: usize) -> u8 {
    count.saturating_mul(2).min(MAX_PRIORITY as usize) as u8
}

#[cfg(test)]
#[path = "tests/placement_tests.rs"]
mod tests;
