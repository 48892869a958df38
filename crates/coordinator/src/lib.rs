use std::{collections::BTreeMap, str::FromStr, sync::Arc};

use shared::{
    domain::{
        EquipmentStatus, FloorPlan, RequestId, RequestStatus, StaffMember, TransportEquipment,
        TransportRequest,
    },
    error::{ApiError, ErrorCode},
    protocol::{DashboardSummary, DispatchSnapshot, Notification, PlacementSuggestion},
};
use storage::Storage;
use tracing::warn;

pub mod motion;
pub mod notify;
pub mod placement;
mod requests;
mod resources;
pub mod zones;

pub use notify::{NotificationSink, RecordingSink, TracingSink};
pub use requests::{assign, cancel, complete, create_request, release, start_transport};
pub use resources::{
    add_equipment, add_staff, apply_suggestion, relocate_equipment, remove_equipment,
    remove_staff, set_equipment_status, set_staff_status,
};

/// What happens to the staff member and equipment of a request when it is
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Resources stay busy until released explicitly with [`release`].
    #[default]
    Retain,
    /// Resources are freed as part of the cancellation.
    Release,
}

impl FromStr for CancelPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "release" => Ok(Self::Release),
            other => Err(format!("unknown cancel policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchPolicy {
    pub cancel: CancelPolicy,
}

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub floors: Arc<Vec<FloorPlan>>,
    pub notifier: Arc<dyn NotificationSink>,
    pub policy: DispatchPolicy,
}

impl ApiContext {
    pub fn new(
        storage: Storage,
        floors: Vec<FloorPlan>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            storage,
            floors: Arc::new(floors),
            notifier,
            policy: DispatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }
}

pub async fn snapshot(ctx: &ApiContext) -> DispatchSnapshot {
    let snapshot = ctx.storage.snapshot().await;
    DispatchSnapshot {
        revision: snapshot.revision,
        requests: snapshot.state.requests,
        staff: snapshot.state.staff,
        equipment: snapshot.state.equipment,
    }
}

pub async fn list_requests(ctx: &ApiContext) -> Vec<TransportRequest> {
    ctx.storage.read(|state| state.requests.clone()).await
}

pub async fn get_request(
    ctx: &ApiContext,
    request_id: &RequestId,
) -> Result<TransportRequest, ApiError> {
    ctx.storage
        .read(|state| state.request(request_id).cloned())
        .await
        .ok_or_else(|| ApiError::not_found("request", request_id))
}

/// Pending requests, most urgent first, oldest first within a priority.
pub async fn pending_queue(ctx: &ApiContext) -> Vec<TransportRequest> {
    ctx.storage
        .read(|state| ordered_queue(&state.requests))
        .await
}

fn ordered_queue(requests: &[TransportRequest]) -> Vec<TransportRequest> {
    let mut queue: Vec<TransportRequest> = requests
        .iter()
        .filter(|r| r.status == RequestStatus::Pending)
        .cloned()
        .collect();
    queue.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.requested_at.cmp(&b.requested_at))
    });
    queue
}

pub async fn list_staff(ctx: &ApiContext) -> Vec<StaffMember> {
    ctx.storage.read(|state| state.staff.clone()).await
}

pub async fn list_equipment(ctx: &ApiContext) -> Vec<TransportEquipment> {
    ctx.storage.read(|state| state.equipment.clone()).await
}

pub fn floor_plans(ctx: &ApiContext) -> Vec<FloorPlan> {
    ctx.floors.as_ref().clone()
}

pub async fn summary(ctx: &ApiContext) -> DashboardSummary {
    let snapshot = ctx.storage.snapshot().await;
    let state = &snapshot.state;

    let mut summary = DashboardSummary {
        revision: snapshot.revision,
        pending_queue_len: state
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count(),
        ..DashboardSummary::default()
    };
    tally(&mut summary.requests_by_status, state.requests.iter().map(|r| r.status));
    tally(&mut summary.staff_by_status, state.staff.iter().map(|s| s.status));
    tally(
        &mut summary.equipment_by_status,
        state.equipment.iter().map(|e| e.status),
    );
    tally(
        &mut summary.available_by_type,
        state
            .equipment
            .iter()
            .filter(|e| e.status == EquipmentStatus::Available)
            .map(|e| e.equipment_type),
    );
    summary
}

fn tally<K: Ord>(counts: &mut BTreeMap<K, usize>, keys: impl Iterator<Item = K>) {
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
}

/// Advisory relocations computed from the current snapshot.
pub async fn placement_suggestions(ctx: &ApiContext) -> Vec<PlacementSuggestion> {
    ctx.storage
        .read(|state| placement::suggest_placements(&state.requests, &state.equipment))
        .await
}

/// Surfaces the outcome of a mutating operation to the notification sink.
fn report<T>(
    ctx: &ApiContext,
    result: Result<T, ApiError>,
    success: impl FnOnce(&T) -> String,
) -> Result<T, ApiError> {
    match &result {
        Ok(value) => ctx.notifier.notify(Notification::success(success(value))),
        Err(err) => {
            warn!(code = ?err.code, message = %err.message, "dispatch operation rejected");
            ctx.notifier.notify(Notification::error(err.message.clone()));
        }
    }
    result
}

fn invalid_transition(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidTransition, message)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
