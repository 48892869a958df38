use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use coordinator::zones::zone_center;
use futures::{SinkExt, StreamExt};
use shared::{
    domain::{
        EquipmentId, FloorPlan, Point, RequestId, StaffId, StaffMember, TransportEquipment,
        TransportRequest,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        AssignRequest, AssignmentOutcome, DashboardSummary, DispatchSnapshot,
        EquipmentStatusUpdate, NewEquipment, NewStaffMember, NewTransportRequest,
        PlacementSuggestion, RelocateEquipment, ServerEvent, StaffStatusUpdate,
    },
};
use tokio::sync::broadcast::error::RecvError;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, warn};

use crate::app_state::AppState;

type Rejection = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<Json<T>, Rejection>;

pub(crate) fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshot", get(http_snapshot))
        .route("/summary", get(http_summary))
        .route("/floors", get(http_floors))
        .route("/floors/:floor/zones/:zone/center", get(http_zone_center))
        .route("/requests", get(http_list_requests).post(http_create_request))
        .route("/requests/queue", get(http_pending_queue))
        .route("/requests/:request_id", get(http_get_request))
        .route("/requests/:request_id/assign", post(http_assign))
        .route("/requests/:request_id/cancel", post(http_cancel))
        .route("/requests/:request_id/start", post(http_start))
        .route("/requests/:request_id/complete", post(http_complete))
        .route("/requests/:request_id/release", post(http_release))
        .route("/staff", get(http_list_staff).post(http_add_staff))
        .route("/staff/:staff_id", delete(http_remove_staff))
        .route("/staff/:staff_id/status", post(http_staff_status))
        .route("/equipment", get(http_list_equipment).post(http_add_equipment))
        .route("/equipment/:equipment_id", delete(http_remove_equipment))
        .route("/equipment/:equipment_id/status", post(http_equipment_status))
        .route("/equipment/:equipment_id/relocate", post(http_relocate))
        .route("/suggestions", get(http_suggestions))
        .route("/suggestions/apply", post(http_apply_suggestion))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::StaffUnavailable
        | ErrorCode::EquipmentUnavailable
        | ErrorCode::TypeMismatch
        | ErrorCode::InvalidTransition
        | ErrorCode::ResourceInUse => StatusCode::CONFLICT,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> Rejection {
    (status_for(err.code), Json(err))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_snapshot(State(state): State<Arc<AppState>>) -> Json<DispatchSnapshot> {
    Json(coordinator::snapshot(&state.api).await)
}

async fn http_summary(State(state): State<Arc<AppState>>) -> Json<DashboardSummary> {
    Json(coordinator::summary(&state.api).await)
}

async fn http_floors(State(state): State<Arc<AppState>>) -> Json<Vec<FloorPlan>> {
    Json(coordinator::floor_plans(&state.api))
}

async fn http_zone_center(
    State(state): State<Arc<AppState>>,
    Path((floor, zone)): Path<(u32, String)>,
) -> ApiResult<Point> {
    zone_center(&state.api.floors, floor, &zone)
        .map(Json)
        .ok_or_else(|| {
            reject(ApiError::new(
                ErrorCode::NotFound,
                format!("zone {zone} is not registered on floor {floor}"),
            ))
        })
}

async fn http_list_requests(State(state): State<Arc<AppState>>) -> Json<Vec<TransportRequest>> {
    Json(coordinator::list_requests(&state.api).await)
}

async fn http_pending_queue(State(state): State<Arc<AppState>>) -> Json<Vec<TransportRequest>> {
    Json(coordinator::pending_queue(&state.api).await)
}

async fn http_get_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<RequestId>,
) -> ApiResult<TransportRequest> {
    coordinator::get_request(&state.api, &request_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewTransportRequest>,
) -> Result<(StatusCode, Json<TransportRequest>), Rejection> {
    let request = coordinator::create_request(&state.api, req)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::RequestUpdated {
        request: request.clone(),
    });
    Ok((StatusCode::CREATED, Json(request)))
}

async fn http_assign(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<RequestId>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<AssignmentOutcome> {
    let outcome = coordinator::assign(&state.api, &request_id, &req.staff_id, &req.equipment_id)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::RequestUpdated {
        request: outcome.request.clone(),
    });
    state.publish(ServerEvent::StaffUpdated {
        staff: outcome.staff.clone(),
    });
    state.publish(ServerEvent::EquipmentUpdated {
        equipment: outcome.equipment.clone(),
    });
    Ok(Json(outcome))
}

async fn http_cancel(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<RequestId>,
) -> ApiResult<TransportRequest> {
    let request = coordinator::cancel(&state.api, &request_id)
        .await
        .map_err(reject)?;
    publish_request_and_resources(&state, &request).await;
    Ok(Json(request))
}

async fn http_start(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<RequestId>,
) -> ApiResult<TransportRequest> {
    let request = coordinator::start_transport(&state.api, &request_id)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::RequestUpdated {
        request: request.clone(),
    });
    Ok(Json(request))
}

async fn http_complete(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<RequestId>,
) -> ApiResult<TransportRequest> {
    let request = coordinator::complete(&state.api, &request_id)
        .await
        .map_err(reject)?;
    publish_request_and_resources(&state, &request).await;
    Ok(Json(request))
}

async fn http_release(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<RequestId>,
) -> ApiResult<TransportRequest> {
    let request = coordinator::release(&state.api, &request_id)
        .await
        .map_err(reject)?;
    publish_request_and_resources(&state, &request).await;
    Ok(Json(request))
}

/// Publishes the request plus the current view of the staff member and
/// equipment it references, which may just have been freed.
async fn publish_request_and_resources(state: &AppState, request: &TransportRequest) {
    let (staff, equipment) = state
        .api
        .storage
        .read(|s| {
            (
                request
                    .assigned_staff
                    .as_ref()
                    .and_then(|id| s.staff_member(id).cloned()),
                request
                    .assigned_equipment
                    .as_ref()
                    .and_then(|id| s.equipment_unit(id).cloned()),
            )
        })
        .await;
    state.publish(ServerEvent::RequestUpdated {
        request: request.clone(),
    });
    if let Some(staff) = staff {
        state.publish(ServerEvent::StaffUpdated { staff });
    }
    if let Some(equipment) = equipment {
        state.publish(ServerEvent::EquipmentUpdated { equipment });
    }
}

async fn http_list_staff(State(state): State<Arc<AppState>>) -> Json<Vec<StaffMember>> {
    Json(coordinator::list_staff(&state.api).await)
}

async fn http_add_staff(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewStaffMember>,
) -> Result<(StatusCode, Json<StaffMember>), Rejection> {
    let staff = coordinator::add_staff(&state.api, req)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::StaffUpdated {
        staff: staff.clone(),
    });
    Ok((StatusCode::CREATED, Json(staff)))
}

async fn http_remove_staff(
    State(state): State<Arc<AppState>>,
    Path(staff_id): Path<StaffId>,
) -> Result<StatusCode, Rejection> {
    coordinator::remove_staff(&state.api, &staff_id)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::StaffRemoved { staff_id });
    Ok(StatusCode::NO_CONTENT)
}

async fn http_staff_status(
    State(state): State<Arc<AppState>>,
    Path(staff_id): Path<StaffId>,
    Json(req): Json<StaffStatusUpdate>,
) -> ApiResult<StaffMember> {
    let staff = coordinator::set_staff_status(&state.api, &staff_id, req.status)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::StaffUpdated {
        staff: staff.clone(),
    });
    Ok(Json(staff))
}

async fn http_list_equipment(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<TransportEquipment>> {
    Json(coordinator::list_equipment(&state.api).await)
}

async fn http_add_equipment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewEquipment>,
) -> Result<(StatusCode, Json<TransportEquipment>), Rejection> {
    let equipment = coordinator::add_equipment(&state.api, req)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::EquipmentUpdated {
        equipment: equipment.clone(),
    });
    Ok((StatusCode::CREATED, Json(equipment)))
}

async fn http_remove_equipment(
    State(state): State<Arc<AppState>>,
    Path(equipment_id): Path<EquipmentId>,
) -> Result<StatusCode, Rejection> {
    coordinator::remove_equipment(&state.api, &equipment_id)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::EquipmentRemoved { equipment_id });
    Ok(StatusCode::NO_CONTENT)
}

async fn http_equipment_status(
    State(state): State<Arc<AppState>>,
    Path(equipment_id): Path<EquipmentId>,
    Json(req): Json<EquipmentStatusUpdate>,
) -> ApiResult<TransportEquipment> {
    let equipment = coordinator::set_equipment_status(&state.api, &equipment_id, req.status)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::EquipmentUpdated {
        equipment: equipment.clone(),
    });
    Ok(Json(equipment))
}

async fn http_relocate(
    State(state): State<Arc<AppState>>,
    Path(equipment_id): Path<EquipmentId>,
    Json(req): Json<RelocateEquipment>,
) -> ApiResult<TransportEquipment> {
    let equipment = coordinator::relocate_equipment(&state.api, &equipment_id, req)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::EquipmentUpdated {
        equipment: equipment.clone(),
    });
    Ok(Json(equipment))
}

async fn http_suggestions(State(state): State<Arc<AppState>>) -> Json<Vec<PlacementSuggestion>> {
    Json(coordinator::placement_suggestions(&state.api).await)
}

async fn http_apply_suggestion(
    State(state): State<Arc<AppState>>,
    Json(suggestion): Json<PlacementSuggestion>,
) -> ApiResult<TransportEquipment> {
    let equipment = coordinator::apply_suggestion(&state.api, &suggestion)
        .await
        .map_err(reject)?;
    state.publish(ServerEvent::EquipmentUpdated {
        equipment: equipment.clone(),
    });
    Ok(Json(equipment))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(error) => {
                    warn!(%error, "failed to encode server event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    debug!("websocket subscriber disconnected");
    send_task.abort();
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
