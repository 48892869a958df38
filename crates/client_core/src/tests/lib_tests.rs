use super::*;
use axum::{
    extract::{ws::Message as WsMessage, Path, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode as HttpStatus},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use coordinator::RecordingSink;
use serde_json::json;
use shared::protocol::NotificationLevel;
use tokio::net::TcpListener;

const TOKEN: &str = "secret-token";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> (HttpStatus, Json<ApiError>) {
    (
        HttpStatus::UNAUTHORIZED,
        Json(ApiError::new(ErrorCode::Unauthorized, "missing bearer token")),
    )
}

fn legacy_request(id: &str) -> Value {
    json!({
        "id": id,
        "patientName": "Grace Hopper",
        "priority": "URGENT",
        "status": "ASSIGNED",
        "transport_type": "wheelchair",
        "pickup_location": { "floor": 1, "zone": "Lobby" },
        "dropoff_location": { "floor": 3, "zone": "Cardiology", "room": "C-4" },
        "created_at": "2024-05-01T09:30:00Z",
        "staff_id": "STF-002",
        "equipment_id": "EQ-006"
    })
}

fn staff_json() -> Value {
    json!({
        "id": "STF-002",
        "name": "James Chen",
        "role": "nurse",
        "status": "busy",
        "current_workload": 1,
        "assigned_equipment": ["EQ-006"],
        "location": { "floor": 1, "zone": "Lobby", "x": 200.0, "y": 425.0 }
    })
}

fn equipment_json() -> Value {
    json!({
        "id": "EQ-006",
        "name": "Wheelchair W-2",
        "equipment_type": "wheelchair",
        "status": "in-use",
        "location": { "floor": 1, "zone": "Lobby", "x": 200.0, "y": 425.0 },
        "assigned_staff": "STF-002",
        "current_request": "REQ-100"
    })
}

async fn legacy_snapshot() -> Json<Value> {
    Json(json!({
        "revision": 12,
        "requests": [legacy_request("REQ-100")],
        "staff": [staff_json()],
        "equipment": [equipment_json()]
    }))
}

async fn legacy_request_by_id(Path(request_id): Path<String>) -> Json<Value> {
    Json(legacy_request(&request_id))
}

async fn legacy_requests(headers: HeaderMap) -> Result<Json<Value>, (HttpStatus, Json<ApiError>)> {
    if !authorized(&headers) {
        return Err(unauthorized());
    }
    Ok(Json(json!([
        legacy_request("REQ-100"),
        {
            "id": "REQ-101",
            "patient_name": "Alan Turing",
            "status": "pending",
            "equipment_type": "stretcher",
            "origin": { "floor": 1, "zone": "Emergency" },
            "destination": { "floor": 2, "zone": "ICU" },
            "requested_at": "2024-05-01T09:45:00Z"
        }
    ])))
}

async fn assign_endpoint(
    Path(request_id): Path<String>,
) -> Result<Json<Value>, (HttpStatus, Json<ApiError>)> {
    if request_id == "REQ-100" {
        return Ok(Json(json!({
            "request": legacy_request("REQ-100"),
            "staff": staff_json(),
            "equipment": equipment_json()
        })));
    }
    Err((
        HttpStatus::CONFLICT,
        Json(ApiError::new(
            ErrorCode::StaffUnavailable,
            "staff member James Chen is busy",
        )),
    ))
}

async fn broken_cancel() -> (HttpStatus, &'static str) {
    (HttpStatus::BAD_GATEWAY, "upstream exploded")
}

async fn zone_center_echo(
    Path((floor, zone)): Path<(u32, String)>,
) -> Result<Json<Point>, HttpStatus> {
    if floor == 3 && zone == "General Ward" {
        Ok(Json(Point { x: 350.0, y: 425.0 }))
    } else {
        Err(HttpStatus::NOT_FOUND)
    }
}

async fn event_stream(ws: WebSocketUpgrade, headers: HeaderMap) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized().into_response();
    }
    ws.on_upgrade(|mut socket| async move {
        let updated = json!({
            "type": "request_updated",
            "payload": { "request": legacy_request("REQ-100") }
        });
        let _ = socket.send(WsMessage::Text(updated.to_string())).await;
        let event = ServerEvent::PositionsMoved {
            revision: 7,
            moved: 2,
        };
        let text = serde_json::to_string(&event).expect("encode event");
        let _ = socket.send(WsMessage::Text(text)).await;
        let _ = socket.send(WsMessage::Close(None)).await;
    })
}

async fn spawn_fake_server() -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/requests", get(legacy_requests))
        .route("/snapshot", get(legacy_snapshot))
        .route("/requests/:request_id", get(legacy_request_by_id))
        .route("/requests/:request_id/assign", post(assign_endpoint))
        .route("/requests/:request_id/cancel", post(broken_cancel))
        .route("/floors/:floor/zones/:zone/center", get(zone_center_echo))
        .route("/ws", get(event_stream));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn bearer_token_is_sent_and_legacy_payloads_are_normalized() {
    let server_url = spawn_fake_server().await.expect("spawn server");
    let client = RemoteDispatchClient::new(&server_url, Some(TOKEN.into())).expect("client");

    let requests = client.list_requests().await.expect("requests");
    assert_eq!(requests.len(), 2);

    let legacy = &requests[0];
    assert_eq!(legacy.patient_name, "Grace Hopper");
    assert_eq!(legacy.status, shared::domain::RequestStatus::Assigned);
    assert_eq!(legacy.priority, shared::domain::Priority::Urgent);
    assert_eq!(
        legacy.equipment_type,
        shared::domain::EquipmentType::Wheelchair
    );
    assert_eq!(legacy.destination.zone, "Cardiology");
    assert_eq!(legacy.assigned_staff, Some(StaffId::new("STF-002")));
    assert_eq!(legacy.assigned_equipment, Some(EquipmentId::new("EQ-006")));

    let normalized = &requests[1];
    assert_eq!(normalized.status, shared::domain::RequestStatus::Pending);
    assert!(normalized.assigned_staff.is_none());
}

#[tokio::test]
async fn snapshots_and_assignments_accept_the_legacy_request_shape() {
    let server_url = spawn_fake_server().await.expect("spawn server");
    let client = RemoteDispatchClient::new(&server_url, Some(TOKEN.into())).expect("client");

    let snapshot = client.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.revision, 12);
    assert_eq!(snapshot.requests.len(), 1);
    assert_eq!(
        snapshot.requests[0].status,
        shared::domain::RequestStatus::Assigned
    );
    assert_eq!(snapshot.requests[0].destination.zone, "Cardiology");
    assert_eq!(snapshot.staff[0].id, StaffId::new("STF-002"));
    assert_eq!(snapshot.equipment[0].id, EquipmentId::new("EQ-006"));

    let outcome = client
        .assign(
            &RequestId::new("REQ-100"),
            &StaffId::new("STF-002"),
            &EquipmentId::new("EQ-006"),
        )
        .await
        .expect("assign");
    assert_eq!(outcome.request.assigned_staff, Some(StaffId::new("STF-002")));
    assert_eq!(outcome.equipment.current_request, Some(RequestId::new("REQ-100")));
}

#[tokio::test]
async fn ids_stay_one_path_segment() {
    let server_url = spawn_fake_server().await.expect("spawn server");
    let client = RemoteDispatchClient::new(&server_url, Some(TOKEN.into())).expect("client");

    let odd = RequestId::new("REQ/7?x=1 #a");
    let request = client.get_request(&odd).await.expect("request");
    assert_eq!(request.id, odd);
}

#[tokio::test]
async fn missing_token_surfaces_unauthorized() {
    let server_url = spawn_fake_server().await.expect("spawn server");
    let client = RemoteDispatchClient::new(&server_url, None).expect("client");

    let err = client.list_requests().await.expect_err("no token");
    assert!(matches!(err, ClientError::Api { status: 401, .. }));
    assert_eq!(err.code(), Some(ErrorCode::Unauthorized));
}

#[tokio::test]
async fn api_errors_are_decoded_from_the_body() {
    let server_url = spawn_fake_server().await.expect("spawn server");
    let client = RemoteDispatchClient::new(&server_url, Some(TOKEN.into())).expect("client");

    let err = client
        .assign(
            &RequestId::new("REQ-101"),
            &StaffId::new("STF-002"),
            &EquipmentId::new("EQ-001"),
        )
        .await
        .expect_err("conflict");
    let ClientError::Api { status, error } = err else {
        panic!("expected api error");
    };
    assert_eq!(status, 409);
    assert_eq!(error.code, ErrorCode::StaffUnavailable);
    assert_eq!(error.message, "staff member James Chen is busy");
}

#[tokio::test]
async fn non_json_errors_get_a_generic_message() {
    let server_url = spawn_fake_server().await.expect("spawn server");
    let client = RemoteDispatchClient::new(&server_url, Some(TOKEN.into())).expect("client");

    let err = client
        .cancel(&RequestId::new("REQ-101"))
        .await
        .expect_err("bad gateway");
    let ClientError::Api { status, error } = err else {
        panic!("expected api error");
    };
    assert_eq!(status, 502);
    assert_eq!(error.code, ErrorCode::Internal);
    assert!(error.message.contains("upstream exploded"));
}

#[tokio::test]
async fn zone_names_are_path_encoded() {
    let server_url = spawn_fake_server().await.expect("spawn server");
    let client = RemoteDispatchClient::new(&format!("{server_url}/"), None).expect("client");

    let center = client.zone_center(3, "General Ward").await.expect("center");
    assert_eq!(center, Point { x: 350.0, y: 425.0 });

    let err = client.zone_center(1, "Nowhere").await.expect_err("unknown");
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = RemoteDispatchClient::new(&format!("http://{addr}"), None).expect("client");
    let err = client.health().await.expect_err("nothing listening");
    assert!(matches!(err, ClientError::Transport(_)));
}

#[tokio::test]
async fn event_subscription_delivers_server_events() {
    let server_url = spawn_fake_server().await.expect("spawn server");
    let client = RemoteDispatchClient::new(&server_url, Some(TOKEN.into())).expect("client");

    let mut events = client.subscribe_events().await.expect("subscribe");
    let first = tokio::time::timeout(std::time::Duration::from_secs(5), events.next())
        .await
        .expect("event in time")
        .expect("request event");
    let ServerEvent::RequestUpdated { request } = first else {
        panic!("expected a request update");
    };
    assert_eq!(request.origin.zone, "Lobby");
    assert_eq!(request.assigned_equipment, Some(EquipmentId::new("EQ-006")));

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.next())
        .await
        .expect("event in time")
        .expect("second event");
    assert!(matches!(
        event,
        ServerEvent::PositionsMoved {
            revision: 7,
            moved: 2
        }
    ));
}

#[test]
fn invalid_base_url_is_rejected() {
    assert!(matches!(
        RemoteDispatchClient::new("not a url", None),
        Err(ClientError::Url(_))
    ));
    let client = RemoteDispatchClient::new("http://dispatch.local/api", Some("  ".into()))
        .expect("client");
    assert_eq!(client.base_url().as_str(), "http://dispatch.local/api/");
    assert!(client.token.is_none());
}

#[tokio::test]
async fn local_backend_runs_the_coordinator() {
    let sink = RecordingSink::new();
    let backend: Box<dyn DispatchBackend> = Box::new(LocalBackend::demo(Arc::new(sink.clone())));

    let outcome = backend
        .assign(
            &RequestId::new("REQ-002"),
            &StaffId::new("STF-002"),
            &EquipmentId::new("EQ-002"),
        )
        .await
        .expect("assign");
    assert_eq!(outcome.staff.current_workload, 1);

    let err = backend
        .assign(
            &RequestId::new("REQ-001"),
            &StaffId::new("STF-002"),
            &EquipmentId::new("EQ-001"),
        )
        .await
        .expect_err("staff already busy");
    let api = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(api.code, ErrorCode::StaffUnavailable);

    let queue = backend.pending_queue().await.expect("queue");
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, RequestId::new("REQ-001"));

    let levels: Vec<NotificationLevel> = sink.drain().into_iter().map(|n| n.level).collect();
    assert_eq!(
        levels,
        vec![NotificationLevel::Success, NotificationLevel::Error]
    );
}
