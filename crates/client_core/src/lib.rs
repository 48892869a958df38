use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use coordinator::{ApiContext, NotificationSink};
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{
    domain::{
        EquipmentId, EquipmentStatus, FloorPlan, Point, RequestId, StaffId, StaffMember,
        StaffStatus, TransportEquipment, TransportRequest,
    },
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        AssignRequest, AssignmentOutcome, DashboardSummary, DispatchSnapshot,
        EquipmentStatusUpdate, NewEquipment, NewStaffMember, NewTransportRequest,
        PlacementSuggestion, RelocateEquipment, ServerEvent, StaffStatusUpdate,
    },
};
use storage::{seed::default_floor_plans, Storage};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};
use tracing::{debug, warn};
use url::Url;

pub mod wire;

use wire::WireError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {error}")]
    Api { status: u16, error: ApiError },
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    #[error("server url {0} must be an http or https base url")]
    UnsupportedUrl(String),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("api token contains characters not allowed in a header")]
    InvalidToken,
}

impl ClientError {
    /// The server's error code, when the server produced one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { error, .. } => Some(error.code),
            _ => None,
        }
    }
}

/// REST client for a remote dispatch server.
#[derive(Clone)]
pub struct RemoteDispatchClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl RemoteDispatchClient {
    pub fn new(server_url: &str, token: Option<String>) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(server_url.trim())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends each segment percent-encoded, so ids and zone names containing
    /// `/`, `?` or spaces stay a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::UnsupportedUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ClientError> {
        let builder = self.http.request(method, self.endpoint(segments)?);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let response = checked(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        Self::send(self.request(Method::GET, segments)?).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        Self::send(self.request(Method::POST, segments)?.json(body)).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        Self::send(self.request(Method::POST, segments)?).await
    }

    async fn delete(&self, segments: &[&str]) -> Result<(), ClientError> {
        checked(self.request(Method::DELETE, segments)?.send().await?).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<(), ClientError> {
        checked(self.request(Method::GET, &["healthz"])?.send().await?).await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<DispatchSnapshot, ClientError> {
        let raw: Value = self.get(&["snapshot"]).await?;
        Ok(wire::decode_snapshot(raw)?)
    }

    pub async fn summary(&self) -> Result<DashboardSummary, ClientError> {
        self.get(&["summary"]).await
    }

    pub async fn floor_plans(&self) -> Result<Vec<FloorPlan>, ClientError> {
        self.get(&["floors"]).await
    }

    pub async fn zone_center(&self, floor: u32, zone: &str) -> Result<Point, ClientError> {
        let floor = floor.to_string();
        self.get(&["floors", floor.as_str(), "zones", zone, "center"]).await
    }

    /// Requests are read through [`wire::decode_requests`] so either payload
    /// shape is accepted.
    pub async fn list_requests(&self) -> Result<Vec<TransportRequest>, ClientError> {
        let raw: Vec<Value> = self.get(&["requests"]).await?;
        Ok(wire::decode_requests(raw)?)
    }

    pub async fn pending_queue(&self) -> Result<Vec<TransportRequest>, ClientError> {
        let raw: Vec<Value> = self.get(&["requests", "queue"]).await?;
        Ok(wire::decode_requests(raw)?)
    }

    pub async fn get_request(&self, request_id: &RequestId) -> Result<TransportRequest, ClientError> {
        let raw: Value = self.get(&["requests", request_id.as_str()]).await?;
        Ok(wire::decode_request(raw)?)
    }

    pub async fn create_request(
        &self,
        new_request: &NewTransportRequest,
    ) -> Result<TransportRequest, ClientError> {
        let raw: Value = self.post(&["requests"], new_request).await?;
        Ok(wire::decode_request(raw)?)
    }

    pub async fn assign(
        &self,
        request_id: &RequestId,
        staff_id: &StaffId,
        equipment_id: &EquipmentId,
    ) -> Result<AssignmentOutcome, ClientError> {
        let body = AssignRequest {
            staff_id: staff_id.clone(),
            equipment_id: equipment_id.clone(),
        };
        let raw: Value = self
            .post(&["requests", request_id.as_str(), "assign"], &body)
            .await?;
        Ok(wire::decode_assignment(raw)?)
    }

    async fn request_transition(
        &self,
        request_id: &RequestId,
        action: &str,
    ) -> Result<TransportRequest, ClientError> {
        let raw: Value = self
            .post_empty(&["requests", request_id.as_str(), action])
            .await?;
        Ok(wire::decode_request(raw)?)
    }

    pub async fn cancel(&self, request_id: &RequestId) -> Result<TransportRequest, ClientError> {
        self.request_transition(request_id, "cancel").await
    }

    pub async fn start_transport(
        &self,
        request_id: &RequestId,
    ) -> Result<TransportRequest, ClientError> {
        self.request_transition(request_id, "start").await
    }

    pub async fn complete(&self, request_id: &RequestId) -> Result<TransportRequest, ClientError> {
        self.request_transition(request_id, "complete").await
    }

    pub async fn release(&self, request_id: &RequestId) -> Result<TransportRequest, ClientError> {
        self.request_transition(request_id, "release").await
    }

    pub async fn list_staff(&self) -> Result<Vec<StaffMember>, ClientError> {
        self.get(&["staff"]).await
    }

    pub async fn add_staff(&self, new_staff: &NewStaffMember) -> Result<StaffMember, ClientError> {
        self.post(&["staff"], new_staff).await
    }

    pub async fn set_staff_status(
        &self,
        staff_id: &StaffId,
        status: StaffStatus,
    ) -> Result<StaffMember, ClientError> {
        self.post(
            &["staff", staff_id.as_str(), "status"],
            &StaffStatusUpdate { status },
        )
        .await
    }

    pub async fn remove_staff(&self, staff_id: &StaffId) -> Result<(), ClientError> {
        self.delete(&["staff", staff_id.as_str()]).await
    }

    pub async fn list_equipment(&self) -> Result<Vec<TransportEquipment>, ClientError> {
        self.get(&["equipment"]).await
    }

    pub async fn add_equipment(
        &self,
        new_equipment: &NewEquipment,
    ) -> Result<TransportEquipment, ClientError> {
        self.post(&["equipment"], new_equipment).await
    }

    pub async fn set_equipment_status(
        &self,
        equipment_id: &EquipmentId,
        status: EquipmentStatus,
    ) -> Result<TransportEquipment, ClientError> {
        self.post(
            &["equipment", equipment_id.as_str(), "status"],
            &EquipmentStatusUpdate { status },
        )
        .await
    }

    pub async fn remove_equipment(&self, equipment_id: &EquipmentId) -> Result<(), ClientError> {
        self.delete(&["equipment", equipment_id.as_str()]).await
    }

    pub async fn relocate_equipment(
        &self,
        equipment_id: &EquipmentId,
        target: &RelocateEquipment,
    ) -> Result<TransportEquipment, ClientError> {
        self.post(&["equipment", equipment_id.as_str(), "relocate"], target)
            .await
    }

    pub async fn suggestions(&self) -> Result<Vec<PlacementSuggestion>, ClientError> {
        self.get(&["suggestions"]).await
    }

    pub async fn apply_suggestion(
        &self,
        suggestion: &PlacementSuggestion,
    ) -> Result<TransportEquipment, ClientError> {
        self.post(&["suggestions", "apply"], suggestion).await
    }

    /// Opens the server's event stream. Events arrive on the returned
    /// subscription until the socket closes or the subscription is dropped.
    pub async fn subscribe_events(&self) -> Result<EventSubscription, ClientError> {
        let mut ws_url = self.endpoint(&["ws"])?;
        let scheme = if ws_url.scheme() == "https" { "wss" } else { "ws" };
        ws_url
            .set_scheme(scheme)
            .map_err(|()| ClientError::UnsupportedUrl(self.base_url.to_string()))?;

        let mut request = ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::WebSocket(Box::new(e)))?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::InvalidToken)?;
            request.headers_mut().insert("authorization", value);
        }
        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| ClientError::WebSocket(Box::new(e)))?;
        let (_, mut ws_reader) = ws_stream.split();

        let (tx, rx) = mpsc::channel(64);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text)
                        .map_err(WireError::from)
                        .and_then(wire::decode_event)
                    {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => warn!(%error, "skipping undecodable server event"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "event stream failed");
                        break;
                    }
                }
            }
            debug!("event stream closed");
        });
        Ok(EventSubscription { events: rx, reader })
    }
}

/// Turns non-2xx responses into [`ClientError::Api`], decoding the server's
/// `ApiError` body when there is one.
async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        let detail = body.trim();
        let message = if detail.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {detail}")
        };
        ApiError::new(fallback_code(status), message)
    });
    Err(ClientError::Api {
        status: status.as_u16(),
        error,
    })
}

fn fallback_code(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorCode::Unauthorized,
        s if s.is_client_error() => ErrorCode::Validation,
        _ => ErrorCode::Internal,
    }
}

pub struct EventSubscription {
    events: mpsc::Receiver<ServerEvent>,
    reader: JoinHandle<()>,
}

impl EventSubscription {
    /// `None` once the server closes the stream.
    pub async fn next(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Operations shared by the in-memory coordinator and a remote server, so
/// front ends can run against either.
#[async_trait]
pub trait DispatchBackend: Send + Sync {
    async fn snapshot(&self) -> Result<DispatchSnapshot>;
    async fn summary(&self) -> Result<DashboardSummary>;
    async fn pending_queue(&self) -> Result<Vec<TransportRequest>>;
    async fn create_request(&self, new_request: NewTransportRequest) -> Result<TransportRequest>;
    async fn assign(
        &self,
        request_id: &RequestId,
        staff_id: &StaffId,
        equipment_id: &EquipmentId,
    ) -> Result<AssignmentOutcome>;
    async fn cancel(&self, request_id: &RequestId) -> Result<TransportRequest>;
    async fn start_transport(&self, request_id: &RequestId) -> Result<TransportRequest>;
    async fn complete(&self, request_id: &RequestId) -> Result<TransportRequest>;
    async fn release(&self, request_id: &RequestId) -> Result<TransportRequest>;
    async fn set_staff_status(&self, staff_id: &StaffId, status: StaffStatus)
        -> Result<StaffMember>;
    async fn set_equipment_status(
        &self,
        equipment_id: &EquipmentId,
        status: EquipmentStatus,
    ) -> Result<TransportEquipment>;
    async fn relocate_equipment(
        &self,
        equipment_id: &EquipmentId,
        target: RelocateEquipment,
    ) -> Result<TransportEquipment>;
    async fn suggestions(&self) -> Result<Vec<PlacementSuggestion>>;
    async fn apply_suggestion(
        &self,
        suggestion: &PlacementSuggestion,
    ) -> Result<TransportEquipment>;
}

#[async_trait]
impl DispatchBackend for RemoteDispatchClient {
    async fn snapshot(&self) -> Result<DispatchSnapshot> {
        Ok(RemoteDispatchClient::snapshot(self).await?)
    }

    async fn summary(&self) -> Result<DashboardSummary> {
        Ok(RemoteDispatchClient::summary(self).await?)
    }

    async fn pending_queue(&self) -> Result<Vec<TransportRequest>> {
        Ok(RemoteDispatchClient::pending_queue(self).await?)
    }

    async fn create_request(&self, new_request: NewTransportRequest) -> Result<TransportRequest> {
        Ok(RemoteDispatchClient::create_request(self, &new_request).await?)
    }

    async fn assign(
        &self,
        request_id: &RequestId,
        staff_id: &StaffId,
        equipment_id: &EquipmentId,
    ) -> Result<AssignmentOutcome> {
        Ok(RemoteDispatchClient::assign(self, request_id, staff_id, equipment_id).await?)
    }

    async fn cancel(&self, request_id: &RequestId) -> Result<TransportRequest> {
        Ok(RemoteDispatchClient::cancel(self, request_id).await?)
    }

    async fn start_transport(&self, request_id: &RequestId) -> Result<TransportRequest> {
        Ok(RemoteDispatchClient::start_transport(self, request_id).await?)
    }

    async fn complete(&self, request_id: &RequestId) -> Result<TransportRequest> {
        Ok(RemoteDispatchClient::complete(self, request_id).await?)
    }

    async fn release(&self, request_id: &RequestId) -> Result<TransportRequest> {
        Ok(RemoteDispatchClient::release(self, request_id).await?)
    }

    async fn set_staff_status(
        &self,
        staff_id: &StaffId,
        status: StaffStatus,
    ) -> Result<StaffMember> {
        Ok(RemoteDispatchClient::set_staff_status(self, staff_id, status).await?)
    }

    async fn set_equipment_status(
        &self,
        equipment_id: &EquipmentId,
        status: EquipmentStatus,
    ) -> Result<TransportEquipment> {
        Ok(RemoteDispatchClient::set_equipment_status(self, equipment_id, status).await?)
    }

    async fn relocate_equipment(
        &self,
        equipment_id: &EquipmentId,
        target: RelocateEquipment,
    ) -> Result<TransportEquipment> {
        Ok(RemoteDispatchClient::relocate_equipment(self, equipment_id, &target).await?)
    }

    async fn suggestions(&self) -> Result<Vec<PlacementSuggestion>> {
        Ok(RemoteDispatchClient::suggestions(self).await?)
    }

    async fn apply_suggestion(
        &self,
        suggestion: &PlacementSuggestion,
    ) -> Result<TransportEquipment> {
        Ok(RemoteDispatchClient::apply_suggestion(self, suggestion).await?)
    }
}

/// Runs the coordinator in-process against its own state.
#[derive(Clone)]
pub struct LocalBackend {
    ctx: ApiContext,
}

impl LocalBackend {
    pub fn new(ctx: ApiContext) -> Self {
        Self { ctx }
    }

    /// Demo roster on the default hospital layout.
    pub fn demo(notifier: Arc<dyn NotificationSink>) -> Self {
        Self::new(ApiContext::new(
            Storage::with_demo_data(),
            default_floor_plans(),
            notifier,
        ))
    }

    pub fn context(&self) -> &ApiContext {
        &self.ctx
    }
}

fn coordinator_error(error: ApiError) -> anyhow::Error {
    ApiException::from(error).into()
}

#[async_trait]
impl DispatchBackend for LocalBackend {
    async fn snapshot(&self) -> Result<DispatchSnapshot> {
        Ok(coordinator::snapshot(&self.ctx).await)
    }

    async fn summary(&self) -> Result<DashboardSummary> {
        Ok(coordinator::summary(&self.ctx).await)
    }

    async fn pending_queue(&self) -> Result<Vec<TransportRequest>> {
        Ok(coordinator::pending_queue(&self.ctx).await)
    }

    async fn create_request(&self, new_request: NewTransportRequest) -> Result<TransportRequest> {
        coordinator::create_request(&self.ctx, new_request)
            .await
            .map_err(coordinator_error)
    }

    async fn assign(
        &self,
        request_id: &RequestId,
        staff_id: &StaffId,
        equipment_id: &EquipmentId,
    ) -> Result<AssignmentOutcome> {
        coordinator::assign(&self.ctx, request_id, staff_id, equipment_id)
            .await
            .map_err(coordinator_error)
    }

    async fn cancel(&self, request_id: &RequestId) -> Result<TransportRequest> {
        coordinator::cancel(&self.ctx, request_id)
            .await
            .map_err(coordinator_error)
    }

    async fn start_transport(&self, request_id: &RequestId) -> Result<TransportRequest> {
        coordinator::start_transport(&self.ctx, request_id)
            .await
            .map_err(coordinator_error)
    }

    async fn complete(&self, request_id: &RequestId) -> Result<TransportRequest> {
        coordinator::complete(&self.ctx, request_id)
            .await
            .map_err(coordinator_error)
    }

    async fn release(&self, request_id: &RequestId) -> Result<TransportRequest> {
        coordinator::release(&self.ctx, request_id)
            .await
            .map_err(coordinator_error)
    }

    async fn set_staff_status(
        &self,
        staff_id: &StaffId,
        status: StaffStatus,
    ) -> Result<StaffMember> {
        coordinator::set_staff_status(&self.ctx, staff_id, status)
            .await
            .map_err(coordinator_error)
    }

    async fn set_equipment_status(
        &self,
        equipment_id: &EquipmentId,
        status: EquipmentStatus,
    ) -> Result<TransportEquipment> {
        coordinator::set_equipment_status(&self.ctx, equipment_id, status)
            .await
            .map_err(coordinator_error)
    }

    async fn relocate_equipment(
        &self,
        equipment_id: &EquipmentId,
        target: RelocateEquipment,
    ) -> Result<TransportEquipment> {
        coordinator::relocate_equipment(&self.ctx, equipment_id, target)
            .await
            .map_err(coordinator_error)
    }

    async fn suggestions(&self) -> Result<Vec<PlacementSuggestion>> {
        Ok(coordinator::placement_suggestions(&self.ctx).await)
    }

    async fn apply_suggestion(
        &self,
        suggestion: &PlacementSuggestion,
    ) -> Result<TransportEquipment> {
        coordinator::apply_suggestion(&self.ctx, suggestion)
            .await
            .map_err(coordinator_error)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
