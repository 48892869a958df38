use coordinator::{ApiContext, NotificationSink};
use shared::protocol::{Notification, ServerEvent};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    /// Broadcasts to WebSocket subscribers. Having none is not an error.
    pub(crate) fn publish(&self, event: ServerEvent) {
        publish(&self.events, event);
    }
}

/// Relays coordinator notifications to WebSocket subscribers.
pub(crate) struct BroadcastSink {
    events: broadcast::Sender<ServerEvent>,
}

impl BroadcastSink {
    pub(crate) fn new(events: broadcast::Sender<ServerEvent>) -> Self {
        Self { events }
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, notification: Notification) {
        publish(&self.events, ServerEvent::Notification(notification));
    }
}

fn publish(events: &broadcast::Sender<ServerEvent>, event: ServerEvent) {
    if events.send(event).is_err() {
        trace!("no event subscribers");
    }
}
