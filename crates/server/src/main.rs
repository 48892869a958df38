use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use coordinator::{motion::simulate_motion, ApiContext, DispatchPolicy};
use rand::{rngs::StdRng, Rng, SeedableRng};
use shared::{domain::FloorPlan, protocol::ServerEvent};
use storage::{seed::default_floor_plans, Storage};
use tokio::{
    sync::broadcast,
    time::{interval, MissedTickBehavior},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use api::build_router;
use app_state::{AppState, BroadcastSink};
use config::{load_floor_plans, load_settings, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let floors = match &settings.floor_plan_path {
        Some(path) => load_floor_plans(path)?,
        None => default_floor_plans(),
    };
    info!(
        floors = floors.len(),
        seed_demo_data = settings.seed_demo_data,
        cancel_policy = ?settings.cancel_policy,
        "dispatch state initialised"
    );

    let (events, _) = broadcast::channel(256);
    let state = Arc::new(build_state(&settings, floors, events));

    if settings.motion_interval_ms > 0 {
        tokio::spawn(run_motion(
            state.clone(),
            Duration::from_millis(settings.motion_interval_ms),
            settings.motion_jitter,
            StdRng::from_entropy(),
        ));
    }

    let app = build_router(state, settings.max_body_bytes);
    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.bind_addr))?;
    info!(%addr, "dispatch server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_state(
    settings: &Settings,
    floors: Vec<FloorPlan>,
    events: broadcast::Sender<ServerEvent>,
) -> AppState {
    let storage = if settings.seed_demo_data {
        Storage::with_demo_data()
    } else {
        Storage::default()
    };
    let notifier = Arc::new(BroadcastSink::new(events.clone()));
    let api = ApiContext::new(storage, floors, notifier).with_policy(DispatchPolicy {
        cancel: settings.cancel_policy,
    });
    AppState { api, events }
}

/// Fixed-rate motion timer. Each tick commits through the coordinator and
/// announces the new revision when anything moved.
async fn run_motion<R: Rng + Send>(
    state: Arc<AppState>,
    period: Duration,
    jitter: f64,
    mut rng: R,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let moved = simulate_motion(&state.api, &mut rng, jitter).await;
        if moved > 0 {
            let revision = state.api.storage.revision().await;
            state.publish(ServerEvent::PositionsMoved { revision, moved });
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
