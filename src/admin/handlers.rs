use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::resilience::circuit_breaker::CircuitSnapshot;
use crate::scheduler::{KeyStatus, SchedulerSnapshot};
use crate::transport::Transport;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub visible: bool,
    pub polls: usize,
    pub paused: usize,
    pub cache_entries: usize,
    pub in_flight: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Visibility {
    pub visible: bool,
}

pub async fn get_status<P: Transport>(State(state): State<AdminState<P>>) -> Json<SystemStatus> {
    let snapshot = state.scheduler.debug_snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        visible: snapshot.visible,
        polls: snapshot.keys.len(),
        paused: snapshot.keys.iter().filter(|k| !k.enabled).count(),
        cache_entries: snapshot.cache_entries,
        in_flight: snapshot.in_flight,
    })
}

pub async fn get_polls<P: Transport>(State(state): State<AdminState<P>>) -> Json<SchedulerSnapshot> {
    Json(state.scheduler.debug_snapshot())
}

pub async fn get_poll<P: Transport>(
    State(state): State<AdminState<P>>,
    Path(key): Path<String>,
) -> Result<Json<KeyStatus>, StatusCode> {
    state
        .scheduler
        .key_status(&key)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn stop_poll<P: Transport>(
    State(state): State<AdminState<P>>,
    Path(key): Path<String>,
) -> StatusCode {
    if state.scheduler.stop_polling(&key) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn restart_poll<P: Transport>(
    State(state): State<AdminState<P>>,
    Path(key): Path<String>,
) -> Result<Json<KeyStatus>, StatusCode> {
    if !state.scheduler.restart(&key) {
        return Err(StatusCode::NOT_FOUND);
    }
    state
        .scheduler
        .key_status(&key)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_circuits<P: Transport>(
    State(state): State<AdminState<P>>,
) -> Json<Vec<CircuitSnapshot>> {
    Json(state.breakers.snapshots())
}

pub async fn set_visibility<P: Transport>(
    State(state): State<AdminState<P>>,
    Json(body): Json<Visibility>,
) -> Json<Visibility> {
    state.scheduler.set_visible(body.visible);
    Json(Visibility {
        visible: state.scheduler.is_visible(),
    })
}

pub async fn clear_cache<P: Transport>(State(state): State<AdminState<P>>) -> StatusCode {
    state.scheduler.clear_cache();
    StatusCode::NO_CONTENT
}
