//! API route definitions.

use super::state::AppState;
use crate::commands::{handle_command, CommandRequest};
use crate::platform::PlatformEvent;
use axum::extract::State;
use axum::{routing::get, routing::post, Json, Router};
use serde_json::{json, Value};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/incidents", get(list_incidents))
        .route("/events", post(ingest_event))
        .route("/commands", post(run_command))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.watchdog.status() }))
}

async fn list_incidents(State(state): State<AppState>) -> Json<Value> {
    match state.watchdog.incidents().list_recent(50) {
        Ok(incidents) => {
            let total = incidents.len();
            Json(json!({ "data": incidents, "meta": { "total": total } }))
        }
        Err(e) => Json(json!({ "data": [], "meta": { "error": e.to_string() } })),
    }
}

/// Gateway bridge delivers platform events here; handling runs inline
/// so a reply means the detection path has completed.
async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<PlatformEvent>,
) -> Json<Value> {
    state.watchdog.handle_event(event).await;
    Json(json!({ "data": { "accepted": true } }))
}

async fn run_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Json<Value> {
    let reply = handle_command(&state.watchdog, req).await;
    Json(json!({ "data": reply }))
}
