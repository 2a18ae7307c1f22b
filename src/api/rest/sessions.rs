use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::TrackingError;
use crate::models::session::{SessionEndReason, SessionStart, TrackingSession};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/:delivery_id", get(get_session))
        .route("/sessions/:delivery_id/end", post(end_session))
        .route("/carriers/:carrier_id/sessions", get(carrier_sessions))
}

#[derive(Deserialize)]
pub struct EndSessionRequest {
    pub reason: SessionEndReason,
    pub actor: String,
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionStart>,
) -> Result<Json<TrackingSession>, TrackingError> {
    let session = state.engine.start_session(payload).await?;
    Ok(Json(session))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(delivery_id): Path<Uuid>,
) -> Result<Json<TrackingSession>, TrackingError> {
    Ok(Json(state.engine.session(delivery_id).await?))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(delivery_id): Path<Uuid>,
    Json(payload): Json<EndSessionRequest>,
) -> Result<Json<TrackingSession>, TrackingError> {
    if payload.actor.trim().is_empty() {
        return Err(TrackingError::InvalidInput("actor cannot be empty".to_string()));
    }

    let session = state
        .engine
        .end_session(delivery_id, payload.reason, &payload.actor)
        .await?;
    Ok(Json(session))
}

async fn carrier_sessions(
    State(state): State<Arc<AppState>>,
    Path(carrier_id): Path<Uuid>,
) -> Json<Vec<TrackingSession>> {
    Json(state.engine.sessions_for_carrier(carrier_id).await)
}
