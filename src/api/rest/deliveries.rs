use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrackingError;
use crate::geo::BoundingBox;
use crate::models::eta::{EtaOverride, EtaRecord, EtaView, TrafficHint};
use crate::models::position::{DeviceTelemetry, GeoPoint, Metadata, PositionInput, PositionReport};
use crate::models::status::{DeliveryStatus, StatusChange, StatusHistoryEntry};
use crate::state::AppState;

const DEFAULT_HISTORY_WINDOW: usize = 50;
const MAX_HISTORY_WINDOW: usize = 1_000;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/deliveries/:id/positions",
            post(record_position).get(position_history),
        )
        .route("/deliveries/:id/positions/latest", get(latest_position))
        .route("/deliveries/:id/status", post(apply_transition).get(current_status))
        .route("/deliveries/:id/status/history", get(status_history))
        .route("/deliveries/:id/eta", get(current_eta))
        .route("/deliveries/:id/eta/history", get(eta_history))
        .route("/deliveries/:id/eta/hint", post(traffic_hint))
        .route("/deliveries/:id/eta/override", post(override_eta))
        .route("/bounds", get(active_bounds))
}

#[derive(Deserialize)]
pub struct RecordPositionRequest {
    pub point: GeoPoint,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub telemetry: Option<DeviceTelemetry>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub window: Option<usize>,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: DeliveryStatus,
    pub actor: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notify_counterparty: bool,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub delivery_id: Uuid,
    pub status: DeliveryStatus,
}

#[derive(Deserialize)]
pub struct OverrideRequest {
    pub estimated_arrival: DateTime<Utc>,
    pub overridden_by: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct BoundsQuery {
    pub carrier_id: Option<Uuid>,
}

async fn record_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordPositionRequest>,
) -> Result<Json<PositionReport>, TrackingError> {
    let report = state
        .engine
        .record_position(PositionInput {
            delivery_id: id,
            point: payload.point,
            accuracy: payload.accuracy,
            heading: payload.heading,
            speed: payload.speed,
            altitude: payload.altitude,
            timestamp: payload.timestamp,
            metadata: payload.metadata,
            telemetry: payload.telemetry,
        })
        .await?;
    Ok(Json(report))
}

async fn position_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PositionReport>>, TrackingError> {
    let window = query
        .window
        .unwrap_or(DEFAULT_HISTORY_WINDOW)
        .min(MAX_HISTORY_WINDOW);
    Ok(Json(state.engine.position_history(id, window).await?))
}

async fn latest_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PositionReport>, TrackingError> {
    Ok(Json(state.engine.latest_position(id).await?))
}

async fn apply_transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<StatusHistoryEntry>, TrackingError> {
    if payload.actor.trim().is_empty() {
        return Err(TrackingError::InvalidInput("actor cannot be empty".to_string()));
    }

    let entry = state
        .engine
        .apply_transition(StatusChange {
            delivery_id: id,
            status: payload.status,
            actor: payload.actor,
            location: payload.location,
            note: payload.note,
            reason: payload.reason,
            notify_counterparty: payload.notify_counterparty,
        })
        .await?;
    Ok(Json(entry))
}

async fn current_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, TrackingError> {
    let status = state.engine.current_status(id).await?;
    Ok(Json(StatusResponse {
        delivery_id: id,
        status,
    }))
}

async fn status_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusHistoryEntry>>, TrackingError> {
    Ok(Json(state.engine.status_history(id).await?))
}

async fn current_eta(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<EtaView>, TrackingError> {
    Ok(Json(state.engine.current_eta(id).await?))
}

async fn eta_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EtaRecord>>, TrackingError> {
    Ok(Json(state.engine.eta_history(id).await?))
}

async fn traffic_hint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TrafficHint>,
) -> Result<Json<EtaRecord>, TrackingError> {
    Ok(Json(state.engine.apply_traffic_hint(id, payload).await?))
}

async fn override_eta(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OverrideRequest>,
) -> Result<Json<EtaRecord>, TrackingError> {
    let record = state
        .engine
        .override_eta(EtaOverride {
            delivery_id: id,
            estimated_arrival: payload.estimated_arrival,
            overridden_by: payload.overridden_by,
            note: payload.note,
        })
        .await?;
    Ok(Json(record))
}

async fn active_bounds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BoundsQuery>,
) -> Json<Option<BoundingBox>> {
    Json(state.engine.active_bounding_box(query.carrier_id).await)
}
