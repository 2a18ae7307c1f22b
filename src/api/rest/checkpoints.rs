use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::TrackingError;
use crate::models::checkpoint::{
    Checkpoint, CheckpointCompletion, CheckpointKind, CheckpointPlan, ConfirmationCode,
    DeliveryConfirmation, ProofOfCompletion,
};
use crate::models::position::{GeoPoint, Metadata};
use crate::models::status::StatusHistoryEntry;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/deliveries/:id/checkpoints",
            post(plan_checkpoint).get(list_checkpoints),
        )
        .route("/checkpoints/:id/complete", post(complete_checkpoint))
        .route("/deliveries/:id/confirmation-code", post(issue_confirmation_code))
        .route("/deliveries/:id/confirm", post(confirm_delivery))
}

#[derive(Deserialize)]
pub struct PlanCheckpointRequest {
    pub kind: CheckpointKind,
    pub point: GeoPoint,
    pub address: String,
    #[serde(default)]
    pub planned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Deserialize)]
pub struct CompleteCheckpointRequest {
    #[serde(default)]
    pub actual_at: Option<DateTime<Utc>>,
    pub completed_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub proof: ProofOfCompletion,
}

#[derive(Deserialize)]
pub struct ConfirmDeliveryRequest {
    pub confirmed_by: String,
    #[serde(default)]
    pub confirmation_code: Option<String>,
    #[serde(default)]
    pub signature_url: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub notes: Option<String>,
}

async fn plan_checkpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PlanCheckpointRequest>,
) -> Result<Json<Checkpoint>, TrackingError> {
    let checkpoint = state
        .engine
        .plan_checkpoint(CheckpointPlan {
            delivery_id: id,
            kind: payload.kind,
            point: payload.point,
            address: payload.address,
            planned_at: payload.planned_at,
            metadata: payload.metadata,
        })
        .await?;
    Ok(Json(checkpoint))
}

async fn list_checkpoints(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Checkpoint>>, TrackingError> {
    Ok(Json(state.engine.checkpoints(id).await?))
}

async fn complete_checkpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteCheckpointRequest>,
) -> Result<Json<Checkpoint>, TrackingError> {
    let checkpoint = state
        .engine
        .complete_checkpoint(CheckpointCompletion {
            checkpoint_id: id,
            actual_at: payload.actual_at.unwrap_or_else(Utc::now),
            completed_by: payload.completed_by,
            notes: payload.notes,
            proof: payload.proof,
        })
        .await?;
    Ok(Json(checkpoint))
}

async fn issue_confirmation_code(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConfirmationCode>, TrackingError> {
    Ok(Json(state.engine.issue_confirmation_code(id).await?))
}

async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmDeliveryRequest>,
) -> Result<Json<StatusHistoryEntry>, TrackingError> {
    let entry = state
        .engine
        .confirm_delivery(DeliveryConfirmation {
            delivery_id: id,
            confirmed_by: payload.confirmed_by,
            confirmation_code: payload.confirmation_code,
            signature_url: payload.signature_url,
            photo_url: payload.photo_url,
            location: payload.location,
            notes: payload.notes,
        })
        .await?;
    Ok(Json(entry))
}
