use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::TrackingError;
use crate::models::issue::{Issue, IssueAction, IssueReport, IssueSeverity, IssueStatus, IssueType};
use crate::models::position::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries/:id/issues", post(report_issue).get(list_issues))
        .route("/issues/:id", get(get_issue))
        .route("/issues/:id/acknowledge", post(acknowledge_issue))
        .route("/issues/:id/resolve", post(resolve_issue))
        .route("/issues/:id/escalate", post(escalate_issue))
        .route("/issues/:id/close", post(close_issue))
}

#[derive(Deserialize)]
pub struct ReportIssueRequest {
    pub issue_type: IssueType,
    pub reported_by: String,
    pub description: String,
    pub severity: IssueSeverity,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub photos: Vec<String>,
}

#[derive(Deserialize)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
}

#[derive(Deserialize)]
pub struct ActorRequest {
    pub actor: String,
}

#[derive(Deserialize)]
pub struct ResolutionRequest {
    pub resolver: String,
    pub resolution: String,
}

async fn report_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportIssueRequest>,
) -> Result<Json<Issue>, TrackingError> {
    let issue = state
        .engine
        .report_issue(IssueReport {
            delivery_id: id,
            issue_type: payload.issue_type,
            reported_by: payload.reported_by,
            description: payload.description,
            severity: payload.severity,
            location: payload.location,
            photos: payload.photos,
        })
        .await?;
    Ok(Json(issue))
}

async fn list_issues(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(filter): Query<IssueFilter>,
) -> Result<Json<Vec<Issue>>, TrackingError> {
    Ok(Json(state.engine.issues(id, filter.status).await?))
}

async fn get_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Issue>, TrackingError> {
    Ok(Json(state.engine.issue(id).await?))
}

async fn acknowledge_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<Issue>, TrackingError> {
    let action = IssueAction::Acknowledge {
        actor: payload.actor,
    };
    Ok(Json(state.engine.issue_action(id, action).await?))
}

async fn resolve_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResolutionRequest>,
) -> Result<Json<Issue>, TrackingError> {
    let action = IssueAction::Resolve {
        resolver: payload.resolver,
        resolution: payload.resolution,
    };
    Ok(Json(state.engine.issue_action(id, action).await?))
}

async fn escalate_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResolutionRequest>,
) -> Result<Json<Issue>, TrackingError> {
    let action = IssueAction::Escalate {
        resolver: payload.resolver,
        resolution: payload.resolution,
    };
    Ok(Json(state.engine.issue_action(id, action).await?))
}

async fn close_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<Issue>, TrackingError> {
    let action = IssueAction::Close {
        actor: payload.actor,
    };
    Ok(Json(state.engine.issue_action(id, action).await?))
}
