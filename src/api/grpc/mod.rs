use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::models::event::{TrackingEvent, TrackingUpdate};
use crate::models::position::PositionInput;
use crate::models::status::{DeliveryStatus, StatusChange, StatusHistoryEntry};
use crate::state::AppState;

pub mod pb;

use pb::tracking_service_server::TrackingService;
use pb::{
    ApplyTransitionRequest, DeliveryRef, GeoPoint, PositionReply, RecordPositionRequest,
    StatusEntry, StatusReply, TrackingEventReply, WatchEventsRequest,
};

pub use pb::tracking_service_server::TrackingServiceServer;

pub struct GrpcTrackingService {
    state: Arc<AppState>,
}

impl GrpcTrackingService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(raw)
        .map_err(|err| Status::invalid_argument(format!("invalid {field}: {err}")))
}

fn entry_to_proto(entry: &StatusHistoryEntry) -> StatusEntry {
    StatusEntry {
        id: entry.id.to_string(),
        delivery_id: entry.delivery_id.to_string(),
        status: entry.status.to_string(),
        previous_status: entry.previous_status.to_string(),
        timestamp: entry.timestamp.to_rfc3339(),
        actor: entry.actor.clone(),
        note: entry.note.clone(),
        reason: entry.reason.clone(),
    }
}

fn event_to_proto(event: &TrackingEvent) -> Result<TrackingEventReply, serde_json::Error> {
    let payload_json = match &event.update {
        TrackingUpdate::LocationUpdate(report) => serde_json::to_string(report)?,
        TrackingUpdate::StatusUpdate(entry) => serde_json::to_string(entry)?,
        TrackingUpdate::EtaUpdate(record) => serde_json::to_string(record)?,
        TrackingUpdate::CheckpointPlanned(checkpoint)
        | TrackingUpdate::CheckpointReached(checkpoint) => serde_json::to_string(checkpoint)?,
        TrackingUpdate::IssueReported(issue)
        | TrackingUpdate::IssueUpdated(issue)
        | TrackingUpdate::IssueResolved(issue) => serde_json::to_string(issue)?,
        TrackingUpdate::SessionStarted(session) | TrackingUpdate::SessionEnded(session) => {
            serde_json::to_string(session)?
        }
    };

    Ok(TrackingEventReply {
        id: event.id.to_string(),
        delivery_id: event.delivery_id.to_string(),
        kind: event.update.kind().to_string(),
        timestamp: event.timestamp.to_rfc3339(),
        payload_json,
    })
}

#[tonic::async_trait]
impl TrackingService for GrpcTrackingService {
    async fn record_position(
        &self,
        request: Request<RecordPositionRequest>,
    ) -> Result<Response<PositionReply>, Status> {
        let req = request.into_inner();

        let delivery_id = parse_uuid("delivery_id", &req.delivery_id)?;
        let point = req
            .point
            .ok_or_else(|| Status::invalid_argument("point is required"))?;
        let timestamp = DateTime::parse_from_rfc3339(&req.timestamp)
            .map_err(|err| Status::invalid_argument(format!("invalid timestamp: {err}")))?
            .with_timezone(&Utc);

        let report = self
            .state
            .engine
            .record_position(PositionInput {
                delivery_id,
                point: crate::models::position::GeoPoint {
                    lat: point.lat,
                    lng: point.lng,
                },
                accuracy: req.accuracy,
                heading: req.heading,
                speed: req.speed,
                altitude: req.altitude,
                timestamp,
                metadata: Default::default(),
                telemetry: None,
            })
            .await?;

        Ok(Response::new(PositionReply {
            id: report.id.to_string(),
            delivery_id: report.delivery_id.to_string(),
            point: Some(GeoPoint {
                lat: report.point.lat,
                lng: report.point.lng,
            }),
            timestamp: report.timestamp.to_rfc3339(),
        }))
    }

    async fn apply_transition(
        &self,
        request: Request<ApplyTransitionRequest>,
    ) -> Result<Response<StatusEntry>, Status> {
        let req = request.into_inner();

        let delivery_id = parse_uuid("delivery_id", &req.delivery_id)?;
        let status: DeliveryStatus = req.status.parse().map_err(Status::invalid_argument)?;
        if req.actor.trim().is_empty() {
            return Err(Status::invalid_argument("actor cannot be empty"));
        }

        let entry = self
            .state
            .engine
            .apply_transition(StatusChange {
                delivery_id,
                status,
                actor: req.actor,
                location: None,
                note: req.note,
                reason: req.reason,
                notify_counterparty: req.notify_counterparty,
            })
            .await?;

        Ok(Response::new(entry_to_proto(&entry)))
    }

    async fn get_status(
        &self,
        request: Request<DeliveryRef>,
    ) -> Result<Response<StatusReply>, Status> {
        let delivery_id = parse_uuid("delivery_id", &request.into_inner().delivery_id)?;

        let session = self.state.engine.session(delivery_id).await?;
        let history = self.state.engine.status_history(delivery_id).await?;
        let status = history
            .last()
            .map(|entry| entry.status)
            .unwrap_or(DeliveryStatus::Created);

        Ok(Response::new(StatusReply {
            delivery_id: delivery_id.to_string(),
            status: status.to_string(),
            active: session.active,
            history: history.iter().map(entry_to_proto).collect(),
        }))
    }

    type WatchEventsStream =
        Pin<Box<dyn Stream<Item = Result<TrackingEventReply, Status>> + Send>>;

    async fn watch_events(
        &self,
        request: Request<WatchEventsRequest>,
    ) -> Result<Response<Self::WatchEventsStream>, Status> {
        let filter = match request.into_inner().delivery_id {
            Some(raw) => Some(parse_uuid("delivery_id", &raw)?),
            None => None,
        };

        let rx = self.state.engine.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
            Ok(event) if filter.is_none_or(|id| id == event.delivery_id) => {
                Some(event_to_proto(&event).map_err(|err| Status::internal(err.to_string())))
            }
            _ => None,
        });

        Ok(Response::new(Box::pin(stream)))
    }
}
