use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::checkpoint::{Checkpoint, CheckpointCompletion, CheckpointPlan, DeliveryConfirmation};
use crate::models::eta::{EtaOverride, EtaRecord, TrafficHint};
use crate::models::issue::{Issue, IssueCommand, IssueReport, IssueSeverity};
use crate::models::position::{PositionInput, PositionReport};
use crate::models::session::TrackingSession;
use crate::models::status::{StatusChange, StatusHistoryEntry};

/// Everything the engine accepts through `TrackingEngine::ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Position(PositionInput),
    Status(StatusChange),
    PlanCheckpoint(CheckpointPlan),
    CompleteCheckpoint(CheckpointCompletion),
    ConfirmDelivery(DeliveryConfirmation),
    TrafficHint { delivery_id: Uuid, hint: TrafficHint },
    EtaOverride(EtaOverride),
    ReportIssue(IssueReport),
    Issue(IssueCommand),
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Position(_) => "position",
            InboundEvent::Status(_) => "status",
            InboundEvent::PlanCheckpoint(_) => "plan_checkpoint",
            InboundEvent::CompleteCheckpoint(_) => "complete_checkpoint",
            InboundEvent::ConfirmDelivery(_) => "confirm_delivery",
            InboundEvent::TrafficHint { .. } => "traffic_hint",
            InboundEvent::EtaOverride(_) => "eta_override",
            InboundEvent::ReportIssue(_) => "report_issue",
            InboundEvent::Issue(_) => "issue",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum TrackingUpdate {
    LocationUpdate(PositionReport),
    StatusUpdate(StatusHistoryEntry),
    EtaUpdate(EtaRecord),
    CheckpointPlanned(Checkpoint),
    CheckpointReached(Checkpoint),
    IssueReported(Issue),
    IssueUpdated(Issue),
    IssueResolved(Issue),
    SessionStarted(TrackingSession),
    SessionEnded(TrackingSession),
}

impl TrackingUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            TrackingUpdate::LocationUpdate(_) => "location-update",
            TrackingUpdate::StatusUpdate(_) => "status-update",
            TrackingUpdate::EtaUpdate(_) => "eta-update",
            TrackingUpdate::CheckpointPlanned(_) => "checkpoint-planned",
            TrackingUpdate::CheckpointReached(_) => "checkpoint-reached",
            TrackingUpdate::IssueReported(_) => "issue-reported",
            TrackingUpdate::IssueUpdated(_) => "issue-updated",
            TrackingUpdate::IssueResolved(_) => "issue-resolved",
            TrackingUpdate::SessionStarted(_) => "session-started",
            TrackingUpdate::SessionEnded(_) => "session-ended",
        }
    }
}

/// Outbound event published for notification and read-model collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub update: TrackingUpdate,
}

impl TrackingEvent {
    pub fn new(delivery_id: Uuid, timestamp: DateTime<Utc>, update: TrackingUpdate) -> Self {
        Self {
            id: Uuid::new_v4(),
            delivery_id,
            timestamp,
            update,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recipient {
    Counterparty,
    Carrier,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationPriority {
    Normal,
    High,
}

/// Title/body/data handed to the external notification dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub delivery_id: Uuid,
    pub recipient: Recipient,
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAlert {
    pub delivery_id: Uuid,
    pub issue_id: Uuid,
    pub severity: IssueSeverity,
    pub title: String,
    pub body: String,
}
