use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TrackingError;
use crate::models::position::GeoPoint;
use crate::models::status::{DeliveryStatus, StatusHistoryEntry};

use DeliveryStatus::*;

pub fn allowed_transitions(from: DeliveryStatus) -> &'static [DeliveryStatus] {
    match from {
        Created => &[Assigned, Failed, Cancelled],
        Assigned => &[PickedUp, InTransit, Failed, Cancelled],
        PickedUp => &[InTransit, Failed, Cancelled],
        InTransit => &[DeliveryAttempt, Delivered, Failed, Cancelled],
        DeliveryAttempt => &[InTransit, Delivered, Failed, Cancelled],
        Delivered | Failed | Cancelled => &[],
    }
}

pub fn can_transition(from: DeliveryStatus, to: DeliveryStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// A transition that has been validated but not yet written.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub status: DeliveryStatus,
    pub actor: String,
    pub location: Option<GeoPoint>,
    pub note: Option<String>,
    pub reason: Option<String>,
    pub notify_counterparty: bool,
}

/// Append-only status history for one delivery.
#[derive(Debug, Clone)]
pub struct StatusLedger {
    delivery_id: Uuid,
    history: Vec<StatusHistoryEntry>,
}

impl StatusLedger {
    pub fn new(delivery_id: Uuid) -> Self {
        Self {
            delivery_id,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> DeliveryStatus {
        self.history
            .last()
            .map(|entry| entry.status)
            .unwrap_or(DeliveryStatus::Created)
    }

    pub fn history(&self) -> &[StatusHistoryEntry] {
        &self.history
    }

    pub fn check(&self, to: DeliveryStatus) -> Result<(), TrackingError> {
        let from = self.current();
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(TrackingError::InvalidTransition { from, to })
        }
    }

    pub fn apply(
        &mut self,
        request: TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<StatusHistoryEntry, TrackingError> {
        self.check(request.status)?;

        let entry = StatusHistoryEntry {
            id: Uuid::new_v4(),
            delivery_id: self.delivery_id,
            status: request.status,
            previous_status: self.current(),
            timestamp: now,
            actor: request.actor,
            location: request.location,
            note: request.note,
            reason: request.reason,
            counterparty_notified: request.notify_counterparty,
        };

        self.history.push(entry.clone());
        Ok(entry)
    }
}
