use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::position::{DeviceTelemetry, GeoPoint};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The delivery reached a terminal status.
    Completed,
    Paused,
    CarrierDisconnected,
    AdministrativeOverride,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSession {
    pub delivery_id: Uuid,
    pub carrier_id: Uuid,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<SessionEndReason>,
    pub destination: Option<GeoPoint>,
    pub telemetry: DeviceTelemetry,
}

impl TrackingSession {
    pub fn start(request: &SessionStart, now: DateTime<Utc>) -> Self {
        Self {
            delivery_id: request.delivery_id,
            carrier_id: request.carrier_id,
            active: true,
            started_at: now,
            last_update_at: now,
            ended_at: None,
            end_reason: None,
            destination: request.destination,
            telemetry: request.telemetry.clone().unwrap_or_default(),
        }
    }

    pub fn end(&mut self, reason: SessionEndReason, now: DateTime<Utc>) {
        self.active = false;
        self.ended_at = Some(now);
        self.end_reason = Some(reason);
        self.last_update_at = now;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_update_at {
            self.last_update_at = now;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStart {
    pub delivery_id: Uuid,
    pub carrier_id: Uuid,
    #[serde(default)]
    pub destination: Option<GeoPoint>,
    #[serde(default)]
    pub telemetry: Option<DeviceTelemetry>,
}
