use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::position::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    Created,
    Assigned,
    PickedUp,
    InTransit,
    DeliveryAttempt,
    Delivered,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Failed | DeliveryStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Created => "created",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::DeliveryAttempt => "delivery_attempt",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let status = match raw {
            "created" | "Created" => DeliveryStatus::Created,
            "assigned" | "Assigned" => DeliveryStatus::Assigned,
            "picked_up" | "PickedUp" => DeliveryStatus::PickedUp,
            "in_transit" | "InTransit" => DeliveryStatus::InTransit,
            "delivery_attempt" | "DeliveryAttempt" => DeliveryStatus::DeliveryAttempt,
            "delivered" | "Delivered" => DeliveryStatus::Delivered,
            "failed" | "Failed" => DeliveryStatus::Failed,
            "cancelled" | "Cancelled" => DeliveryStatus::Cancelled,
            other => return Err(format!("unknown delivery status: {other}")),
        };
        Ok(status)
    }
}

/// One accepted transition. The history for a delivery is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub status: DeliveryStatus,
    pub previous_status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub location: Option<GeoPoint>,
    pub note: Option<String>,
    pub reason: Option<String>,
    pub counterparty_notified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub delivery_id: Uuid,
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
