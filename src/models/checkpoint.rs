use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::position::{GeoPoint, Metadata};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CheckpointKind {
    Departure,
    Pickup,
    Waypoint,
    DeliveryAttempt,
    Delivery,
    ReturnPoint,
    Warehouse,
    Customs,
    Handoff,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProofOfCompletion {
    pub photo_url: Option<String>,
    pub signature_url: Option<String>,
    pub confirmation_code: Option<String>,
}

impl ProofOfCompletion {
    pub fn is_empty(&self) -> bool {
        self.photo_url.is_none() && self.signature_url.is_none() && self.confirmation_code.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub kind: CheckpointKind,
    pub point: GeoPoint,
    pub address: String,
    pub planned_at: Option<DateTime<Utc>>,
    /// Set once on completion and never changed afterwards.
    pub actual_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub notes: Option<String>,
    pub proof: ProofOfCompletion,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Checkpoint {
    pub fn is_completed(&self) -> bool {
        self.actual_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointPlan {
    pub delivery_id: Uuid,
    pub kind: CheckpointKind,
    pub point: GeoPoint,
    pub address: String,
    #[serde(default)]
    pub planned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointCompletion {
    pub checkpoint_id: Uuid,
    pub actual_at: DateTime<Utc>,
    pub completed_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub proof: ProofOfCompletion,
}

/// Proof-of-delivery submitted by the confirmation workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfirmation {
    pub delivery_id: Uuid,
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationCode {
    pub delivery_id: Uuid,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}
