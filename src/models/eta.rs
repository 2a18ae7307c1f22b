use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::position::Metadata;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EtaMethod {
    LivePositional,
    HistoricalPattern,
    ManualOverride,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrafficCondition {
    Light,
    Moderate,
    Heavy,
    Severe,
    #[serde(other)]
    Unknown,
}

impl TrafficCondition {
    /// Nominal travel speed assumed for the condition, in km/h.
    pub fn nominal_speed_kmh(self) -> Option<f64> {
        match self {
            TrafficCondition::Light => Some(40.0),
            TrafficCondition::Moderate => Some(30.0),
            TrafficCondition::Heavy => Some(15.0),
            TrafficCondition::Severe => Some(8.0),
            TrafficCondition::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtaRecord {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub estimated_arrival: DateTime<Utc>,
    pub previous_estimate: Option<DateTime<Utc>>,
    pub computed_at: DateTime<Utc>,
    pub method: EtaMethod,
    /// Meters to the next stop, when a position was available.
    pub remaining_distance: Option<f64>,
    pub traffic: TrafficCondition,
    pub confidence: f64,
    pub overridden_by: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtaView {
    pub record: EtaRecord,
    pub is_late: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrafficHint {
    pub condition: TrafficCondition,
    /// Explicit speed in km/h; falls back to the condition's nominal speed.
    #[serde(default)]
    pub speed_kmh: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtaOverride {
    pub delivery_id: Uuid,
    pub estimated_arrival: DateTime<Utc>,
    pub overridden_by: String,
    #[serde(default)]
    pub note: Option<String>,
}
