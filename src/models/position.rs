use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form key/value bag attached to reports, checkpoints and ETA records.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NetworkClass {
    Wifi,
    Cellular5g,
    Cellular4g,
    Cellular3g,
    Cellular2g,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceTelemetry {
    pub battery_level: Option<u8>,
    pub network: Option<NetworkClass>,
}

/// An accepted position fix. Never mutated once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub point: GeoPoint,
    /// Horizontal accuracy radius in meters.
    pub accuracy: Option<f64>,
    /// Degrees clockwise from true north.
    pub heading: Option<f64>,
    /// Ground speed in meters per second.
    pub speed: Option<f64>,
    /// Meters above sea level.
    pub altitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A position fix as submitted by the carrier device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInput {
    pub delivery_id: Uuid,
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
