use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TrackingConfig;
use crate::geo::{distance_m, transit_seconds, within_radius};
use crate::models::eta::{EtaMethod, EtaOverride, EtaRecord, TrafficCondition, TrafficHint};
use crate::models::position::{GeoPoint, Metadata, PositionReport};

const LIVE_BASE_CONFIDENCE: f64 = 0.9;
const HISTORICAL_BASE_CONFIDENCE: f64 = 0.75;
/// Accuracy assumed when a fix does not report one, in meters.
const UNREPORTED_ACCURACY_M: f64 = 100.0;
const MIN_CONFIDENCE: f64 = 0.05;

/// Everything a recomputation looks at. Built from a ledger snapshot so the
/// estimator itself stays free of state.
#[derive(Debug, Clone)]
pub struct EtaInputs<'a> {
    pub delivery_id: Uuid,
    pub position: &'a PositionReport,
    pub target: GeoPoint,
    pub hint: Option<TrafficHint>,
    pub historical_speed_kmh: Option<f64>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EtaEstimator {
    default_speed_kmh: f64,
}

impl EtaEstimator {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            default_speed_kmh: config.default_speed_kmh,
        }
    }

    /// `None` when no usable speed is known or the arrival time is out of range.
    pub fn estimate(&self, inputs: &EtaInputs<'_>) -> Option<EtaRecord> {
        let remaining = distance_m(&inputs.position.point, &inputs.target);
        let (speed_kmh, method, traffic) = self.select_speed(inputs);
        let seconds = transit_seconds(remaining, speed_kmh)?;
        let travel = Duration::try_milliseconds((seconds * 1000.0).round() as i64)?;
        let estimated_arrival = inputs.now.checked_add_signed(travel)?;

        let mut metadata = Metadata::new();
        metadata.insert("assumed_speed_kmh".to_string(), speed_kmh.into());

        Some(EtaRecord {
            id: Uuid::new_v4(),
            delivery_id: inputs.delivery_id,
            estimated_arrival,
            previous_estimate: None,
            computed_at: inputs.now,
            method,
            remaining_distance: Some(remaining),
            traffic,
            confidence: confidence(method, inputs.position.accuracy, traffic),
            overridden_by: None,
            metadata,
        })
    }

    fn select_speed(&self, inputs: &EtaInputs<'_>) -> (f64, EtaMethod, TrafficCondition) {
        if let Some(hint) = inputs.hint {
            let speed = hint
                .speed_kmh
                .filter(|s| *s > 0.0)
                .or_else(|| hint.condition.nominal_speed_kmh())
                .unwrap_or(self.default_speed_kmh);
            return (speed, EtaMethod::LivePositional, hint.condition);
        }
        if let Some(speed) = inputs.historical_speed_kmh {
            return (speed, EtaMethod::HistoricalPattern, traffic_from_speed(speed));
        }
        (
            self.default_speed_kmh,
            EtaMethod::LivePositional,
            TrafficCondition::Unknown,
        )
    }

    pub fn manual(
        &self,
        request: &EtaOverride,
        remaining_distance: Option<f64>,
        traffic: TrafficCondition,
        now: DateTime<Utc>,
    ) -> EtaRecord {
        let mut metadata = Metadata::new();
        if let Some(note) = &request.note {
            metadata.insert("note".to_string(), note.clone().into());
        }

        EtaRecord {
            id: Uuid::new_v4(),
            delivery_id: request.delivery_id,
            estimated_arrival: request.estimated_arrival,
            previous_estimate: None,
            computed_at: now,
            method: EtaMethod::ManualOverride,
            remaining_distance,
            traffic,
            confidence: 1.0,
            overridden_by: Some(request.overridden_by.clone()),
            metadata,
        }
    }
}

pub fn traffic_from_speed(speed_kmh: f64) -> TrafficCondition {
    if speed_kmh > 40.0 {
        TrafficCondition::Light
    } else if speed_kmh < 20.0 {
        TrafficCondition::Heavy
    } else {
        TrafficCondition::Moderate
    }
}

/// Confidence in `[MIN_CONFIDENCE, 1]`. Never increases as the accuracy radius
/// grows or as traffic gets heavier.
pub fn confidence(method: EtaMethod, accuracy_m: Option<f64>, traffic: TrafficCondition) -> f64 {
    let base = match method {
        EtaMethod::ManualOverride => return 1.0,
        EtaMethod::LivePositional => LIVE_BASE_CONFIDENCE,
        EtaMethod::HistoricalPattern => HISTORICAL_BASE_CONFIDENCE,
    };

    let accuracy = accuracy_m.unwrap_or(UNREPORTED_ACCURACY_M).max(0.0);
    let accuracy_factor = 100.0 / (100.0 + accuracy);

    let traffic_factor = match traffic {
        TrafficCondition::Light => 1.0,
        TrafficCondition::Moderate => 0.95,
        TrafficCondition::Unknown => 0.9,
        TrafficCondition::Heavy => 0.8,
        TrafficCondition::Severe => 0.65,
    };

    (base * accuracy_factor * traffic_factor).clamp(MIN_CONFIDENCE, 1.0)
}

/// Append-only log of ETA computations; the last entry is current.
#[derive(Debug, Clone, Default)]
pub struct EtaLog {
    records: Vec<EtaRecord>,
}

impl EtaLog {
    pub fn current(&self) -> Option<&EtaRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[EtaRecord] {
        &self.records
    }

    pub fn is_pinned(&self) -> bool {
        self.current()
            .is_some_and(|r| r.method == EtaMethod::ManualOverride)
    }

    pub fn push(&mut self, mut record: EtaRecord) -> EtaRecord {
        record.previous_estimate = self.current().map(|r| r.estimated_arrival);
        self.records.push(record.clone());
        record
    }

    pub fn is_late(&self, now: DateTime<Utc>) -> bool {
        self.current().is_some_and(|r| now > r.estimated_arrival)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProximityLevel {
    Approaching,
    Nearby,
    Arrived,
}

impl ProximityLevel {
    pub fn classify(point: &GeoPoint, destination: &GeoPoint, config: &TrackingConfig) -> Option<Self> {
        if within_radius(destination, point, config.arrived_radius_m) {
            Some(ProximityLevel::Arrived)
        } else if within_radius(destination, point, config.nearby_radius_m) {
            Some(ProximityLevel::Nearby)
        } else if within_radius(destination, point, config.approaching_radius_m) {
            Some(ProximityLevel::Approaching)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{confidence, EtaEstimator, EtaInputs, EtaLog, ProximityLevel};
    use crate::config::TrackingConfig;
    use crate::models::eta::{EtaMethod, EtaOverride, TrafficCondition, TrafficHint};
    use crate::models::position::{GeoPoint, PositionReport};

    fn report(point: GeoPoint, accuracy: Option<f64>) -> PositionReport {
        PositionReport {
            id: Uuid::new_v4(),
            delivery_id: Uuid::new_v4(),
            point,
            accuracy,
            heading: None,
            speed: None,
            altitude: None,
            timestamp: Utc::now(),
            metadata: Default::default(),
        }
    }

    /// A target 2.1 km due north of the start.
    fn points() -> (GeoPoint, GeoPoint) {
        let start = GeoPoint::new(48.0, 2.0);
        let target = GeoPoint::new(48.0 + 2_100.0 / 111_195.0, 2.0);
        (start, target)
    }

    #[test]
    fn default_speed_projects_about_four_minutes_for_2_1_km() {
        let estimator = EtaEstimator::new(&TrackingConfig::default());
        let (start, target) = points();
        let position = report(start, Some(5.0));
        let now = Utc::now();

        let record = estimator
            .estimate(&EtaInputs {
                delivery_id: position.delivery_id,
                position: &position,
                target,
                hint: None,
                historical_speed_kmh: None,
                now,
            })
            .unwrap();

        let seconds = (record.estimated_arrival - now).num_seconds();
        assert!((250..=254).contains(&seconds), "eta was {seconds}s");
        assert_eq!(record.method, EtaMethod::LivePositional);
        assert!((record.remaining_distance.unwrap() - 2_100.0).abs() < 5.0);
    }

    #[test]
    fn traffic_hint_overrides_historical_speed() {
        let estimator = EtaEstimator::new(&TrackingConfig::default());
        let (start, target) = points();
        let position = report(start, Some(5.0));
        let now = Utc::now();

        let record = estimator
            .estimate(&EtaInputs {
                delivery_id: position.delivery_id,
                position: &position,
                target,
                hint: Some(TrafficHint {
                    condition: TrafficCondition::Heavy,
                    speed_kmh: None,
                }),
                historical_speed_kmh: Some(45.0),
                now,
            })
            .unwrap();

        // 2.1 km at 15 km/h
        let seconds = (record.estimated_arrival - now).num_seconds();
        assert!((502..=506).contains(&seconds), "eta was {seconds}s");
        assert_eq!(record.traffic, TrafficCondition::Heavy);
    }

    #[test]
    fn historical_speed_is_tagged() {
        let estimator = EtaEstimator::new(&TrackingConfig::default());
        let (start, target) = points();
        let position = report(start, None);

        let record = estimator
            .estimate(&EtaInputs {
                delivery_id: position.delivery_id,
                position: &position,
                target,
                hint: None,
                historical_speed_kmh: Some(45.0),
                now: Utc::now(),
            })
            .unwrap();

        assert_eq!(record.method, EtaMethod::HistoricalPattern);
        assert_eq!(record.traffic, TrafficCondition::Light);
    }

    #[test]
    fn vanishing_hinted_speed_yields_no_estimate() {
        let estimator = EtaEstimator::new(&TrackingConfig::default());
        let (start, target) = points();
        let position = report(start, Some(5.0));

        let record = estimator.estimate(&EtaInputs {
            delivery_id: position.delivery_id,
            position: &position,
            target,
            hint: Some(TrafficHint {
                condition: TrafficCondition::Heavy,
                speed_kmh: Some(1e-12),
            }),
            historical_speed_kmh: None,
            now: Utc::now(),
        });

        assert!(record.is_none());
    }

    #[test]
    fn confidence_never_rises_as_accuracy_worsens() {
        let mut previous = f64::INFINITY;
        for accuracy in [0.0, 3.0, 10.0, 25.0, 50.0, 100.0, 500.0, 5_000.0] {
            let value = confidence(
                EtaMethod::LivePositional,
                Some(accuracy),
                TrafficCondition::Moderate,
            );
            assert!(value <= previous);
            assert!((0.0..=1.0).contains(&value));
            previous = value;
        }
    }

    #[test]
    fn heavier_traffic_lowers_confidence() {
        let light = confidence(EtaMethod::LivePositional, Some(10.0), TrafficCondition::Light);
        let heavy = confidence(EtaMethod::LivePositional, Some(10.0), TrafficCondition::Heavy);
        assert!(heavy < light);
    }

    #[test]
    fn manual_override_has_full_confidence_and_keeps_previous() {
        let estimator = EtaEstimator::new(&TrackingConfig::default());
        let mut log = EtaLog::default();
        let now = Utc::now();
        let delivery_id = Uuid::new_v4();

        let first = estimator.manual(
            &EtaOverride {
                delivery_id,
                estimated_arrival: now + Duration::minutes(20),
                overridden_by: "ops".to_string(),
                note: None,
            },
            None,
            TrafficCondition::Unknown,
            now,
        );
        log.push(first.clone());

        let second = log.push(estimator.manual(
            &EtaOverride {
                delivery_id,
                estimated_arrival: now + Duration::minutes(35),
                overridden_by: "ops".to_string(),
                note: Some("road closure".to_string()),
            },
            None,
            TrafficCondition::Unknown,
            now,
        ));

        assert_eq!(second.confidence, 1.0);
        assert_eq!(second.method, EtaMethod::ManualOverride);
        assert_eq!(second.previous_estimate, Some(first.estimated_arrival));
        assert!(log.is_pinned());
        assert_eq!(log.records().len(), 2);
        assert!(!log.is_late(now));
        assert!(log.is_late(now + Duration::minutes(36)));
    }

    #[test]
    fn proximity_levels() {
        let config = TrackingConfig::default();
        let destination = GeoPoint::new(48.0, 2.0);
        let north = |meters: f64| GeoPoint::new(48.0 + meters / 111_195.0, 2.0);

        assert_eq!(
            ProximityLevel::classify(&north(30.0), &destination, &config),
            Some(ProximityLevel::Arrived)
        );
        assert_eq!(
            ProximityLevel::classify(&north(400.0), &destination, &config),
            Some(ProximityLevel::Nearby)
        );
        assert_eq!(
            ProximityLevel::classify(&north(1_500.0), &destination, &config),
            Some(ProximityLevel::Approaching)
        );
        assert_eq!(ProximityLevel::classify(&north(2_500.0), &destination, &config), None);
    }
}
