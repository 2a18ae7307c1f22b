use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::TrackingError;
use crate::geo::distance_m;
use crate::models::position::{PositionInput, PositionReport};

const MIN_PLAUSIBLE_KMH: f64 = 0.0;
const MAX_PLAUSIBLE_KMH: f64 = 100.0;

/// Append-only position ledger for a single delivery.
///
/// Reports older than the retention count are pruned from the front, but the
/// last accepted timestamp is tracked separately so pruning never reopens the
/// stale-timestamp window.
#[derive(Debug, Clone)]
pub struct PositionStore {
    reports: VecDeque<PositionReport>,
    last_timestamp: Option<DateTime<Utc>>,
    retention: usize,
}

impl PositionStore {
    pub fn new(retention: usize) -> Self {
        Self {
            reports: VecDeque::new(),
            last_timestamp: None,
            retention: retention.max(1),
        }
    }

    /// Validates a fix without storing it.
    pub fn check(
        &self,
        input: &PositionInput,
        now: DateTime<Utc>,
        max_clock_skew: Duration,
    ) -> Result<(), TrackingError> {
        if !input.point.is_valid() {
            return Err(TrackingError::InvalidInput(format!(
                "coordinates out of range: lat {}, lng {}",
                input.point.lat, input.point.lng
            )));
        }
        if input.accuracy.is_some_and(|a| !(a >= 0.0)) {
            return Err(TrackingError::InvalidInput(
                "accuracy must be a non-negative number of meters".to_string(),
            ));
        }
        if input.speed.is_some_and(|s| !(s >= 0.0)) {
            return Err(TrackingError::InvalidInput(
                "speed must be a non-negative number".to_string(),
            ));
        }
        if input.timestamp > now + max_clock_skew {
            return Err(TrackingError::InvalidInput(format!(
                "position timestamp {} is ahead of server time",
                input.timestamp
            )));
        }
        if let Some(last) = self.last_timestamp {
            if input.timestamp <= last {
                return Err(TrackingError::StaleTimestamp {
                    submitted: input.timestamp,
                    last,
                });
            }
        }
        Ok(())
    }

    pub fn record(
        &mut self,
        input: &PositionInput,
        now: DateTime<Utc>,
        max_clock_skew: Duration,
    ) -> Result<PositionReport, TrackingError> {
        self.check(input, now, max_clock_skew)?;

        let report = PositionReport {
            id: Uuid::new_v4(),
            delivery_id: input.delivery_id,
            point: input.point,
            accuracy: input.accuracy,
            heading: input.heading,
            speed: input.speed,
            altitude: input.altitude,
            timestamp: input.timestamp,
            metadata: input.metadata.clone(),
        };

        self.last_timestamp = Some(report.timestamp);
        self.reports.push_back(report.clone());
        while self.reports.len() > self.retention {
            self.reports.pop_front();
        }

        Ok(report)
    }

    pub fn latest(&self) -> Option<&PositionReport> {
        self.reports.back()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Most-recent-first view of at most `window` reports. The iterator is
    /// `Clone`, so a caller can walk it again from the start.
    pub fn history(&self, window: usize) -> impl Iterator<Item = &PositionReport> + Clone + '_ {
        self.reports.iter().rev().take(window)
    }

    /// Mean plausible speed (km/h) over the recent reports, or `None` with
    /// fewer than two samples.
    pub fn average_speed_kmh(&self, sample_size: usize, window: Duration) -> Option<f64> {
        let latest = self.latest()?;
        let cutoff = latest.timestamp - window;
        let recent: Vec<&PositionReport> = self
            .history(sample_size)
            .take_while(|report| report.timestamp >= cutoff)
            .collect();

        let reported: Vec<f64> = recent
            .iter()
            .filter_map(|report| report.speed)
            .map(|mps| mps * 3.6)
            .filter(|kmh| plausible(*kmh))
            .collect();

        let samples = if reported.len() >= 2 {
            reported
        } else {
            recent
                .windows(2)
                .filter_map(|pair| {
                    let hours = (pair[0].timestamp - pair[1].timestamp).num_milliseconds() as f64
                        / 3_600_000.0;
                    if hours <= 0.0 {
                        return None;
                    }
                    let km = distance_m(&pair[1].point, &pair[0].point) / 1000.0;
                    Some(km / hours)
                })
                .filter(|kmh| plausible(*kmh))
                .collect()
        };

        if samples.len() < 2 {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

fn plausible(kmh: f64) -> bool {
    kmh > MIN_PLAUSIBLE_KMH && kmh < MAX_PLAUSIBLE_KMH
}
