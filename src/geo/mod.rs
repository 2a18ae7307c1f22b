use serde::{Deserialize, Serialize};

use crate::models::position::GeoPoint;

/// Mean Earth radius (IUGG), meters.
pub const EARTH_RADIUS_M: f64 = 6_371_009.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

/// Great-circle distance in meters (haversine on a spherical Earth).
pub fn distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * central_angle
}

pub fn within_radius(center: &GeoPoint, point: &GeoPoint, radius_m: f64) -> bool {
    distance_m(center, point) <= radius_m
}

pub fn bounding_box<'a, I>(points: I) -> Option<BoundingBox>
where
    I: IntoIterator<Item = &'a GeoPoint>,
{
    points.into_iter().fold(None, |acc, p| {
        Some(match acc {
            None => BoundingBox {
                min_lat: p.lat,
                min_lng: p.lng,
                max_lat: p.lat,
                max_lng: p.lng,
            },
            Some(b) => BoundingBox {
                min_lat: b.min_lat.min(p.lat),
                min_lng: b.min_lng.min(p.lng),
                max_lat: b.max_lat.max(p.lat),
                max_lng: b.max_lng.max(p.lng),
            },
        })
    })
}

/// Seconds needed to cover `distance_m` at `speed_kmh`, or `None` for a non-positive speed.
pub fn transit_seconds(distance_m: f64, speed_kmh: f64) -> Option<f64> {
    if !(speed_kmh > 0.0) || !distance_m.is_finite() {
        return None;
    }
    let speed_mps = speed_kmh * 1000.0 / 3600.0;
    Some(distance_m.max(0.0) / speed_mps)
}
