//! Spherical geometry for proximity search.
//!
//! Points are (longitude, latitude) in degrees. Distances are great-circle
//! distances in meters.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Earth radius used for spherical distances, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// A geographic point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    /// Longitude in degrees, -180..=180
    pub longitude: f64,
    /// Latitude in degrees, -90..=90
    pub latitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range coordinates.
    pub fn new(longitude: f64, latitude: f64) -> CoreResult<Self> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoreError::Validation(format!(
                "longitude out of range: {}",
                longitude
            )));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoreError::Validation(format!(
                "latitude out of range: {}",
                latitude
            )));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    /// Great-circle distance to another point in meters (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();
        EARTH_RADIUS_METERS * c
    }

    /// Point reached by travelling `meters` due north (negative = south).
    pub fn offset_north(&self, meters: f64) -> GeoPoint {
        let dlat = (meters / EARTH_RADIUS_METERS).to_degrees();
        GeoPoint {
            longitude: self.longitude,
            latitude: (self.latitude + dlat).clamp(-90.0, 90.0),
        }
    }

    /// Point reached by travelling `meters` due east along the parallel.
    pub fn offset_east(&self, meters: f64) -> GeoPoint {
        let parallel_radius = EARTH_RADIUS_METERS * self.latitude.to_radians().cos();
        let dlon = (meters / parallel_radius).to_degrees();
        let mut longitude = self.longitude + dlon;
        if longitude > 180.0 {
            longitude -= 360.0;
        } else if longitude < -180.0 {
            longitude += 360.0;
        }
        GeoPoint {
            longitude,
            latitude: self.latitude,
        }
    }
}

/// Coarse lat/lon rectangle used to pre-filter rows before exact distance checks.
///
/// The box always contains every point within the radius. Near the poles or
/// across the antimeridian it degrades to the full longitude range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Box enclosing the circle of `radius_meters` around `center`.
    pub fn around(center: &GeoPoint, radius_meters: f64) -> Self {
        let dlat = (radius_meters / EARTH_RADIUS_METERS).to_degrees();
        let min_latitude = (center.latitude - dlat).max(-90.0);
        let max_latitude = (center.latitude + dlat).min(90.0);

        // Widest parallel inside the box decides the longitude span.
        let widest = min_latitude.abs().max(max_latitude.abs());
        let cos_lat = widest.to_radians().cos();
        if widest >= 89.0 || cos_lat <= f64::EPSILON {
            return Self {
                min_latitude,
                max_latitude,
                min_longitude: -180.0,
                max_longitude: 180.0,
            };
        }

        let dlon = (radius_meters / (EARTH_RADIUS_METERS * cos_lat)).to_degrees();
        let min_longitude = center.longitude - dlon;
        let max_longitude = center.longitude + dlon;
        if min_longitude < -180.0 || max_longitude > 180.0 {
            return Self {
                min_latitude,
                max_latitude,
                min_longitude: -180.0,
                max_longitude: 180.0,
            };
        }

        Self {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        }
    }

    /// Check whether a point lies inside the box.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.min_latitude
            && point.latitude <= self.max_latitude
            && point.longitude >= self.min_longitude
            && point.longitude <= self.max_longitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range() {
        assert!(GeoPoint::new(181.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -91.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(77.59, 12.97).is_ok());
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = GeoPoint::new(77.5946, 12.9716).unwrap();
        assert!(p.distance_to(&p).abs() < 1e-6);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0).unwrap();
        let b = GeoPoint::new(0.0, 1.0).unwrap();
        // 2 * pi * R / 360
        let expected = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;
        assert!((a.distance_to(&b) - expected).abs() < 1.0);
    }

    #[test]
    fn test_offsets_round_trip_distance() {
        let origin = GeoPoint::new(72.8777, 19.0760).unwrap();
        let north = origin.offset_north(10_000.0);
        let east = origin.offset_east(10_000.0);
        assert!((origin.distance_to(&north) - 10_000.0).abs() < 1.0);
        assert!((origin.distance_to(&east) - 10_000.0).abs() < 5.0);
    }

    #[test]
    fn test_bounding_box_contains_circle() {
        let center = GeoPoint::new(2.3522, 48.8566).unwrap();
        let bbox = BoundingBox::around(&center, 50_000.0);
        assert!(bbox.contains(&center.offset_north(49_000.0)));
        assert!(bbox.contains(&center.offset_east(-49_000.0)));
        assert!(!bbox.contains(&center.offset_north(60_000.0)));
    }

    #[test]
    fn test_bounding_box_near_antimeridian() {
        let center = GeoPoint::new(179.9, 0.0).unwrap();
        let bbox = BoundingBox::around(&center, 50_000.0);
        assert_eq!(bbox.min_longitude, -180.0);
        assert_eq!(bbox.max_longitude, 180.0);
    }
}
