//! Search filter shared by medicine and hospital lookups.

use serde::{Deserialize, Serialize};

use super::account::{Account, BedType};
use crate::error::{CoreError, CoreResult};
use crate::geo::GeoPoint;

/// Recognized search options.
///
/// `bed_type` only applies to hospital searches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchFilter {
    /// Case-insensitive substring of the name
    pub query: Option<String>,
    /// Caller position; enables radius filtering and distance ordering
    pub near: Option<GeoPoint>,
    /// Radius in meters; defaults from configuration
    pub radius_meters: Option<f64>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub bed_type: Option<BedType>,
}

impl SearchFilter {
    /// Text search without location.
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// Text search around a point.
    pub fn near(query: impl Into<String>, point: GeoPoint) -> Self {
        Self {
            query: Some(query.into()),
            near: Some(point),
            ..Default::default()
        }
    }

    pub fn with_radius(mut self, radius_meters: f64) -> Self {
        self.radius_meters = Some(radius_meters);
        self
    }

    /// Trimmed query, `None` when empty.
    pub fn normalized_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    pub fn normalized_city(&self) -> Option<&str> {
        self.city.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    pub fn normalized_area(&self) -> Option<&str> {
        self.area.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }

    /// Effective radius, validated.
    pub fn radius_or(&self, default_meters: f64) -> CoreResult<f64> {
        let radius = self.radius_meters.unwrap_or(default_meters);
        if !radius.is_finite() || radius <= 0.0 {
            return Err(CoreError::Validation(format!(
                "radius must be a positive number of meters, got {}",
                radius
            )));
        }
        Ok(radius)
    }
}

/// One hospital search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HospitalMatch {
    pub hospital: Account,
    pub distance_meters: Option<f64>,
}
