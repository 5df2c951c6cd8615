//! Visitor records and coordinate normalization
//!
//! Rows arrive from the sync transport with loosely typed coordinates (numbers,
//! numeric strings, or nothing at all). [`Coordinate::parse`] and
//! [`Visitor::position`] are the single place where those are turned into
//! validated WGS84 positions.

use crate::utils;
use chrono::{DateTime, Utc};
use geo::Point;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A latitude or longitude as delivered by the data source
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum Coordinate {
    /// Plain numeric value
    Number(f64),
    /// Numeric string, e.g. `"40.7128"`
    Text(String),
    /// Absent or `null`
    #[default]
    Missing,
}

impl Coordinate {
    /// Parse to degrees, returning `None` for anything that is not a finite number
    pub fn parse(&self) -> Option<f64> {
        let value = match self {
            Coordinate::Number(value) => *value,
            Coordinate::Text(text) => text.trim().parse::<f64>().ok()?,
            Coordinate::Missing => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for Coordinate {
    fn from(value: f64) -> Self {
        Coordinate::Number(value)
    }
}

impl From<&str> for Coordinate {
    fn from(value: &str) -> Self {
        Coordinate::Text(value.to_string())
    }
}

impl From<String> for Coordinate {
    fn from(value: String) -> Self {
        Coordinate::Text(value)
    }
}

/// A single recorded visit event
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct Visitor {
    /// Unique identifier of this visit event
    pub id: String,
    /// Stable identifier of the browsing client
    #[cfg_attr(feature = "serde", serde(alias = "visitor_id"))]
    pub visitor_id: String,
    pub latitude: Coordinate,
    pub longitude: Coordinate,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub country: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub city: Option<String>,
    /// Visit weight; absent or zero counts as one
    #[cfg_attr(
        feature = "serde",
        serde(alias = "visit_count", skip_serializing_if = "Option::is_none")
    )]
    pub visit_count: Option<u32>,
    /// Most recent activity of this record
    #[cfg_attr(
        feature = "serde",
        serde(alias = "last_seen", skip_serializing_if = "Option::is_none")
    )]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Visitor {
    /// Create a visitor at the given position with default weight and no labels
    pub fn new(
        id: impl Into<String>,
        visitor_id: impl Into<String>,
        latitude: impl Into<Coordinate>,
        longitude: impl Into<Coordinate>,
    ) -> Self {
        Self {
            id: id.into(),
            visitor_id: visitor_id.into(),
            latitude: latitude.into(),
            longitude: longitude.into(),
            ..Default::default()
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_visit_count(mut self, visit_count: u32) -> Self {
        self.visit_count = Some(visit_count);
        self
    }

    pub fn with_last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.last_seen = Some(last_seen);
        self
    }

    /// Visit weight used for cluster totals (absent or zero counts as one)
    #[inline]
    pub fn weight(&self) -> u64 {
        match self.visit_count {
            Some(count) if count > 0 => u64::from(count),
            _ => 1,
        }
    }

    /// Normalized position as a point (x = longitude, y = latitude)
    ///
    /// Returns `None` when either coordinate is unparseable, non-finite or
    /// outside the WGS84 ranges.
    pub fn position(&self) -> Option<Point<f64>> {
        let lat = self.latitude.parse()?;
        let lon = self.longitude.parse()?;
        utils::is_valid_wgs84(lat, lon).then(|| Point::new(lon, lat))
    }
}

/// A visitor that passed normalization, paired with its parsed position
#[derive(Clone, Debug)]
pub struct LocatedVisitor {
    pub visitor: Arc<Visitor>,
    /// x = longitude, y = latitude
    pub position: Point<f64>,
}

impl LocatedVisitor {
    /// Normalize a visitor, or `None` if its coordinates are unusable
    pub fn new(visitor: Arc<Visitor>) -> Option<Self> {
        let position = visitor.position()?;
        Some(Self { visitor, position })
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.position.y()
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.position.x()
    }
}

/// Normalize a visitor snapshot, dropping records with unusable coordinates
///
/// Input order is preserved. Dropped records are reported at debug level only.
pub fn normalize(visitors: &[Arc<Visitor>]) -> Vec<LocatedVisitor> {
    #[cfg(feature = "profiling")]
    profiling::scope!("visitor::normalize");

    visitors
        .iter()
        .filter_map(|visitor| {
            let located = LocatedVisitor::new(visitor.clone());
            if located.is_none() {
                tracing::debug!(
                    "Skipping visitor {} with unusable coordinates: ({:?}, {:?})",
                    visitor.id,
                    visitor.latitude,
                    visitor.longitude
                );
            }
            located
        })
        .collect()
}
