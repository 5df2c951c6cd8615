//! Cluster output type consumed by the rendering layer

use crate::{LocatedVisitor, Visitor};
use chrono::{DateTime, Utc};
use geo::{Coord, Point, Rect};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;

/// A group of geographically close visitors, rendered as a single marker
///
/// The centroid is the unweighted mean of member coordinates and is kept up to
/// date as each member is added. Longitudes are averaged relative to the seed
/// member, so a cluster straddling the antimeridian stays on it.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "camelCase"))]
pub struct Cluster {
    /// Centroid latitude in degrees
    pub latitude: f64,
    /// Centroid longitude in degrees
    pub longitude: f64,
    /// Members in the order they were assigned
    pub members: Vec<Arc<Visitor>>,
    /// Sum of member visit weights
    pub total_visits: u64,
    /// Latest member activity, set only for clusters inside the recency window
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_visit_time: Option<DateTime<Utc>>,
    /// Member positions (x = longitude, y = latitude), parallel to `members`
    #[cfg_attr(feature = "serde", serde(skip))]
    positions: Vec<Point<f64>>,
    #[cfg_attr(feature = "serde", serde(skip))]
    latitude_sum: f64,
    /// Sum of member longitudes unwrapped to within 180 degrees of the seed
    #[cfg_attr(feature = "serde", serde(skip))]
    longitude_sum: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Cluster {
    /// Start a new cluster from a single visitor
    pub fn seed(first: &LocatedVisitor) -> Self {
        Self {
            latitude: first.latitude(),
            longitude: first.longitude(),
            members: vec![first.visitor.clone()],
            total_visits: first.visitor.weight(),
            last_visit_time: None,
            positions: vec![first.position],
            latitude_sum: first.latitude(),
            longitude_sum: first.longitude(),
        }
    }

    /// Append a member and recompute the centroid and visit total
    pub fn push(&mut self, member: &LocatedVisitor) {
        self.members.push(member.visitor.clone());
        self.positions.push(member.position);
        self.latitude_sum += member.latitude();
        self.longitude_sum += self.unwrap_longitude(member.longitude());
        self.total_visits += member.visitor.weight();

        let count = self.members.len() as f64;
        self.latitude = self.latitude_sum / count;
        self.longitude = wrap_longitude(self.longitude_sum / count);
    }

    /// Shift `lon` by a full turn when it is more than 180 degrees from the seed
    #[inline]
    fn unwrap_longitude(&self, lon: f64) -> f64 {
        let seed = self.positions[0].x();
        if lon - seed > 180.0 {
            lon - 360.0
        } else if lon - seed < -180.0 {
            lon + 360.0
        } else {
            lon
        }
    }

    /// Centroid as a point (x = longitude, y = latitude)
    #[inline]
    pub fn centroid(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Member positions in member order (x = longitude, y = latitude)
    #[inline]
    pub fn positions(&self) -> &[Point<f64>] {
        &self.positions
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false for clusters produced by a strategy
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Latest `last_seen` over members, regardless of the recency window
    pub fn latest_member_visit(&self) -> Option<DateTime<Utc>> {
        self.members.iter().filter_map(|m| m.last_seen).max()
    }

    /// Whether the rendering layer should highlight this cluster as new
    #[inline]
    pub fn is_new(&self) -> bool {
        self.last_visit_time.is_some()
    }

    /// Marker size scaled logarithmically by the visit total
    #[inline]
    pub fn marker_scale(&self, base: f64) -> f64 {
        base * (1.0 + (self.total_visits.max(1) as f64).log2())
    }

    /// Bounding box of member positions
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let first = self.positions.first()?;
        let (mut min_x, mut min_y) = (first.x(), first.y());
        let (mut max_x, mut max_y) = (min_x, min_y);
        for p in &self.positions[1..] {
            min_x = min_x.min(p.x());
            min_y = min_y.min(p.y());
            max_x = max_x.max(p.x());
            max_y = max_y.max(p.y());
        }
        Some(Rect::new(
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: max_y },
        ))
    }

    /// Human readable label taken from the first member that has one
    ///
    /// Prefers "City, Country", then the city or country alone.
    pub fn label(&self) -> Option<String> {
        self.members.iter().find_map(|m| match (&m.city, &m.country) {
            (Some(city), Some(country)) => Some(format!("{city}, {country}")),
            (Some(city), None) => Some(city.clone()),
            (None, Some(country)) => Some(country.clone()),
            (None, None) => None,
        })
    }
}

/// Bring a longitude back into [-180, 180]
#[inline]
fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}
