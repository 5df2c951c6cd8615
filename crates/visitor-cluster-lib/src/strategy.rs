//! Clustering strategies
//!
//! Every strategy maps a normalized visitor list and a view parameter to an
//! ordered list of clusters. [`RadiusStrategy`] is the default; the others are
//! alternative policies that can be swapped in through [`StrategyKind`] or
//! [`crate::ClusterEngine::with_strategy`] without touching call sites.

use crate::{Cluster, LocatedVisitor, utils};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default clustering radius in kilometers
pub const DEFAULT_RADIUS_KM: f64 = 50.0;

/// A policy turning visitor positions into clusters
pub trait ClusterStrategy: Send + Sync + std::fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Cluster the visitors, in input order, for the given view parameter
    ///
    /// `view` is finite and non-negative. Implementations return clusters in
    /// creation order and must place every input visitor in exactly one cluster.
    fn cluster(&self, points: &[LocatedVisitor], view: f64) -> Vec<Cluster>;
}

/// Built-in strategies selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum StrategyKind {
    /// Fixed-radius first-fit agglomeration
    #[default]
    Radius,
    /// First-fit agglomeration with a radius shrinking as the view zooms in
    ZoomScaledRadius,
    /// Latitude/longitude grid with zoom-dependent cell size
    Grid,
}

impl StrategyKind {
    /// Instantiate the strategy with the given base radius
    pub fn build(self, radius_km: f64) -> Box<dyn ClusterStrategy> {
        match self {
            StrategyKind::Radius => Box::new(RadiusStrategy::new(radius_km)),
            StrategyKind::ZoomScaledRadius => Box::new(ZoomScaledRadiusStrategy::new(radius_km)),
            StrategyKind::Grid => Box::new(GridStrategy),
        }
    }
}

/// First-fit agglomeration of `points` using a fixed radius
///
/// Each point joins the first cluster (in creation order) whose current
/// centroid lies within `radius_km`, not the nearest one.
fn first_fit(points: &[LocatedVisitor], radius_km: f64) -> Vec<Cluster> {
    let Some((first, rest)) = points.split_first() else {
        return Vec::new();
    };

    let mut clusters = vec![Cluster::seed(first)];
    for point in rest {
        let target = clusters
            .iter()
            .position(|c| utils::point_distance_km(&point.position, &c.centroid()) <= radius_km);
        match target {
            Some(index) => clusters[index].push(point),
            None => {
                tracing::trace!(
                    "New cluster #{} seeded by visitor {}",
                    clusters.len(),
                    point.visitor.id
                );
                clusters.push(Cluster::seed(point));
            }
        }
    }
    clusters
}

/// Radius-based agglomerative clustering with a radius independent of zoom
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusStrategy {
    pub radius_km: f64,
}

impl RadiusStrategy {
    pub fn new(radius_km: f64) -> Self {
        Self { radius_km }
    }
}

impl Default for RadiusStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS_KM)
    }
}

impl ClusterStrategy for RadiusStrategy {
    fn name(&self) -> &'static str {
        "radius"
    }

    fn cluster(&self, points: &[LocatedVisitor], _view: f64) -> Vec<Cluster> {
        #[cfg(feature = "profiling")]
        profiling::scope!("strategy::radius");

        first_fit(points, self.radius_km)
    }
}

/// Radius-based agglomerative clustering with radius `base * (1 - view)`
///
/// At `view >= 1` the radius is zero and only coincident visitors merge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomScaledRadiusStrategy {
    pub base_radius_km: f64,
}

impl ZoomScaledRadiusStrategy {
    pub fn new(base_radius_km: f64) -> Self {
        Self { base_radius_km }
    }

    /// Effective radius for a view parameter
    #[inline]
    pub fn radius_for(&self, view: f64) -> f64 {
        self.base_radius_km * (1.0 - view).max(0.0)
    }
}

impl ClusterStrategy for ZoomScaledRadiusStrategy {
    fn name(&self) -> &'static str {
        "zoom-scaled-radius"
    }

    fn cluster(&self, points: &[LocatedVisitor], view: f64) -> Vec<Cluster> {
        #[cfg(feature = "profiling")]
        profiling::scope!("strategy::zoom_scaled_radius");

        first_fit(points, self.radius_for(view))
    }
}

/// Grid bucketing with a cell size that shrinks in steps as the view zooms in
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridStrategy;

impl GridStrategy {
    /// Cell edge in degrees for a view parameter
    pub fn cell_size_degrees(view: f64) -> f64 {
        if view < 0.25 {
            10.0
        } else if view < 0.5 {
            5.0
        } else if view < 0.75 {
            2.0
        } else if view < 1.0 {
            1.0
        } else {
            0.5
        }
    }
}

impl ClusterStrategy for GridStrategy {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn cluster(&self, points: &[LocatedVisitor], view: f64) -> Vec<Cluster> {
        #[cfg(feature = "profiling")]
        profiling::scope!("strategy::grid");

        let cell = Self::cell_size_degrees(view);
        let mut index_by_cell: HashMap<(i64, i64), usize> = HashMap::new();
        let mut clusters: Vec<Cluster> = Vec::new();

        for point in points {
            let key = (
                (point.latitude() / cell).floor() as i64,
                (point.longitude() / cell).floor() as i64,
            );
            match index_by_cell.get(&key) {
                Some(&index) => clusters[index].push(point),
                None => {
                    index_by_cell.insert(key, clusters.len());
                    clusters.push(Cluster::seed(point));
                }
            }
        }
        clusters
    }
}
