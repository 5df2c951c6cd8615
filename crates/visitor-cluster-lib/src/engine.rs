//! ClusterEngine - Top-level entry point turning visitor snapshots into clusters
//!
//! The engine owns a configuration and a strategy. Each call to
//! [`ClusterEngine::cluster`] normalizes the snapshot, runs the strategy and
//! flags clusters whose latest visit falls inside the recency window. Nothing
//! is retained between calls.

use crate::{Cluster, ClusterStrategy, DataError, Result, StrategyKind, Visitor, strategy, visitor};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default recency window in milliseconds
pub const DEFAULT_RECENCY_WINDOW_MS: i64 = 5_000;

/// Configuration for the cluster engine
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Config {
    /// Merge radius in kilometers (base radius for zoom-scaled strategies).
    /// Default: 50 km
    pub radius_km: f64,
    /// Clusters whose latest visit is within this many milliseconds of the
    /// globally latest visit are flagged as new. Default: 5000
    pub recency_window_ms: i64,
    /// Which built-in strategy to use
    pub strategy: StrategyKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radius_km: strategy::DEFAULT_RADIUS_KM,
            recency_window_ms: DEFAULT_RECENCY_WINDOW_MS,
            strategy: StrategyKind::default(),
        }
    }
}

impl Config {
    /// Check that the configuration values are usable
    pub fn validate(&self) -> Result<()> {
        if !self.radius_km.is_finite() || self.radius_km < 0.0 {
            return Err(DataError::InvalidConfig(format!(
                "radius must be a finite non-negative number of kilometers, got {}",
                self.radius_km
            )));
        }
        if self.recency_window_ms < 0 {
            return Err(DataError::InvalidConfig(format!(
                "recency window must not be negative, got {} ms",
                self.recency_window_ms
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn recency_window(&self) -> Duration {
        Duration::milliseconds(self.recency_window_ms)
    }
}

/// Counters describing one clustering pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "camelCase"))]
pub struct ClusterSummary {
    /// Visitors in the input snapshot
    pub visitor_count: usize,
    /// Visitors excluded because of unusable coordinates
    pub dropped_count: usize,
    /// Clusters produced
    pub cluster_count: usize,
    /// Sum of visit weights over all clusters
    pub total_visits: u64,
    /// Clusters flagged as new
    pub new_cluster_count: usize,
}

/// Stateless clustering front end
#[derive(Debug)]
pub struct ClusterEngine {
    config: Config,
    strategy: Box<dyn ClusterStrategy>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ClusterEngine {
    /// Create an engine using the strategy selected in `config`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let strategy = config.strategy.build(config.radius_km);
        Ok(Self { config, strategy })
    }

    /// Create an engine with a custom strategy
    ///
    /// `config.strategy` is ignored; the radius is only used by the strategy
    /// itself if it was built with it.
    pub fn with_strategy(config: Config, strategy: Box<dyn ClusterStrategy>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, strategy })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn strategy(&self) -> &dyn ClusterStrategy {
        self.strategy.as_ref()
    }

    /// Cluster a visitor snapshot for the given view parameter
    ///
    /// Never fails: visitors with unusable coordinates are skipped, an empty
    /// snapshot yields no clusters, and a non-finite or negative `view` is
    /// treated as zero.
    pub fn cluster(&self, visitors: &[Arc<Visitor>], view: f64) -> Vec<Cluster> {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::cluster");

        let view = if view.is_finite() && view > 0.0 { view } else { 0.0 };

        let located = visitor::normalize(visitors);
        let mut clusters = self.strategy.cluster(&located, view);

        if let Some(most_recent) = most_recent_visit(visitors) {
            flag_recent(&mut clusters, most_recent, self.config.recency_window());
        }

        tracing::debug!(
            "{} strategy: {} visitors ({} usable) -> {} clusters at view {}",
            self.strategy.name(),
            visitors.len(),
            located.len(),
            clusters.len(),
            view
        );
        clusters
    }

    /// Summarize the result of a clustering pass over `visitors`
    pub fn summarize(visitors: &[Arc<Visitor>], clusters: &[Cluster]) -> ClusterSummary {
        let clustered: usize = clusters.iter().map(Cluster::len).sum();
        ClusterSummary {
            visitor_count: visitors.len(),
            dropped_count: visitors.len().saturating_sub(clustered),
            cluster_count: clusters.len(),
            total_visits: clusters.iter().map(|c| c.total_visits).sum(),
            new_cluster_count: clusters.iter().filter(|c| c.is_new()).count(),
        }
    }
}

/// Latest `last_seen` over every visitor, including ones without usable coordinates
fn most_recent_visit(visitors: &[Arc<Visitor>]) -> Option<DateTime<Utc>> {
    visitors.iter().filter_map(|v| v.last_seen).max()
}

/// Set `last_visit_time` on clusters whose latest visit is within `window` of `most_recent`
fn flag_recent(clusters: &mut [Cluster], most_recent: DateTime<Utc>, window: Duration) {
    let threshold = most_recent - window;
    for cluster in clusters.iter_mut() {
        cluster.last_visit_time = cluster
            .latest_member_visit()
            .filter(|&latest| latest >= threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, RadiusStrategy, utils};
    use chrono::TimeZone;

    fn visitor(id: &str, lat: f64, lon: f64) -> Arc<Visitor> {
        Arc::new(Visitor::new(id, id, lat, lon))
    }

    fn engine() -> ClusterEngine {
        ClusterEngine::new(Config::default()).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn member_ids(clusters: &[Cluster]) -> Vec<String> {
        clusters
            .iter()
            .flat_map(|c| c.members.iter().map(|m| m.id.clone()))
            .collect()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.radius_km, 50.0);
        assert_eq!(config.recency_window_ms, 5000);
        assert_eq!(config.strategy, StrategyKind::Radius);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate_rejects_bad_values() {
        let negative = Config {
            radius_km: -1.0,
            ..Config::default()
        };
        assert!(matches!(
            ClusterEngine::new(negative),
            Err(DataError::InvalidConfig(_))
        ));

        let nan = Config {
            radius_km: f64::NAN,
            ..Config::default()
        };
        assert!(nan.validate().is_err());

        let window = Config {
            recency_window_ms: -5,
            ..Config::default()
        };
        assert!(window.validate().is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(engine().cluster(&[], 0.0).is_empty());
    }

    #[test]
    fn test_all_invalid_input() {
        let visitors = vec![
            Arc::new(Visitor::new("a", "a", "north", "west")),
            Arc::new(Visitor::new("b", "b", Coordinate::Missing, 1.0)),
        ];
        assert!(engine().cluster(&visitors, 0.0).is_empty());
    }

    #[test]
    fn test_single_visitor_with_weight() {
        let visitors = vec![Arc::new(
            Visitor::new("a", "a", 35.6762, 139.6503).with_visit_count(4),
        )];
        let clusters = engine().cluster(&visitors, 0.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].latitude, 35.6762);
        assert_eq!(clusters[0].longitude, 139.6503);
        assert_eq!(clusters[0].total_visits, 4);
    }

    #[test]
    fn test_members_cover_exactly_valid_visitors() {
        let visitors = vec![
            visitor("nyc", 40.7128, -74.0060),
            Arc::new(Visitor::new("bad", "x", "NaN", 0.0)),
            visitor("ldn", 51.5074, -0.1278),
            visitor("bk", 40.730, -73.935),
            Arc::new(Visitor::new("far", "x", 95.0, 0.0)),
            visitor("paris", 48.8566, 2.3522),
        ];
        let clusters = engine().cluster(&visitors, 0.0);

        let mut clustered = member_ids(&clusters);
        clustered.sort();
        assert_eq!(clustered, vec!["bk", "ldn", "nyc", "paris"]);
        assert!(clusters.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_centroid_within_radius_of_a_member() {
        let visitors: Vec<Arc<Visitor>> = (0..60)
            .map(|i| {
                let f = i as f64;
                visitor(&i.to_string(), 45.0 + (f * 0.37).sin() * 2.0, 7.0 + f * 0.11)
            })
            .collect();
        let config = Config::default();
        let clusters = engine().cluster(&visitors, 0.0);
        for cluster in &clusters {
            let centroid = cluster.centroid();
            assert!(
                cluster
                    .positions()
                    .iter()
                    .any(|p| utils::point_distance_km(p, &centroid) <= config.radius_km)
            );
        }
    }

    #[test]
    fn test_cluster_across_antimeridian() {
        let visitors = vec![
            visitor("a", 0.0, 179.9),
            visitor("b", 0.0, -179.9),
            visitor("c", 0.0, 179.95),
        ];
        let clusters = engine().cluster(&visitors, 0.0);
        assert_eq!(member_ids(&clusters), vec!["a", "b", "c"]);
        assert_eq!(clusters[0].len(), 3);

        let centroid = clusters[0].centroid();
        assert!(centroid.x().abs() > 179.0);
        for p in clusters[0].positions() {
            assert!(utils::point_distance_km(p, &centroid) < 20.0);
        }
    }

    #[test]
    fn test_deterministic() {
        let visitors: Vec<Arc<Visitor>> = (0..40)
            .map(|i| visitor(&i.to_string(), (i % 7) as f64 * 0.2, (i % 5) as f64 * 0.3))
            .collect();
        let engine = engine();
        let a = engine.cluster(&visitors, 0.3);
        let b = engine.cluster(&visitors, 0.3);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.latitude, y.latitude);
            assert_eq!(x.longitude, y.longitude);
            assert_eq!(member_ids(std::slice::from_ref(x)), member_ids(std::slice::from_ref(y)));
        }
    }

    #[test]
    fn test_reclustering_members_yields_one_cluster() {
        let visitors = vec![
            visitor("a", 0.0, 0.0),
            visitor("b", 0.0, 0.4),
            visitor("c", 0.0, 0.6),
            visitor("d", 10.0, 10.0),
        ];
        let engine = engine();
        for cluster in engine.cluster(&visitors, 0.0) {
            let again = engine.cluster(&cluster.members, 0.0);
            assert_eq!(again.len(), 1);
            assert_eq!(again[0].len(), cluster.len());
        }
    }

    #[test]
    fn test_recency_flag() {
        let t = t0();
        let visitors = vec![
            Arc::new(Visitor::new("a", "a", 40.7128, -74.0060).with_last_seen(t)),
            Arc::new(
                Visitor::new("b", "b", 40.730, -73.935)
                    .with_last_seen(t - Duration::milliseconds(3000)),
            ),
            Arc::new(
                Visitor::new("c", "c", 51.5074, -0.1278)
                    .with_last_seen(t - Duration::milliseconds(20_000)),
            ),
        ];
        let clusters = engine().cluster(&visitors, 0.0);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].last_visit_time, Some(t));
        assert_eq!(clusters[1].last_visit_time, None);
    }

    #[test]
    fn test_recency_window_is_inclusive() {
        let t = t0();
        let visitors = vec![
            Arc::new(Visitor::new("a", "a", 0.0, 0.0).with_last_seen(t)),
            Arc::new(
                Visitor::new("b", "b", 30.0, 30.0).with_last_seen(t - Duration::milliseconds(5000)),
            ),
        ];
        let clusters = engine().cluster(&visitors, 0.0);
        assert!(clusters.iter().all(Cluster::is_new));
    }

    #[test]
    fn test_recency_uses_dropped_visitors_too() {
        let t = t0();
        let visitors = vec![
            Arc::new(
                Visitor::new("a", "a", 0.0, 0.0).with_last_seen(t - Duration::milliseconds(10_000)),
            ),
            Arc::new(Visitor::new("bad", "x", "?", "?").with_last_seen(t)),
        ];
        let clusters = engine().cluster(&visitors, 0.0);
        assert_eq!(clusters.len(), 1);
        assert!(!clusters[0].is_new());
    }

    #[test]
    fn test_no_timestamps_no_flags() {
        let visitors = vec![visitor("a", 0.0, 0.0), visitor("b", 20.0, 20.0)];
        let clusters = engine().cluster(&visitors, 0.0);
        assert!(clusters.iter().all(|c| c.last_visit_time.is_none()));
    }

    #[test]
    fn test_invalid_view_treated_as_zero() {
        let config = Config {
            strategy: StrategyKind::ZoomScaledRadius,
            ..Config::default()
        };
        let engine = ClusterEngine::new(config).unwrap();
        let visitors = vec![visitor("a", 0.0, 0.0), visitor("b", 0.0, 0.3)];
        assert_eq!(engine.cluster(&visitors, f64::NAN).len(), 1);
        assert_eq!(engine.cluster(&visitors, -3.0).len(), 1);
    }

    #[test]
    fn test_with_custom_strategy() {
        let engine =
            ClusterEngine::with_strategy(Config::default(), Box::new(RadiusStrategy::new(0.0)))
                .unwrap();
        assert_eq!(engine.strategy().name(), "radius");
        let visitors = vec![visitor("a", 0.0, 0.0), visitor("b", 0.0, 0.01)];
        assert_eq!(engine.cluster(&visitors, 0.0).len(), 2);
    }

    #[test]
    fn test_summarize() {
        let t = t0();
        let visitors = vec![
            Arc::new(
                Visitor::new("a", "a", 40.7128, -74.0060)
                    .with_visit_count(3)
                    .with_last_seen(t),
            ),
            visitor("b", 40.730, -73.935),
            Arc::new(Visitor::new("bad", "x", "", "")),
            visitor("c", 51.5074, -0.1278),
        ];
        let clusters = engine().cluster(&visitors, 0.0);
        let summary = ClusterEngine::summarize(&visitors, &clusters);
        assert_eq!(
            summary,
            ClusterSummary {
                visitor_count: 4,
                dropped_count: 1,
                cluster_count: 2,
                total_visits: 5,
                new_cluster_count: 1,
            }
        );
    }
}
