//! VisitorLog - Insert-only store mirroring the rows delivered by the sync transport
//!
//! The log keeps visitors in arrival order and hands out cheap snapshots for
//! the cluster engine. Statistics are updated incrementally on append.

use crate::{VisitRequest, Visitor};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use crate::Result;
#[cfg(feature = "serde")]
use std::path::Path;

/// Information about the visitor log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct LogInfo {
    /// Number of visit events recorded
    pub event_count: usize,
    /// Number of distinct browsing clients
    pub unique_clients: usize,
    /// Sum of visit weights
    pub total_visits: u64,
    /// Latest `last_seen` across all events
    pub latest_visit: Option<DateTime<Utc>>,
}

/// Cached statistics, updated incrementally on append
#[derive(Debug, Clone, Default)]
struct CachedStats {
    clients: HashSet<String>,
    total_visits: u64,
    latest_visit: Option<DateTime<Utc>>,
}

/// Ordered, append-only collection of visitor rows
#[derive(Debug, Clone, Default)]
pub struct VisitorLog {
    visitors: Vec<Arc<Visitor>>,
    cached_stats: CachedStats,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl VisitorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a visitor row
    pub fn push(&mut self, visitor: impl Into<Arc<Visitor>>) {
        let visitor = visitor.into();
        self.update_stats_for_added_visitor(&visitor);
        self.visitors.push(visitor);
    }

    /// Record a new visit from a client and return the stored row
    ///
    /// The row gets a fresh random id, a visit count of one and `now` as its
    /// last activity.
    pub fn record(&mut self, request: VisitRequest, now: DateTime<Utc>) -> Arc<Visitor> {
        let visitor = Arc::new(request.into_visitor(uuid::Uuid::new_v4().to_string(), now));
        tracing::debug!("Recorded visit {} from client {}", visitor.id, visitor.visitor_id);
        self.push(visitor.clone());
        visitor
    }

    /// Shared snapshot of every row, in arrival order
    #[inline]
    pub fn snapshot(&self) -> Vec<Arc<Visitor>> {
        self.visitors.clone()
    }

    #[inline]
    pub fn visitors(&self) -> &[Arc<Visitor>] {
        &self.visitors
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    /// Remove all rows
    pub fn clear(&mut self) {
        self.visitors.clear();
        self.cached_stats = CachedStats::default();
    }

    /// Get log information
    ///
    /// This is O(1) as all values are cached.
    #[inline]
    pub fn info(&self) -> LogInfo {
        LogInfo {
            event_count: self.visitors.len(),
            unique_clients: self.cached_stats.clients.len(),
            total_visits: self.cached_stats.total_visits,
            latest_visit: self.cached_stats.latest_visit,
        }
    }

    /// Visitors seen within `window` before `now`, newest first
    ///
    /// Rows without a `last_seen` are never recent. Rows with equal timestamps
    /// keep their arrival order.
    pub fn recent(&self, now: DateTime<Utc>, window: Duration) -> Vec<Arc<Visitor>> {
        let since = now - window;
        let mut recent: Vec<Arc<Visitor>> = self
            .visitors
            .iter()
            .filter(|v| v.last_seen.is_some_and(|seen| seen >= since && seen <= now))
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        recent
    }

    /// Parse a JSON array of visitor rows
    ///
    /// Rows that do not match the visitor shape are skipped; only input that
    /// is not a JSON array is an error.
    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let rows: Vec<serde_json::Value> = serde_json::from_str(json)?;
        Ok(Self::from_rows(rows))
    }

    /// Load a JSON array of visitor rows from a file
    #[cfg(feature = "serde")]
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("visitor_log::load_from_file");

        let file = std::fs::File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        let rows: Vec<serde_json::Value> = serde_json::from_reader(reader)?;
        let log = Self::from_rows(rows);
        tracing::info!(
            "Loaded {} visitor rows from {}",
            log.len(),
            path.as_ref().display()
        );
        Ok(log)
    }

    /// Build a log from raw JSON rows, dropping the ones that fail to deserialize
    #[cfg(feature = "serde")]
    fn from_rows(rows: Vec<serde_json::Value>) -> Self {
        let total = rows.len();
        let log: Self = rows
            .into_iter()
            .enumerate()
            .filter_map(|(index, row)| match serde_json::from_value::<Visitor>(row) {
                Ok(visitor) => Some(visitor),
                Err(e) => {
                    tracing::debug!("Skipping malformed visitor row #{}: {}", index, e);
                    None
                }
            })
            .collect();
        if log.len() < total {
            tracing::warn!("Skipped {} malformed visitor rows", total - log.len());
        }
        log
    }

    #[inline]
    fn update_stats_for_added_visitor(&mut self, visitor: &Visitor) {
        self.cached_stats.clients.insert(visitor.visitor_id.clone());
        self.cached_stats.total_visits += visitor.weight();
        if visitor.last_seen > self.cached_stats.latest_visit {
            self.cached_stats.latest_visit = visitor.last_seen;
        }
    }
}

impl<V: Into<Arc<Visitor>>> Extend<V> for VisitorLog {
    fn extend<I: IntoIterator<Item = V>>(&mut self, iter: I) {
        for visitor in iter {
            self.push(visitor);
        }
    }
}

impl<V: Into<Arc<Visitor>>> FromIterator<V> for VisitorLog {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let mut log = Self::new();
        log.extend(iter);
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedIdentity;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_log_creation() {
        let log = VisitorLog::new();
        assert!(log.is_empty());
        assert_eq!(log.info(), LogInfo::default());
    }

    #[test]
    fn test_push_updates_stats() {
        let mut log = VisitorLog::new();
        log.push(Visitor::new("1", "alice", 0.0, 0.0).with_visit_count(2));
        log.push(Visitor::new("2", "bob", 1.0, 1.0).with_last_seen(t0()));
        log.push(Visitor::new("3", "alice", 2.0, 2.0));

        let info = log.info();
        assert_eq!(info.event_count, 3);
        assert_eq!(info.unique_clients, 2);
        assert_eq!(info.total_visits, 4);
        assert_eq!(info.latest_visit, Some(t0()));
    }

    #[test]
    fn test_snapshot_keeps_order() {
        let log: VisitorLog = (0..5)
            .map(|i| Visitor::new(i.to_string(), "c", 0.0, 0.0))
            .collect();
        let ids: Vec<String> = log.snapshot().iter().map(|v| v.id.clone()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_snapshot_is_independent_of_later_appends() {
        let mut log = VisitorLog::new();
        log.push(Visitor::new("1", "c", 0.0, 0.0));
        let snapshot = log.snapshot();
        log.push(Visitor::new("2", "c", 0.0, 0.0));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut log = VisitorLog::new();
        log.push(Visitor::new("1", "c", 0.0, 0.0).with_last_seen(t0()));
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.info(), LogInfo::default());
    }

    #[test]
    fn test_recent_newest_first() {
        let now = t0();
        let mut log = VisitorLog::new();
        log.push(Visitor::new("old", "a", 0.0, 0.0).with_last_seen(now - Duration::minutes(10)));
        log.push(Visitor::new("mid", "b", 0.0, 0.0).with_last_seen(now - Duration::minutes(2)));
        log.push(Visitor::new("none", "c", 0.0, 0.0));
        log.push(Visitor::new("new", "d", 0.0, 0.0).with_last_seen(now - Duration::seconds(5)));

        let recent = log.recent(now, Duration::minutes(5));
        let ids: Vec<&str> = recent.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[test]
    fn test_record() {
        let now = t0();
        let identity = FixedIdentity::new("client-42");
        let request = VisitRequest::new(&identity, 48.8566, 2.3522)
            .unwrap()
            .with_city("Paris")
            .with_country("France");

        let mut log = VisitorLog::new();
        let row = log.record(request, now);

        assert_eq!(log.len(), 1);
        assert_eq!(row.visitor_id, "client-42");
        assert_eq!(row.weight(), 1);
        assert_eq!(row.last_seen, Some(now));
        assert_eq!(row.city.as_deref(), Some("Paris"));
        assert!(uuid::Uuid::parse_str(&row.id).is_ok());
        assert!(row.position().is_some());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json_str() {
        let json = r#"[
            {"id": "1", "visitorId": "a", "latitude": 40.7128, "longitude": -74.006},
            {"id": "2", "visitorId": "b", "latitude": "51.5074", "longitude": "-0.1278", "visitCount": 0}
        ]"#;
        let log = VisitorLog::from_json_str(json).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.info().total_visits, 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json_str_skips_malformed_rows() {
        let json = r#"[
            {"id": "1", "visitorId": "a", "latitude": 40.7128, "longitude": -74.006},
            {"id": "2", "visitorId": "b", "latitude": 1.0, "longitude": 2.0, "visitCount": "3"},
            {"id": "3", "visitorId": "c", "latitude": 1.0, "longitude": 2.0, "lastSeen": "2024-05-01 12:00:00.123+00"},
            "not a row",
            {"id": "4", "visitorId": "d", "latitude": "51.5074", "longitude": "-0.1278", "lastSeen": "2024-05-01T12:00:00Z"}
        ]"#;
        let log = VisitorLog::from_json_str(json).unwrap();
        let ids: Vec<&str> = log.visitors().iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
        assert_eq!(log.info().latest_visit, Some(t0()));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json_str_rejects_non_array() {
        let result = VisitorLog::from_json_str(r#"{"id": "1"}"#);
        assert!(matches!(result, Err(crate::DataError::Json(_))));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "1", "visitor_id": "a", "latitude": 1.0, "longitude": 2.0}}]"#
        )
        .unwrap();
        let log = VisitorLog::load_from_file(file.path()).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.visitors()[0].visitor_id, "a");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_load_missing_file() {
        let result = VisitorLog::load_from_file("/nonexistent/visitors.json");
        assert!(matches!(result, Err(crate::DataError::Io(_))));
    }
}
