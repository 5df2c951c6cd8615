//! JSON report handed to the rendering layer

use serde::Serialize;
use std::sync::Arc;
use visitor_cluster_lib::{Cluster, ClusterEngine, ClusterSummary, LogInfo, Visitor, VisitorLog};

use crate::settings::Settings;

/// Everything one render pass needs: clusters, counters and the side panel
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub strategy: &'static str,
    pub view: f64,
    pub log: LogInfo,
    pub summary: ClusterSummary,
    pub clusters: Vec<Cluster>,
    pub recent: Vec<Arc<Visitor>>,
}

impl Report {
    /// Run one clustering pass over the log
    pub fn build(engine: &ClusterEngine, log: &VisitorLog, settings: &Settings) -> Self {
        let snapshot = log.snapshot();
        let clusters = engine.cluster(&snapshot, settings.view);
        let summary = ClusterEngine::summarize(&snapshot, &clusters);
        let recent = log.recent(settings.reference_time(), settings.recent_window());

        tracing::info!(
            "{} clusters ({} new) from {} visitors, {} dropped, {} recent",
            summary.cluster_count,
            summary.new_cluster_count,
            summary.visitor_count,
            summary.dropped_count,
            recent.len()
        );

        Self {
            strategy: engine.strategy().name(),
            view: settings.view,
            log: log.info(),
            summary,
            clusters,
            recent,
        }
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
