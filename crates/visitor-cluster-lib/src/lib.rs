//! Visitor Cluster Library - Core clustering of live visitor geolocations
//!
//! This library turns a snapshot of recorded visits into clusters of nearby
//! visitors for display as markers on a globe. Clusters are recomputed from
//! scratch on every call; there is no spatial index and no state kept between
//! calls.
//!
//! # Architecture
//!
//! - **[`Visitor`]**: Visit record with loosely typed coordinates, normalized at the boundary
//! - **[`ClusterStrategy`]**: Swappable clustering policy ([`RadiusStrategy`] by default)
//! - **[`ClusterEngine`]**: Normalizes input, runs the strategy and flags recent clusters
//! - **[`VisitorLog`]**: Insert-only store of visitor rows handing out snapshots
//! - **[`ClientIdentityProvider`]**: Stable client identifier for the recording path
//!
//! # Performance Characteristics
//!
//! - **Clustering**: O(N × C) haversine evaluations, N = visitors, C = clusters
//! - **Memory**: O(N); members are shared `Arc<Visitor>` references

mod cluster;
mod engine;
mod identity;
mod strategy;
mod visitor;
mod visitor_log;
pub mod utils;

// Public API exports
pub use cluster::Cluster;
pub use engine::{ClusterEngine, ClusterSummary, Config, DEFAULT_RECENCY_WINDOW_MS};
pub use identity::{ClientIdentityProvider, FileIdentity, FixedIdentity, VisitRequest};
pub use strategy::{
    ClusterStrategy, DEFAULT_RADIUS_KM, GridStrategy, RadiusStrategy, StrategyKind,
    ZoomScaledRadiusStrategy,
};
pub use visitor::{Coordinate, LocatedVisitor, Visitor, normalize};
pub use visitor_log::{LogInfo, VisitorLog};

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Client identity error: {0}")]
    Identity(String),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DataError>;
