use chrono::{DateTime, Duration, Utc};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use visitor_cluster_lib::{Config, StrategyKind};

/// Clustering policy selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    /// Fixed radius, first cluster within range wins
    Radius,
    /// Radius scaled by (1 - view)
    ZoomScaledRadius,
    /// Lat/long grid whose cell size shrinks with the view
    Grid,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Radius => StrategyKind::Radius,
            StrategyArg::ZoomScaledRadius => StrategyKind::ZoomScaledRadius,
            StrategyArg::Grid => StrategyKind::Grid,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Visitor Globe - Cluster recorded visitor locations for display on a globe
pub struct Settings {
    /// JSON file with an array of visitor rows (reads stdin when omitted)
    #[clap(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// View/zoom parameter passed to the clustering strategy
    #[clap(long, default_value = "0.0")]
    pub view: f64,

    /// Merge radius in kilometers
    #[clap(short, long, default_value = "50.0")]
    pub radius_km: f64,

    /// Clusters active within this many milliseconds of the latest visit are flagged as new
    #[clap(long, default_value = "5000")]
    pub recency_window_ms: i64,

    /// Clustering strategy
    #[clap(short, long, value_enum, default_value = "radius")]
    pub strategy: StrategyArg,

    /// Window in minutes for the recent-visitors panel
    #[clap(long, default_value = "5")]
    pub recent_minutes: i64,

    /// Reference time for the recent-visitors panel (RFC 3339, defaults to now)
    #[clap(long)]
    pub now: Option<DateTime<Utc>>,

    /// Pretty-print the JSON report
    #[clap(long, default_value = "false")]
    pub pretty: bool,
}

impl Settings {
    /// Parse settings from the process arguments, exiting on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Engine configuration derived from the settings
    pub fn config(&self) -> Config {
        Config {
            radius_km: self.radius_km,
            recency_window_ms: self.recency_window_ms,
            strategy: self.strategy.into(),
        }
    }

    #[inline]
    pub fn recent_window(&self) -> Duration {
        Duration::minutes(self.recent_minutes.max(0))
    }

    #[inline]
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}
