//! Logging initialization for the command-line driver

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Default filter used when `RUST_LOG` is not set
fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Initialize the global tracing subscriber
///
/// Log lines go to stderr so that stdout only carries the JSON report.
pub fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(fmt_layer).init();
    tracing::debug!(
        "Tracing initialized ({} {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
}
