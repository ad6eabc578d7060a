//! VectorHouse Observability
//!
//! Provides metrics and logging for the VectorHouse data node.
//!
//! # Features
//!
//! - Prometheus metric families for the flush engine ([`FlushMetrics`])
//! - Structured logging bootstrap with tracing

pub mod metrics;

pub use metrics::{labels, FlushMetrics, DEFAULT_METRICS, REGISTRY};

/// Initialize tracing with an env-filter controlled subscriber.
///
/// Intended for binaries and integration tests; library code only emits
/// through `tracing` macros and never installs a subscriber itself.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
