//! Flush Engine Metrics
//!
//! Prometheus metric families for the data node's write path. Metrics are
//! grouped into a struct rather than free statics so the flush engine can
//! take them at construction time and tests can assert on a private
//! instance without cross-test interference. A process-wide default
//! instance and registry are still provided for production wiring.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
};

/// Label values for object-store operations.
pub mod labels {
    pub const OP_PUT: &str = "put";
    pub const OP_GET: &str = "get";
    pub const OP_REMOVE: &str = "remove";
    pub const OP_LIST: &str = "list";
    pub const OP_STAT: &str = "stat";

    pub const STATUS_SUCCESS: &str = "success";
    pub const STATUS_FAIL: &str = "fail";

    pub const KIND_INSERT: &str = "insert";
    pub const KIND_DELETE: &str = "delete";
}

/// Metric families emitted by the flush engine.
#[derive(Clone)]
pub struct FlushMetrics {
    /// Object-store requests by operation and outcome.
    pub object_ops_total: IntCounterVec,

    /// Bytes persisted to the object store by binlog kind.
    pub flushed_bytes_total: IntCounterVec,

    /// Save-to-storage latency by binlog kind.
    pub save_latency_seconds: HistogramVec,

    /// Buffer encode latency of the insert path.
    pub encode_latency_seconds: Histogram,

    /// Channel checkpoint RPCs by outcome.
    pub checkpoint_updates_total: IntCounterVec,
}

impl FlushMetrics {
    pub fn new() -> Self {
        Self {
            object_ops_total: IntCounterVec::new(
                Opts::new(
                    "vectorhouse_object_store_ops_total",
                    "Total object store requests",
                ),
                &["op", "status"],
            )
            .expect("metric can be created"),
            flushed_bytes_total: IntCounterVec::new(
                Opts::new(
                    "vectorhouse_flushed_bytes_total",
                    "Total binlog bytes persisted",
                ),
                &["kind"],
            )
            .expect("metric can be created"),
            save_latency_seconds: HistogramVec::new(
                HistogramOpts::new(
                    "vectorhouse_save_latency_seconds",
                    "Save-to-storage latency in seconds",
                )
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
                &["kind"],
            )
            .expect("metric can be created"),
            encode_latency_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "vectorhouse_encode_buffer_latency_seconds",
                    "Insert buffer encode latency in seconds",
                )
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            )
            .expect("metric can be created"),
            checkpoint_updates_total: IntCounterVec::new(
                Opts::new(
                    "vectorhouse_channel_checkpoint_updates_total",
                    "Total channel checkpoint update RPCs",
                ),
                &["status"],
            )
            .expect("metric can be created"),
        }
    }

    /// Register every family onto `registry`.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.object_ops_total.clone()))?;
        registry.register(Box::new(self.flushed_bytes_total.clone()))?;
        registry.register(Box::new(self.save_latency_seconds.clone()))?;
        registry.register(Box::new(self.encode_latency_seconds.clone()))?;
        registry.register(Box::new(self.checkpoint_updates_total.clone()))?;
        Ok(())
    }
}

impl Default for FlushMetrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// Global metrics registry for production wiring.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Process-wide metric instance, registered onto [`struct@REGISTRY`].
    pub static ref DEFAULT_METRICS: FlushMetrics = {
        let metrics = FlushMetrics::new();
        metrics
            .register(&REGISTRY)
            .expect("default metrics can be registered");
        metrics
    };
}
