/*!
Observability infrastructure for filevault.

Structured-logging setup plus optional Prometheus metrics for the
object-store operations (behind the `metrics` feature).
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{FileVaultError, Result};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<StoreMetrics> = OnceLock::new();

/// Metrics for object-store operations.
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct StoreMetrics {
    pub store_requests_total: Counter,
    pub store_errors_total: Counter,
    pub store_latency_seconds: Histogram,
    pub content_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
impl StoreMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let store_requests_total = Counter::new(
            "filevault_store_requests_total",
            "Total object-store requests made by filevault",
        )
        .map_err(|e| FileVaultError::storage(format!("failed to create request counter: {e}")))?;

        let store_errors_total = Counter::new(
            "filevault_store_errors_total",
            "Total object-store request errors in filevault",
        )
        .map_err(|e| FileVaultError::storage(format!("failed to create error counter: {e}")))?;

        let store_latency_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "filevault_store_latency_seconds",
            "Duration of object-store operations in seconds",
        ))
        .map_err(|e| FileVaultError::storage(format!("failed to create latency histogram: {e}")))?;

        let content_size_bytes = Histogram::with_opts(prometheus::HistogramOpts::new(
            "filevault_content_size_bytes",
            "Size of stored content representations in bytes",
        ))
        .map_err(|e| FileVaultError::storage(format!("failed to create size histogram: {e}")))?;

        for collector in [
            Box::new(store_requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(store_errors_total.clone()),
            Box::new(store_latency_seconds.clone()),
            Box::new(content_size_bytes.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| FileVaultError::storage(format!("failed to register metric: {e}")))?;
        }

        Ok(Self {
            store_requests_total,
            store_errors_total,
            store_latency_seconds,
            content_size_bytes,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    pub fn global() -> &'static StoreMetrics {
        METRICS.get_or_init(|| Self::new().expect("failed to initialize filevault metrics"))
    }

    pub fn record_request(&self) {
        self.store_requests_total.inc();
    }

    pub fn record_error(&self) {
        self.store_errors_total.inc();
    }

    pub fn record_latency(&self, duration: std::time::Duration) {
        self.store_latency_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_content_size(&self, size_bytes: u64) {
        self.content_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus text format.
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| FileVaultError::storage(format!("failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| FileVaultError::storage(format!("metrics are not valid UTF-8: {e}")))
    }
}

/// Timer helper measuring one object-store operation.
#[cfg(feature = "metrics")]
pub struct MetricsTimer {
    start: Instant,
}

#[cfg(feature = "metrics")]
impl MetricsTimer {
    /// Start a timer, counting the request immediately.
    pub fn start(_operation: &str) -> Self {
        StoreMetrics::global().record_request();
        Self {
            start: Instant::now(),
        }
    }

    /// Complete the timer, recording success latency.
    pub fn finish(self) {
        StoreMetrics::global().record_latency(self.start.elapsed());
    }

    /// Complete the timer with an error, recording latency and the error.
    pub fn finish_with_error(self) {
        StoreMetrics::global().record_latency(self.start.elapsed());
        StoreMetrics::global().record_error();
    }
}

/// Initialize the global observability system: JSON-formatted structured
/// logging filtered by `RUST_LOG`, with `filevault=info` as the default
/// directive, plus metrics when the `metrics` feature is enabled.
pub fn init_observability() -> Result<()> {
    #[cfg(feature = "metrics")]
    StoreMetrics::global();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(false);

    let subscriber = TracingRegistry::default()
        .with(
            EnvFilter::from_default_env().add_directive(
                "filevault=info"
                    .parse()
                    .map_err(|e| FileVaultError::storage(format!("bad filter directive: {e}")))?,
            ),
        )
        .with(fmt_layer);

    set_global_default(subscriber).map_err(|e| {
        FileVaultError::storage(format!("failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("filevault observability initialized");
    Ok(())
}
