//! Prometheus metrics for the query client, boundaries and retries.
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed, so library code records unconditionally.
//!
//! # Example
//!
//! ```rust,no_run
//! use marquee_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use marquee_core::BranchKind;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus exporter handle.
///
/// Installs the global recorder and renders the text exposition format; the
/// host application decides how to serve it.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an exporter that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Query client
    describe_counter!("query_cache_hits_total", "Fetches answered from fresh cached data");
    describe_counter!("query_fetches_started_total", "Network requests started by the query client");
    describe_counter!(
        "query_fetches_deduplicated_total",
        "Fetches that joined a request already in flight for the same key"
    );
    describe_counter!("query_fetch_errors_total", "Requests that settled with a transport error");
    describe_counter!(
        "query_stale_writes_discarded_total",
        "Settled requests whose cache write was discarded after invalidation"
    );
    describe_counter!("query_invalidations_total", "Cache entries invalidated");
    describe_counter!("query_evictions_total", "Idle cache entries dropped after the cache time");
    describe_histogram!("query_fetch_duration_seconds", "Time from request start to settle");

    // Boundaries
    describe_counter!("boundary_branches_total", "Branch transitions observed by loaders");
    describe_counter!(
        "boundary_validation_failures_total",
        "Aggregated payloads rejected by their schema"
    );

    // Retries
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Total number of successful retries");
    describe_counter!(
        "retry_exhausted_total",
        "Total number of requests that exhausted max retries"
    );
}

/// Query client metrics recorder.
pub struct QueryMetrics;

impl QueryMetrics {
    /// Record a fetch served from fresh cache.
    pub fn record_cache_hit() {
        counter!("query_cache_hits_total").increment(1);
    }

    /// Record a new network request.
    pub fn record_fetch_started() {
        counter!("query_fetches_started_total").increment(1);
    }

    /// Record a fetch that joined an in-flight request.
    pub fn record_deduplicated() {
        counter!("query_fetches_deduplicated_total").increment(1);
    }

    /// Record a settled request.
    pub fn record_settled(duration: Duration, failed: bool) {
        histogram!("query_fetch_duration_seconds").record(duration.as_secs_f64());
        if failed {
            counter!("query_fetch_errors_total").increment(1);
        }
    }

    /// Record a cache write discarded because its generation was superseded.
    pub fn record_discarded_write() {
        counter!("query_stale_writes_discarded_total").increment(1);
    }

    /// Record invalidated entries.
    pub fn record_invalidated(count: usize) {
        counter!("query_invalidations_total").increment(count as u64);
    }

    /// Record idle entries dropped from the cache.
    pub fn record_evicted(count: usize) {
        counter!("query_evictions_total").increment(count as u64);
    }
}

/// Boundary metrics recorder.
pub struct BoundaryMetrics;

impl BoundaryMetrics {
    /// Record a branch transition.
    pub fn record_branch(kind: BranchKind) {
        counter!("boundary_branches_total", "branch" => kind.to_string()).increment(1);
    }

    /// Record a payload rejected by its schema.
    pub fn record_validation_failure(violations: usize) {
        counter!("boundary_validation_failures_total").increment(1);
        tracing::debug!(violations, "Payload failed validation");
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let server = MetricsServer::new();
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_metrics_server_render() {
        let mut server = MetricsServer::new();
        server.start().unwrap();

        QueryMetrics::record_fetch_started();
        QueryMetrics::record_settled(Duration::from_millis(40), true);
        BoundaryMetrics::record_branch(BranchKind::Success);

        // Another test may have installed the recorder first; recording still
        // works, only rendering through this handle is unavailable.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("query_fetches_started_total"));
            assert!(rendered.contains("query_fetch_errors_total"));
            assert!(rendered.contains("boundary_branches_total"));
        }
    }
}
