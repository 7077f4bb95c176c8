//! Prometheus metrics for the search pipeline.
//!
//! Covers query volume and latency, zero-result queries, cache effectiveness,
//! indexing outcomes and embedding fallbacks.
//!
//! # Example
//! ```no_run
//! use content_search::metrics::SEARCH_QUERIES_TOTAL;
//!
//! SEARCH_QUERIES_TOTAL.with_label_values(&["content"]).inc();
//! ```
mod registry;

pub use registry::{MetricsRegistry, MetricsSummary};

use lazy_static::lazy_static;
use prometheus::{CounterVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

const NAMESPACE: &str = "content_search";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Search Metrics
    // ============================================================================

    /// Total number of executed searches
    ///
    /// Labels: object_type (all, content, comment, account)
    pub static ref SEARCH_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("search_queries_total", "Total number of executed searches")
            .namespace(NAMESPACE),
        &["object_type"]
    ).expect("Failed to create SEARCH_QUERIES_TOTAL metric");

    /// Searches that returned no results
    pub static ref SEARCH_ZERO_RESULTS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("search_zero_results_total", "Searches that returned no results")
            .namespace(NAMESPACE)
    ).expect("Failed to create SEARCH_ZERO_RESULTS_TOTAL metric");

    /// Searches rejected by validation
    ///
    /// Labels: reason
    pub static ref SEARCH_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("search_rejected_total", "Searches rejected by validation")
            .namespace(NAMESPACE),
        &["reason"]
    ).expect("Failed to create SEARCH_REJECTED_TOTAL metric");

    /// End-to-end search duration in seconds
    pub static ref SEARCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("search_duration_seconds", "Search duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).expect("Failed to create SEARCH_DURATION_SECONDS metric");

    // ============================================================================
    // Cache Metrics
    // ============================================================================

    /// Cache lookups by outcome
    ///
    /// Labels: outcome (hit, miss, error)
    pub static ref CACHE_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("search_cache_requests_total", "Search cache lookups by outcome")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create CACHE_REQUESTS_TOTAL metric");

    // ============================================================================
    // Indexing Metrics
    // ============================================================================

    /// Index operations by outcome
    ///
    /// Labels: operation (index, remove, reindex, optimize), outcome (success, failure)
    pub static ref INDEX_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("index_operations_total", "Index operations by outcome")
            .namespace(NAMESPACE),
        &["operation", "outcome"]
    ).expect("Failed to create INDEX_OPERATIONS_TOTAL metric");

    // ============================================================================
    // Embedding Metrics
    // ============================================================================

    /// Semantic scoring fallbacks to lexical ranking
    ///
    /// Labels: reason (timeout, error, dimension_mismatch, empty)
    pub static ref EMBEDDING_FALLBACKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("embedding_fallbacks_total", "Semantic scoring fallbacks to lexical ranking")
            .namespace(NAMESPACE),
        &["reason"]
    ).expect("Failed to create EMBEDDING_FALLBACKS_TOTAL metric");
}

/// Register all metrics with the global registry.
///
/// Calling it twice is harmless: already-registered collectors are skipped.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SEARCH_QUERIES_TOTAL.clone()),
        Box::new(SEARCH_ZERO_RESULTS_TOTAL.clone()),
        Box::new(SEARCH_REJECTED_TOTAL.clone()),
        Box::new(SEARCH_DURATION_SECONDS.clone()),
        Box::new(CACHE_REQUESTS_TOTAL.clone()),
        Box::new(INDEX_OPERATIONS_TOTAL.clone()),
        Box::new(EMBEDDING_FALLBACKS_TOTAL.clone()),
    ];

    for collector in collectors {
        match PROMETHEUS_REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Export all registered metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Record the outcome of an index operation
pub fn record_index_operation(operation: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    INDEX_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}
