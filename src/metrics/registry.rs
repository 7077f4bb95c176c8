//! Metrics registry management
use super::*;

/// Central metrics registry
///
/// High-level handle over the global Prometheus registry used by the search
/// services.
pub struct MetricsRegistry {
    enabled: bool,
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Register all metrics. No-op when disabled.
    pub fn init(&self) -> Result<(), prometheus::Error> {
        if !self.enabled {
            tracing::info!("Prometheus metrics disabled in configuration");
            return Ok(());
        }
        init_metrics()?;
        tracing::info!("Prometheus metrics initialized");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        gather_metrics()
    }

    /// Get metrics summary
    pub fn summary(&self) -> MetricsSummary {
        let metrics_text = self.export();

        let mut counter_count = 0;
        let mut histogram_count = 0;

        for line in metrics_text.lines() {
            if line.starts_with("# TYPE") {
                if line.contains("counter") {
                    counter_count += 1;
                } else if line.contains("histogram") {
                    histogram_count += 1;
                }
            }
        }

        MetricsSummary {
            enabled: self.enabled,
            total_metrics: counter_count + histogram_count,
            counter_count,
            histogram_count,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Summary of metrics registry state
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub enabled: bool,
    pub total_metrics: usize,
    pub counter_count: usize,
    pub histogram_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_registry_skips_init() {
        let registry = MetricsRegistry::new(false);
        assert!(registry.init().is_ok());
        assert!(!registry.is_enabled());
    }

    #[test]
    fn test_metrics_summary() {
        let registry = MetricsRegistry::default();
        registry.init().unwrap();
        SEARCH_ZERO_RESULTS_TOTAL.inc();
        SEARCH_DURATION_SECONDS.observe(0.01);

        let summary = registry.summary();
        assert!(summary.enabled);
        assert!(summary.counter_count > 0);
        assert!(summary.histogram_count > 0);
    }
}
