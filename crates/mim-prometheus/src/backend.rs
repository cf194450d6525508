use std::sync::Arc;

use prometheus::{
    CounterVec, Histogram, HistogramOpts, IntGauge, Opts, Registry, proto::MetricFamily,
};

use mim_core::{AllocationSource, MetricsBackend, SolveOutcome};

/// Prometheus metrics backend for the image allocator.
///
/// ## Label cardinality
/// - `outcome`: "solved", "unsatisfiable"
/// - `source`: "planned", "greedy"
/// - `label` and `device`: bounded by the size of the configured pool
#[derive(Clone)]
pub struct PrometheusMetrics {
    initial_allocations: CounterVec,
    reimage_bound: IntGauge,
    solve_duration: Histogram,
    allocations: CounterVec,
    exhausted: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Create a new prometheus metrics backend with custom registry.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let initial_allocations = CounterVec::new(
            Opts::new(
                "initial_allocations_total",
                "Initial allocation searches by outcome",
            )
            .namespace("mim"),
            &["outcome"],
        )?;
        registry.register(Box::new(initial_allocations.clone()))?;

        let reimage_bound = IntGauge::with_opts(
            Opts::new(
                "reimage_bound",
                "Per-device reimage bound found by the initial allocation",
            )
            .namespace("mim"),
        )?;
        registry.register(Box::new(reimage_bound.clone()))?;

        let solve_duration = Histogram::with_opts(
            HistogramOpts::new(
                "initial_allocation_duration_seconds",
                "Initial allocation search time in seconds",
            )
            .namespace("mim")
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(solve_duration.clone()))?;

        let allocations = CounterVec::new(
            Opts::new("allocations_total", "Labels handed out to devices").namespace("mim"),
            &["label", "source"],
        )?;
        registry.register(Box::new(allocations.clone()))?;

        let exhausted = CounterVec::new(
            Opts::new(
                "devices_exhausted_total",
                "Allocation requests answered with no more work",
            )
            .namespace("mim"),
            &["device"],
        )?;
        registry.register(Box::new(exhausted.clone()))?;

        Ok(Self {
            initial_allocations,
            reimage_bound,
            solve_duration,
            allocations,
            exhausted,
            registry,
        })
    }

    /// Create a new prometheus metrics backend with default registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    /// Gather all metrics for exposition.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Get reference to underlying prometheus registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_initial_allocation(&self, outcome: SolveOutcome, bound: usize, duration_ms: u64) {
        self.initial_allocations
            .with_label_values(&[outcome.as_label()])
            .inc();
        self.reimage_bound.set(bound as i64);
        self.solve_duration.observe(duration_ms as f64 / 1000.0);
    }

    fn record_allocation(&self, label: &str, source: AllocationSource) {
        self.allocations
            .with_label_values(&[label, source.as_label()])
            .inc();
    }

    fn record_exhausted(&self, device: &str) {
        self.exhausted.with_label_values(&[device]).inc();
    }
}
