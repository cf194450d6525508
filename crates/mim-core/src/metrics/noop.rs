use crate::{
    ledger::AllocationSource,
    metrics::backend::{MetricsBackend, SolveOutcome},
};

/// No-op metrics backend that compiles to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_initial_allocation(&self, _: SolveOutcome, _: usize, _: u64) {}

    #[inline(always)]
    fn record_allocation(&self, _: &str, _: AllocationSource) {}

    #[inline(always)]
    fn record_exhausted(&self, _: &str) {}
}
