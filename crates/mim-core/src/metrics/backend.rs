use std::sync::Arc;

use crate::ledger::AllocationSource;

/// Result of the initial allocation search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// Every label received a planned device.
    Solved,
    /// At least one label has no compatible device.
    Unsatisfiable,
}

impl SolveOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            SolveOutcome::Solved => "solved",
            SolveOutcome::Unsatisfiable => "unsatisfiable",
        }
    }
}

/// Backend metrics collection interface.
///
/// Calls are made outside the allocator lock.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record the initial allocation search.
    ///
    /// # Arguments
    /// - `outcome`: Whether every label could be planned
    /// - `bound`: Per-device reimage bound found (zero when unsatisfiable)
    /// - `duration_ms`: Search time in milliseconds
    fn record_initial_allocation(&self, outcome: SolveOutcome, bound: usize, duration_ms: u64);
    /// Record a label handed out to a device.
    ///
    /// # Arguments
    /// - `label`: Label name
    /// - `source`: Planned cell or greedy fallback
    fn record_allocation(&self, label: &str, source: AllocationSource);
    /// Record a device that was told there is no more work for it.
    fn record_exhausted(&self, device: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
