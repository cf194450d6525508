pub mod allocator;
pub mod error;
pub mod ledger;
pub mod matrix;
pub mod metrics;
pub mod pending;
pub mod solver;

pub use allocator::ImageAllocator;
pub use error::CoreError;
pub use ledger::{AllocationEvent, AllocationLedger, AllocationSource};
pub use matrix::{CellState, CompatibilityMatrix};
pub use metrics::{MetricsBackend, MetricsHandle, NoOpMetrics, SolveOutcome, noop_metrics};
pub use pending::PendingWork;
pub use solver::InitialAllocationSolver;

pub mod prelude {
    pub use crate::allocator::ImageAllocator;
    pub use crate::error::CoreError;
    pub use crate::ledger::{AllocationLedger, AllocationSource};
    pub use crate::pending::PendingWork;
    pub use mim_model::{Device, DeviceId, Label, LabelId, PoolSpec};
}
