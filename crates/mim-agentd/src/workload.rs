use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use mim_core::{ImageAllocator, PendingWork};
use mim_model::LabelId;

/// Remaining benchmark runs per label, shared by all device workers.
///
/// Doubles as the allocator's pending-work signal.
#[derive(Debug)]
pub struct Workload {
    remaining: Vec<AtomicUsize>,
}

impl Workload {
    /// Runs per label taken from `runs` by label name; unlisted labels get one run.
    pub fn new(allocator: &ImageAllocator, runs: &BTreeMap<String, usize>) -> Self {
        let remaining = allocator
            .labels()
            .iter()
            .map(|l| AtomicUsize::new(runs.get(l.name()).copied().unwrap_or(1)))
            .collect();
        Self { remaining }
    }

    /// Claim one run of `label`. Returns `false` once the label is drained.
    pub fn take_run(&self, label: LabelId) -> bool {
        self.remaining[label.ordinal()]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self, label: LabelId) -> usize {
        self.remaining[label.ordinal()].load(Ordering::Acquire)
    }

    pub fn total_remaining(&self) -> usize {
        self.remaining.iter().map(|n| n.load(Ordering::Acquire)).sum()
    }
}

impl PendingWork for Workload {
    fn pending(&self, label: LabelId) -> usize {
        self.remaining(label)
    }
}
