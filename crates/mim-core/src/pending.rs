//! Pending-work signal supplied by the test scheduler.
use std::collections::{BTreeMap, HashMap};

use mim_model::LabelId;

/// Reports how many benchmark iterations remain to be run for a label.
///
/// The allocator consults this while holding its lock, so implementations must
/// be quick and must not call back into the allocator.
pub trait PendingWork {
    fn pending(&self, label: LabelId) -> usize;
}

impl<F> PendingWork for F
where
    F: Fn(LabelId) -> usize,
{
    #[inline]
    fn pending(&self, label: LabelId) -> usize {
        self(label)
    }
}

/// Labels absent from the map have no pending work.
impl PendingWork for BTreeMap<LabelId, usize> {
    fn pending(&self, label: LabelId) -> usize {
        self.get(&label).copied().unwrap_or(0)
    }
}

/// Labels absent from the map have no pending work.
impl PendingWork for HashMap<LabelId, usize> {
    fn pending(&self, label: LabelId) -> usize {
        self.get(&label).copied().unwrap_or(0)
    }
}
