use std::cmp::Reverse;

use mim_model::{DeviceId, LabelId};

use crate::{
    ledger::{AllocationLedger, AllocationSource},
    matrix::{CellState, CompatibilityMatrix},
    pending::PendingWork,
};

/// Matrix and ledger guarded together by the allocator lock.
#[derive(Debug)]
pub(crate) struct AllocationState {
    pub(crate) matrix: CompatibilityMatrix,
    pub(crate) ledger: AllocationLedger,
}

impl AllocationState {
    pub(crate) fn new(matrix: CompatibilityMatrix) -> Self {
        Self {
            matrix,
            ledger: AllocationLedger::new(),
        }
    }

    /// Pick the next label for `device`, mark its cell `Taken` and record it.
    pub(crate) fn take(
        &mut self,
        device: DeviceId,
        pending: Option<&dyn PendingWork>,
    ) -> Option<(LabelId, AllocationSource)> {
        let (label, source) = match self.next_planned(device) {
            Some(label) => (label, AllocationSource::Planned),
            None => (self.next_greedy(device, pending)?, AllocationSource::Greedy),
        };

        self.matrix.set(label, device, CellState::Taken);
        self.ledger.record(label, device, source);
        Some((label, source))
    }

    /// Lowest-ordinal planned label of the device column.
    fn next_planned(&self, device: DeviceId) -> Option<LabelId> {
        self.matrix
            .column(device)
            .find(|(_, state)| *state == CellState::Planned)
            .map(|(label, _)| label)
    }

    /// Open label with the fewest reimages so far.
    ///
    /// Ties prefer more pending work, then the lowest label ordinal. Labels with
    /// no pending work are skipped when a pending signal is supplied.
    fn next_greedy(&self, device: DeviceId, pending: Option<&dyn PendingWork>) -> Option<LabelId> {
        self.matrix
            .column(device)
            .filter(|(_, state)| *state == CellState::Open)
            .filter_map(|(label, _)| {
                let work = match pending {
                    Some(signal) => match signal.pending(label) {
                        0 => return None,
                        n => n,
                    },
                    None => 0,
                };
                Some((self.ledger.reimage_count(label), Reverse(work), label))
            })
            .min()
            .map(|(_, _, label)| label)
    }
}
