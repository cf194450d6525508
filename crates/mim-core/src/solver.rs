//! Initial allocation search.
//!
//! Finds the smallest per-device reimage bound `N` for which every label can be
//! planned onto at least one compatible device while no device receives more
//! than `N` planned labels.
use mim_model::{DeviceId, LabelId};
use tracing::{debug, trace};

use crate::matrix::{CellState, CompatibilityMatrix};

/// Backtracking solver that marks `Planned` cells in a [`CompatibilityMatrix`].
///
/// The search walks label rows in ascending order and tries device columns in
/// ascending order, so identical inputs always produce the same plan.
pub struct InitialAllocationSolver<'a> {
    matrix: &'a mut CompatibilityMatrix,
    /// Planned cells per device column.
    load: Vec<usize>,
}

impl<'a> InitialAllocationSolver<'a> {
    pub fn new(matrix: &'a mut CompatibilityMatrix) -> Self {
        let load = vec![0; matrix.num_devices()];
        Self { matrix, load }
    }

    /// Run the search and return the bound `N` it settled on.
    ///
    /// On success the matrix carries the `Planned` cells. On failure (`None`)
    /// the matrix is left without any `Planned` cell.
    pub fn solve(mut self) -> Option<usize> {
        let labels = self.matrix.num_labels();
        let devices = self.matrix.num_devices();

        if labels == 0 {
            return Some(0);
        }
        if let Some(label) =
            (0..labels).map(LabelId::new).find(|l| !self.matrix.row_is_compatible(*l))
        {
            debug!(%label, "label has no compatible device");
            return None;
        }

        if devices == 1 {
            return Some(self.plan_single_device());
        }
        if labels == 1 {
            return Some(self.plan_single_label());
        }

        let lower = if devices >= labels {
            1
        } else {
            labels - devices + 1
        };

        for bound in lower..=labels {
            trace!(bound, "searching initial allocation");
            if self.plan_rows(0, bound) {
                return Some(bound);
            }
        }
        None
    }

    /// Every compatible label goes onto the only device.
    fn plan_single_device(&mut self) -> usize {
        let device = DeviceId::new(0);
        let mut planned = 0;
        for l in 0..self.matrix.num_labels() {
            let label = LabelId::new(l);
            if self.matrix.get(label, device) == CellState::Open {
                self.matrix.set(label, device, CellState::Planned);
                planned += 1;
            }
        }
        self.load[0] = planned;
        planned
    }

    /// The only label goes onto every compatible device.
    fn plan_single_label(&mut self) -> usize {
        let label = LabelId::new(0);
        for d in 0..self.matrix.num_devices() {
            let device = DeviceId::new(d);
            if self.matrix.get(label, device) == CellState::Open {
                self.matrix.set(label, device, CellState::Planned);
                self.load[d] = 1;
            }
        }
        1
    }

    /// Plan rows `row..` with at most `bound` planned cells per column.
    fn plan_rows(&mut self, row: usize, bound: usize) -> bool {
        if row == self.matrix.num_labels() {
            return true;
        }

        let label = LabelId::new(row);
        for d in 0..self.matrix.num_devices() {
            let device = DeviceId::new(d);
            if self.load[d] >= bound || self.matrix.get(label, device) != CellState::Open {
                continue;
            }

            self.matrix.set(label, device, CellState::Planned);
            self.load[d] += 1;
            if self.plan_rows(row + 1, bound) {
                return true;
            }
            self.matrix.set(label, device, CellState::Open);
            self.load[d] -= 1;
        }
        false
    }
}
