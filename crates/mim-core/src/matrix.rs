//! Label × device compatibility grid.
//!
//! Every `(label, device)` pair carries a [`CellState`]. Cells start either
//! `Incompatible` (fixed forever) or `Open`; the initial solver flips cells
//! between `Open` and `Planned`, and runtime allocation marks cells `Taken`.
use std::fmt;

use mim_model::{Device, DeviceId, Label, LabelId};

/// State of a single `(label, device)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellState {
    /// The label is restricted away from this device. Never changes.
    Incompatible,
    /// Compatible and not yet planned or consumed.
    Open,
    /// Pre-selected by the initial allocation solver.
    Planned,
    /// Consumed by a runtime allocation.
    Taken,
}

impl CellState {
    /// Returns `true` for every state except [`CellState::Incompatible`].
    #[inline]
    pub fn is_compatible(self) -> bool {
        !matches!(self, CellState::Incompatible)
    }

    /// Single-character glyph used when rendering the grid.
    #[inline]
    pub fn glyph(self) -> char {
        match self {
            CellState::Incompatible => 'X',
            CellState::Open => '.',
            CellState::Planned => 'O',
            CellState::Taken => '*',
        }
    }
}

/// Dense row-major grid of [`CellState`] indexed by `[label][device]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityMatrix {
    labels: usize,
    devices: usize,
    cells: Vec<CellState>,
}

impl CompatibilityMatrix {
    /// Build the grid from label restriction sets.
    ///
    /// A cell is `Incompatible` when the label has a non-empty restriction set
    /// that does not name the device, `Open` otherwise.
    pub fn new(labels: &[Label], devices: &[Device]) -> Self {
        let cells = labels
            .iter()
            .flat_map(|label| {
                devices.iter().map(move |device| {
                    if label.accepts(device) {
                        CellState::Open
                    } else {
                        CellState::Incompatible
                    }
                })
            })
            .collect();

        Self {
            labels: labels.len(),
            devices: devices.len(),
            cells,
        }
    }

    #[inline]
    pub fn num_labels(&self) -> usize {
        self.labels
    }

    #[inline]
    pub fn num_devices(&self) -> usize {
        self.devices
    }

    #[inline]
    fn index(&self, label: LabelId, device: DeviceId) -> usize {
        assert!(
            label.ordinal() < self.labels && device.ordinal() < self.devices,
            "cell ({label}, {device}) is outside a {}x{} matrix",
            self.labels,
            self.devices,
        );
        label.ordinal() * self.devices + device.ordinal()
    }

    pub fn get(&self, label: LabelId, device: DeviceId) -> CellState {
        self.cells[self.index(label, device)]
    }

    /// Overwrite a cell.
    ///
    /// # Panics
    /// If the cell is `Incompatible` or `state` is `Incompatible`: compatibility
    /// is fixed at construction.
    pub fn set(&mut self, label: LabelId, device: DeviceId, state: CellState) {
        let idx = self.index(label, device);
        let current = self.cells[idx];
        assert!(
            current.is_compatible() && state.is_compatible(),
            "compatibility of ({label}, {device}) is fixed: {current:?} -> {state:?}"
        );
        self.cells[idx] = state;
    }

    /// Iterate over a device column in ascending label order.
    pub fn column(&self, device: DeviceId) -> impl Iterator<Item = (LabelId, CellState)> + '_ {
        (0..self.labels).map(move |l| {
            let label = LabelId::new(l);
            (label, self.get(label, device))
        })
    }

    /// Iterate over a label row in ascending device order.
    pub fn row(&self, label: LabelId) -> impl Iterator<Item = (DeviceId, CellState)> + '_ {
        (0..self.devices).map(move |d| {
            let device = DeviceId::new(d);
            (device, self.get(label, device))
        })
    }

    /// Number of cells in a device column currently in `state`.
    pub fn count_in_column(&self, device: DeviceId, state: CellState) -> usize {
        self.column(device).filter(|(_, s)| *s == state).count()
    }

    /// Returns `true` if any cell of the label row is in `state`.
    pub fn row_contains(&self, label: LabelId, state: CellState) -> bool {
        self.row(label).any(|(_, s)| s == state)
    }

    /// Returns `true` if the label is compatible with at least one device.
    pub fn row_is_compatible(&self, label: LabelId) -> bool {
        self.row(label).any(|(_, s)| s.is_compatible())
    }
}

impl fmt::Display for CompatibilityMatrix {
    /// One line per label, one glyph per device.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for l in 0..self.labels {
            if l > 0 {
                f.write_str("\n")?;
            }
            for (_, state) in self.row(LabelId::new(l)) {
                write!(f, "{}", state.glyph())?;
            }
        }
        Ok(())
    }
}
