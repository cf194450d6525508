//! Append-only record of runtime allocations.
//!
//! Per-label counters are derived from the event list on demand, so the ledger
//! has a single source of truth.
use serde::{Deserialize, Serialize};

use mim_model::{DeviceId, LabelId};

/// How a runtime allocation was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllocationSource {
    /// Consumed a cell pre-planned by the initial solver.
    Planned,
    /// Picked by the minimum-reimage-count fallback.
    Greedy,
}

impl AllocationSource {
    /// Return label value for logs and metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            AllocationSource::Planned => "planned",
            AllocationSource::Greedy => "greedy",
        }
    }
}

/// Single `(label, device)` assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationEvent {
    /// Position in the ledger, starting at zero.
    pub seq: u64,
    pub label: LabelId,
    pub device: DeviceId,
    pub source: AllocationSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationLedger {
    events: Vec<AllocationEvent>,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an assignment and return the stored event.
    pub fn record(
        &mut self,
        label: LabelId,
        device: DeviceId,
        source: AllocationSource,
    ) -> AllocationEvent {
        let event = AllocationEvent {
            seq: self.events.len() as u64,
            label,
            device,
            source,
        };
        self.events.push(event);
        event
    }

    /// Number of devices that have been assigned `label` so far.
    pub fn reimage_count(&self, label: LabelId) -> usize {
        self.events.iter().filter(|e| e.label == label).count()
    }

    /// Devices assigned `label`, in assignment order.
    pub fn assigned_devices(&self, label: LabelId) -> Vec<DeviceId> {
        self.events
            .iter()
            .filter(|e| e.label == label)
            .map(|e| e.device)
            .collect()
    }

    pub fn events(&self) -> &[AllocationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
