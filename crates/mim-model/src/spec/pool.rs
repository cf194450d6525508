use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{Device, Label},
    error::{ModelError, ModelResult},
};

/// Declarative description of the labels and devices to allocate between.
///
/// Ordinals of labels and devices follow the order of the lists, which fixes
/// the search and tie-break order of the allocator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    /// Build images to schedule.
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Devices available for flashing.
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl PoolSpec {
    pub fn new(labels: Vec<Label>, devices: Vec<Device>) -> Self {
        Self { labels, devices }
    }

    /// Check that every name is non-empty and unique within its list.
    ///
    /// Restriction sets are not checked against the device list: a label that
    /// names only unknown devices is a valid pool that simply cannot be scheduled.
    pub fn validate(&self) -> ModelResult<()> {
        let mut seen = HashSet::new();
        for label in &self.labels {
            if label.name().is_empty() {
                return Err(ModelError::EmptyName("label"));
            }
            if !seen.insert(label.name()) {
                return Err(ModelError::DuplicateLabel(label.name().to_string()));
            }
        }

        seen.clear();
        for device in &self.devices {
            if device.name().is_empty() {
                return Err(ModelError::EmptyName("device"));
            }
            if !seen.insert(device.name()) {
                return Err(ModelError::DuplicateDevice(device.name().to_string()));
            }
        }
        Ok(())
    }
}
