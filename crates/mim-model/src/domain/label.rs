use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Device;

/// Build image configuration that can be flashed onto devices.
///
/// A label may carry a set of device names it is restricted to (`remotes`).
/// An empty set means the image is compatible with every device in the pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    name: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    remotes: BTreeSet<String>,
}

impl Label {
    /// Create an unrestricted label.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remotes: BTreeSet::new(),
        }
    }

    /// Create a label that may only be flashed onto the named devices.
    ///
    /// ```rust
    /// use mim_model::{Device, Label};
    ///
    /// let label = Label::restricted_to("image-a", ["dut-1"]);
    /// assert!(label.accepts(&Device::new("dut-1")));
    /// assert!(!label.accepts(&Device::new("dut-2")));
    /// ```
    pub fn restricted_to<I, S>(name: impl Into<String>, remotes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            remotes: remotes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device names this label is restricted to, in lexical order.
    pub fn remotes(&self) -> impl Iterator<Item = &str> {
        self.remotes.iter().map(String::as_str)
    }

    /// Returns `true` if the label carries a non-empty restriction set.
    pub fn is_restricted(&self) -> bool {
        !self.remotes.is_empty()
    }

    /// Returns `true` if the image may be flashed onto `device`.
    pub fn accepts(&self, device: &Device) -> bool {
        self.remotes.is_empty() || self.remotes.contains(device.name())
    }
}
