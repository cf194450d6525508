use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares an ordinal-backed identifier.
///
/// The ordinal is the position of the entity in the list it was registered from,
/// so identifiers are only meaningful next to that list.
macro_rules! ordinal_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Wrap a raw ordinal.
            #[inline]
            pub const fn new(ordinal: usize) -> Self {
                Self(ordinal)
            }

            /// Position in the registration list.
            #[inline]
            pub const fn ordinal(&self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

ordinal_id!(
    /// Typed handle of a [`crate::Label`] inside a pool.
    LabelId,
    "label"
);

ordinal_id!(
    /// Typed handle of a [`crate::Device`] inside a pool.
    DeviceId,
    "device"
);
