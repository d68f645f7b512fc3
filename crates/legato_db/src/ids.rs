//! Opaque ID newtypes for chip database entities.
//!
//! Every entity owned by the [`Database`](crate::Database) arena is referenced
//! elsewhere only through one of these thin `u32` wrappers. Distinct types per
//! entity kind prevent cross-kind id confusion at compile time. Lookups that
//! may have no answer use `Option<XxxId>` rather than a sentinel value.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            /// Returns the index as `usize` for arena access.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque ID for a library cell template.
    CellId
);

define_id!(
    /// Opaque ID for a placed instance.
    InstanceId
);

define_id!(
    /// Opaque ID for the per-row slice of an instance.
    SubInstanceId
);

define_id!(
    /// Opaque ID for a placement row.
    RowId
);

define_id!(
    /// Opaque ID for a single site of the placement grid.
    SiteId
);

define_id!(
    /// Opaque ID for a free interval within a row.
    IntervalId
);

define_id!(
    /// Opaque ID for a fence region.
    FenceRegionId
);

define_id!(
    /// Opaque ID for a power/ground rail.
    RailId
);

define_id!(
    /// Opaque ID for a routing layer.
    LayerId
);

define_id!(
    /// Opaque ID for a SAT decision variable.
    VariableId
);
