//! Placement database for row-based standard-cell designs.
//!
//! The [`Database`] owns flat arenas of every design entity (cells, rows,
//! sites, instances and their per-row sub-instances, fence regions, rails,
//! free intervals and repair variables), all cross-referenced by typed u32
//! ids. It also provides the structural passes the placement engines rely
//! on: sorting rows by y, binding rails to rows, partitioning rows into
//! fence-region-aware free intervals, and keeping sub-instance positions in
//! sync with their owners.

#![warn(missing_docs)]

mod cell;
mod database;
mod error;
mod fence_region;
mod grid;
mod ids;
mod instance;
mod interval;
mod row;
mod site;
mod split;
mod types;
mod variable;

pub use cell::Cell;
pub use database::{Database, NUM_EDGE_TYPES};
pub use error::DbError;
pub use fence_region::FenceRegion;
pub use grid::GridConfig;
pub use ids::{
    CellId, FenceRegionId, InstanceId, IntervalId, LayerId, RailId, RowId, SiteId, SubInstanceId,
    VariableId,
};
pub use instance::{Instance, SubInstance};
pub use interval::Interval;
pub use row::Row;
pub use site::{Rail, Site};
pub use types::{EdgeType, Orientation, RailKind};
pub use variable::Variable;
