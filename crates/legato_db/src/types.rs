//! Shared enumerations of the placement data model.

use serde::{Deserialize, Serialize};

/// Placement orientation of an instance or row.
///
/// Only the north/south family is used by row-based standard cells: `N` and
/// `S` are upright, `FN` and `FS` are their mirrored (flipped) counterparts.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Orientation {
    /// North, upright.
    N,
    /// South, rotated 180 degrees.
    S,
    /// Flipped north (mirrored about the y axis).
    FN,
    /// Flipped south (mirrored about the x axis).
    FS,
}

impl Orientation {
    /// The orientation after a vertical flip (mirror about the x axis).
    pub fn flipped_vertically(self) -> Self {
        match self {
            Orientation::N => Orientation::FS,
            Orientation::S => Orientation::FN,
            Orientation::FN => Orientation::S,
            Orientation::FS => Orientation::N,
        }
    }

    /// The orientation after a horizontal flip (mirror about the y axis).
    pub fn flipped_horizontally(self) -> Self {
        match self {
            Orientation::N => Orientation::FN,
            Orientation::S => Orientation::FS,
            Orientation::FN => Orientation::N,
            Orientation::FS => Orientation::S,
        }
    }
}

/// Electrical type of a rail net.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RailKind {
    /// Power (VDD) rail.
    Power,
    /// Ground (VSS) rail.
    Ground,
}

/// A cell edge type, indexing the pairwise edge spacing table.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct EdgeType(pub u8);

impl EdgeType {
    /// Index into the edge spacing table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
