//! Library cell templates.

use crate::types::EdgeType;
use serde::{Deserialize, Serialize};

/// A library cell definition. Immutable after library load; instances
/// reference it by [`CellId`](crate::CellId).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cell {
    /// Cell name in the library.
    pub name: String,
    /// Cell width in design units.
    pub width: f64,
    /// Cell height in design units (a multiple of the row height).
    pub height: f64,
    /// Edge type of the left cell boundary.
    pub left_edge_type: EdgeType,
    /// Edge type of the right cell boundary.
    pub right_edge_type: EdgeType,
}

impl Cell {
    /// Creates a cell template with default edge types.
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            left_edge_type: EdgeType::default(),
            right_edge_type: EdgeType::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cell() {
        let cell = Cell::new("INVX1", 20.0, 100.0);
        assert_eq!(cell.name, "INVX1");
        assert_eq!(cell.width, 20.0);
        assert_eq!(cell.left_edge_type, EdgeType(0));
    }
}
