//! Placement sites and power/ground rails.

use crate::ids::{FenceRegionId, LayerId, SubInstanceId, VariableId};
use crate::types::RailKind;
use legato_geom::Point;
use serde::{Deserialize, Serialize};

/// One cell of the placement grid: a single site column of a single row.
///
/// A site is `valid` when it lies on a usable part of the row. At most one
/// sub-instance occupies it at any time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Site {
    /// Lower-left position of the site.
    pub position: Point,
    /// Whether the site can host a sub-instance at all.
    pub is_valid: bool,
    /// Fence region the site belongs to, if any.
    pub fence_region: Option<FenceRegionId>,
    sub_instance: Option<SubInstanceId>,
    variables: Vec<VariableId>,
}

impl Site {
    /// Creates a valid, unoccupied site outside every fence region.
    pub fn new(position: Point) -> Self {
        Self {
            position,
            is_valid: true,
            fence_region: None,
            sub_instance: None,
            variables: Vec::new(),
        }
    }

    /// Whether a sub-instance currently occupies the site.
    pub fn has_sub_instance(&self) -> bool {
        self.sub_instance.is_some()
    }

    /// The occupying sub-instance, if any.
    pub fn sub_instance(&self) -> Option<SubInstanceId> {
        self.sub_instance
    }

    /// Marks the site occupied by `id`.
    pub fn set_sub_instance(&mut self, id: SubInstanceId) {
        self.sub_instance = Some(id);
    }

    /// Clears the site's occupancy.
    pub fn remove_sub_instance(&mut self) {
        self.sub_instance = None;
    }

    /// Number of SAT variables registered on this site.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// The SAT variables registered on this site.
    pub fn variable_ids(&self) -> &[VariableId] {
        &self.variables
    }

    /// Registers a SAT variable touching this site.
    pub fn add_variable_id(&mut self, id: VariableId) {
        self.variables.push(id);
    }

    /// Drops all SAT variable registrations.
    pub fn clear_variable_ids(&mut self) {
        self.variables.clear();
    }
}

/// A power or ground strap on a routing layer, bound to a row by exact
/// y-coincidence of its middle line with the row y.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rail {
    /// Routing layer carrying the rail.
    pub layer: LayerId,
    /// Power or ground.
    pub kind: RailKind,
    /// Y coordinate of the rail middle line.
    pub y: f64,
}

impl Rail {
    /// Creates a rail.
    pub fn new(layer: LayerId, kind: RailKind, y: f64) -> Self {
        Self { layer, kind, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupancy_lifecycle() {
        let mut site = Site::new(Point::new(0.0, 0.0));
        assert!(!site.has_sub_instance());

        site.set_sub_instance(SubInstanceId::from_raw(3));
        assert!(site.has_sub_instance());
        assert_eq!(site.sub_instance(), Some(SubInstanceId::from_raw(3)));

        site.remove_sub_instance();
        assert!(!site.has_sub_instance());
    }

    #[test]
    fn variables_accumulate() {
        let mut site = Site::new(Point::default());
        site.add_variable_id(VariableId::from_raw(0));
        site.add_variable_id(VariableId::from_raw(1));
        assert_eq!(site.num_variables(), 2);
    }
}
