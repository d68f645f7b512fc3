//! Placed instances and their per-row slices.

use crate::ids::{CellId, FenceRegionId, InstanceId, IntervalId, SubInstanceId, VariableId};
use crate::types::{EdgeType, Orientation};
use legato_geom::Point;
use serde::{Deserialize, Serialize};

/// A placed occurrence of a library cell.
///
/// Positions are lower-left corners. The global-placed position is the input
/// position the legalizer tries to stay close to; `position` is the current
/// (possibly legalized) one. `detail_initial_position` is snapshotted before
/// detailed placement for its own displacement accounting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instance {
    /// The cell template this instance realizes, if known.
    pub cell: Option<CellId>,
    /// Instance name in the design.
    pub name: String,
    /// Edge type of the left boundary (swapped by horizontal flips).
    pub left_edge_type: EdgeType,
    /// Edge type of the right boundary.
    pub right_edge_type: EdgeType,
    /// Whether the instance may not be moved.
    pub is_fixed: bool,
    /// Position assigned by global placement.
    pub global_placed_position: Point,
    position: Point,
    /// Position snapshotted when detailed placement starts.
    pub detail_initial_position: Point,
    /// Instance width in design units.
    pub width: f64,
    /// Instance height in design units.
    pub height: f64,
    /// Current orientation.
    pub orientation: Orientation,
    /// Fence region this instance must be placed in, if any.
    pub fence_region: Option<FenceRegionId>,
    /// Whether the bottom rail of the cell is ground (VSS).
    pub is_bottom_ground: bool,
    sub_instances: Vec<SubInstanceId>,
    variables: Vec<VariableId>,
    /// Whether this instance participates in a forbidden adjacency.
    pub forbidden_cell: bool,
    /// Whether SAT exactly-one clauses were already emitted for it.
    pub variables_encoded: bool,
}

impl Instance {
    /// Creates an instance at its global-placed position.
    pub fn new(
        name: impl Into<String>,
        is_fixed: bool,
        global_placed_position: Point,
        width: f64,
        height: f64,
        orientation: Orientation,
    ) -> Self {
        Self {
            cell: None,
            name: name.into(),
            left_edge_type: EdgeType::default(),
            right_edge_type: EdgeType::default(),
            is_fixed,
            global_placed_position,
            position: global_placed_position,
            detail_initial_position: global_placed_position,
            width,
            height,
            orientation,
            fence_region: None,
            is_bottom_ground: true,
            sub_instances: Vec::new(),
            variables: Vec::new(),
            forbidden_cell: false,
            variables_encoded: false,
        }
    }

    /// Current lower-left position.
    pub fn position(&self) -> Point {
        self.position
    }

    /// Moves the instance.
    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    /// Number of rows this instance spans.
    pub fn num_sub_instances(&self) -> usize {
        self.sub_instances.len()
    }

    /// The sub-instance on the `idx`-th row from the bottom.
    pub fn sub_instance_id(&self, idx: usize) -> SubInstanceId {
        self.sub_instances[idx]
    }

    /// All sub-instances, bottom to top.
    pub fn sub_instance_ids(&self) -> &[SubInstanceId] {
        &self.sub_instances
    }

    /// Registers a sub-instance. Must be added bottom to top.
    pub fn add_sub_instance_id(&mut self, id: SubInstanceId) {
        self.sub_instances.push(id);
    }

    /// Number of SAT variables allocated for this instance.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// The `idx`-th SAT variable of this instance.
    pub fn variable_id(&self, idx: usize) -> VariableId {
        self.variables[idx]
    }

    /// All SAT variables of this instance.
    pub fn variable_ids(&self) -> &[VariableId] {
        &self.variables
    }

    /// Registers a SAT variable for this instance.
    pub fn add_variable_id(&mut self, id: VariableId) {
        self.variables.push(id);
    }

    /// Drops all SAT variable registrations and the encoded flag.
    pub fn clear_variable_ids(&mut self) {
        self.variables.clear();
        self.variables_encoded = false;
    }

    /// Flips the instance upside down, toggling its orientation and rail
    /// polarity.
    pub fn flip_vertically(&mut self) {
        self.orientation = self.orientation.flipped_vertically();
        self.is_bottom_ground = !self.is_bottom_ground;
    }

    /// Mirrors the instance left-to-right, swapping its edge types.
    pub fn flip_horizontally(&mut self) {
        self.orientation = self.orientation.flipped_horizontally();
        std::mem::swap(&mut self.left_edge_type, &mut self.right_edge_type);
    }
}

/// The slice of an instance occupying a single row.
///
/// Height-1 instances have exactly one. The four corner gate flags record the
/// presence of source/drain gate structures at each corner of the slice and
/// drive the forbidden-adjacency predicate of the detailed engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubInstance {
    /// The owning instance.
    pub instance: InstanceId,
    /// Width of the slice (equals the instance width).
    pub width: f64,
    /// Lower-left position of the slice.
    pub position: Point,
    /// The interval currently hosting this slice, if registered.
    pub interval: Option<IntervalId>,
    /// Gate present at the top-left corner.
    pub left_top: bool,
    /// Gate present at the bottom-left corner.
    pub left_bottom: bool,
    /// Gate present at the top-right corner.
    pub right_top: bool,
    /// Gate present at the bottom-right corner.
    pub right_bottom: bool,
    /// Chain neighbor to the left in the row, if any.
    pub left_neighbor: Option<SubInstanceId>,
    /// Chain neighbor to the right in the row, if any.
    pub right_neighbor: Option<SubInstanceId>,
    /// Oxide diffusion height class.
    pub oxide_height: f64,
    /// Whether this slice participates in a forbidden adjacency.
    pub dda_forbidden: bool,
}

impl SubInstance {
    /// Creates the slice of `instance` at `position`.
    pub fn new(instance: InstanceId, width: f64, position: Point) -> Self {
        Self {
            instance,
            width,
            position,
            interval: None,
            left_top: false,
            left_bottom: false,
            right_top: false,
            right_bottom: false,
            left_neighbor: None,
            right_neighbor: None,
            oxide_height: 1.0,
            dda_forbidden: false,
        }
    }

    /// Sets the left-edge gate flags (top, bottom).
    pub fn set_gates_left(&mut self, top: bool, bottom: bool) {
        self.left_top = top;
        self.left_bottom = bottom;
    }

    /// Sets the right-edge gate flags (top, bottom).
    pub fn set_gates_right(&mut self, top: bool, bottom: bool) {
        self.right_top = top;
        self.right_bottom = bottom;
    }

    /// Mirrors the slice left-to-right, exchanging the corner gate flags.
    pub fn flip(&mut self) {
        std::mem::swap(&mut self.left_top, &mut self.right_top);
        std::mem::swap(&mut self.left_bottom, &mut self.right_bottom);
    }
}
