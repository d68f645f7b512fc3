//! The central placement database.
//!
//! All entities live in flat arenas owned by [`Database`] and reference each
//! other through typed ids. Accessors panic on out-of-range ids (an id is a
//! proof of prior insertion); name lookups return [`DbError`]
//! on unknown names, position lookups return `Option`.

use crate::cell::Cell;
use crate::error::DbError;
use crate::fence_region::FenceRegion;
use crate::grid::GridConfig;
use crate::ids::{
    CellId, FenceRegionId, InstanceId, IntervalId, RailId, RowId, SiteId, SubInstanceId,
    VariableId,
};
use crate::instance::{Instance, SubInstance};
use crate::interval::Interval;
use crate::row::Row;
use crate::site::{Rail, Site};
use crate::variable::Variable;
use legato_geom::{Point, Rect};
use std::collections::HashMap;

/// Number of distinct cell edge types in the spacing table.
pub const NUM_EDGE_TYPES: usize = 3;

/// Owner of every placement entity of one design.
#[derive(Clone, Debug)]
pub struct Database {
    grid: GridConfig,
    design_name: String,
    die_rect: Rect,
    density_target: f64,
    displacement_limit: f64,
    edge_type_spacing: [[f64; NUM_EDGE_TYPES]; NUM_EDGE_TYPES],

    cells: Vec<Cell>,
    cell_id_by_name: HashMap<String, CellId>,

    rows: Vec<Row>,
    row_id_by_name: HashMap<String, RowId>,

    sites: Vec<Site>,
    site_grid: Vec<Vec<Option<SiteId>>>,

    fence_regions: Vec<FenceRegion>,
    fence_region_id_by_name: HashMap<String, FenceRegionId>,

    rails: Vec<Rail>,

    instances: Vec<Instance>,
    instance_id_by_name: HashMap<String, InstanceId>,
    // Bucket h-1 holds instances spanning h rows.
    instance_ids_by_row_height: Vec<Vec<InstanceId>>,
    fixed_instance_ids: Vec<InstanceId>,

    sub_instances: Vec<SubInstance>,
    intervals: Vec<Interval>,
    variables: Vec<Variable>,
}

impl Database {
    /// Creates an empty database on `grid` with die area `die_rect`.
    pub fn new(grid: GridConfig, die_rect: Rect) -> Self {
        Self {
            grid,
            design_name: String::new(),
            die_rect,
            density_target: 1.0,
            displacement_limit: f64::INFINITY,
            edge_type_spacing: [[0.0; NUM_EDGE_TYPES]; NUM_EDGE_TYPES],
            cells: Vec::new(),
            cell_id_by_name: HashMap::new(),
            rows: Vec::new(),
            row_id_by_name: HashMap::new(),
            sites: Vec::new(),
            site_grid: Vec::new(),
            fence_regions: Vec::new(),
            fence_region_id_by_name: HashMap::new(),
            rails: Vec::new(),
            instances: Vec::new(),
            instance_id_by_name: HashMap::new(),
            instance_ids_by_row_height: Vec::new(),
            fixed_instance_ids: Vec::new(),
            sub_instances: Vec::new(),
            intervals: Vec::new(),
            variables: Vec::new(),
        }
    }

    // Getters

    /// The placement grid.
    pub fn grid(&self) -> GridConfig {
        self.grid
    }

    /// Design name.
    pub fn design_name(&self) -> &str {
        &self.design_name
    }

    /// The die area.
    pub fn die_rect(&self) -> Rect {
        self.die_rect
    }

    /// Target placement density in (0, 1].
    pub fn density_target(&self) -> f64 {
        self.density_target
    }

    /// Maximum allowed per-instance displacement.
    pub fn displacement_limit(&self) -> f64 {
        self.displacement_limit
    }

    /// Required spacing between abutting edges of types `a` and `b`.
    pub fn edge_type_spacing(&self, a: crate::types::EdgeType, b: crate::types::EdgeType) -> f64 {
        self.edge_type_spacing[a.index()][b.index()]
    }

    /// Tallest movable instance height, in rows.
    pub fn max_instance_row_height(&self) -> usize {
        self.instance_ids_by_row_height.len()
    }

    /// Number of cells.
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of sites.
    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    /// Number of fence regions.
    pub fn num_fence_regions(&self) -> usize {
        self.fence_regions.len()
    }

    /// Number of rails.
    pub fn num_rails(&self) -> usize {
        self.rails.len()
    }

    /// Number of instances.
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Number of sub-instances.
    pub fn num_sub_instances(&self) -> usize {
        self.sub_instances.len()
    }

    /// Number of intervals.
    pub fn num_intervals(&self) -> usize {
        self.intervals.len()
    }

    /// Number of assignment variables.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of movable instances spanning `row_height` rows.
    pub fn num_instances_of_row_height(&self, row_height: usize) -> usize {
        self.instance_ids_by_row_height
            .get(row_height - 1)
            .map_or(0, Vec::len)
    }

    /// The `idx`-th movable instance spanning `row_height` rows.
    pub fn instance_id_by_row_height(&self, row_height: usize, idx: usize) -> InstanceId {
        self.instance_ids_by_row_height[row_height - 1][idx]
    }

    /// Number of fixed instances.
    pub fn num_fixed_instances(&self) -> usize {
        self.fixed_instance_ids.len()
    }

    /// The `idx`-th fixed instance.
    pub fn fixed_instance_id(&self, idx: usize) -> InstanceId {
        self.fixed_instance_ids[idx]
    }

    /// The cell with id `id`.
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.index()]
    }

    /// The row with id `id`.
    pub fn row(&self, id: RowId) -> &Row {
        &self.rows[id.index()]
    }

    /// Mutable access to a row.
    pub fn row_mut(&mut self, id: RowId) -> &mut Row {
        &mut self.rows[id.index()]
    }

    /// The site with id `id`.
    pub fn site(&self, id: SiteId) -> &Site {
        &self.sites[id.index()]
    }

    /// Mutable access to a site.
    pub fn site_mut(&mut self, id: SiteId) -> &mut Site {
        &mut self.sites[id.index()]
    }

    /// The fence region with id `id`.
    pub fn fence_region(&self, id: FenceRegionId) -> &FenceRegion {
        &self.fence_regions[id.index()]
    }

    /// Mutable access to a fence region.
    pub fn fence_region_mut(&mut self, id: FenceRegionId) -> &mut FenceRegion {
        &mut self.fence_regions[id.index()]
    }

    /// The rail with id `id`.
    pub fn rail(&self, id: RailId) -> &Rail {
        &self.rails[id.index()]
    }

    /// The instance with id `id`.
    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.index()]
    }

    /// Mutable access to an instance.
    pub fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
        &mut self.instances[id.index()]
    }

    /// The sub-instance with id `id`.
    pub fn sub_instance(&self, id: SubInstanceId) -> &SubInstance {
        &self.sub_instances[id.index()]
    }

    /// Mutable access to a sub-instance.
    pub fn sub_instance_mut(&mut self, id: SubInstanceId) -> &mut SubInstance {
        &mut self.sub_instances[id.index()]
    }

    /// The interval with id `id`.
    pub fn interval(&self, id: IntervalId) -> &Interval {
        &self.intervals[id.index()]
    }

    /// Mutable access to an interval.
    pub fn interval_mut(&mut self, id: IntervalId) -> &mut Interval {
        &mut self.intervals[id.index()]
    }

    /// The variable with id `id`.
    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.index()]
    }

    /// Mutable access to a variable.
    pub fn variable_mut(&mut self, id: VariableId) -> &mut Variable {
        &mut self.variables[id.index()]
    }

    /// Looks up a cell by name.
    pub fn cell_id_by_name(&self, name: &str) -> Result<CellId, DbError> {
        self.cell_id_by_name
            .get(name)
            .copied()
            .ok_or_else(|| DbError::UnknownName {
                entity: "cell",
                name: name.to_owned(),
            })
    }

    /// Looks up a row by name.
    pub fn row_id_by_name(&self, name: &str) -> Result<RowId, DbError> {
        self.row_id_by_name
            .get(name)
            .copied()
            .ok_or_else(|| DbError::UnknownName {
                entity: "row",
                name: name.to_owned(),
            })
    }

    /// Looks up a fence region by name.
    pub fn fence_region_id_by_name(&self, name: &str) -> Result<FenceRegionId, DbError> {
        self.fence_region_id_by_name
            .get(name)
            .copied()
            .ok_or_else(|| DbError::UnknownName {
                entity: "fence region",
                name: name.to_owned(),
            })
    }

    /// Looks up an instance by name.
    pub fn instance_id_by_name(&self, name: &str) -> Result<InstanceId, DbError> {
        self.instance_id_by_name
            .get(name)
            .copied()
            .ok_or_else(|| DbError::UnknownName {
                entity: "instance",
                name: name.to_owned(),
            })
    }

    /// The site whose span contains `position`, or `None` outside the die or
    /// on an unregistered grid cell.
    pub fn site_id_by_position(&self, position: Point) -> Option<SiteId> {
        if !self.die_rect.contains(position) {
            return None;
        }

        let row = ((position.y - self.die_rect.min.y) / self.grid.row_height) as usize;
        let col = ((position.x - self.die_rect.min.x) / self.grid.site_width) as usize;

        *self.site_grid.get(row)?.get(col)?
    }

    // Setters

    /// Sets the design name.
    pub fn set_design_name(&mut self, name: impl Into<String>) {
        self.design_name = name.into();
    }

    /// Sets the target placement density.
    pub fn set_density_target(&mut self, density_target: f64) {
        self.density_target = density_target;
    }

    /// Sets the maximum allowed per-instance displacement.
    pub fn set_displacement_limit(&mut self, displacement_limit: f64) {
        self.displacement_limit = displacement_limit;
    }

    /// Sets a (symmetric) entry of the edge spacing table.
    pub fn set_edge_type_spacing(
        &mut self,
        a: crate::types::EdgeType,
        b: crate::types::EdgeType,
        spacing: f64,
    ) {
        self.edge_type_spacing[a.index()][b.index()] = spacing;
        self.edge_type_spacing[b.index()][a.index()] = spacing;
    }

    /// Sizes the site grid. Must precede
    /// [`index_site_by_position`](Self::index_site_by_position).
    pub fn initialize_site_grid(&mut self, num_site_rows: usize, num_site_cols: usize) {
        self.site_grid = vec![vec![None; num_site_cols]; num_site_rows];
    }

    /// Registers `id` on the grid cell containing `position`.
    pub fn index_site_by_position(&mut self, id: SiteId, position: Point) {
        let row = ((position.y - self.die_rect.min.y) / self.grid.row_height) as usize;
        let col = ((position.x - self.die_rect.min.x) / self.grid.site_width) as usize;
        self.site_grid[row][col] = Some(id);
    }

    /// Adds a cell template and indexes it by name.
    pub fn add_cell(&mut self, cell: Cell) -> CellId {
        let id = CellId::from_raw(self.cells.len() as u32);
        self.cell_id_by_name.insert(cell.name.clone(), id);
        self.cells.push(cell);
        id
    }

    /// Adds a row and indexes it by name.
    pub fn add_row(&mut self, row: Row) -> RowId {
        let id = RowId::from_raw(self.rows.len() as u32);
        self.row_id_by_name.insert(row.name().to_owned(), id);
        self.rows.push(row);
        id
    }

    /// Adds a site.
    pub fn add_site(&mut self, site: Site) -> SiteId {
        let id = SiteId::from_raw(self.sites.len() as u32);
        self.sites.push(site);
        id
    }

    /// Adds a fence region and indexes it by name.
    pub fn add_fence_region(&mut self, fence_region: FenceRegion) -> FenceRegionId {
        let id = FenceRegionId::from_raw(self.fence_regions.len() as u32);
        self.fence_region_id_by_name
            .insert(fence_region.name.clone(), id);
        self.fence_regions.push(fence_region);
        id
    }

    /// Adds a rail.
    pub fn add_rail(&mut self, rail: Rail) -> RailId {
        let id = RailId::from_raw(self.rails.len() as u32);
        self.rails.push(rail);
        id
    }

    /// Adds an instance, creating one sub-instance per spanned row, indexing
    /// by name, and bucketing it by row height (or into the fixed list).
    pub fn add_instance(&mut self, instance: Instance) -> InstanceId {
        let id = InstanceId::from_raw(self.instances.len() as u32);
        self.instance_id_by_name.insert(instance.name.clone(), id);

        let row_height = self.grid.rows_per_height(instance.height);
        if instance.is_fixed {
            self.fixed_instance_ids.push(id);
        } else {
            if self.instance_ids_by_row_height.len() < row_height {
                self.instance_ids_by_row_height
                    .resize_with(row_height, Vec::new);
            }
            self.instance_ids_by_row_height[row_height - 1].push(id);
        }

        self.instances.push(instance);

        for i in 0..row_height {
            let instance = &self.instances[id.index()];
            let position = instance
                .position()
                .offset(0.0, i as f64 * self.grid.row_height);
            let sub = SubInstance::new(id, instance.width, position);
            let sub_id = self.add_sub_instance(sub);
            self.instances[id.index()].add_sub_instance_id(sub_id);
        }

        id
    }

    /// Adds a sub-instance.
    pub fn add_sub_instance(&mut self, sub_instance: SubInstance) -> SubInstanceId {
        let id = SubInstanceId::from_raw(self.sub_instances.len() as u32);
        self.sub_instances.push(sub_instance);
        id
    }

    /// Adds an interval.
    pub fn add_interval(&mut self, interval: Interval) -> IntervalId {
        let id = IntervalId::from_raw(self.intervals.len() as u32);
        self.intervals.push(interval);
        id
    }

    /// Adds an assignment variable.
    pub fn add_variable(&mut self, variable: Variable) -> VariableId {
        let id = VariableId::from_raw(self.variables.len() as u32);
        self.variables.push(variable);
        id
    }

    /// Drops all assignment variables and their per-entity registrations.
    pub fn clear_variables(&mut self) {
        self.variables.clear();
        for instance in &mut self.instances {
            instance.clear_variable_ids();
        }
        for site in &mut self.sites {
            site.clear_variable_ids();
        }
    }

    // Helpers

    /// Sorts rows by ascending y and rebuilds the name index. Must run before
    /// any row indexing by y, and before row ids are handed out.
    pub fn sort_rows_by_y(&mut self) {
        self.rows
            .sort_by(|a, b| a.position().y.total_cmp(&b.position().y));

        self.row_id_by_name.clear();
        for (i, row) in self.rows.iter().enumerate() {
            self.row_id_by_name
                .insert(row.name().to_owned(), RowId::from_raw(i as u32));
        }
    }

    /// Binds each rail whose middle line coincides with a row y (an exact
    /// multiple of the row height above the die bottom) to that row.
    pub fn assign_rails_to_rows(&mut self) {
        let row_height = self.grid.row_height;
        let die_bottom = self.die_rect.min.y;

        for i in 0..self.rails.len() {
            let rail = &self.rails[i];
            let n = (rail.y - die_bottom) / row_height;

            if n >= 0.0 && n == n.floor() {
                let row_idx = n as usize;
                if row_idx < self.rows.len() {
                    let layer = rail.layer;
                    self.rows[row_idx].set_rail_id_on_layer(RailId::from_raw(i as u32), layer);
                }
            }
        }
    }

    /// Recomputes the sub-instance positions of `instance_id` from its current
    /// position, one row height apart bottom to top.
    pub fn update_instance_sub_instance_positions(&mut self, instance_id: InstanceId) {
        let row_height = self.grid.row_height;
        let position = self.instances[instance_id.index()].position();
        let sub_ids: Vec<SubInstanceId> = self.instances[instance_id.index()]
            .sub_instance_ids()
            .to_vec();

        for (i, sub_id) in sub_ids.into_iter().enumerate() {
            self.sub_instances[sub_id.index()].position =
                position.offset(0.0, i as f64 * row_height);
        }
    }

    /// Sum over all instances of the Manhattan distance between current and
    /// global-placed positions.
    pub fn compute_total_displacement(&self) -> f64 {
        self.instances
            .iter()
            .map(|inst| inst.position().manhattan_distance(inst.global_placed_position))
            .sum()
    }

    /// Sum of all instance areas.
    pub fn compute_total_instance_area(&self) -> f64 {
        self.instances.iter().map(|inst| inst.width * inst.height).sum()
    }
}
