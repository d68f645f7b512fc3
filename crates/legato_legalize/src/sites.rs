//! Site alignment: snap relaxed instances onto the discrete site grid.

use crate::{LegalizeError, Legalizer};
use legato_db::{Database, InstanceId, LayerId, RailKind, RowId, SiteId};
use legato_geom::Point;
use std::collections::{HashMap, HashSet};

/// Shared displacement budget (in site widths) for direct placement and
/// transitive relocation.
const DISPLACEMENT_BUDGET_SITES: f64 = 10.0;

impl Legalizer {
    /// Places instances on free sites, tallest row height first, left to
    /// right. Instances that fit neither directly nor by relocating their
    /// neighbors are parked at the die's right edge and queued for
    /// [`allocate_illegal_instances`](Self::allocate_illegal_instances).
    pub(crate) fn align_instances_to_sites(
        &mut self,
        db: &mut Database,
    ) -> Result<(), LegalizeError> {
        let die = db.die_rect();
        let die_right_x = die.max.x;
        let site_width = db.grid().site_width;
        let row_height = db.grid().row_height;
        let num_sites_limit = (db.num_rows() as f64 * row_height / site_width) as usize;
        let budget = DISPLACEMENT_BUDGET_SITES * site_width;

        let order = sort_instances_by_row_height_by_x(db);

        for bucket in order.into_iter().rev() {
            for (_, instance_id) in bucket {
                if db.instance(instance_id).is_fixed {
                    continue;
                }

                let instance = db.instance(instance_id);
                let width = instance.width;
                let site_cols = db.grid().sites_per_width(width);
                let nearest_col = db
                    .grid()
                    .nearest_site_column(instance.position().x, die.min.x)
                    .max(0);
                let nearest_site_x = die.min.x + nearest_col as f64 * site_width;

                let mut best_x: Option<f64> = None;
                for j in 0..num_sites_limit {
                    let site_x = nearest_site_x + j as f64 * site_width;

                    if site_x + width > die_right_x {
                        break;
                    }

                    if footprint_free(db, instance_id, site_x, site_cols)? {
                        let displacement =
                            (site_x - db.instance(instance_id).global_placed_position.x).abs();

                        if displacement < budget {
                            best_x = Some(site_x);
                        }

                        break;
                    }
                }

                if best_x.is_none()
                    && self.try_place_instance(db, instance_id, nearest_site_x, budget)?
                {
                    continue;
                }

                if best_x.is_none() {
                    self.illegal_by_row_height
                        [db.instance(instance_id).num_sub_instances() - 1]
                        .push(instance_id);
                }

                // Unplaced instances are parked at the right die edge until
                // reallocation.
                let x = best_x.unwrap_or(die_right_x);
                let y = db.instance(instance_id).position().y;
                db.instance_mut(instance_id).set_position(Point::new(x, y));
                db.update_instance_sub_instance_positions(instance_id);

                if best_x.is_some() {
                    fill_instance_sites(db, instance_id)?;
                }
            }
        }

        Ok(())
    }

    /// Places `root` at `new_x`, transitively pushing overlapping neighbors
    /// aside as long as the total incurred displacement stays under
    /// `displacement_limit`. On failure every moved instance and every site
    /// is restored.
    pub(crate) fn try_place_instance(
        &self,
        db: &mut Database,
        root: InstanceId,
        new_x: f64,
        displacement_limit: f64,
    ) -> Result<bool, LegalizeError> {
        let die = db.die_rect();
        let site_width = db.grid().site_width;

        let mut original_x: HashMap<InstanceId, f64> = HashMap::new();
        original_x.insert(root, new_x);

        let mut stack: Vec<(InstanceId, f64)> = vec![(root, new_x)];
        let mut unplaceable: HashSet<InstanceId> = HashSet::new();
        let mut placeable = true;

        while let Some((current, current_new_x)) = stack.pop() {
            let current_width = db.instance(current).width;
            let site_cols = (current_width / site_width).ceil() as usize;

            let incurred: f64 = original_x
                .iter()
                .map(|(&id, &x0)| (db.instance(id).position().x - x0).abs())
                .sum();

            if current_new_x < die.min.x
                || current_new_x + current_width > die.max.x
                || incurred > displacement_limit
            {
                placeable = false;
                unplaceable.insert(current);
                unplaceable.extend(stack.drain(..).map(|(id, _)| id));
                break;
            }

            let mut displaced: HashSet<InstanceId> = HashSet::new();
            'subs: for i in 0..db.instance(current).num_sub_instances() {
                let sub_id = db.instance(current).sub_instance_id(i);
                let sub_y = db.sub_instance(sub_id).position.y;

                for j in 0..site_cols {
                    let probe = Point::new(current_new_x + j as f64 * site_width, sub_y);
                    let site_id = site_at(db, probe)?;
                    let site = db.site(site_id);

                    if !site.is_valid || site.fence_region != db.instance(current).fence_region {
                        placeable = false;
                        unplaceable.insert(current);
                        unplaceable.extend(stack.drain(..).map(|(id, _)| id));
                        break 'subs;
                    }

                    if let Some(occupant_sub) = site.sub_instance() {
                        let occupant = db.sub_instance(occupant_sub).instance;
                        if !displaced.insert(occupant) {
                            continue;
                        }

                        // Push the occupant to whichever side is closer.
                        let occupant_pos = db.instance(occupant).position();
                        let occupant_width = db.instance(occupant).width;
                        let left_x = current_new_x - occupant_width;
                        let right_x = current_new_x + current_width;
                        let occupant_new_x = if (occupant_pos.x - left_x).abs()
                            < (occupant_pos.x - right_x).abs()
                        {
                            left_x
                        } else {
                            right_x
                        };

                        clear_instance_sites(db, occupant)?;
                        original_x.entry(occupant).or_insert(occupant_pos.x);
                        stack.push((occupant, occupant_new_x));
                    }
                }
            }

            if !placeable {
                break;
            }

            let y = db.instance(current).position().y;
            db.instance_mut(current)
                .set_position(Point::new(current_new_x, y));
            db.update_instance_sub_instance_positions(current);
            fill_instance_sites(db, current)?;
        }

        if !placeable {
            for &id in original_x.keys() {
                if !unplaceable.contains(&id) {
                    clear_instance_sites(db, id)?;
                }
            }

            for (&id, &x0) in &original_x {
                let y = db.instance(id).position().y;
                db.instance_mut(id).set_position(Point::new(x0, y));
                db.update_instance_sub_instance_positions(id);

                if id != root {
                    fill_instance_sites(db, id)?;
                }
            }
        }

        Ok(placeable)
    }

    /// Re-places every instance the site alignment gave up on, tallest
    /// bucket first, probing rows and sites concentrically outward from the
    /// fence-adjusted start point.
    pub(crate) fn allocate_illegal_instances(
        &mut self,
        db: &mut Database,
    ) -> Result<(), LegalizeError> {
        let die = db.die_rect();
        let site_width = db.grid().site_width;
        let row_height = db.grid().row_height;
        let num_rows = db.num_rows() as i64;
        let num_row_sites = if db.num_rows() > 0 {
            (db.num_sites() / db.num_rows()) as i64
        } else {
            0
        };

        for h in (0..self.illegal_by_row_height.len()).rev() {
            let bucket = std::mem::take(&mut self.illegal_by_row_height[h]);

            for instance_id in bucket {
                let instance = db.instance(instance_id);
                let global = instance.global_placed_position;
                let width = instance.width;
                let site_cols = db.grid().sites_per_width(width);
                let instance_rows = instance.num_sub_instances() as i64;
                let fence_region = instance.fence_region;

                let top_start_row = num_rows - instance_rows;
                if top_start_row < 0 {
                    continue;
                }
                let nearest_row = db
                    .grid()
                    .nearest_row_index(global.y, die.min.y)
                    .clamp(0, top_start_row);
                let mut start_site = db.grid().nearest_site_column(global.x, die.min.x);

                // Start from a row that actually carries the fence region.
                let search_row = find_row_with_fence_region(db, nearest_row, top_start_row, fence_region)
                    .unwrap_or(nearest_row);
                let search_row_id = RowId::from_raw(search_row as u32);

                // Bias the start column toward the fence region's span.
                if let Some(before) = db
                    .row(search_row_id)
                    .interval_id_of_fence_region_before(fence_region, global.x)
                {
                    let interval = db.interval(before);
                    let inside = interval.begin() < global.x
                        && global.x + width < interval.end();
                    if !inside {
                        start_site = db.grid().nearest_site_column(
                            interval.end() - site_width * site_cols as f64,
                            die.min.x,
                        );
                    }
                } else if let Some(after) = db
                    .row(search_row_id)
                    .interval_id_of_fence_region_after(fence_region, global.x)
                {
                    start_site = db
                        .grid()
                        .nearest_site_column(db.interval(after).begin(), die.min.x);
                }

                let mut best: Option<(f64, f64)> = None;
                let mut best_displacement = f64::MAX;

                let mut current_row = nearest_row;
                'rows: for j in 0..(2 * num_rows) {
                    if j % 2 == 0 {
                        current_row += j;
                    } else {
                        current_row -= j;
                    }

                    if current_row < 0 || current_row > top_start_row {
                        continue;
                    }

                    let row_id = RowId::from_raw(current_row as u32);
                    let row = db.row(row_id);

                    if !row.has_interval_of_fence_region(fence_region) {
                        continue;
                    }

                    if !rail_parity_ok_for(db, instance_id, row_id) {
                        continue;
                    }

                    let site_y = row.position().y;

                    let mut current_site = start_site;
                    for k in 0..(2 * num_row_sites) {
                        if k % 2 == 0 {
                            current_site += k;
                        } else {
                            current_site -= k;
                        }

                        if current_site < 0 || current_site + site_cols as i64 > num_row_sites {
                            continue;
                        }

                        let site_x = die.min.x + current_site as f64 * site_width;

                        if !footprint_free_at(
                            db,
                            instance_id,
                            site_x,
                            site_y,
                            site_cols,
                            row_height,
                        )? {
                            continue;
                        }

                        let dx = (site_x - global.x).abs();
                        let dy = (site_y - global.y).abs();
                        if dx + dy < best_displacement {
                            best_displacement = dx + dy;
                            best = Some((site_x, site_y));
                            if dx < row_height {
                                break 'rows;
                            }
                            break;
                        }
                    }
                }

                let Some((best_x, best_y)) = best else {
                    // Nowhere to put it; leave it parked for the legality
                    // report to flag.
                    continue;
                };

                db.instance_mut(instance_id)
                    .set_position(Point::new(best_x, best_y));

                let best_row_id =
                    RowId::from_raw(((best_y - die.min.y) / row_height) as u32);
                if db.instance(instance_id).orientation != db.row(best_row_id).orientation() {
                    db.instance_mut(instance_id).flip_vertically();
                }

                db.update_instance_sub_instance_positions(instance_id);
                fill_instance_sites(db, instance_id)?;
            }
        }

        Ok(())
    }
}

/// Instances bucketed by row height (index h−1), each bucket keyed by current
/// x ascending.
fn sort_instances_by_row_height_by_x(db: &Database) -> Vec<Vec<(f64, InstanceId)>> {
    let mut buckets: Vec<Vec<(f64, InstanceId)>> =
        vec![Vec::new(); db.max_instance_row_height()];

    for (h, bucket) in buckets.iter_mut().enumerate() {
        let row_height = h + 1;
        for i in 0..db.num_instances_of_row_height(row_height) {
            let id = db.instance_id_by_row_height(row_height, i);
            bucket.push((db.instance(id).position().x, id));
        }
        bucket.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    buckets
}

fn site_at(db: &Database, position: Point) -> Result<SiteId, LegalizeError> {
    db.site_id_by_position(position)
        .ok_or(LegalizeError::MissingSite {
            x: position.x,
            y: position.y,
        })
}

/// Whether the whole footprint of `instance_id` at `site_x` consists of
/// valid, free, fence-matching sites.
fn footprint_free(
    db: &Database,
    instance_id: InstanceId,
    site_x: f64,
    site_cols: usize,
) -> Result<bool, LegalizeError> {
    let site_width = db.grid().site_width;
    let fence_region = db.instance(instance_id).fence_region;

    for i in 0..db.instance(instance_id).num_sub_instances() {
        let sub_id = db.instance(instance_id).sub_instance_id(i);
        let sub_y = db.sub_instance(sub_id).position.y;

        for j in 0..site_cols {
            let site_id = site_at(db, Point::new(site_x + j as f64 * site_width, sub_y))?;
            let site = db.site(site_id);

            if !site.is_valid || site.has_sub_instance() || site.fence_region != fence_region {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

/// Footprint check anchored at an explicit (x, y) rather than the instance's
/// current sub-instance positions.
fn footprint_free_at(
    db: &Database,
    instance_id: InstanceId,
    site_x: f64,
    site_y: f64,
    site_cols: usize,
    row_height: f64,
) -> Result<bool, LegalizeError> {
    let site_width = db.grid().site_width;
    let fence_region = db.instance(instance_id).fence_region;

    for m in 0..db.instance(instance_id).num_sub_instances() {
        for n in 0..site_cols {
            let probe = Point::new(
                site_x + n as f64 * site_width,
                site_y + m as f64 * row_height,
            );
            let site_id = site_at(db, probe)?;
            let site = db.site(site_id);

            if !site.is_valid || site.has_sub_instance() || site.fence_region != fence_region {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

fn rail_parity_ok_for(db: &Database, instance_id: InstanceId, row_id: RowId) -> bool {
    let instance = db.instance(instance_id);
    if instance.num_sub_instances() % 2 != 0 {
        return true;
    }

    let Some(rail_id) = db.row(row_id).rail_id_on_layer(LayerId::from_raw(0)) else {
        return true;
    };

    let rail = db.rail(rail_id);
    !((instance.is_bottom_ground && rail.kind == RailKind::Power)
        || (!instance.is_bottom_ground && rail.kind == RailKind::Ground))
}

fn find_row_with_fence_region(
    db: &Database,
    nearest_row: i64,
    top_start_row: i64,
    fence_region: Option<legato_db::FenceRegionId>,
) -> Option<i64> {
    if db
        .row(RowId::from_raw(nearest_row as u32))
        .has_interval_of_fence_region(fence_region)
    {
        return Some(nearest_row);
    }

    let mut current = nearest_row;
    for j in 0..(2 * db.num_rows() as i64) {
        if j % 2 == 0 {
            current += j;
        } else {
            current -= j;
        }

        if current < 0 || current > top_start_row {
            continue;
        }

        if db
            .row(RowId::from_raw(current as u32))
            .has_interval_of_fence_region(fence_region)
        {
            return Some(current);
        }
    }

    None
}

/// Marks every site under the instance's footprint occupied by the matching
/// sub-instance.
pub(crate) fn fill_instance_sites(
    db: &mut Database,
    instance_id: InstanceId,
) -> Result<(), LegalizeError> {
    let site_width = db.grid().site_width;
    let site_cols = (db.instance(instance_id).width / site_width).ceil() as usize;

    for i in 0..db.instance(instance_id).num_sub_instances() {
        let sub_id = db.instance(instance_id).sub_instance_id(i);
        let sub_pos = db.sub_instance(sub_id).position;

        for j in 0..site_cols {
            let site_id = site_at(db, Point::new(sub_pos.x + j as f64 * site_width, sub_pos.y))?;
            db.site_mut(site_id).set_sub_instance(sub_id);
        }
    }

    Ok(())
}

/// Clears every site under the instance's footprint.
pub(crate) fn clear_instance_sites(
    db: &mut Database,
    instance_id: InstanceId,
) -> Result<(), LegalizeError> {
    let site_width = db.grid().site_width;
    let site_cols = (db.instance(instance_id).width / site_width).ceil() as usize;

    for i in 0..db.instance(instance_id).num_sub_instances() {
        let sub_id = db.instance(instance_id).sub_instance_id(i);
        let sub_pos = db.sub_instance(sub_id).position;

        for j in 0..site_cols {
            let site_id = site_at(db, Point::new(sub_pos.x + j as f64 * site_width, sub_pos.y))?;
            db.site_mut(site_id).remove_sub_instance();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use legato_db::{GridConfig, Instance, Orientation, Row, Site};
    use legato_geom::Rect;

    fn db_with_site_grid(num_rows: usize, num_cols: usize) -> Database {
        let grid = GridConfig::new(10.0, 100.0);
        let mut db = Database::new(
            grid,
            Rect::new(0.0, 0.0, num_cols as f64 * 10.0, num_rows as f64 * 100.0),
        );
        for i in 0..num_rows {
            db.add_row(Row::new(
                format!("r{i}"),
                Point::new(0.0, i as f64 * 100.0),
                Orientation::N,
                1,
            ));
        }
        db.sort_rows_by_y();
        db.initialize_site_grid(num_rows, num_cols);
        for r in 0..num_rows {
            for c in 0..num_cols {
                let position = Point::new(c as f64 * 10.0, r as f64 * 100.0);
                let id = db.add_site(Site::new(position));
                db.index_site_by_position(id, position);
            }
        }
        db
    }

    fn movable(db: &mut Database, name: &str, x: f64, y: f64, width: f64) -> InstanceId {
        db.add_instance(Instance::new(
            name,
            false,
            Point::new(x, y),
            width,
            100.0,
            Orientation::N,
        ))
    }

    fn prepare(db: &mut Database) -> Legalizer {
        db.split_rows_into_intervals();
        let mut legalizer = Legalizer::new(db);
        legalizer.align_instances_to_rows(db);
        legalizer
    }

    #[test]
    fn aligned_instance_occupies_its_sites() {
        let mut db = db_with_site_grid(1, 100);
        let id = movable(&mut db, "a", 33.0, 0.0, 20.0);
        let mut legalizer = prepare(&mut db);

        legalizer.align_instances_to_sites(&mut db).unwrap();

        let instance = db.instance(id);
        assert_eq!(instance.position().x % 10.0, 0.0);

        let sub = instance.sub_instance_id(0);
        let x = instance.position().x;
        for j in 0..2 {
            let site_id = db
                .site_id_by_position(Point::new(x + j as f64 * 10.0, 0.0))
                .unwrap();
            assert_eq!(db.site(site_id).sub_instance(), Some(sub));
        }
    }

    #[test]
    fn overlapping_instances_end_on_disjoint_sites() {
        let mut db = db_with_site_grid(1, 100);
        let a = movable(&mut db, "a", 40.0, 0.0, 20.0);
        let b = movable(&mut db, "b", 42.0, 0.0, 20.0);
        let mut legalizer = prepare(&mut db);

        legalizer.align_instances_to_sites(&mut db).unwrap();

        let ax = db.instance(a).position().x;
        let bx = db.instance(b).position().x;
        assert!(ax + 20.0 <= bx || bx + 20.0 <= ax, "a at {ax}, b at {bx}");
    }

    #[test]
    fn try_place_rolls_back_when_budget_exceeded() {
        let mut db = db_with_site_grid(1, 30);
        // Wall of instances filling the row; pushing into it busts the budget.
        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(movable(&mut db, &format!("w{i}"), i as f64 * 30.0, 0.0, 30.0));
        }
        let root = movable(&mut db, "root", 50.0, 0.0, 30.0);
        db.split_rows_into_intervals();

        let legalizer = Legalizer::new(&db);
        for &id in &ids {
            fill_instance_sites(&mut db, id).unwrap();
        }

        let before: Vec<f64> = ids.iter().map(|&id| db.instance(id).position().x).collect();
        let placed = legalizer
            .try_place_instance(&mut db, root, 60.0, 100.0)
            .unwrap();
        assert!(!placed);

        // Every wall instance is back where it was, sites intact.
        for (&id, &x0) in ids.iter().zip(&before) {
            assert_eq!(db.instance(id).position().x, x0);
            let sub = db.instance(id).sub_instance_id(0);
            let site = db.site_id_by_position(Point::new(x0, 0.0)).unwrap();
            assert_eq!(db.site(site).sub_instance(), Some(sub));
        }
    }

    #[test]
    fn try_place_relocates_single_neighbor() {
        let mut db = db_with_site_grid(1, 100);
        let neighbor = movable(&mut db, "n", 100.0, 0.0, 20.0);
        let root = movable(&mut db, "root", 0.0, 0.0, 20.0);
        db.split_rows_into_intervals();

        let legalizer = Legalizer::new(&db);
        fill_instance_sites(&mut db, neighbor).unwrap();

        let placed = legalizer
            .try_place_instance(&mut db, root, 100.0, 100.0)
            .unwrap();
        assert!(placed);

        assert_eq!(db.instance(root).position().x, 100.0);
        let nx = db.instance(neighbor).position().x;
        assert!((nx - 80.0).abs() < 1e-9 || (nx - 120.0).abs() < 1e-9);
    }

    #[test]
    fn illegal_instances_reallocated_to_free_sites() {
        let mut db = db_with_site_grid(2, 10);
        // Row 0 is full.
        let mut wall = Vec::new();
        for i in 0..5 {
            wall.push(movable(&mut db, &format!("w{i}"), i as f64 * 20.0, 0.0, 20.0));
        }
        let late = movable(&mut db, "late", 30.0, 0.0, 20.0);
        let mut legalizer = prepare(&mut db);

        legalizer.align_instances_to_sites(&mut db).unwrap();
        legalizer.allocate_illegal_instances(&mut db).unwrap();

        // Everyone ends on a valid, disjoint footprint.
        let mut seen = std::collections::HashSet::new();
        for &id in wall.iter().chain([&late]) {
            let instance = db.instance(id);
            assert!(instance.position().x + 20.0 <= 100.0);
            for j in 0..2 {
                let site = db
                    .site_id_by_position(Point::new(
                        instance.position().x + j as f64 * 10.0,
                        instance.position().y,
                    ))
                    .unwrap();
                assert!(seen.insert(site), "site shared between instances");
            }
        }
    }
}
