//! Partition of rows into fence-region-aware free intervals.

use crate::database::Database;
use crate::ids::{FenceRegionId, RowId};
use crate::interval::{FloatKey, Interval};
use std::collections::BTreeMap;

impl Database {
    /// Splits every row into intervals: maximal free spans of uniform
    /// fence-region membership, with fixed instances carved out.
    ///
    /// Together the intervals of a row with its fixed-instance footprints tile
    /// the die width exactly. Requires [`sort_rows_by_y`]
    /// (Self::sort_rows_by_y) beforehand; registers each interval on its row
    /// and leaves the per-row lists sorted by begin.
    pub fn split_rows_into_intervals(&mut self) {
        let num_rows = self.num_rows();
        let row_height = self.grid().row_height;
        let die = self.die_rect();
        // Row left/right boundaries are assumed aligned with the die.
        let row_left_x = die.min.x;
        let row_right_x = die.max.x;

        let mut interval_by_begin_by_row: Vec<BTreeMap<FloatKey, Interval>> =
            (0..num_rows)
                .map(|i| {
                    let row_id = RowId::from_raw(i as u32);
                    let mut map = BTreeMap::new();
                    map.insert(
                        FloatKey(row_left_x),
                        Interval::new(row_id, row_left_x, row_right_x, None),
                    );
                    map
                })
                .collect();

        // Fence regions.
        for i in 0..self.num_fence_regions() {
            let fence_region_id = FenceRegionId::from_raw(i as u32);

            for j in 0..self.fence_region(fence_region_id).num_rects() {
                let rect = *self.fence_region(fence_region_id).rect(j);
                let left_x = rect.min.x;
                let right_x = rect.max.x.min(row_right_x);
                let lower_y = rect.min.y;
                let upper_y = rect.max.y;

                let mut row_idx = ((lower_y - die.min.y) / row_height) as usize;
                while row_idx < num_rows
                    && self.row(RowId::from_raw(row_idx as u32)).position().y < upper_y
                {
                    let row_id = RowId::from_raw(row_idx as u32);
                    let map = &mut interval_by_begin_by_row[row_idx];

                    carve_fence_span(map, row_id, left_x, right_x, fence_region_id);

                    row_idx += 1;
                }
            }
        }

        // Merge adjacent intervals with equal tag and coincident boundary.
        for map in &mut interval_by_begin_by_row {
            let mut merged: BTreeMap<FloatKey, Interval> = BTreeMap::new();

            for (key, interval) in std::mem::take(map) {
                match merged.iter_mut().next_back() {
                    Some((_, last))
                        if last.fence_region() == interval.fence_region()
                            && last.end() == interval.begin() =>
                    {
                        last.set_end(interval.end());
                    }
                    _ => {
                        merged.insert(key, interval);
                    }
                }
            }

            *map = merged;
        }

        // Carve out fixed instances.
        for i in 0..self.num_fixed_instances() {
            let fixed = self.instance(self.fixed_instance_id(i));
            let left_x = fixed.position().x;
            let lower_y = fixed.position().y;
            let right_x = left_x + fixed.width;
            let upper_y = lower_y + fixed.height;

            let mut row_idx = ((lower_y - die.min.y) / row_height) as usize;
            while row_idx < num_rows
                && self.row(RowId::from_raw(row_idx as u32)).position().y < upper_y
            {
                carve_obstruction(&mut interval_by_begin_by_row[row_idx], left_x, right_x);
                row_idx += 1;
            }
        }

        // Register everything on the rows.
        let num_fence_regions = self.num_fence_regions();
        for row_idx in 0..num_rows {
            let row_id = RowId::from_raw(row_idx as u32);
            self.row_mut(row_id)
                .prepare_for_adding_interval_ids(num_fence_regions);

            for (_, interval) in std::mem::take(&mut interval_by_begin_by_row[row_idx]) {
                let begin = interval.begin();
                let fence_region = interval.fence_region();
                let interval_id = self.add_interval(interval);
                self.row_mut(row_id)
                    .add_interval_id(interval_id, begin, fence_region);
            }

            self.row_mut(row_id).sort_intervals_by_begin();
        }
    }
}

/// Splits the interval containing `left_x` around the fence span
/// `[left_x, right_x)`, tagging the span with `fence_region_id`.
fn carve_fence_span(
    map: &mut BTreeMap<FloatKey, Interval>,
    row_id: RowId,
    left_x: f64,
    right_x: f64,
    fence_region_id: FenceRegionId,
) {
    let Some((_, host)) = map.range_mut(..=FloatKey(left_x)).next_back() else {
        return;
    };

    let host_old_end = host.end();
    let host_old_fence_region = host.fence_region();

    if left_x != host.begin() {
        // Shrink the host and insert the fence span next to it.
        host.set_end(left_x);
        map.insert(
            FloatKey(left_x),
            Interval::new(row_id, left_x, right_x, Some(fence_region_id)),
        );
    } else {
        // The span starts exactly at the host; retag it in place.
        host.set_fence_region(Some(fence_region_id));
        host.set_end(right_x);
    }

    if right_x != host_old_end {
        map.insert(
            FloatKey(right_x),
            Interval::new(row_id, right_x, host_old_end, host_old_fence_region),
        );
    }
}

/// Removes `[left_x, right_x)` from the free intervals of one row.
fn carve_obstruction(map: &mut BTreeMap<FloatKey, Interval>, left_x: f64, right_x: f64) {
    let Some((&begin_key, _)) = map.range(..=FloatKey(left_x)).next_back() else {
        return;
    };
    let Some((&end_key, _)) = map.range(..=FloatKey(right_x)).next_back() else {
        return;
    };

    if begin_key == end_key {
        let Some(host) = map.get_mut(&begin_key) else {
            return;
        };
        let row_id = host.row();
        let host_old_end = host.end();
        let host_old_fence_region = host.fence_region();

        if left_x != host.begin() {
            host.set_end(left_x);
        } else {
            map.remove(&begin_key);
        }

        if right_x != host_old_end {
            map.insert(
                FloatKey(right_x),
                Interval::new(row_id, right_x, host_old_end, host_old_fence_region),
            );
        }
    } else {
        // The obstruction spans several intervals: shrink the two boundary
        // ones and drop everything in between.
        let between: Vec<FloatKey> = map
            .range((
                std::ops::Bound::Excluded(begin_key),
                std::ops::Bound::Excluded(end_key),
            ))
            .map(|(&k, _)| k)
            .collect();
        for key in between {
            map.remove(&key);
        }

        if let Some(first) = map.get_mut(&begin_key) {
            first.set_end(left_x);
            if first.capacity() == 0.0 {
                map.remove(&begin_key);
            }
        }

        if let Some(mut last) = map.remove(&end_key) {
            last.set_begin(right_x);
            if last.capacity() != 0.0 {
                map.insert(FloatKey(right_x), last);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::fence_region::FenceRegion;
    use crate::grid::GridConfig;
    use crate::instance::Instance;
    use crate::row::Row;
    use crate::types::Orientation;
    use legato_geom::{Point, Rect};

    fn db_with_rows(num_rows: usize) -> Database {
        let grid = GridConfig {
            site_width: 10.0,
            row_height: 100.0,
        };
        let mut db = Database::new(grid, Rect::new(0.0, 0.0, 1000.0, num_rows as f64 * 100.0));
        for i in 0..num_rows {
            db.add_row(Row::new(
                format!("r{i}"),
                Point::new(0.0, i as f64 * 100.0),
                Orientation::N,
                0,
            ));
        }
        db.sort_rows_by_y();
        db
    }

    fn row_intervals(db: &Database, row_id: RowId) -> Vec<(f64, f64, Option<FenceRegionId>)> {
        let row = db.row(row_id);
        (0..row.num_intervals())
            .map(|i| {
                let iv = db.interval(row.interval_id(i));
                (iv.begin(), iv.end(), iv.fence_region())
            })
            .collect()
    }

    #[test]
    fn plain_rows_get_one_die_wide_interval() {
        let mut db = db_with_rows(2);
        db.split_rows_into_intervals();

        for i in 0..2 {
            assert_eq!(
                row_intervals(&db, RowId::from_raw(i)),
                vec![(0.0, 1000.0, None)]
            );
        }
    }

    #[test]
    fn fence_region_splits_spanned_rows() {
        let mut db = db_with_rows(3);
        let mut region = FenceRegion::new("fr");
        region.add_rect(Rect::new(200.0, 0.0, 500.0, 200.0));
        let fr = db.add_fence_region(region);
        db.split_rows_into_intervals();

        for i in 0..2 {
            assert_eq!(
                row_intervals(&db, RowId::from_raw(i)),
                vec![
                    (0.0, 200.0, None),
                    (200.0, 500.0, Some(fr)),
                    (500.0, 1000.0, None),
                ]
            );
        }
        // The third row is above the region.
        assert_eq!(
            row_intervals(&db, RowId::from_raw(2)),
            vec![(0.0, 1000.0, None)]
        );
    }

    #[test]
    fn fence_region_clipped_to_die() {
        let mut db = db_with_rows(1);
        let mut region = FenceRegion::new("fr");
        region.add_rect(Rect::new(800.0, 0.0, 1200.0, 100.0));
        let fr = db.add_fence_region(region);
        db.split_rows_into_intervals();

        assert_eq!(
            row_intervals(&db, RowId::from_raw(0)),
            vec![(0.0, 800.0, None), (800.0, 1000.0, Some(fr))]
        );
    }

    #[test]
    fn fence_region_touching_die_left_retags_in_place() {
        let mut db = db_with_rows(1);
        let mut region = FenceRegion::new("fr");
        region.add_rect(Rect::new(0.0, 0.0, 300.0, 100.0));
        let fr = db.add_fence_region(region);
        db.split_rows_into_intervals();

        assert_eq!(
            row_intervals(&db, RowId::from_raw(0)),
            vec![(0.0, 300.0, Some(fr)), (300.0, 1000.0, None)]
        );
    }

    #[test]
    fn adjacent_rects_of_same_region_merge() {
        let mut db = db_with_rows(1);
        let mut region = FenceRegion::new("fr");
        region.add_rect(Rect::new(200.0, 0.0, 400.0, 100.0));
        region.add_rect(Rect::new(400.0, 0.0, 600.0, 100.0));
        let fr = db.add_fence_region(region);
        db.split_rows_into_intervals();

        assert_eq!(
            row_intervals(&db, RowId::from_raw(0)),
            vec![
                (0.0, 200.0, None),
                (200.0, 600.0, Some(fr)),
                (600.0, 1000.0, None),
            ]
        );
    }

    #[test]
    fn fixed_instance_carves_interior_hole() {
        let mut db = db_with_rows(1);
        db.add_cell(Cell::new("BLK", 100.0, 100.0));
        db.add_instance(Instance::new(
            "blk",
            true,
            Point::new(300.0, 0.0),
            100.0,
            100.0,
            Orientation::N,
        ));
        db.split_rows_into_intervals();

        assert_eq!(
            row_intervals(&db, RowId::from_raw(0)),
            vec![(0.0, 300.0, None), (400.0, 1000.0, None)]
        );
    }

    #[test]
    fn fixed_instance_at_interval_begin_erases_left_part() {
        let mut db = db_with_rows(1);
        db.add_instance(Instance::new(
            "blk",
            true,
            Point::new(0.0, 0.0),
            100.0,
            100.0,
            Orientation::N,
        ));
        db.split_rows_into_intervals();

        assert_eq!(
            row_intervals(&db, RowId::from_raw(0)),
            vec![(100.0, 1000.0, None)]
        );
    }

    #[test]
    fn fixed_instance_spanning_fence_boundary_trims_both_sides() {
        let mut db = db_with_rows(1);
        let mut region = FenceRegion::new("fr");
        region.add_rect(Rect::new(500.0, 0.0, 800.0, 100.0));
        let fr = db.add_fence_region(region);
        db.add_instance(Instance::new(
            "blk",
            true,
            Point::new(400.0, 0.0),
            200.0,
            100.0,
            Orientation::N,
        ));
        db.split_rows_into_intervals();

        assert_eq!(
            row_intervals(&db, RowId::from_raw(0)),
            vec![
                (0.0, 400.0, None),
                (600.0, 800.0, Some(fr)),
                (800.0, 1000.0, None),
            ]
        );
    }

    #[test]
    fn fence_then_fixed_obstruction_yields_four_intervals() {
        let mut db = db_with_rows(1);
        let mut region = FenceRegion::new("fr");
        region.add_rect(Rect::new(200.0, 0.0, 400.0, 100.0));
        let fr = db.add_fence_region(region);
        db.add_instance(Instance::new(
            "blk",
            true,
            Point::new(500.0, 0.0),
            20.0,
            100.0,
            Orientation::N,
        ));
        db.split_rows_into_intervals();

        assert_eq!(
            row_intervals(&db, RowId::from_raw(0)),
            vec![
                (0.0, 200.0, None),
                (200.0, 400.0, Some(fr)),
                (400.0, 500.0, None),
                (520.0, 1000.0, None),
            ]
        );
    }

    #[test]
    fn intervals_and_fixed_footprints_tile_the_row() {
        let mut db = db_with_rows(1);
        db.add_instance(Instance::new(
            "blk",
            true,
            Point::new(250.0, 0.0),
            150.0,
            100.0,
            Orientation::N,
        ));
        let mut region = FenceRegion::new("fr");
        region.add_rect(Rect::new(600.0, 0.0, 900.0, 100.0));
        db.add_fence_region(region);
        db.split_rows_into_intervals();

        let spans = row_intervals(&db, RowId::from_raw(0));
        let covered: f64 = spans.iter().map(|(b, e, _)| e - b).sum();
        assert_eq!(covered + 150.0, 1000.0);
        // Spans are disjoint and ordered.
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0);
        }
    }
}
