//! Row alignment: snap every movable instance onto a row and an interval.

use crate::Legalizer;
use legato_db::{Database, InstanceId, IntervalId, LayerId, RailKind, RowId};
use legato_geom::Point;

const OVERLAP_WEIGHT: f64 = 3.0;

impl Legalizer {
    /// Assigns every movable instance to the cheapest feasible row span,
    /// registering its sub-instances on the chosen intervals.
    ///
    /// Cost per candidate is `|Δy| + |Δx| + 3 · overlap`; rows are probed
    /// outward from the y-nearest one, stopping once `|Δy|` alone can no
    /// longer beat the best candidate. Instances are processed left to right
    /// so each interval sees its occupants in ascending x.
    pub(crate) fn align_instances_to_rows(&mut self, db: &mut Database) {
        let row_height = db.grid().row_height;
        let num_rows = db.num_rows() as i64;

        let order = sort_instances_by_x(db);

        for (_, instance_id) in order {
            if db.instance(instance_id).is_fixed {
                continue;
            }

            let Some(best) = find_best_row(db, instance_id, num_rows) else {
                continue;
            };

            let best_row_y = db.row(best.row).position().y;
            let row_orientation = db.row(best.row).orientation();

            if db.instance(instance_id).orientation != row_orientation {
                db.instance_mut(instance_id).flip_vertically();
            }

            db.instance_mut(instance_id)
                .set_position(Point::new(best.x, best_row_y));

            for j in 0..db.instance(instance_id).num_sub_instances() {
                let sub_id = db.instance(instance_id).sub_instance_id(j);
                let interval_id = best.intervals[j];
                let width = db.sub_instance(sub_id).width;

                db.sub_instance_mut(sub_id).position =
                    Point::new(best.x, best_row_y + j as f64 * row_height);
                db.sub_instance_mut(sub_id).interval = Some(interval_id);
                db.interval_mut(interval_id)
                    .add_sub_instance(sub_id, best.x, width);
            }
        }
    }
}

/// All movable and fixed instances keyed by current x, ascending.
pub(crate) fn sort_instances_by_x(db: &Database) -> Vec<(f64, InstanceId)> {
    let mut order: Vec<(f64, InstanceId)> = (0..db.num_instances())
        .map(|i| {
            let id = InstanceId::from_raw(i as u32);
            (db.instance(id).position().x, id)
        })
        .collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0));
    order
}

struct RowCandidate {
    row: RowId,
    x: f64,
    intervals: Vec<IntervalId>,
}

/// Whether an instance of the given parity can sit on `row` without an
/// unresolvable P/G rail mismatch. Only metal-1 rails constrain placement;
/// odd-row-height instances can always be fixed up by a vertical flip.
fn rail_parity_ok(db: &Database, instance_id: InstanceId, row: &legato_db::Row) -> bool {
    let instance = db.instance(instance_id);
    let row_height_parity_even = instance.num_sub_instances() % 2 == 0;

    if !row_height_parity_even {
        return true;
    }

    let Some(rail_id) = row.rail_id_on_layer(LayerId::from_raw(0)) else {
        return true;
    };

    let rail = db.rail(rail_id);
    !((instance.is_bottom_ground && rail.kind == RailKind::Power)
        || (!instance.is_bottom_ground && rail.kind == RailKind::Ground))
}

fn find_best_row(db: &Database, instance_id: InstanceId, num_rows: i64) -> Option<RowCandidate> {
    let instance = db.instance(instance_id);
    let row_height = db.grid().row_height;
    let instance_row_height = instance.num_sub_instances() as i64;
    let x = instance.position().x;
    let width = instance.width;
    let fence_region = instance.fence_region;

    let nearest_row = db
        .grid()
        .nearest_row_index(instance.position().y, db.die_rect().min.y);

    let mut best: Option<RowCandidate> = None;
    let mut best_cost = f64::MAX;

    let mut current_row = nearest_row;
    for j in 0..(2 * num_rows) {
        if j % 2 == 0 {
            current_row += j;
        } else {
            current_row -= j;
        }

        if current_row < 0 || current_row > num_rows - instance_row_height {
            continue;
        }

        let row_id = RowId::from_raw(current_row as u32);
        let row = db.row(row_id);
        let y_displacement = (instance.global_placed_position.y - row.position().y).abs();

        if y_displacement >= best_cost {
            break;
        }

        if !rail_parity_ok(db, instance_id, row) {
            continue;
        }

        let spanned: Vec<RowId> = (0..instance_row_height)
            .map(|k| RowId::from_raw((current_row + k) as u32))
            .collect();

        if !spanned
            .iter()
            .all(|&r| db.row(r).has_interval_of_fence_region(fence_region))
        {
            continue;
        }

        // Direct placement: clamp the current x into the intervals that end
        // past the instance's right edge.
        if let Some(intervals) = collect_intervals(&spanned, |r| {
            db.row(r)
                .interval_id_of_fence_region_before(fence_region, x + width)
                .filter(|&id| {
                    let iv = db.interval(id);
                    iv.end() - iv.begin() >= width && iv.end() > x
                })
        }) {
            let min_end = interval_min_end(db, &intervals);
            let max_begin = interval_max_begin(db, &intervals);

            let mut new_x = x;
            if new_x + width > min_end {
                new_x = min_end - width;
            } else if new_x < max_begin {
                new_x = max_begin;
            }

            consider(
                db,
                &mut best,
                &mut best_cost,
                row_id,
                &intervals,
                new_x,
                x,
                width,
                y_displacement,
            );
        }

        // Fall back to the interval entirely left of the instance.
        if let Some(intervals) = collect_intervals(&spanned, |r| {
            db.row(r)
                .interval_id_of_fence_region_before(fence_region, x)
                .filter(|&id| {
                    let iv = db.interval(id);
                    iv.end() - iv.begin() >= width && iv.end() <= x
                })
        }) {
            let new_x = interval_min_end(db, &intervals) - width;

            consider(
                db,
                &mut best,
                &mut best_cost,
                row_id,
                &intervals,
                new_x,
                x,
                width,
                y_displacement,
            );
        }

        // Or the next interval to the right.
        if let Some(intervals) = collect_intervals(&spanned, |r| {
            db.row(r)
                .interval_id_of_fence_region_after(fence_region, x + width)
                .filter(|&id| {
                    let iv = db.interval(id);
                    iv.end() - iv.begin() >= width
                })
        }) {
            let new_x = interval_max_begin(db, &intervals);

            consider(
                db,
                &mut best,
                &mut best_cost,
                row_id,
                &intervals,
                new_x,
                x,
                width,
                y_displacement,
            );
        }
    }

    best
}

/// One interval per spanned row, or `None` when any row has no match.
fn collect_intervals(
    spanned: &[RowId],
    mut pick: impl FnMut(RowId) -> Option<IntervalId>,
) -> Option<Vec<IntervalId>> {
    spanned.iter().map(|&r| pick(r)).collect()
}

fn interval_min_end(db: &Database, intervals: &[IntervalId]) -> f64 {
    intervals
        .iter()
        .map(|&id| db.interval(id).end())
        .fold(f64::MAX, f64::min)
}

fn interval_max_begin(db: &Database, intervals: &[IntervalId]) -> f64 {
    intervals
        .iter()
        .map(|&id| db.interval(id).begin())
        .fold(f64::MIN, f64::max)
}

#[allow(clippy::too_many_arguments)]
fn consider(
    db: &Database,
    best: &mut Option<RowCandidate>,
    best_cost: &mut f64,
    row_id: RowId,
    intervals: &[IntervalId],
    new_x: f64,
    old_x: f64,
    width: f64,
    y_displacement: f64,
) {
    let overlap: f64 = intervals
        .iter()
        .map(|&id| db.interval(id).accumulated_overlap(new_x, width))
        .sum();

    let cost = y_displacement + (new_x - old_x).abs() + OVERLAP_WEIGHT * overlap;

    if cost < *best_cost {
        *best_cost = cost;
        *best = Some(RowCandidate {
            row: row_id,
            x: new_x,
            intervals: intervals.to_vec(),
        });
    }
}
