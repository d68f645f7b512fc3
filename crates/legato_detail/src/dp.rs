//! Solver-free repair: a greedy 4-cell sliding window per row chain.

use crate::dda::judge_dda_pair;
use legato_db::{Database, InstanceId, SubInstanceId};
use legato_geom::Point;

/// What one window evaluation decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WindowAction {
    FlipB,
    FlipC,
    FlipBoth,
    Swap,
    SwapFlipC,
    SwapFlipB,
    None,
}

/// Slides a 4-cell window (A, B, C, D) over every chain; whenever B carries a
/// forbidden adjacency, applies the first repair hypothesis whose three pair
/// checks all pass. A and D are taken from the chain neighbor links, which
/// swaps keep in sync. Swaps exchange x positions only and contribute twice
/// the moved distance to the returned displacement total.
pub(crate) fn dynamic_programming(db: &mut Database, rows: &mut [Vec<SubInstanceId>]) -> f64 {
    let mut total_displacement = 0.0;

    for row in rows.iter_mut() {
        if row.len() < 4 {
            continue;
        }

        for j in 1..row.len() - 2 {
            let b_id = row[j];
            if !db.sub_instance(b_id).dda_forbidden {
                continue;
            }

            let c_id = row[j + 1];
            let Some(a_id) = db.sub_instance(b_id).left_neighbor else {
                continue;
            };
            let Some(d_id) = db.sub_instance(c_id).right_neighbor else {
                continue;
            };

            match classify_window(db, a_id, b_id, c_id, d_id) {
                WindowAction::FlipB => db.sub_instance_mut(b_id).flip(),
                WindowAction::FlipC => db.sub_instance_mut(c_id).flip(),
                WindowAction::FlipBoth => {
                    db.sub_instance_mut(b_id).flip();
                    db.sub_instance_mut(c_id).flip();
                }
                WindowAction::Swap => {
                    total_displacement += swap_slices(db, a_id, b_id, c_id, d_id);
                    row.swap(j, j + 1);
                }
                WindowAction::SwapFlipC => {
                    total_displacement += swap_slices(db, a_id, b_id, c_id, d_id);
                    row.swap(j, j + 1);
                    db.sub_instance_mut(c_id).flip();
                }
                WindowAction::SwapFlipB => {
                    total_displacement += swap_slices(db, a_id, b_id, c_id, d_id);
                    row.swap(j, j + 1);
                    db.sub_instance_mut(b_id).flip();
                }
                WindowAction::None => {}
            }
        }
    }

    refresh_instance_positions(db);

    total_displacement
}

/// Exchanges the x positions of the two middle slices and rewires the
/// window's chain links to A-C-B-D, returning the displacement both moves
/// incur together.
fn swap_slices(
    db: &mut Database,
    a_id: SubInstanceId,
    b_id: SubInstanceId,
    c_id: SubInstanceId,
    d_id: SubInstanceId,
) -> f64 {
    let b_position = db.sub_instance(b_id).position;
    let c_position = db.sub_instance(c_id).position;

    db.sub_instance_mut(b_id).position = Point::new(c_position.x, b_position.y);
    db.sub_instance_mut(c_id).position = Point::new(b_position.x, c_position.y);

    db.sub_instance_mut(a_id).right_neighbor = Some(c_id);
    db.sub_instance_mut(c_id).left_neighbor = Some(a_id);
    db.sub_instance_mut(c_id).right_neighbor = Some(b_id);
    db.sub_instance_mut(b_id).left_neighbor = Some(c_id);
    db.sub_instance_mut(b_id).right_neighbor = Some(d_id);
    db.sub_instance_mut(d_id).left_neighbor = Some(b_id);

    2.0 * (b_position.x - c_position.x).abs()
}

/// Pulls every instance's x back from its bottom slice after the window pass
/// moved slices around.
fn refresh_instance_positions(db: &mut Database) {
    for i in 0..db.num_instances() {
        let instance_id = InstanceId::from_raw(i as u32);
        if db.instance(instance_id).num_sub_instances() == 0 {
            continue;
        }

        let sub_id = db.instance(instance_id).sub_instance_id(0);
        let x = db.sub_instance(sub_id).position.x;
        let y = db.instance(instance_id).position().y;
        db.instance_mut(instance_id).set_position(Point::new(x, y));
    }
}

/// Evaluates the seven repair hypotheses over the window's 12 corner flags
/// and returns the first that leaves all three regrouped pairs legal.
fn classify_window(
    db: &Database,
    a_id: SubInstanceId,
    b_id: SubInstanceId,
    c_id: SubInstanceId,
    d_id: SubInstanceId,
) -> WindowAction {
    let a = db.sub_instance(a_id);
    let b = db.sub_instance(b_id);
    let c = db.sub_instance(c_id);
    let d = db.sub_instance(d_id);

    let (n1, n2) = (a.right_top, a.right_bottom);
    let (n3, n4) = (b.left_top, b.left_bottom);
    let (n5, n6) = (b.right_top, b.right_bottom);
    let (n7, n8) = (c.left_top, c.left_bottom);
    let (n9, n10) = (c.right_top, c.right_bottom);
    let (n11, n12) = (d.left_top, d.left_bottom);

    let legal = |rt, rb, lt, lb| !judge_dda_pair(rt, rb, lt, lb);

    // Flip B: B's edges exchange sides.
    if legal(n1, n2, n5, n6) && legal(n3, n4, n7, n8) && legal(n9, n10, n11, n12) {
        return WindowAction::FlipB;
    }
    // Flip C.
    if legal(n1, n2, n3, n4) && legal(n5, n6, n9, n10) && legal(n7, n8, n11, n12) {
        return WindowAction::FlipC;
    }
    // Flip both.
    if legal(n1, n2, n5, n6) && legal(n3, n4, n9, n10) && legal(n7, n8, n11, n12) {
        return WindowAction::FlipBoth;
    }
    // Swap B and C.
    if legal(n1, n2, n7, n8) && legal(n9, n10, n3, n4) && legal(n5, n6, n11, n12) {
        return WindowAction::Swap;
    }
    // Swap, then flip C.
    if legal(n1, n2, n9, n10) && legal(n7, n8, n3, n4) && legal(n5, n6, n11, n12) {
        return WindowAction::SwapFlipC;
    }
    // Swap, then flip B.
    if legal(n1, n2, n7, n8) && legal(n9, n10, n5, n6) && legal(n3, n4, n11, n12) {
        return WindowAction::SwapFlipB;
    }
    // Swap, flip C, with B's left edge facing D.
    if legal(n1, n2, n9, n10) && legal(n7, n8, n5, n6) && legal(n3, n4, n11, n12) {
        return WindowAction::SwapFlipC;
    }

    WindowAction::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use legato_db::{GridConfig, Instance, Orientation, Row};
    use legato_geom::Rect;

    fn db_with_row() -> Database {
        let grid = GridConfig::new(10.0, 100.0);
        let mut db = Database::new(grid, Rect::new(0.0, 0.0, 1000.0, 100.0));
        db.add_row(Row::new("r0", Point::new(0.0, 0.0), Orientation::N, 1));
        db.sort_rows_by_y();
        db
    }

    fn slice(db: &mut Database, name: &str, x: f64) -> SubInstanceId {
        let id = db.add_instance(Instance::new(
            name,
            false,
            Point::new(x, 0.0),
            20.0,
            100.0,
            Orientation::N,
        ));
        db.instance(id).sub_instance_id(0)
    }

    fn link_chain(db: &mut Database, subs: &[SubInstanceId]) {
        for pair in subs.windows(2) {
            db.sub_instance_mut(pair[0]).right_neighbor = Some(pair[1]);
            db.sub_instance_mut(pair[1]).left_neighbor = Some(pair[0]);
        }
    }

    #[test]
    fn swap_hypothesis_moves_cells_and_counts_displacement() {
        let mut db = db_with_row();
        let a = slice(&mut db, "a", 0.0);
        let b = slice(&mut db, "b", 20.0);
        let c = slice(&mut db, "c", 40.0);
        let d = slice(&mut db, "d", 60.0);

        // Flags chosen so hypotheses 1-3 fail and the swap hypothesis holds.
        db.sub_instance_mut(a).set_gates_right(true, false);
        db.sub_instance_mut(b).set_gates_left(true, false);
        db.sub_instance_mut(b).set_gates_right(false, false);
        db.sub_instance_mut(c).set_gates_left(true, true);
        db.sub_instance_mut(c).set_gates_right(false, true);
        db.sub_instance_mut(d).set_gates_left(true, true);
        db.sub_instance_mut(b).dda_forbidden = true;
        link_chain(&mut db, &[a, b, c, d]);

        let mut rows = vec![vec![a, b, c, d]];
        let displacement = dynamic_programming(&mut db, &mut rows);

        assert_eq!(displacement, 40.0);
        assert_eq!(db.sub_instance(b).position.x, 40.0);
        assert_eq!(db.sub_instance(c).position.x, 20.0);
        assert_eq!(rows[0], vec![a, c, b, d]);

        // Neighbor links follow the new order.
        assert_eq!(db.sub_instance(a).right_neighbor, Some(c));
        assert_eq!(db.sub_instance(c).left_neighbor, Some(a));
        assert_eq!(db.sub_instance(c).right_neighbor, Some(b));
        assert_eq!(db.sub_instance(b).left_neighbor, Some(c));
        assert_eq!(db.sub_instance(b).right_neighbor, Some(d));
        assert_eq!(db.sub_instance(d).left_neighbor, Some(b));

        // Owning instances follow their slices.
        assert_eq!(db.instance(db.sub_instance(b).instance).position().x, 40.0);
    }

    #[test]
    fn flip_b_hypothesis_flips_in_place() {
        let mut db = db_with_row();
        let a = slice(&mut db, "a", 0.0);
        let b = slice(&mut db, "b", 20.0);
        let c = slice(&mut db, "c", 40.0);
        let d = slice(&mut db, "d", 60.0);

        // B's left edge is bare but its right edge is fully gated; flipping B
        // fixes the A-B pair and leaves the others legal.
        db.sub_instance_mut(a).set_gates_right(true, true);
        db.sub_instance_mut(b).set_gates_left(false, false);
        db.sub_instance_mut(b).set_gates_right(true, true);
        db.sub_instance_mut(c).set_gates_left(true, true);
        db.sub_instance_mut(c).set_gates_right(true, true);
        db.sub_instance_mut(d).set_gates_left(true, true);
        db.sub_instance_mut(b).dda_forbidden = true;
        link_chain(&mut db, &[a, b, c, d]);

        let mut rows = vec![vec![a, b, c, d]];
        let displacement = dynamic_programming(&mut db, &mut rows);

        assert_eq!(displacement, 0.0);
        // B's edges exchanged sides.
        assert!(db.sub_instance(b).left_top && db.sub_instance(b).left_bottom);
        assert!(!db.sub_instance(b).right_top && !db.sub_instance(b).right_bottom);
        assert_eq!(rows[0], vec![a, b, c, d]);
    }

    #[test]
    fn clean_window_is_untouched() {
        let mut db = db_with_row();
        let subs: Vec<SubInstanceId> = (0..4)
            .map(|i| slice(&mut db, &format!("i{i}"), i as f64 * 20.0))
            .collect();
        for &s in &subs {
            db.sub_instance_mut(s).set_gates_left(true, true);
            db.sub_instance_mut(s).set_gates_right(true, true);
        }
        link_chain(&mut db, &subs);

        let mut rows = vec![subs.clone()];
        let displacement = dynamic_programming(&mut db, &mut rows);

        assert_eq!(displacement, 0.0);
        assert_eq!(rows[0], subs);
    }

    #[test]
    fn short_chains_are_skipped() {
        let mut db = db_with_row();
        let a = slice(&mut db, "a", 0.0);
        let b = slice(&mut db, "b", 20.0);
        db.sub_instance_mut(b).dda_forbidden = true;

        let mut rows = vec![vec![a, b]];
        assert_eq!(dynamic_programming(&mut db, &mut rows), 0.0);
    }
}
