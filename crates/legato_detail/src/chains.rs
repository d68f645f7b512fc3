//! Per-row adjacency chains of slices.

use legato_db::{Database, SiteId, SubInstanceId};
use legato_geom::Point;

/// The chained slices and sites of every row, in left-to-right order.
pub(crate) struct RowChains {
    /// Row r's occupant slices, deduplicated, left to right.
    pub sub_instances: Vec<Vec<SubInstanceId>>,
    /// Row r's sites, left to right.
    pub sites: Vec<Vec<SiteId>>,
}

/// Walks every row's sites left to right, groups contiguous same-slice runs,
/// and wires each slice's left/right neighbor links.
pub(crate) fn build_row_chains(db: &mut Database) -> RowChains {
    let die = db.die_rect();
    let site_width = db.grid().site_width;
    let row_height = db.grid().row_height;
    let num_cols = (die.width() / site_width) as usize;

    let mut sub_instances = Vec::with_capacity(db.num_rows());
    let mut sites = Vec::with_capacity(db.num_rows());

    for r in 0..db.num_rows() {
        let y = die.min.y + r as f64 * row_height;

        let mut row_subs: Vec<SubInstanceId> = Vec::new();
        let mut row_sites: Vec<SiteId> = Vec::new();
        let mut left: Option<SubInstanceId> = None;

        for c in 0..num_cols {
            let position = Point::new(die.min.x + c as f64 * site_width, y);
            let Some(site_id) = db.site_id_by_position(position) else {
                continue;
            };
            row_sites.push(site_id);

            let Some(sub_id) = db.site(site_id).sub_instance() else {
                continue;
            };
            if left == Some(sub_id) {
                continue;
            }

            db.sub_instance_mut(sub_id).left_neighbor = left;
            row_subs.push(sub_id);
            left = Some(sub_id);
        }

        let mut right: Option<SubInstanceId> = None;
        for &sub_id in row_subs.iter().rev() {
            db.sub_instance_mut(sub_id).right_neighbor = right;
            right = Some(sub_id);
        }

        sub_instances.push(row_subs);
        sites.push(row_sites);
    }

    RowChains {
        sub_instances,
        sites,
    }
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

    fn occupy(db: &mut Database, name: &str, x: f64, width: f64) -> SubInstanceId {
        let id = db.add_instance(Instance::new(
            name,
            false,
            Point::new(x, 0.0),
            width,
            100.0,
            Orientation::N,
        ));
        let sub = db.instance(id).sub_instance_id(0);
        for j in 0..(width / 10.0) as usize {
            let site = db
                .site_id_by_position(Point::new(x + j as f64 * 10.0, 0.0))
                .unwrap();
            db.site_mut(site).set_sub_instance(sub);
        }
        sub
    }

    #[test]
    fn chains_follow_site_order_and_dedup_runs() {
        let mut db = db_with_site_grid(1, 20);
        let b = occupy(&mut db, "b", 100.0, 30.0);
        let a = occupy(&mut db, "a", 20.0, 20.0);

        let chains = build_row_chains(&mut db);
        assert_eq!(chains.sub_instances[0], vec![a, b]);
        assert_eq!(chains.sites[0].len(), 20);

        assert_eq!(db.sub_instance(a).left_neighbor, None);
        assert_eq!(db.sub_instance(a).right_neighbor, Some(b));
        assert_eq!(db.sub_instance(b).left_neighbor, Some(a));
        assert_eq!(db.sub_instance(b).right_neighbor, None);
    }

    #[test]
    fn empty_row_builds_empty_chain() {
        let mut db = db_with_site_grid(2, 10);
        let chains = build_row_chains(&mut db);
        assert!(chains.sub_instances[0].is_empty());
        assert!(chains.sub_instances[1].is_empty());
        assert_eq!(chains.sites[1].len(), 10);
    }
}
