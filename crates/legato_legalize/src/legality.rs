//! Structured legality checking of a placement result.

use crate::{LegalizeError, Legalizer};
use legato_db::{Database, InstanceId, RowId};
use legato_geom::Point;
use serde::Serialize;
use std::collections::HashSet;

/// One legality violation found in the current placement.
#[derive(Clone, Debug, Serialize)]
pub enum Violation {
    /// The instance's bounding box leaves the die area.
    OutOfDie {
        /// The offending instance.
        instance: InstanceId,
    },
    /// A footprint column lands on a missing, invalid, fence-mismatched, or
    /// foreign-occupied site.
    WrongSite {
        /// The offending instance.
        instance: InstanceId,
        /// X of the offending site column.
        x: f64,
        /// Y of the offending site column.
        y: f64,
    },
    /// The instance's orientation cannot be reconciled with its row's, even
    /// by a vertical flip.
    RailMismatch {
        /// The offending instance.
        instance: InstanceId,
        /// The row it sits on.
        row: RowId,
    },
    /// Two horizontally adjacent instances sit closer than their edge types
    /// allow. This is a soft violation.
    EdgeSpacing {
        /// The left instance of the pair.
        left: InstanceId,
        /// The right instance of the pair.
        right: InstanceId,
        /// Actual gap between the two.
        distance: f64,
        /// Minimum gap the edge spacing table requires.
        required: f64,
    },
}

impl Violation {
    /// Whether this violation makes the placement illegal (as opposed to
    /// merely rule-degrading).
    pub fn is_hard(&self) -> bool {
        !matches!(self, Violation::EdgeSpacing { .. })
    }
}

impl Legalizer {
    /// Audits the current placement and reports every violation found.
    ///
    /// Hard violations are out-of-die positions, bad site footprints, and
    /// unresolvable row orientation mismatches. Edge spacing shortfalls are
    /// reported as soft violations.
    pub fn check_legality(&self, db: &Database) -> Result<Vec<Violation>, LegalizeError> {
        let mut violations = Vec::new();

        for i in 0..db.num_instances() {
            let instance_id = InstanceId::from_raw(i as u32);
            if db.instance(instance_id).is_fixed {
                continue;
            }

            check_die_bounds(db, instance_id, &mut violations);
            check_sites(db, instance_id, &mut violations)?;
            check_row_orientation(db, instance_id, &mut violations);
            check_edge_spacing(db, instance_id, &mut violations)?;
        }

        Ok(violations)
    }
}

fn check_die_bounds(db: &Database, instance_id: InstanceId, violations: &mut Vec<Violation>) {
    let die = db.die_rect();
    let instance = db.instance(instance_id);
    let position = instance.position();

    if position.x < die.min.x
        || position.x + instance.width > die.max.x
        || position.y < die.min.y
        || position.y + instance.height > die.max.y
    {
        violations.push(Violation::OutOfDie {
            instance: instance_id,
        });
    }
}

fn check_sites(
    db: &Database,
    instance_id: InstanceId,
    violations: &mut Vec<Violation>,
) -> Result<(), LegalizeError> {
    let site_width = db.grid().site_width;
    let instance = db.instance(instance_id);
    let site_cols = db.grid().sites_per_width(instance.width);

    for i in 0..instance.num_sub_instances() {
        let sub_id = instance.sub_instance_id(i);
        let sub_position = db.sub_instance(sub_id).position;

        for j in 0..site_cols {
            let probe = Point::new(sub_position.x + j as f64 * site_width, sub_position.y);

            let bad = match db.site_id_by_position(probe) {
                None => true,
                Some(site_id) => {
                    let site = db.site(site_id);
                    !site.is_valid
                        || site.fence_region != instance.fence_region
                        || site.sub_instance() != Some(sub_id)
                }
            };

            if bad {
                violations.push(Violation::WrongSite {
                    instance: instance_id,
                    x: probe.x,
                    y: probe.y,
                });
            }
        }
    }

    Ok(())
}

fn check_row_orientation(db: &Database, instance_id: InstanceId, violations: &mut Vec<Violation>) {
    let die = db.die_rect();
    let instance = db.instance(instance_id);

    let row_idx = ((instance.position().y - die.min.y) / db.grid().row_height) as i64;
    if row_idx < 0 || row_idx >= db.num_rows() as i64 {
        return;
    }

    let row_id = RowId::from_raw(row_idx as u32);
    let row_orientation = db.row(row_id).orientation();

    if instance.orientation != row_orientation
        && instance.orientation.flipped_vertically() != row_orientation
    {
        violations.push(Violation::RailMismatch {
            instance: instance_id,
            row: row_id,
        });
    }
}

fn check_edge_spacing(
    db: &Database,
    instance_id: InstanceId,
    violations: &mut Vec<Violation>,
) -> Result<(), LegalizeError> {
    let instance = db.instance(instance_id);
    let right_x = instance.position().x + instance.width;

    for neighbor_id in adjacent_instances_to_right(db, instance_id)? {
        let neighbor = db.instance(neighbor_id);
        let distance = neighbor.position().x - right_x;
        let required = db.edge_type_spacing(instance.right_edge_type, neighbor.left_edge_type);

        if distance < required {
            violations.push(Violation::EdgeSpacing {
                left: instance_id,
                right: neighbor_id,
                distance,
                required,
            });
        }
    }

    Ok(())
}

/// The nearest distinct instances to the right of `instance_id`, one per
/// spanned row, found by walking sites rightward until an occupant appears.
fn adjacent_instances_to_right(
    db: &Database,
    instance_id: InstanceId,
) -> Result<Vec<InstanceId>, LegalizeError> {
    let die = db.die_rect();
    let site_width = db.grid().site_width;
    let instance = db.instance(instance_id);

    let mut neighbors = Vec::new();
    let mut seen = HashSet::new();

    for i in 0..instance.num_sub_instances() {
        let sub_id = instance.sub_instance_id(i);
        let sub_position = db.sub_instance(sub_id).position;

        let mut x = sub_position.x + db.sub_instance(sub_id).width;
        while x < die.max.x {
            let Some(site_id) = db.site_id_by_position(Point::new(x, sub_position.y)) else {
                break;
            };

            if let Some(occupant_sub) = db.site(site_id).sub_instance() {
                let occupant = db.sub_instance(occupant_sub).instance;
                if occupant != instance_id && seen.insert(occupant) {
                    neighbors.push(occupant);
                }
                break;
            }

            x += site_width;
        }
    }

    Ok(neighbors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::fill_instance_sites;
    use legato_db::{EdgeType, GridConfig, Instance, Orientation, Row, Site};
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

    fn placed(db: &mut Database, name: &str, x: f64, width: f64) -> InstanceId {
        let id = db.add_instance(Instance::new(
            name,
            false,
            Point::new(x, 0.0),
            width,
            100.0,
            Orientation::N,
        ));
        fill_instance_sites(db, id).unwrap();
        id
    }

    #[test]
    fn clean_placement_has_no_violations() {
        let mut db = db_with_site_grid(1, 20);
        placed(&mut db, "a", 0.0, 20.0);
        placed(&mut db, "b", 20.0, 20.0);

        let legalizer = Legalizer::new(&db);
        let violations = legalizer.check_legality(&db).unwrap();
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn out_of_die_is_hard() {
        let mut db = db_with_site_grid(1, 20);
        let id = db.add_instance(Instance::new(
            "a",
            false,
            Point::new(190.0, 0.0),
            20.0,
            100.0,
            Orientation::N,
        ));

        let legalizer = Legalizer::new(&db);
        let violations = legalizer.check_legality(&db).unwrap();
        assert!(violations.iter().any(|v| matches!(
            v,
            Violation::OutOfDie { instance } if *instance == id
        )));
        assert!(violations.iter().all(Violation::is_hard));
    }

    #[test]
    fn unfilled_sites_are_flagged() {
        let mut db = db_with_site_grid(1, 20);
        // On-grid but never committed to its sites.
        let id = db.add_instance(Instance::new(
            "a",
            false,
            Point::new(30.0, 0.0),
            20.0,
            100.0,
            Orientation::N,
        ));

        let legalizer = Legalizer::new(&db);
        let violations = legalizer.check_legality(&db).unwrap();
        let wrong: Vec<_> = violations
            .iter()
            .filter(|v| matches!(v, Violation::WrongSite { instance, .. } if *instance == id))
            .collect();
        assert_eq!(wrong.len(), 2);
    }

    #[test]
    fn tight_pair_triggers_edge_spacing() {
        let mut db = db_with_site_grid(1, 20);
        db.set_edge_type_spacing(EdgeType(1), EdgeType(1), 15.0);

        let a = placed(&mut db, "a", 0.0, 20.0);
        let b = placed(&mut db, "b", 30.0, 20.0);
        db.instance_mut(a).right_edge_type = EdgeType(1);
        db.instance_mut(b).left_edge_type = EdgeType(1);

        let legalizer = Legalizer::new(&db);
        let violations = legalizer.check_legality(&db).unwrap();
        assert!(violations.iter().any(|v| matches!(
            v,
            Violation::EdgeSpacing { left, right, distance, required }
                if *left == a && *right == b && *distance == 10.0 && *required == 15.0
        )));
        assert!(violations.iter().all(|v| !v.is_hard()));
    }

    #[test]
    fn violations_serialize_with_their_kind() {
        let violation = Violation::EdgeSpacing {
            left: InstanceId::from_raw(0),
            right: InstanceId::from_raw(1),
            distance: 10.0,
            required: 15.0,
        };
        let json = serde_json::to_string(&violation).unwrap();
        assert!(json.contains("EdgeSpacing"));
        assert!(json.contains("required"));
    }

    #[test]
    fn orientation_mismatch_beyond_flip_is_flagged() {
        let mut db = db_with_site_grid(1, 20);
        let id = placed(&mut db, "a", 0.0, 20.0);
        db.instance_mut(id).orientation = Orientation::FN;

        let legalizer = Legalizer::new(&db);
        let violations = legalizer.check_legality(&db).unwrap();
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::RailMismatch { instance, .. } if *instance == id)));
    }
}
