//! Quadratic relaxation of x positions under ordering constraints.
//!
//! After row alignment, sub-instances on an interval may still overlap. This
//! pass minimizes total squared movement subject to per-interval cell
//! ordering (each occupant leaves room for its left neighbor's width, with a
//! heavily penalized dummy variable anchoring each interval's right end),
//! interval-begin bounds, and vertical alignment of multi-row instances. The
//! inequality system is solved as a fixed point of a modulus-based matrix
//! splitting iteration over a saddle-point operator; one sparse LU of the
//! splitting matrix is reused across all iterations.

use crate::sparse::{SparseLu, SparseMatrix};
use crate::{LegalizeError, Legalizer};
use legato_db::{Database, InstanceId, RowId};
use legato_geom::Point;
use serde::Serialize;

/// Penalty pinning interval-end dummy variables to their interval's end.
const INTERVAL_END_PENALTY: f64 = 1.0e9;
/// Weight of the vertical-alignment constraints in the objective.
const LAMBDA: f64 = 1000.0;
/// Modulus-iteration scaling of the complementarity variables.
const GAMMA: f64 = 10.0;
/// Splitting parameters.
const BETA: f64 = 0.5;
const THETA: f64 = 0.5;

/// Relaxation tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct RelaxConfig {
    /// Hard cap on fixed-point iterations.
    pub max_iterations: usize,
}

impl Default for RelaxConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
        }
    }
}

/// How the relaxation fixed point ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RelaxOutcome {
    /// Every sub-instance coordinate moved less than a quarter site width
    /// between the last two iterates.
    Converged {
        /// Iterations taken.
        iterations: usize,
    },
    /// The iteration budget ran out; the last iterate is still applied.
    MaxIterationsReached,
}

struct ConstraintSystem {
    b_matrix: SparseMatrix,
    b_vector: Vec<f64>,
    e_matrix: SparseMatrix,
    p_vector: Vec<f64>,
    q_matrix: SparseMatrix,
    interval_end_xs: Vec<f64>,
}

impl Legalizer {
    /// Runs the relaxation and writes the resulting x positions back to every
    /// movable instance and its sub-instances.
    pub(crate) fn relax(&self, db: &mut Database) -> Result<RelaxOutcome, LegalizeError> {
        let epsilon = db.grid().site_width / 4.0;
        let num_sub_instances = db.num_sub_instances();

        if num_sub_instances == 0 {
            return Ok(RelaxOutcome::Converged { iterations: 0 });
        }

        let system = build_constraint_system(db);
        let n_vars = system.q_matrix.num_rows();
        let n_constraints = system.b_matrix.num_rows();
        let n_total = n_vars + n_constraints;

        let e_t = system.e_matrix.transpose();
        let b_t = system.b_matrix.transpose();

        let f_matrix = system
            .q_matrix
            .add(&e_t.matmul(&system.e_matrix).scale(LAMBDA));

        // A = [[F, -Bᵀ], [B, 0]], q = [p; -b].
        let a_matrix = SparseMatrix::vstack(
            &SparseMatrix::hstack(&f_matrix, &b_t.scale(-1.0)),
            &SparseMatrix::hstack(
                &system.b_matrix,
                &SparseMatrix::zeros(n_constraints, n_constraints),
            ),
        );
        let mut q_vector = system.p_vector.clone();
        q_vector.extend(system.b_vector.iter().map(|v| -v));

        // D approximates the Schur complement of the saddle-point system by
        // its tridiagonal band.
        let e_rows = system.e_matrix.num_rows();
        let schur_inner = e_t
            .scale(LAMBDA)
            .matmul(
                &SparseMatrix::identity(e_rows)
                    .add(&system.e_matrix.matmul(&e_t).scale(LAMBDA))
                    .inverse_diagonal(),
            )
            .matmul(&system.e_matrix);
        let d_matrix = system
            .b_matrix
            .matmul(&b_t)
            .sub(&system.b_matrix.matmul(&schur_inner).matmul(&b_t))
            .tridiagonal();

        let m_matrix = SparseMatrix::vstack(
            &SparseMatrix::hstack(
                &f_matrix.scale(1.0 / BETA),
                &SparseMatrix::zeros(n_vars, n_constraints),
            ),
            &SparseMatrix::hstack(&system.b_matrix, &d_matrix.scale(1.0 / THETA)),
        );
        let n_matrix = SparseMatrix::vstack(
            &SparseMatrix::hstack(&f_matrix.scale(1.0 / BETA - 1.0), &b_t),
            &SparseMatrix::hstack(
                &SparseMatrix::zeros(n_constraints, n_vars),
                &d_matrix.scale(1.0 / THETA),
            ),
        );
        let identity = SparseMatrix::identity(n_total);
        let i_minus_a = identity.sub(&a_matrix);

        let lu = SparseLu::factor(&m_matrix.add(&identity))?;

        let gamma_q: Vec<f64> = q_vector.iter().map(|v| GAMMA * v).collect();

        let mut s = vec![0.0; n_total];
        let mut z = vec![0.0; n_total];
        for i in 0..num_sub_instances {
            z[i] = db
                .sub_instance(legato_db::SubInstanceId::from_raw(i as u32))
                .position
                .x;
        }
        for (i, &end_x) in system.interval_end_xs.iter().enumerate() {
            z[num_sub_instances + i] = end_x;
        }

        let mut outcome = RelaxOutcome::MaxIterationsReached;
        for iteration in 0..self.relax_config.max_iterations {
            let s_abs: Vec<f64> = s.iter().map(|v: &f64| v.abs()).collect();
            let rhs: Vec<f64> = n_matrix
                .mul_vec(&s)
                .iter()
                .zip(i_minus_a.mul_vec(&s_abs))
                .zip(&gamma_q)
                .map(|((ns, ia), gq)| ns + ia - gq)
                .collect();
            s = lu.solve(&rhs);

            let previous_z = std::mem::replace(
                &mut z,
                s.iter().map(|v| (v.abs() + v) / GAMMA).collect(),
            );

            let converged = z
                .iter()
                .zip(&previous_z)
                .take(num_sub_instances)
                .all(|(a, b)| (a - b).abs() < epsilon);

            if converged {
                outcome = RelaxOutcome::Converged {
                    iterations: iteration + 1,
                };
                break;
            }
        }

        apply_positions(db, &z);

        Ok(outcome)
    }
}

/// Builds B x = b (ordering + interval begins, padded with slack columns),
/// E x = 0 (vertical alignment), the target vector p and the diagonal
/// objective Q.
fn build_constraint_system(db: &Database) -> ConstraintSystem {
    let num_sub_instances = db.num_sub_instances();

    // Cell ordering: within each row, consecutive occupants (and a trailing
    // dummy pinned to each interval end) are separated by the left cell's
    // width plus a nonnegative slack.
    let mut ordering_triplets: Vec<(usize, usize, f64)> = Vec::new();
    let mut widths: Vec<f64> = Vec::new();
    let mut interval_end_xs: Vec<f64> = Vec::new();
    let mut ordering_rows = 0;

    for i in 0..db.num_rows() {
        let row = db.row(RowId::from_raw(i as u32));

        let mut previous: Option<usize> = None;
        for j in 0..row.num_intervals() {
            let interval = db.interval(row.interval_id(j));

            for k in 0..interval.num_sub_instances() {
                let current = interval.sub_instance_id(k).index();

                if let Some(prev) = previous {
                    ordering_triplets.push((ordering_rows, prev, -1.0));
                    ordering_triplets.push((ordering_rows, current, 1.0));
                    ordering_rows += 1;
                    widths.push(required_gap(db, prev, num_sub_instances));
                }

                previous = Some(current);
            }

            let dummy = num_sub_instances + interval_end_xs.len();
            interval_end_xs.push(interval.end());

            if let Some(prev) = previous {
                ordering_triplets.push((ordering_rows, prev, -1.0));
                ordering_triplets.push((ordering_rows, dummy, 1.0));
                ordering_rows += 1;
                widths.push(required_gap(db, prev, num_sub_instances));
            }

            previous = Some(dummy);
        }
    }

    let num_interval_ends = interval_end_xs.len();
    let ordering = SparseMatrix::from_triplets(
        ordering_rows,
        num_sub_instances + num_interval_ends,
        ordering_triplets,
    );

    // Interval begins: the first occupant of each interval sits at or after
    // the interval's begin.
    let mut begin_triplets: Vec<(usize, usize, f64)> = Vec::new();
    let mut begins: Vec<f64> = Vec::new();

    for i in 0..db.num_rows() {
        let row = db.row(RowId::from_raw(i as u32));
        for j in 0..row.num_intervals() {
            let interval = db.interval(row.interval_id(j));
            if interval.num_sub_instances() > 0 {
                begin_triplets.push((begins.len(), interval.first_sub_instance_id().index(), 1.0));
                begins.push(interval.begin());
            }
        }
    }

    let num_begins = begins.len();
    let begin_matrix = SparseMatrix::from_triplets(
        num_begins,
        num_sub_instances + num_interval_ends,
        begin_triplets,
    );

    // Vertical alignment of multi-row instances, with slack variables
    // chaining three-or-more-row spans.
    let mut e_triplets: Vec<(usize, usize, f64)> = Vec::new();
    let mut e_rows = 0;
    let mut e_dummies = 0;

    for i in 0..db.num_instances() {
        let instance = db.instance(InstanceId::from_raw(i as u32));
        if instance.is_fixed {
            continue;
        }

        let h = instance.num_sub_instances();
        for j in 1..h {
            let lower = instance.sub_instance_id(j - 1).index();
            let upper = instance.sub_instance_id(j).index();

            e_triplets.push((e_rows, lower, -1.0));
            e_triplets.push((e_rows, upper, 1.0));

            if h > 2 {
                let base = num_sub_instances + num_interval_ends;
                if j == 1 {
                    e_triplets.push((e_rows, base + e_dummies, 1.0));
                } else if j == h - 1 {
                    e_triplets.push((e_rows, base + e_dummies, 1.0));
                    e_dummies += 1;
                } else {
                    e_triplets.push((e_rows, base + e_dummies, 1.0));
                    e_dummies += 1;
                    e_triplets.push((e_rows, base + e_dummies, 1.0));
                }
            }

            e_rows += 1;
        }
    }

    // Pad B with slack identity so the stacked system has full row rank.
    let num_dummies = num_begins.max(e_dummies);
    let num_variables = num_sub_instances + num_interval_ends + num_dummies;

    let e_matrix = SparseMatrix::from_triplets(
        e_rows,
        num_variables,
        e_triplets,
    );

    let begin_slack = if num_dummies > num_begins {
        SparseMatrix::hstack(
            &SparseMatrix::identity(num_begins).scale(-1.0),
            &SparseMatrix::zeros(num_begins, num_dummies - num_begins),
        )
    } else {
        SparseMatrix::identity(num_begins).scale(-1.0)
    };

    let b_matrix = SparseMatrix::vstack(
        &SparseMatrix::hstack(
            &ordering,
            &SparseMatrix::zeros(ordering_rows, num_dummies),
        ),
        &SparseMatrix::hstack(&begin_matrix, &begin_slack),
    );

    let mut b_vector = widths;
    b_vector.extend(begins);

    // Target: pull real variables toward current x, pin dummies to their
    // interval ends.
    let mut p_vector = vec![0.0; num_variables];
    for i in 0..num_sub_instances {
        p_vector[i] = -db
            .sub_instance(legato_db::SubInstanceId::from_raw(i as u32))
            .position
            .x;
    }
    for (i, &end_x) in interval_end_xs.iter().enumerate() {
        p_vector[num_sub_instances + i] = -INTERVAL_END_PENALTY * end_x;
    }

    let mut q_triplets: Vec<(usize, usize, f64)> = Vec::with_capacity(num_variables);
    for i in 0..num_variables {
        let weight = if i >= num_sub_instances && i < num_sub_instances + num_interval_ends {
            INTERVAL_END_PENALTY
        } else {
            1.0
        };
        q_triplets.push((i, i, weight));
    }
    let q_matrix = SparseMatrix::from_triplets(num_variables, num_variables, q_triplets);

    ConstraintSystem {
        b_matrix,
        b_vector,
        e_matrix,
        p_vector,
        q_matrix,
        interval_end_xs,
    }
}

/// Width a left neighbor requires; dummy variables require none.
fn required_gap(db: &Database, var_index: usize, num_sub_instances: usize) -> f64 {
    if var_index < num_sub_instances {
        db.sub_instance(legato_db::SubInstanceId::from_raw(var_index as u32))
            .width
    } else {
        0.0
    }
}

fn apply_positions(db: &mut Database, z: &[f64]) {
    for i in 0..db.num_instances() {
        let instance_id = InstanceId::from_raw(i as u32);
        if db.instance(instance_id).is_fixed {
            continue;
        }

        for j in 0..db.instance(instance_id).num_sub_instances() {
            let sub_id = db.instance(instance_id).sub_instance_id(j);
            let new_x = z[sub_id.index()];
            let y = db.sub_instance(sub_id).position.y;
            db.sub_instance_mut(sub_id).position = Point::new(new_x, y);

            if j == 0 {
                let instance_y = db.instance(instance_id).position().y;
                db.instance_mut(instance_id)
                    .set_position(Point::new(new_x, instance_y));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legato_db::{GridConfig, Instance, Orientation, Row};
    use legato_geom::Rect;

    fn db_with_instances(xs: &[f64], width: f64) -> Database {
        let grid = GridConfig::new(10.0, 100.0);
        let mut db = Database::new(grid, Rect::new(0.0, 0.0, 1000.0, 100.0));
        db.add_row(Row::new("r0", Point::new(0.0, 0.0), Orientation::N, 1));
        db.sort_rows_by_y();

        for (i, &x) in xs.iter().enumerate() {
            db.add_instance(Instance::new(
                format!("i{i}"),
                false,
                Point::new(x, 0.0),
                width,
                100.0,
                Orientation::N,
            ));
        }
        db.split_rows_into_intervals();
        db
    }

    fn run(db: &mut Database, max_iterations: usize) -> RelaxOutcome {
        let mut legalizer = Legalizer::new(db);
        legalizer.relax_config = RelaxConfig { max_iterations };
        legalizer.align_instances_to_rows(db);
        legalizer.relax(db).unwrap()
    }

    #[test]
    fn empty_database_converges_immediately() {
        let grid = GridConfig::new(10.0, 100.0);
        let mut db = Database::new(grid, Rect::new(0.0, 0.0, 1000.0, 100.0));
        let legalizer = Legalizer::new(&db);
        assert_eq!(
            legalizer.relax(&mut db).unwrap(),
            RelaxOutcome::Converged { iterations: 0 }
        );
    }

    #[test]
    fn zero_budget_reports_exhaustion_and_keeps_positions() {
        let mut db = db_with_instances(&[100.0, 300.0], 20.0);
        let outcome = run(&mut db, 0);
        assert_eq!(outcome, RelaxOutcome::MaxIterationsReached);

        // z was never iterated, so the aligned positions survive.
        let a = db.instance(legato_db::InstanceId::from_raw(0));
        assert_eq!(a.position().x, 100.0);
    }

    #[test]
    fn overlapping_pair_keeps_order() {
        let mut db = db_with_instances(&[100.0, 105.0], 20.0);
        let outcome = run(&mut db, 1000);
        assert!(matches!(outcome, RelaxOutcome::Converged { .. }));

        let a = db.instance(legato_db::InstanceId::from_raw(0));
        let b = db.instance(legato_db::InstanceId::from_raw(1));
        assert!(a.position().x <= b.position().x);
        assert!(a.position().x.is_finite() && b.position().x.is_finite());
        // Neither cell escapes the die.
        assert!(a.position().x >= -1.0);
        assert!(b.position().x + 20.0 <= 1001.0);
    }

    #[test]
    fn sub_instances_follow_relaxed_instances() {
        let mut db = db_with_instances(&[200.0, 210.0, 220.0], 30.0);
        run(&mut db, 1000);

        for i in 0..3 {
            let instance = db.instance(legato_db::InstanceId::from_raw(i));
            let sub = db.sub_instance(instance.sub_instance_id(0));
            assert_eq!(sub.position.x, instance.position().x);
        }
    }
}
