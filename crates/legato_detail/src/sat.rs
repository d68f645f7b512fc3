//! Constraint-solver-based repair: CNF encoding and DIMACS file handoff.
//!
//! Two variables are allocated per forbidden-capable instance (keep / flip at
//! its current site). Clause families: per instance an exactly-one pair
//! (all-positive plus all-negative over its variables), per occupied head
//! site an all-negative mutual-exclusion clause, and per abutting slice pair
//! a binary negative clause for every variable combination whose selected
//! corner gates would still be forbidden.

use crate::dda::judge_dda_pair;
use crate::DetailError;
use legato_db::{Database, SiteId, SubInstanceId, Variable, VariableId};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// A CNF formula over 1-based DIMACS literals.
#[derive(Clone, Debug, Default)]
pub struct CnfFormula {
    num_variables: usize,
    clauses: Vec<Vec<i32>>,
}

impl CnfFormula {
    /// Creates a formula over `num_variables` variables with no clauses.
    pub fn new(num_variables: usize) -> Self {
        Self {
            num_variables,
            clauses: Vec::new(),
        }
    }

    /// Number of variables.
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Number of clauses.
    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    /// The clauses, each a list of non-zero DIMACS literals.
    pub fn clauses(&self) -> &[Vec<i32>] {
        &self.clauses
    }

    /// Appends a clause of non-zero literals.
    pub fn add_clause(&mut self, clause: Vec<i32>) {
        debug_assert!(clause.iter().all(|&lit| lit != 0));
        self.clauses.push(clause);
    }

    /// The 1-based DIMACS literal selecting `id`.
    pub fn literal(id: VariableId) -> i32 {
        id.as_raw() as i32 + 1
    }
}

/// The set of variables a solver selected.
#[derive(Clone, Debug, Default)]
pub struct SatAssignment {
    selected: HashSet<VariableId>,
}

impl SatAssignment {
    /// Builds an assignment from positive DIMACS literals; non-positive
    /// entries are ignored.
    pub fn from_positive_literals(literals: impl IntoIterator<Item = i32>) -> Self {
        Self {
            selected: literals
                .into_iter()
                .filter(|&lit| lit > 0)
                .map(|lit| VariableId::from_raw(lit as u32 - 1))
                .collect(),
        }
    }

    /// Whether the solver selected `id`.
    pub fn is_selected(&self, id: VariableId) -> bool {
        self.selected.contains(&id)
    }

    /// Number of selected variables.
    pub fn num_selected(&self) -> usize {
        self.selected.len()
    }
}

/// A boolean-satisfiability backend for the repair encoding.
pub trait ConstraintSolver {
    /// Solves `formula`, returning the selected variables.
    fn solve(&self, formula: &CnfFormula) -> Result<SatAssignment, DetailError>;
}

/// File-based solver handoff in DIMACS format.
///
/// Writes the formula to `formula_path`, then reads `result_path`, which an
/// external solver is expected to have produced: lines are skipped until one
/// starting with `s`, after which every positive integer token is a selected
/// variable.
pub struct DimacsSolver {
    /// Where the CNF problem is written.
    pub formula_path: PathBuf,
    /// Where the solver's result is read from.
    pub result_path: PathBuf,
}

impl DimacsSolver {
    /// Creates a solver exchanging files at the given paths.
    pub fn new(formula_path: impl Into<PathBuf>, result_path: impl Into<PathBuf>) -> Self {
        Self {
            formula_path: formula_path.into(),
            result_path: result_path.into(),
        }
    }

    fn write_formula(&self, formula: &CnfFormula) -> Result<(), DetailError> {
        let mut file = std::fs::File::create(&self.formula_path)?;
        writeln!(
            file,
            "p cnf {} {}",
            formula.num_variables(),
            formula.num_clauses()
        )?;
        for clause in formula.clauses() {
            for lit in clause {
                write!(file, "{lit} ")?;
            }
            writeln!(file, "0")?;
        }
        Ok(())
    }

    fn read_result(&self) -> Result<SatAssignment, DetailError> {
        let file =
            std::fs::File::open(&self.result_path).map_err(|e| DetailError::RepairUnavailable {
                reason: format!("result file {}: {e}", self.result_path.display()),
            })?;
        let reader = BufReader::new(file);

        let mut literals = Vec::new();
        let mut seen_status = false;
        for line in reader.lines() {
            let line = line?;
            if !seen_status {
                seen_status = line.starts_with('s');
                continue;
            }

            for token in line.split_whitespace() {
                if token == "v" {
                    continue;
                }
                let lit: i32 = token.parse().map_err(|_| DetailError::RepairUnavailable {
                    reason: format!("malformed literal {token:?} in result file"),
                })?;
                literals.push(lit);
            }
        }

        if !seen_status {
            return Err(DetailError::RepairUnavailable {
                reason: format!(
                    "no status line in result file {}",
                    self.result_path.display()
                ),
            });
        }

        Ok(SatAssignment::from_positive_literals(literals))
    }
}

impl ConstraintSolver for DimacsSolver {
    fn solve(&self, formula: &CnfFormula) -> Result<SatAssignment, DetailError> {
        self.write_formula(formula)?;
        self.read_result()
    }
}

/// Allocates assignment variables and builds the repair formula over the
/// given chains.
pub(crate) fn encode(
    db: &mut Database,
    rows: &[Vec<SubInstanceId>],
    sites: &[Vec<SiteId>],
) -> Result<CnfFormula, DetailError> {
    db.clear_variables();

    // Variable allocation: two per instance, shared by its slices, each
    // registered on the head site of every slice.
    for row in rows {
        for &sub_id in row {
            let instance_id = db.sub_instance(sub_id).instance;

            if db.instance(instance_id).num_variables() == 0 {
                let position = db.instance(instance_id).position();
                let keep = db.add_variable(Variable::for_instance(instance_id, false, position));
                let flip = db.add_variable(Variable::for_instance(instance_id, true, position));
                db.instance_mut(instance_id).add_variable_id(keep);
                db.instance_mut(instance_id).add_variable_id(flip);
            }

            let sub_position = db.sub_instance(sub_id).position;
            let site_id = db.site_id_by_position(sub_position).ok_or(
                DetailError::MissingSite {
                    x: sub_position.x,
                    y: sub_position.y,
                },
            )?;
            let keep = db.instance(instance_id).variable_id(0);
            let flip = db.instance(instance_id).variable_id(1);
            db.site_mut(site_id).add_variable_id(keep);
            db.site_mut(site_id).add_variable_id(flip);
            db.variable_mut(keep).add_site_id(site_id);
            db.variable_mut(flip).add_site_id(site_id);
        }
    }

    let mut formula = CnfFormula::new(db.num_variables());

    for (row, row_sites) in rows.iter().zip(sites) {
        // Exactly-one per instance: some assignment is taken, not all are.
        for &sub_id in row {
            let instance_id = db.sub_instance(sub_id).instance;
            if db.instance(instance_id).variables_encoded {
                continue;
            }
            db.instance_mut(instance_id).variables_encoded = true;

            let positive: Vec<i32> = db
                .instance(instance_id)
                .variable_ids()
                .iter()
                .map(|&v| CnfFormula::literal(v))
                .collect();
            let negative: Vec<i32> = positive.iter().map(|&lit| -lit).collect();
            formula.add_clause(positive);
            formula.add_clause(negative);
        }

        // Mutual exclusion per occupied site.
        for &site_id in row_sites {
            let site = db.site(site_id);
            if site.num_variables() == 0 {
                continue;
            }
            formula.add_clause(
                site.variable_ids()
                    .iter()
                    .map(|&v| -CnfFormula::literal(v))
                    .collect(),
            );
        }

        // Forbidden corner-gate combinations between abutting slices.
        for pair in row.windows(2) {
            let (left_sub, right_sub) = (pair[0], pair[1]);
            let left_instance = db.sub_instance(left_sub).instance;
            let right_instance = db.sub_instance(right_sub).instance;

            for &a in db.instance(left_instance).variable_ids() {
                let left = db.sub_instance(left_sub);
                let (rt, rb) = if db.variable(a).flipped {
                    (left.left_top, left.left_bottom)
                } else {
                    (left.right_top, left.right_bottom)
                };

                for &b in db.instance(right_instance).variable_ids() {
                    let right = db.sub_instance(right_sub);
                    let (lt, lb) = if db.variable(b).flipped {
                        (right.right_top, right.right_bottom)
                    } else {
                        (right.left_top, right.left_bottom)
                    };

                    if judge_dda_pair(rt, rb, lt, lb) {
                        formula
                            .add_clause(vec![-CnfFormula::literal(a), -CnfFormula::literal(b)]);
                    }
                }
            }
        }
    }

    Ok(formula)
}

/// Marks the selected variables and flips every slice whose instance's
/// flipped assignment was chosen.
pub(crate) fn apply_assignment(
    db: &mut Database,
    rows: &[Vec<SubInstanceId>],
    assignment: &SatAssignment,
) {
    for i in 0..db.num_variables() {
        let id = VariableId::from_raw(i as u32);
        if assignment.is_selected(id) {
            db.variable_mut(id).selected = true;
        }
    }

    for row in rows {
        for &sub_id in row {
            let instance_id = db.sub_instance(sub_id).instance;
            let flip = db
                .instance(instance_id)
                .variable_ids()
                .iter()
                .any(|&v| db.variable(v).selected && db.variable(v).flipped);

            if flip {
                db.sub_instance_mut(sub_id).flip();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_conversion_is_one_based() {
        assert_eq!(CnfFormula::literal(VariableId::from_raw(0)), 1);
        assert_eq!(CnfFormula::literal(VariableId::from_raw(6)), 7);
    }

    #[test]
    fn assignment_keeps_positive_literals_only() {
        let assignment = SatAssignment::from_positive_literals([1, -2, 3, 0, -4]);
        assert_eq!(assignment.num_selected(), 2);
        assert!(assignment.is_selected(VariableId::from_raw(0)));
        assert!(!assignment.is_selected(VariableId::from_raw(1)));
        assert!(assignment.is_selected(VariableId::from_raw(2)));
    }

    #[test]
    fn dimacs_writes_header_and_terminated_clauses() {
        let dir = std::env::temp_dir();
        let formula_path = dir.join("legato_dimacs_write_test.cnf");
        let result_path = dir.join("legato_dimacs_write_test.out");

        let mut formula = CnfFormula::new(3);
        formula.add_clause(vec![1, 2]);
        formula.add_clause(vec![-1, -2]);
        formula.add_clause(vec![-3]);

        std::fs::write(&result_path, "c noise\ns SATISFIABLE\nv 1 -2 -3 0\n").unwrap();

        let solver = DimacsSolver::new(&formula_path, &result_path);
        let assignment = solver.solve(&formula).unwrap();

        let written = std::fs::read_to_string(&formula_path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("p cnf 3 3"));
        assert_eq!(lines.next(), Some("1 2 0"));
        assert_eq!(lines.next(), Some("-1 -2 0"));
        assert_eq!(lines.next(), Some("-3 0"));

        assert!(assignment.is_selected(VariableId::from_raw(0)));
        assert!(!assignment.is_selected(VariableId::from_raw(1)));

        std::fs::remove_file(&formula_path).ok();
        std::fs::remove_file(&result_path).ok();
    }

    #[test]
    fn missing_result_file_is_repair_unavailable() {
        let dir = std::env::temp_dir();
        let formula_path = dir.join("legato_dimacs_missing_test.cnf");
        let result_path = dir.join("legato_dimacs_missing_test.out");
        std::fs::remove_file(&result_path).ok();

        let solver = DimacsSolver::new(&formula_path, &result_path);
        let err = solver.solve(&CnfFormula::new(0)).unwrap_err();
        assert!(matches!(err, DetailError::RepairUnavailable { .. }));

        std::fs::remove_file(&formula_path).ok();
    }

    #[test]
    fn result_without_status_line_is_repair_unavailable() {
        let dir = std::env::temp_dir();
        let formula_path = dir.join("legato_dimacs_nostatus_test.cnf");
        let result_path = dir.join("legato_dimacs_nostatus_test.out");
        std::fs::write(&result_path, "c only comments here\n").unwrap();

        let solver = DimacsSolver::new(&formula_path, &result_path);
        let err = solver.solve(&CnfFormula::new(0)).unwrap_err();
        assert!(matches!(err, DetailError::RepairUnavailable { .. }));

        std::fs::remove_file(&formula_path).ok();
        std::fs::remove_file(&result_path).ok();
    }
}
