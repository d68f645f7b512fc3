//! Detailed-placement constraint engine.
//!
//! Operates on a legalized placement: builds per-row adjacency chains of
//! slices, detects forbidden adjacent-gate patterns between abutting cells,
//! and repairs them either through a boolean-satisfiability encoding (solved
//! by a pluggable backend) or a local sliding-window pass that flips and
//! swaps cells in place.

#![warn(missing_docs)]

mod chains;
mod constraints;
mod dda;
mod dp;
mod sat;

pub use crate::constraints::{GateConstraintSource, RandomGateSource};
pub use crate::dda::{judge_dda_pair, ForbiddenSummary};
pub use crate::sat::{CnfFormula, ConstraintSolver, DimacsSolver, SatAssignment};

use legato_db::{Database, SiteId, SubInstanceId};
use thiserror::Error;

/// Errors surfaced by the detailed-placement engine.
#[derive(Debug, Error)]
pub enum DetailError {
    /// The external solver's result is missing or malformed; the caller may
    /// fall back to the sliding-window repair.
    #[error("constraint repair unavailable: {reason}")]
    RepairUnavailable {
        /// What went wrong with the solver handoff.
        reason: String,
    },
    /// A chained slice sits on a grid cell with no registered site.
    #[error("no site registered at ({x}, {y})")]
    MissingSite {
        /// X of the missing site.
        x: f64,
        /// Y of the missing site.
        y: f64,
    },
    /// Writing or reading a solver exchange file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of one sliding-window repair pass.
#[derive(Clone, Copy, Debug)]
pub struct DpOutcome {
    /// Twice the summed swap distance of the pass.
    pub total_displacement: f64,
    /// Forbidden-pair counts after the pass.
    pub summary: ForbiddenSummary,
}

/// The detailed-placement engine.
///
/// [`prepare`](Self::prepare) builds the row chains and must run before any
/// detection or repair. The chains are maintained across repairs (swaps
/// update them in place).
#[derive(Default)]
pub struct DetailEngine {
    rows: Vec<Vec<SubInstanceId>>,
    sites: Vec<Vec<SiteId>>,
}

impl DetailEngine {
    /// Creates an engine with no chains built yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the row chains, assigns gate constraints to every chained
    /// slice, and runs an initial forbidden-pair detection.
    pub fn prepare(
        &mut self,
        db: &mut Database,
        source: &mut dyn GateConstraintSource,
    ) -> ForbiddenSummary {
        let chains = chains::build_row_chains(db);
        self.rows = chains.sub_instances;
        self.sites = chains.sites;

        constraints::assign_constraints(db, &self.rows, source);
        dda::find_forbidden_pairs(db, &self.rows)
    }

    /// Re-runs forbidden-pair detection over the current chains.
    pub fn find_forbidden_pairs(&self, db: &mut Database) -> ForbiddenSummary {
        dda::find_forbidden_pairs(db, &self.rows)
    }

    /// Encodes the repair problem as CNF, allocating assignment variables in
    /// the database.
    pub fn encode(&self, db: &mut Database) -> Result<CnfFormula, DetailError> {
        sat::encode(db, &self.rows, &self.sites)
    }

    /// Applies a solver result: flips every slice whose instance's flipped
    /// assignment was selected, then re-detects forbidden pairs.
    pub fn apply_assignment(
        &self,
        db: &mut Database,
        assignment: &SatAssignment,
    ) -> ForbiddenSummary {
        sat::apply_assignment(db, &self.rows, assignment);
        dda::find_forbidden_pairs(db, &self.rows)
    }

    /// Full solver-based repair round trip: encode, solve, apply, re-detect.
    pub fn repair_with_solver(
        &self,
        db: &mut Database,
        solver: &dyn ConstraintSolver,
    ) -> Result<ForbiddenSummary, DetailError> {
        let formula = self.encode(db)?;
        let assignment = solver.solve(&formula)?;
        Ok(self.apply_assignment(db, &assignment))
    }

    /// Sliding-window repair pass followed by re-detection.
    pub fn repair_with_dp(&mut self, db: &mut Database) -> DpOutcome {
        let total_displacement = dp::dynamic_programming(db, &mut self.rows);
        let summary = dda::find_forbidden_pairs(db, &self.rows);
        DpOutcome {
            total_displacement,
            summary,
        }
    }

    /// The chained slices of row `idx`, left to right.
    pub fn row_chain(&self, idx: usize) -> &[SubInstanceId] {
        &self.rows[idx]
    }

    /// Number of chained rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}
