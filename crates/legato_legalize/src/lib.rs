//! Row/site legalizer for standard-cell placements.
//!
//! Given a globally placed design, the legalizer assigns every movable
//! instance to a row and a free interval, spreads overlapping instances with
//! a quadratic relaxation, snaps them onto discrete sites, re-places the
//! stragglers, and audits the result. Multi-row instances are handled as
//! stacks of per-row slices that must stay x-aligned throughout.

#![warn(missing_docs)]

mod legality;
mod relax;
mod rows;
mod sites;
pub mod sparse;

pub use crate::legality::Violation;
pub use crate::relax::{RelaxConfig, RelaxOutcome};
pub use crate::sparse::SparseError;

use legato_db::{Database, InstanceId};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the legalization pipeline.
#[derive(Debug, Error)]
pub enum LegalizeError {
    /// A footprint probe fell on a grid cell with no registered site.
    #[error("no site registered at ({x}, {y})")]
    MissingSite {
        /// X of the missing site.
        x: f64,
        /// Y of the missing site.
        y: f64,
    },
    /// The relaxation system could not be factorized.
    #[error("relaxation factorization failed: {0}")]
    Factorization(#[from] SparseError),
}

/// Summary of one full legalization run.
#[derive(Clone, Debug, Serialize)]
pub struct LegalizeReport {
    /// How the relaxation phase terminated.
    pub relax_outcome: RelaxOutcome,
    /// Violations remaining after all phases.
    pub violations: Vec<Violation>,
    /// Total Manhattan displacement from the global placement.
    pub total_displacement: f64,
}

/// The row/site legalization engine.
///
/// A `Legalizer` is created against a database and then run once with
/// [`legalize`](Self::legalize). Instances the site alignment cannot place
/// are carried between phases in per-row-height buckets.
pub struct Legalizer {
    /// Bucket h-1 holds unplaced instances spanning h rows.
    illegal_by_row_height: Vec<Vec<InstanceId>>,
    /// Tuning knobs for the relaxation phase.
    pub relax_config: RelaxConfig,
}

impl Legalizer {
    /// Creates a legalizer sized for `db`.
    pub fn new(db: &Database) -> Self {
        Self {
            illegal_by_row_height: vec![Vec::new(); db.max_instance_row_height()],
            relax_config: RelaxConfig::default(),
        }
    }

    /// Runs the full pipeline: row alignment, overlap relaxation, site
    /// alignment, reallocation of unplaced instances, and a final audit.
    ///
    /// On return every movable instance has a row- and site-aligned position
    /// and the report lists whatever violations remain.
    pub fn legalize(&mut self, db: &mut Database) -> Result<LegalizeReport, LegalizeError> {
        self.align_instances_to_rows(db);
        let relax_outcome = self.relax(db)?;

        self.align_instances_to_sites(db)?;
        self.allocate_illegal_instances(db)?;

        let violations = self.check_legality(db)?;

        snapshot_detail_initial_positions(db);

        Ok(LegalizeReport {
            relax_outcome,
            violations,
            total_displacement: db.compute_total_displacement(),
        })
    }
}

/// Records each instance's current position as the baseline for detailed
/// placement displacement accounting.
fn snapshot_detail_initial_positions(db: &mut Database) {
    for i in 0..db.num_instances() {
        let id = InstanceId::from_raw(i as u32);
        let position = db.instance(id).position();
        db.instance_mut(id).detail_initial_position = position;
    }
}
