//! Boolean assignment variables for the constraint-based repair step.

use crate::ids::{InstanceId, SiteId};
use legato_geom::Point;
use serde::{Deserialize, Serialize};

/// One candidate assignment of an instance: a position plus a flip choice.
///
/// The repair encoder emits two variables per movable instance (flipped and
/// unflipped at its current site), shared by all of the instance's slices.
/// Each variable records the sites it would occupy so mutual-exclusion
/// clauses can be generated per site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variable {
    /// The instance this assignment places.
    pub instance: InstanceId,
    /// Whether the assignment mirrors the instance left-to-right.
    pub flipped: bool,
    /// Lower-left position of the assignment.
    pub position: Point,
    /// Whether the solver picked this assignment.
    pub selected: bool,
    sites: Vec<SiteId>,
}

impl Variable {
    /// Creates an assignment variable for `instance`.
    pub fn for_instance(instance: InstanceId, flipped: bool, position: Point) -> Self {
        Self {
            instance,
            flipped,
            position,
            selected: false,
            sites: Vec::new(),
        }
    }

    /// Number of sites this assignment would occupy.
    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    /// The `idx`-th occupied site.
    pub fn site_id(&self, idx: usize) -> SiteId {
        self.sites[idx]
    }

    /// All sites this assignment would occupy.
    pub fn site_ids(&self) -> &[SiteId] {
        &self.sites
    }

    /// Registers a site this assignment would occupy.
    pub fn add_site_id(&mut self, id: SiteId) {
        self.sites.push(id);
    }
}
