//! Free-space intervals within rows.
//!
//! An interval is a maximal contiguous span of a row with uniform fence-region
//! membership and no fixed obstruction. During legalization it tracks its
//! occupants and a cluster-based accumulator that answers "how much overlap
//! would placing a cell here incur" incrementally, without rescanning the
//! occupant list.

use crate::ids::{FenceRegionId, IntervalId, RowId, SubInstanceId};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

/// Total-order wrapper so f64 coordinates can key ordered maps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct FloatKey(pub f64);

impl Eq for FloatKey {}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A maximal free span `[begin, end)` of one row.
#[derive(Clone, Debug)]
pub struct Interval {
    row: RowId,
    begin: f64,
    end: f64,
    capacity: f64,
    fence_region: Option<FenceRegionId>,
    occupants: Vec<(f64, SubInstanceId)>,
    // Cluster right-x -> (cluster left-x, accumulated overlap within cluster).
    clusters: BTreeMap<FloatKey, (f64, f64)>,
}

impl Interval {
    /// Creates an empty interval spanning `[begin, end)` on `row`.
    pub fn new(row: RowId, begin: f64, end: f64, fence_region: Option<FenceRegionId>) -> Self {
        Self {
            row,
            begin,
            end,
            capacity: end - begin,
            fence_region,
            occupants: Vec::new(),
            clusters: BTreeMap::new(),
        }
    }

    /// The row owning this interval.
    pub fn row(&self) -> RowId {
        self.row
    }

    /// Left boundary.
    pub fn begin(&self) -> f64 {
        self.begin
    }

    /// Right boundary.
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Remaining free width: `end - begin - sum(occupant widths)`.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Fence region this interval belongs to, if any.
    pub fn fence_region(&self) -> Option<FenceRegionId> {
        self.fence_region
    }

    /// Number of registered occupants.
    pub fn num_sub_instances(&self) -> usize {
        self.occupants.len()
    }

    /// The `idx`-th occupant in x order (requires [`sort_sub_instances_by_x`]
    /// after bulk insertion).
    ///
    /// [`sort_sub_instances_by_x`]: Self::sort_sub_instances_by_x
    pub fn sub_instance_id(&self, idx: usize) -> SubInstanceId {
        self.occupants[idx].1
    }

    /// The leftmost occupant. Panics when empty.
    pub fn first_sub_instance_id(&self) -> SubInstanceId {
        self.occupants[0].1
    }

    /// Moves the left boundary, adjusting capacity.
    pub fn set_begin(&mut self, begin: f64) {
        self.capacity += self.begin - begin;
        self.begin = begin;
    }

    /// Moves the right boundary, adjusting capacity.
    pub fn set_end(&mut self, end: f64) {
        self.capacity += end - self.end;
        self.end = end;
    }

    /// Retags the interval with a different fence region.
    pub fn set_fence_region(&mut self, fence_region: Option<FenceRegionId>) {
        self.fence_region = fence_region;
    }

    /// Overlap a cell of `width` placed at `x` would incur against the
    /// already-registered occupants, including the accumulated overlap of the
    /// cluster it would join.
    pub fn accumulated_overlap(&self, x: f64, width: f64) -> f64 {
        let right_x = x + width;

        let Some((&FloatKey(cluster_right), &(cluster_left, cluster_overlap))) =
            self.clusters.range((Excluded(FloatKey(x)), Unbounded)).next()
        else {
            return 0.0;
        };

        debug_assert!(cluster_left < right_x);

        cluster_overlap + (cluster_right.min(right_x) - cluster_left.max(x))
    }

    /// Registers an occupant of `width` at `x`, consuming capacity and
    /// extending or merging the overlap cluster it lands in.
    pub fn add_sub_instance(&mut self, id: SubInstanceId, x: f64, width: f64) {
        self.capacity -= width;
        self.occupants.push((x, id));

        let right_x = x + width;

        let joined = self
            .clusters
            .range((Excluded(FloatKey(x)), Unbounded))
            .next()
            .map(|(&k, &v)| (k, v));

        match joined {
            None => {
                self.clusters.insert(FloatKey(right_x), (x, 0.0));
            }
            Some((key, (cluster_left, cluster_overlap))) => {
                let cluster_right = key.0;
                debug_assert!(cluster_left < right_x);

                let overlap =
                    cluster_overlap + (cluster_right.min(right_x) - cluster_left.max(x));

                self.clusters.remove(&key);
                self.clusters.insert(FloatKey(right_x), (cluster_left, overlap));
            }
        }
    }

    /// Clears occupancy, restoring full capacity. The interval itself is never
    /// destroyed; removal is modeled as this reset.
    pub fn clear_sub_instances(&mut self) {
        self.capacity = self.end - self.begin;
        self.occupants.clear();
        self.clusters.clear();
    }

    /// Sorts occupants by x. Precondition for index-ordered traversal after
    /// bulk insertion; not auto-maintained.
    pub fn sort_sub_instances_by_x(&mut self) {
        self.occupants
            .sort_by(|a, b| a.0.total_cmp(&b.0));
    }
}
