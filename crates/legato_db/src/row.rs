//! Placement rows and their interval index.

use crate::ids::{FenceRegionId, IntervalId, LayerId, RailId};
use crate::interval::FloatKey;
use crate::types::Orientation;
use legato_geom::Point;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

/// A standard-cell row.
///
/// Besides its geometry a row indexes its intervals twice: a flat list sorted
/// by begin x for ordered traversal, and one ordered map per fence region for
/// O(log n) "nearest interval of this region before/after x" queries. Slot 0
/// of the per-region table holds intervals outside every fence region.
#[derive(Clone, Debug)]
pub struct Row {
    name: String,
    position: Point,
    orientation: Orientation,
    rail_by_layer: Vec<Option<RailId>>,
    interval_by_begin_by_fence_region: Vec<BTreeMap<FloatKey, IntervalId>>,
    intervals_sorted_by_begin: Vec<(f64, IntervalId)>,
}

impl Row {
    /// Creates a row with `num_layers` rail slots and no intervals.
    pub fn new(
        name: impl Into<String>,
        position: Point,
        orientation: Orientation,
        num_layers: usize,
    ) -> Self {
        Self {
            name: name.into(),
            position,
            orientation,
            rail_by_layer: vec![None; num_layers],
            interval_by_begin_by_fence_region: Vec::new(),
            intervals_sorted_by_begin: Vec::new(),
        }
    }

    /// Row name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower-left position of the row.
    pub fn position(&self) -> Point {
        self.position
    }

    /// Row orientation.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Number of registered intervals.
    pub fn num_intervals(&self) -> usize {
        self.intervals_sorted_by_begin.len()
    }

    /// The `idx`-th interval in begin-x order.
    ///
    /// Meaningful only after [`sort_intervals_by_begin`]
    /// (Self::sort_intervals_by_begin) has been called.
    pub fn interval_id(&self, idx: usize) -> IntervalId {
        self.intervals_sorted_by_begin[idx].1
    }

    /// The rail bound to `layer`, if any.
    pub fn rail_id_on_layer(&self, layer: LayerId) -> Option<RailId> {
        self.rail_by_layer[layer.index()]
    }

    /// Binds `rail` to `layer`.
    pub fn set_rail_id_on_layer(&mut self, rail: RailId, layer: LayerId) {
        self.rail_by_layer[layer.index()] = Some(rail);
    }

    fn fence_region_slot(fence_region: Option<FenceRegionId>) -> usize {
        // Slot 0 is the no-region bucket; region r occupies slot r + 1.
        match fence_region {
            None => 0,
            Some(id) => id.index() + 1,
        }
    }

    fn interval_by_begin(
        &self,
        fence_region: Option<FenceRegionId>,
    ) -> &BTreeMap<FloatKey, IntervalId> {
        &self.interval_by_begin_by_fence_region[Self::fence_region_slot(fence_region)]
    }

    /// Whether the row has any interval of `fence_region`.
    pub fn has_interval_of_fence_region(&self, fence_region: Option<FenceRegionId>) -> bool {
        !self.interval_by_begin(fence_region).is_empty()
    }

    /// The interval of `fence_region` with the greatest begin strictly left of
    /// `x`, if any.
    pub fn interval_id_of_fence_region_before(
        &self,
        fence_region: Option<FenceRegionId>,
        x: f64,
    ) -> Option<IntervalId> {
        self.interval_by_begin(fence_region)
            .range((Unbounded, Excluded(FloatKey(x))))
            .next_back()
            .map(|(_, &id)| id)
    }

    /// The interval of `fence_region` with the least begin at or right of `x`,
    /// if any.
    pub fn interval_id_of_fence_region_after(
        &self,
        fence_region: Option<FenceRegionId>,
        x: f64,
    ) -> Option<IntervalId> {
        self.interval_by_begin(fence_region)
            .range((Included(FloatKey(x)), Unbounded))
            .next()
            .map(|(_, &id)| id)
    }

    /// Sizes the per-fence-region index. Must be called before
    /// [`add_interval_id`](Self::add_interval_id) and the fence-region
    /// queries.
    pub fn prepare_for_adding_interval_ids(&mut self, num_fence_regions: usize) {
        self.interval_by_begin_by_fence_region
            .resize_with(num_fence_regions + 1, BTreeMap::new);
    }

    /// Registers an interval starting at `begin` under `fence_region`.
    pub fn add_interval_id(
        &mut self,
        id: IntervalId,
        begin: f64,
        fence_region: Option<FenceRegionId>,
    ) {
        self.interval_by_begin_by_fence_region[Self::fence_region_slot(fence_region)]
            .insert(FloatKey(begin), id);
        self.intervals_sorted_by_begin.push((begin, id));
    }

    /// Sorts the flat interval list by begin x. Precondition for
    /// [`interval_id`](Self::interval_id) traversal; not auto-maintained.
    pub fn sort_intervals_by_begin(&mut self) {
        self.intervals_sorted_by_begin
            .sort_by(|a, b| a.0.total_cmp(&b.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with_intervals() -> Row {
        let mut row = Row::new("row0", Point::new(0.0, 0.0), Orientation::N, 2);
        row.prepare_for_adding_interval_ids(2);
        row.add_interval_id(IntervalId::from_raw(0), 0.0, None);
        row.add_interval_id(IntervalId::from_raw(1), 40.0, Some(FenceRegionId::from_raw(0)));
        row.add_interval_id(IntervalId::from_raw(2), 80.0, None);
        row.sort_intervals_by_begin();
        row
    }

    #[test]
    fn sorted_traversal() {
        let mut row = Row::new("row0", Point::default(), Orientation::N, 1);
        row.prepare_for_adding_interval_ids(0);
        row.add_interval_id(IntervalId::from_raw(0), 50.0, None);
        row.add_interval_id(IntervalId::from_raw(1), 10.0, None);
        row.sort_intervals_by_begin();
        assert_eq!(row.num_intervals(), 2);
        assert_eq!(row.interval_id(0), IntervalId::from_raw(1));
        assert_eq!(row.interval_id(1), IntervalId::from_raw(0));
    }

    #[test]
    fn fence_region_buckets_are_disjoint() {
        let row = row_with_intervals();
        assert!(row.has_interval_of_fence_region(None));
        assert!(row.has_interval_of_fence_region(Some(FenceRegionId::from_raw(0))));
        assert!(!row.has_interval_of_fence_region(Some(FenceRegionId::from_raw(1))));
    }

    #[test]
    fn before_query_is_strict() {
        let row = row_with_intervals();
        // The no-region interval at 0.0 is the only one strictly before 80.0.
        assert_eq!(
            row.interval_id_of_fence_region_before(None, 80.0),
            Some(IntervalId::from_raw(0))
        );
        assert_eq!(row.interval_id_of_fence_region_before(None, 0.0), None);
    }

    #[test]
    fn after_query_is_inclusive() {
        let row = row_with_intervals();
        assert_eq!(
            row.interval_id_of_fence_region_after(None, 80.0),
            Some(IntervalId::from_raw(2))
        );
        assert_eq!(row.interval_id_of_fence_region_after(None, 80.1), None);
        assert_eq!(
            row.interval_id_of_fence_region_after(Some(FenceRegionId::from_raw(0)), 0.0),
            Some(IntervalId::from_raw(1))
        );
    }

    #[test]
    fn rails_bind_per_layer() {
        let mut row = Row::new("row0", Point::default(), Orientation::N, 3);
        assert_eq!(row.rail_id_on_layer(LayerId::from_raw(1)), None);
        row.set_rail_id_on_layer(RailId::from_raw(7), LayerId::from_raw(1));
        assert_eq!(row.rail_id_on_layer(LayerId::from_raw(1)), Some(RailId::from_raw(7)));
        assert_eq!(row.rail_id_on_layer(LayerId::from_raw(0)), None);
    }
}
