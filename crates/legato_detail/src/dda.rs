//! The forbidden-adjacency predicate and chain-wide detection.

use legato_db::{Database, InstanceId, SubInstanceId};
use serde::Serialize;

/// Whether two abutting slices form a forbidden adjacency.
///
/// `rt`/`rb` are the left slice's right-edge gates, `lt`/`lb` the right
/// slice's left-edge gates. The pair is forbidden iff fewer than two of the
/// merged rows {rt∨lt, rb∨lb} carry a gate.
pub fn judge_dda_pair(rt: bool, rb: bool, lt: bool, lb: bool) -> bool {
    let merged_rows = usize::from(rt || lt) + usize::from(rb || lb);
    merged_rows < 2
}

/// Counts produced by one forbidden-pair scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ForbiddenSummary {
    /// Abutting pairs examined.
    pub pairs_checked: usize,
    /// Pairs found forbidden.
    pub forbidden_pairs: usize,
    /// Instances touched by at least one forbidden pair.
    pub forbidden_instances: usize,
    /// Forbidden instances bucketed by row height (index h-1, heights 1-4).
    pub forbidden_by_row_height: [usize; 4],
}

/// Scans every chain for forbidden adjacencies, marking the slices and their
/// owning instances, and returns the counts.
pub(crate) fn find_forbidden_pairs(
    db: &mut Database,
    rows: &[Vec<SubInstanceId>],
) -> ForbiddenSummary {
    for i in 0..db.num_instances() {
        db.instance_mut(InstanceId::from_raw(i as u32)).forbidden_cell = false;
    }
    for i in 0..db.num_sub_instances() {
        db.sub_instance_mut(legato_db::SubInstanceId::from_raw(i as u32))
            .dda_forbidden = false;
    }

    let mut summary = ForbiddenSummary::default();

    for row in rows {
        for pair in row.windows(2) {
            let (left_id, right_id) = (pair[0], pair[1]);
            let left = db.sub_instance(left_id);
            let right = db.sub_instance(right_id);

            summary.pairs_checked += 1;

            if judge_dda_pair(
                left.right_top,
                left.right_bottom,
                right.left_top,
                right.left_bottom,
            ) {
                summary.forbidden_pairs += 1;

                let left_instance = left.instance;
                let right_instance = right.instance;
                db.sub_instance_mut(left_id).dda_forbidden = true;
                db.sub_instance_mut(right_id).dda_forbidden = true;
                db.instance_mut(left_instance).forbidden_cell = true;
                db.instance_mut(right_instance).forbidden_cell = true;
            }
        }
    }

    for i in 0..db.num_instances() {
        let instance = db.instance(InstanceId::from_raw(i as u32));
        if instance.forbidden_cell {
            summary.forbidden_instances += 1;
            let h = instance.num_sub_instances();
            if (1..=4).contains(&h) {
                summary.forbidden_by_row_height[h - 1] += 1;
            }
        }
    }

    summary
}
