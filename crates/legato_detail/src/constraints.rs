//! Sources of per-slice adjacency-gate constraints.

use legato_db::{Database, SubInstanceId};
use rand::Rng;

/// Provides the corner gate flags and oxide height class of each slice.
///
/// Production implementations derive these from the cell library. The engine
/// only depends on this trait, so the placeholder random source below can be
/// swapped out without touching the detection or repair code.
pub trait GateConstraintSource {
    /// Corner gate flags as (left-top, left-bottom, right-top, right-bottom).
    fn corner_gates(&mut self) -> (bool, bool, bool, bool);

    /// Oxide diffusion height class.
    fn oxide_height(&mut self) -> f64;
}

/// Placeholder constraint source drawing from a fixed set of gate patterns
/// and two oxide classes.
pub struct RandomGateSource<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomGateSource<R> {
    /// Creates a source backed by `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> GateConstraintSource for RandomGateSource<R> {
    fn corner_gates(&mut self) -> (bool, bool, bool, bool) {
        // (LT, LB, RT, RB)
        match self.rng.gen_range(0..8) {
            0 => (true, false, true, true),
            1 => (true, true, true, false),
            2 => (true, true, false, true),
            3 => (false, false, true, true),
            4 => (true, true, true, false),
            _ => (true, true, true, true),
        }
    }

    fn oxide_height(&mut self) -> f64 {
        if self.rng.gen_range(0..2) == 0 {
            1.0
        } else {
            2.0
        }
    }
}

/// Assigns gate flags and an oxide class to every chained slice.
pub(crate) fn assign_constraints(
    db: &mut Database,
    rows: &[Vec<SubInstanceId>],
    source: &mut dyn GateConstraintSource,
) {
    for row in rows {
        for &sub_id in row {
            let (lt, lb, rt, rb) = source.corner_gates();
            let sub = db.sub_instance_mut(sub_id);
            sub.set_gates_left(lt, lb);
            sub.set_gates_right(rt, rb);
        }
    }

    for row in rows {
        for &sub_id in row {
            let oxide = source.oxide_height();
            db.sub_instance_mut(sub_id).oxide_height = oxide;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn patterns_come_from_the_fixed_set() {
        let mut source = RandomGateSource::new(StdRng::seed_from_u64(7));
        let allowed = [
            (true, false, true, true),
            (true, true, true, false),
            (true, true, false, true),
            (false, false, true, true),
            (true, true, true, true),
        ];
        for _ in 0..64 {
            let gates = source.corner_gates();
            assert!(allowed.contains(&gates), "{gates:?}");
        }
    }

    #[test]
    fn oxide_classes_are_binary() {
        let mut source = RandomGateSource::new(StdRng::seed_from_u64(7));
        for _ in 0..64 {
            let h = source.oxide_height();
            assert!(h == 1.0 || h == 2.0);
        }
    }
}
