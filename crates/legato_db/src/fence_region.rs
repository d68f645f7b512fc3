//! Fence regions: named unions of rectangles constraining instance placement.

use legato_geom::Rect;
use serde::{Deserialize, Serialize};

/// A named placement region. An instance tagged with a fence region must be
/// placed entirely inside one of its rectangles; untagged instances must stay
/// outside all of them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FenceRegion {
    /// Region name in the design.
    pub name: String,
    rects: Vec<Rect>,
}

impl FenceRegion {
    /// Creates an empty region.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rects: Vec::new(),
        }
    }

    /// Number of rectangles in the region.
    pub fn num_rects(&self) -> usize {
        self.rects.len()
    }

    /// The `idx`-th rectangle.
    pub fn rect(&self, idx: usize) -> &Rect {
        &self.rects[idx]
    }

    /// The rectangles of the region.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Adds a rectangle to the region.
    pub fn add_rect(&mut self, rect: Rect) {
        self.rects.push(rect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rects_accumulate() {
        let mut region = FenceRegion::new("block_a");
        region.add_rect(Rect::new(0.0, 0.0, 100.0, 200.0));
        region.add_rect(Rect::new(100.0, 0.0, 150.0, 100.0));
        assert_eq!(region.num_rects(), 2);
        assert_eq!(region.rect(1).width(), 50.0);
    }
}
