//! Placement grid configuration.
//!
//! The site width and row height are an explicit value threaded through the
//! database and both placement engines, not hidden global state.

use serde::{Deserialize, Serialize};

/// Dimensions of the placement grid: one site is `site_width` wide and one
/// row is `row_height` tall.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct GridConfig {
    /// Width of a single placement site, in design units.
    pub site_width: f64,
    /// Height of a placement row, in design units.
    pub row_height: f64,
}

impl GridConfig {
    /// Creates a grid configuration.
    pub fn new(site_width: f64, row_height: f64) -> Self {
        Self {
            site_width,
            row_height,
        }
    }

    /// Index of the row whose y is nearest to `y`, measured from `origin_y`.
    ///
    /// May be negative or past the last row; callers clamp to the row range.
    pub fn nearest_row_index(&self, y: f64, origin_y: f64) -> i64 {
        ((y + 0.5 * self.row_height - origin_y) / self.row_height) as i64
    }

    /// Index of the site column whose x is nearest to `x`, measured from
    /// `origin_x`.
    pub fn nearest_site_column(&self, x: f64, origin_x: f64) -> i64 {
        ((x + 0.5 * self.site_width - origin_x) / self.site_width) as i64
    }

    /// Number of whole sites covered by a footprint of the given width.
    pub fn sites_per_width(&self, width: f64) -> usize {
        (width / self.site_width) as usize
    }

    /// Number of whole rows covered by a footprint of the given height.
    pub fn rows_per_height(&self, height: f64) -> usize {
        (height / self.row_height).round() as usize
    }
}
