use mask_painter_common::{Ellipse, GridParams};
use serde::{Deserialize, Serialize};

/// Affine mapping between the world-space bounding box and a `width x height` cell array.
///
/// Rows run along y, columns along x. Storage elsewhere is row-major: `row * width + col`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridMapping {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub width: usize,
    pub height: usize,
}

impl GridMapping {
    /// Covers the ellipse's bounding box grown by `padding`. `width` is the configured
    /// resolution and `height = floor(width * span_y / span_x)`, at least 1.
    pub fn new(ellipse: &Ellipse, params: &GridParams) -> Self {
        let pad = params.padding.max(0.0);
        let x_min = ellipse.center.x - ellipse.radius_x - pad;
        let x_max = ellipse.center.x + ellipse.radius_x + pad;
        let y_min = ellipse.center.y - ellipse.radius_y - pad;
        let y_max = ellipse.center.y + ellipse.radius_y + pad;

        let width = params.resolution.max(1);
        let height = ((width as f64 * (y_max - y_min) / (x_max - x_min)).floor() as usize).max(1);

        GridMapping { x_min, x_max, y_min, y_max, width, height }
    }

    #[inline]
    pub fn span_x(&self) -> f64 {
        self.x_max - self.x_min
    }

    #[inline]
    pub fn span_y(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// World-space size of one cell, `(dx, dy)`.
    pub fn cell_size(&self) -> (f64, f64) {
        (self.span_x() / self.width as f64, self.span_y() / self.height as f64)
    }

    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    /// Maps a world point to `(row, col)`. Points outside the bounding box yield None;
    /// points on the far edges are clamped into the last row/column.
    #[inline]
    pub fn coord_to_grid(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !(self.x_min..=self.x_max).contains(&x) || !(self.y_min..=self.y_max).contains(&y) {
            return None;
        }
        let col = ((x - self.x_min) / self.span_x() * self.width as f64).floor() as usize;
        let row = ((y - self.y_min) / self.span_y() * self.height as f64).floor() as usize;
        // Clamp to grid dimensions to handle edge cases
        Some((row.min(self.height - 1), col.min(self.width - 1)))
    }

    /// World coordinates of the center of cell `(row, col)`.
    #[inline]
    pub fn grid_to_coord(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.x_min + (col as f64 + 0.5) / self.width as f64 * self.span_x();
        let y = self.y_min + (row as f64 + 0.5) / self.height as f64 * self.span_y();
        (x, y)
    }

    /// Row-major index of `(row, col)`.
    #[inline(always)]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Half-extent, in cells, of a search window guaranteed to cover a circle of
    /// world radius `radius`: `(rows, cols)`. Never wider than the grid itself plus one.
    pub fn radius_in_cells(&self, radius: f64) -> (usize, usize) {
        let cols = (radius / self.span_x() * self.width as f64).ceil().min(self.width as f64) as usize + 1;
        let rows = (radius / self.span_y() * self.height as f64).ceil().min(self.height as f64) as usize + 1;
        (rows, cols)
    }

    /// `(x_min, x_max, y_min, y_max)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (self.x_min, self.x_max, self.y_min, self.y_max)
    }
}
