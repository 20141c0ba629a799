use crate::error::{MaskError, MaskResult};
use crate::grid::GridMapping;
use log::{debug, info};
use mask_painter_common::{CatchParams, Ellipse, GridParams, MaskStatistics, Vec2};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// On-disk form of the exposure grid.
#[derive(Debug, Serialize, Deserialize)]
struct StoredGrid {
    height: usize,
    width: usize,
    cells: Vec<f32>,
}

/// Decaying exposure field over the ellipse's bounding box, plus an optional
/// per-cell capture counter.
///
/// Both grids are row-major `height x width` arrays. They are rebuilt from scratch,
/// losing all accumulated exposure, whenever geometry or resolution changes.
#[derive(Debug, Clone)]
pub struct MaskSystem {
    ellipse: Ellipse,
    params: GridParams,
    mapping: GridMapping,
    exposure: Vec<f32>,
    counts: Option<Vec<u32>>,
}

impl MaskSystem {
    pub fn new(ellipse: Ellipse, params: GridParams) -> Self {
        let mapping = GridMapping::new(&ellipse, &params);
        let mut mask = MaskSystem { ellipse, params, mapping, exposure: Vec::new(), counts: None };
        mask.create_grid();
        mask
    }

    /// (Re)allocates both grids for the current geometry, discarding prior exposure.
    pub fn create_grid(&mut self) {
        self.mapping = GridMapping::new(&self.ellipse, &self.params);
        let n = self.mapping.num_cells();
        self.exposure = vec![0.0; n];
        self.counts = if self.params.count_particles { Some(vec![0; n]) } else { None };
        info!(
            "Created {}x{} exposure grid over x=[{:.2}, {:.2}], y=[{:.2}, {:.2}].",
            self.mapping.width, self.mapping.height,
            self.mapping.x_min, self.mapping.x_max, self.mapping.y_min, self.mapping.y_max
        );
    }

    /// Applies new geometry. The grid is recreated only if something that shapes it changed.
    /// Returns true if it was recreated.
    pub fn set_geometry(&mut self, ellipse: Ellipse, params: GridParams) -> bool {
        if ellipse == self.ellipse && params == self.params {
            return false;
        }
        self.ellipse = ellipse;
        self.params = params;
        self.create_grid();
        true
    }

    pub fn is_inside_ellipse(&self, x: f64, y: f64) -> bool {
        self.ellipse.contains(Vec2::new(x, y))
    }

    /// `(row, col)` of the cell containing a world point, None outside the grid bounds.
    pub fn coord_to_grid(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        self.mapping.coord_to_grid(x, y)
    }

    /// World coordinates of the center of a cell.
    pub fn grid_to_coord(&self, row: usize, col: usize) -> (f64, f64) {
        self.mapping.grid_to_coord(row, col)
    }

    /// Attempts a cell-based capture at `(x, y)`.
    ///
    /// Points outside the ellipse are never caught and consume no randomness.
    /// Otherwise one uniform sample in `[0, 1)` is drawn; a sample above
    /// `catch.probability` means no capture. On capture, exposure is stamped onto every
    /// cell whose center is within `catch.radius` of the point and inside the ellipse.
    pub fn try_catch_by_cell<R: Rng + ?Sized>(&mut self, x: f64, y: f64, catch: &CatchParams, rng: &mut R) -> bool {
        if !self.is_inside_ellipse(x, y) {
            return false;
        }
        let sample: f64 = rng.random();
        if sample > catch.probability {
            return false;
        }

        self.apply_exposure_circle(x, y, catch.radius, catch.exposure);

        if let Some(counts) = self.counts.as_mut() {
            if let Some((row, col)) = self.mapping.coord_to_grid(x, y) {
                let idx = self.mapping.index(row, col);
                counts[idx] = counts[idx].saturating_add(1);
            }
        }
        true
    }

    /// Adds `exposure` to every in-ellipse cell whose center lies within `radius` of the point.
    pub fn apply_exposure_circle(&mut self, center_x: f64, center_y: f64, radius: f64, exposure: f32) {
        let Some((center_row, center_col)) = self.mapping.coord_to_grid(center_x, center_y) else {
            return;
        };
        let (rows, cols) = self.mapping.radius_in_cells(radius);
        let row_lo = center_row.saturating_sub(rows);
        let row_hi = center_row.saturating_add(rows).min(self.mapping.height - 1);
        let col_lo = center_col.saturating_sub(cols);
        let col_hi = center_col.saturating_add(cols).min(self.mapping.width - 1);

        let center = Vec2::new(center_x, center_y);
        let radius_sq = radius * radius;
        let mut stamped = 0usize;
        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                let (x, y) = self.mapping.grid_to_coord(row, col);
                let cell = Vec2::new(x, y);
                if cell.distance_squared(center) <= radius_sq && self.ellipse.contains(cell) {
                    let idx = self.mapping.index(row, col);
                    self.exposure[idx] += exposure;
                    stamped += 1;
                }
            }
        }
        debug!("Stamped {:.3} exposure onto {} cells at ({:.2}, {:.2}).", exposure, stamped, center_x, center_y);
    }

    /// Multiplies every cell below `saturation_threshold` by `1 - rate`, then clamps at 0.
    /// Cells at or above the threshold are left untouched.
    pub fn apply_decay(&mut self, rate: f32, saturation_threshold: f32) {
        let keep = 1.0 - rate;
        self.exposure.par_iter_mut().for_each(|value| {
            if *value < saturation_threshold {
                *value *= keep;
            }
            if *value < 0.0 {
                *value = 0.0;
            }
        });
    }

    /// Zeroes both grids without resizing them.
    pub fn reset(&mut self) {
        self.exposure.fill(0.0);
        if let Some(counts) = self.counts.as_mut() {
            counts.fill(0);
        }
    }

    /// Coverage and exposure statistics. Scans the whole grid; meant for query time only.
    pub fn statistics(&self) -> MaskStatistics {
        let mapping = self.mapping;
        let ellipse = self.ellipse;
        let exposure = &self.exposure;

        let (total_cells, painted_cells) = (0..mapping.height)
            .into_par_iter()
            .map(|row| {
                let mut inside = 0usize;
                let mut painted = 0usize;
                for col in 0..mapping.width {
                    let (x, y) = mapping.grid_to_coord(row, col);
                    if ellipse.contains(Vec2::new(x, y)) {
                        inside += 1;
                        if exposure[mapping.index(row, col)] > 0.0 {
                            painted += 1;
                        }
                    }
                }
                (inside, painted)
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        let (sum, nonzero, max_exposure) = exposure
            .par_iter()
            .filter(|v| **v > 0.0)
            .fold(|| (0.0f64, 0usize, 0.0f32), |(s, n, m), &v| (s + v as f64, n + 1, m.max(v)))
            .reduce(|| (0.0, 0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1, a.2.max(b.2)));

        MaskStatistics {
            total_cells,
            painted_cells,
            coverage_percentage: if total_cells > 0 {
                painted_cells as f64 / total_cells as f64 * 100.0
            } else {
                0.0
            },
            average_exposure: if nonzero > 0 { (sum / nonzero as f64) as f32 } else { 0.0 },
            max_exposure,
            grid_dimensions: (mapping.width, mapping.height),
        }
    }

    /// Writes the exposure grid to `path` in bincode form.
    pub fn save_grid<P: AsRef<Path>>(&self, path: P) -> MaskResult<()> {
        let stored = StoredGrid {
            height: self.mapping.height,
            width: self.mapping.width,
            cells: self.exposure.clone(),
        };
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, &stored)?;
        Ok(())
    }

    /// Replaces the exposure grid with one saved by `save_grid`.
    /// A grid of a different shape is rejected and the live grid is left untouched.
    pub fn load_grid<P: AsRef<Path>>(&mut self, path: P) -> MaskResult<()> {
        let reader = BufReader::new(File::open(path)?);
        let stored: StoredGrid = bincode::deserialize_from(reader)?;

        let expected = (self.mapping.height, self.mapping.width);
        let found = (stored.height, stored.width);
        if found != expected {
            return Err(MaskError::ShapeMismatch { expected, found });
        }
        if stored.cells.len() != stored.height * stored.width {
            return Err(MaskError::Corrupt { shape: found, cells: stored.cells.len() });
        }
        self.exposure = stored.cells;
        Ok(())
    }

    /// Copy of the row-major exposure grid.
    pub fn exposure_data(&self) -> Vec<f32> {
        self.exposure.clone()
    }

    /// Copy of the row-major capture count grid, if counting is enabled.
    pub fn count_data(&self) -> Option<Vec<u32>> {
        self.counts.clone()
    }

    pub fn exposure_at(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.mapping.height || col >= self.mapping.width {
            return None;
        }
        Some(self.exposure[self.mapping.index(row, col)])
    }

    pub fn count_at(&self, row: usize, col: usize) -> Option<u32> {
        if row >= self.mapping.height || col >= self.mapping.width {
            return None;
        }
        self.counts.as_ref().map(|c| c[self.mapping.index(row, col)])
    }

    pub fn mapping(&self) -> &GridMapping {
        &self.mapping
    }

    /// `(x_min, x_max, y_min, y_max)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.mapping.bounds()
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.mapping.width, self.mapping.height)
    }

    pub fn ellipse(&self) -> Ellipse {
        self.ellipse
    }

    pub fn grid_params(&self) -> GridParams {
        self.params
    }
}
