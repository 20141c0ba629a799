use serde::{Serialize, Deserialize};

/// Aggregate statistics over the exposure grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    /// Number of grid cells whose center lies inside the ellipse.
    pub total_cells: usize,
    /// Number of those cells with exposure > 0.
    pub painted_cells: usize,
    pub coverage_percentage: f64,
    /// Mean exposure over cells with exposure > 0.
    pub average_exposure: f32,
    pub max_exposure: f32,
    /// `(width, height)` of the grid.
    pub grid_dimensions: (usize, usize),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleStatistics {
    pub count: usize,
    pub average_age: f64,
    pub oldest_age: u32,
    pub average_velocity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DividerStatistics {
    pub count: usize,
    pub average_probability: f64,
    /// `(min_x, max_x)` over all dividers, `(0, 0)` when there are none.
    pub position_range: (f64, f64),
    pub names: Vec<String>,
}

/// Read-only view of the spawner for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnerStatus {
    pub position: (f64, f64),
    pub spawn_count: u32,
    pub spawn_interval: u32,
    pub step_counter: u64,
    /// Steps remaining until the next emission.
    pub next_spawn_in: u64,
}

/// A snapshot of the simulation state and metrics at a specific step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The simulation step at which the snapshot was taken.
    pub step: u64,
    /// The number of live particles.
    pub total_particle_count: u32,
    /// Particles caught by divider regions since the last clear.
    pub total_region_catches: u64,
    /// Particles caught by grid cells since the last clear.
    pub total_cell_catches: u64,
    pub mask: MaskStatistics,
    /// Optional: raw row-major exposure grid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_grid: Option<Vec<f32>>,
    /// Optional: raw [x, y] positions of all particles.
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "positions": null
    pub positions: Option<Vec<(f64, f64)>>,
}
