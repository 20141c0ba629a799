use serde::{Deserialize, Serialize};
use crate::config::MovementMode;
use crate::vecmath::Ellipse;

/// Particle kinematics parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleParams {
    /// Speed for ballistic particles, diffusion coefficient for diffusive ones.
    pub velocity: f64,
    /// Steps a particle survives before it expires.
    pub lifetime: u32,
    pub movement_mode: MovementMode,
    /// 0 = slip boundary, 1 = fully elastic reflection.
    pub bounce: f64,
    /// Time step passed to `move`.
    pub dt: f64,
}

/// Parameters for cell-based stochastic capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CatchParams {
    pub probability: f64,
    pub radius: f64,
    pub exposure: f32,
}

/// Global exposure decay parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayParams {
    pub rate: f32,
    /// Cells at or above this value no longer decay.
    pub saturation_threshold: f32,
}

/// Shape parameters of the exposure grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    /// Number of columns; rows are derived from the aspect ratio.
    pub resolution: usize,
    pub padding: f64,
    pub count_particles: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnParams {
    pub spawn_count: u32,
    pub spawn_interval: u32,
}

/// Simulation parameters derived from the configuration, already clamped to valid ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    pub ellipse: Ellipse,
    pub particles: ParticleParams,
    pub spawn: SpawnParams,
    pub catching: CatchParams,
    pub decay: DecayParams,
    pub grid: GridParams,
    /// Wall-clock interval between automatic steps, in milliseconds.
    pub step_interval_ms: u64,
    pub seed: Option<u64>,
}
