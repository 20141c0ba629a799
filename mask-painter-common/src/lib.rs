pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    CatchingConfig, DividerConfig, EllipseConfig, MovementMode, OutputConfig, ParticlesConfig,
    RunConfig, SimulationConfig, SpawnerConfig, StepFunctionConfig, SystemConfig, clamp_count,
    clamp_unit,
};
pub use sim_params::{CatchParams, DecayParams, GridParams, ParticleParams, SimParams, SpawnParams};
pub use snapshot::{DividerStatistics, MaskStatistics, ParticleStatistics, Snapshot, SpawnerStatus};
pub use vecmath::{Ellipse, Vec2, angle_to_vec, vec_to_angle, clamp};
