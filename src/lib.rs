pub mod divider;
pub mod error;
pub mod grid;
pub mod mask;
pub mod particle;
pub mod simulation;
pub mod spawner;

pub use divider::{Divider, DividerManager};
pub use error::{MaskError, MaskResult};
pub use grid::GridMapping;
pub use mask::MaskSystem;
pub use particle::{Motion, Particle, ParticleId, ParticleManager};
pub use simulation::{MaskPainterSimulation, StepReport};
pub use spawner::ParticleSpawner;
