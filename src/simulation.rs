use crate::divider::{Divider, DividerManager};
use crate::error::MaskResult;
use crate::mask::MaskSystem;
use crate::particle::{ParticleId, ParticleManager};
use crate::spawner::ParticleSpawner;
use anyhow::Result;
use log::{debug, info, trace, warn};
use mask_painter_common::{
    DividerStatistics, EllipseConfig, MaskStatistics, MovementMode, ParticleStatistics, SimParams,
    SimulationConfig, Snapshot, SpawnerStatus,
};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What happened during one call to `step`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step number after this step completed (1-based).
    pub step: u64,
    pub spawned: usize,
    pub region_caught: usize,
    pub cell_caught: usize,
    pub expired: usize,
    /// Live particles after the step.
    pub particle_count: usize,
}

/// Drives the spawner, particles, dividers and exposure mask through fixed-order ticks.
///
/// Each `step` runs: spawn, move + reflect, capture resolution, removal of caught
/// particles, removal of expired particles, mask decay. All randomness comes from the
/// single owned RNG, so a seeded simulation is fully reproducible.
pub struct MaskPainterSimulation {
    /// The configuration record all runtime parameters are derived from.
    config: SimulationConfig,
    /// Clamped runtime parameters derived from `config`.
    params: SimParams,
    dividers: DividerManager,
    particles: ParticleManager,
    spawner: ParticleSpawner,
    mask: MaskSystem,
    rng: StdRng,
    current_step: u64,
    total_region_catches: u64,
    total_cell_catches: u64,
    /// Stores collected snapshots at record intervals.
    recorded_snapshots: Vec<Snapshot>,
}

impl MaskPainterSimulation {
    /// Creates a simulation. The RNG is seeded from `system.seed` when present.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let rng = match config.system.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, rng)
    }

    /// Creates a simulation that draws all randomness from `rng`.
    pub fn with_rng(config: SimulationConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let ellipse = params.ellipse;

        let dividers = DividerManager::from_configs(&config.dividers, ellipse);
        let particles = ParticleManager::new(ellipse, &params.particles);
        let spawner = ParticleSpawner::new(&params.spawn, &ellipse);
        let mask = MaskSystem::new(ellipse, params.grid);

        info!(
            "Simulation initialised: ellipse center=({:.1}, {:.1}) radii=({:.1}, {:.1}), {} dividers.",
            ellipse.center.x, ellipse.center.y, ellipse.radius_x, ellipse.radius_y, dividers.len()
        );

        Ok(Self {
            config,
            params,
            dividers,
            particles,
            spawner,
            mask,
            rng,
            current_step: 0,
            total_region_catches: 0,
            total_cell_catches: 0,
            recorded_snapshots: Vec::new(),
        })
    }

    /// Advances the simulation by one tick.
    pub fn step(&mut self) -> StepReport {
        // --- 1. Spawn ---
        let spawned = if self.spawner.should_spawn() {
            self.emit()
        } else {
            0
        };

        // --- 2. Move + Reflect ---
        self.particles.move_all(self.params.particles.dt, &mut self.rng);

        // --- 3. Capture Resolution ---
        let (caught, region_caught, cell_caught) = self.resolve_captures();

        // --- 4. Remove Caught (batched, never mid-iteration) ---
        self.particles.remove_many(&caught);

        // --- 5. Expire ---
        let expired = self.particles.remove_expired();

        // --- 6. Decay ---
        self.mask.apply_decay(self.params.decay.rate, self.params.decay.saturation_threshold);

        self.current_step += 1;
        self.total_region_catches += region_caught as u64;
        self.total_cell_catches += cell_caught as u64;

        let report = StepReport {
            step: self.current_step,
            spawned,
            region_caught,
            cell_caught,
            expired,
            particle_count: self.particles.len(),
        };
        debug!(
            "Step {}: spawned={} region_caught={} cell_caught={} expired={} live={}",
            report.step, spawned, region_caught, cell_caught, expired, report.particle_count
        );
        report
    }

    /// Each particle is tested against its divider region first. Only if that draw
    /// misses is it tested against the grid cell, so no particle sees both mechanisms.
    fn resolve_captures(&mut self) -> (Vec<ParticleId>, usize, usize) {
        let catch = self.params.catching;
        let mut caught = Vec::new();
        let mut region_caught = 0;
        let mut cell_caught = 0;

        for particle in self.particles.particles() {
            let (x, y) = particle.position();

            let region_probability = self.dividers.region_probability(x);
            if region_probability > 0.0 && self.rng.random::<f64>() < region_probability {
                trace!("Particle {:?} caught by region at x={:.2}.", particle.id(), x);
                caught.push(particle.id());
                region_caught += 1;
                continue;
            }

            if self.mask.try_catch_by_cell(x, y, &catch, &mut self.rng) {
                trace!("Particle {:?} caught by cell at ({:.2}, {:.2}).", particle.id(), x, y);
                caught.push(particle.id());
                cell_caught += 1;
            }
        }
        (caught, region_caught, cell_caught)
    }

    /// Emits one batch of particles at the spawner position.
    fn emit(&mut self) -> usize {
        let (x, y) = self.spawner.position();
        let count = self.spawner.spawn_count();
        self.particles
            .spawn_many(x, y, count, self.params.particles.velocity, &mut self.rng)
            .len()
    }

    /// Emits a batch immediately and restarts the spawn interval.
    pub fn spawn_now(&mut self) -> usize {
        self.spawner.force_spawn();
        self.emit()
    }

    /// Returns to a pristine state: no particles, zeroed grids, zeroed counters.
    /// Geometry, parameters and dividers are kept.
    pub fn clear(&mut self) {
        let removed = self.particles.clear();
        self.mask.reset();
        self.spawner.reset();
        self.current_step = 0;
        self.total_region_catches = 0;
        self.total_cell_catches = 0;
        self.recorded_snapshots.clear();
        info!("Simulation cleared ({} particles removed).", removed);
    }

    // --- Parameter Mutators (take effect on the next step) ---

    /// Speed (or diffusion coefficient) for particles spawned from now on.
    pub fn set_velocity(&mut self, velocity: f64) {
        self.config.particles.velocity = velocity;
        self.sync_components();
    }

    pub fn set_lifetime(&mut self, lifetime: u32) {
        self.config.particles.lifetime = lifetime;
        self.sync_components();
    }

    pub fn set_bounce(&mut self, bounce: f64) {
        self.config.particles.bounce = bounce;
        self.sync_components();
    }

    pub fn set_movement_mode(&mut self, mode: MovementMode) {
        self.config.particles.movement_mode = mode;
        self.sync_components();
    }

    pub fn set_catch_probability(&mut self, probability: f64) {
        self.config.catching.probability = probability;
        self.sync_components();
    }

    pub fn set_catch_radius(&mut self, radius: f64) {
        self.config.catching.radius = radius;
        self.sync_components();
    }

    pub fn set_catch_exposure(&mut self, exposure: f64) {
        self.config.catching.exposure = exposure;
        self.sync_components();
    }

    pub fn set_decay_rate(&mut self, rate: f64) {
        self.config.step_function.decay_rate = rate;
        self.sync_components();
    }

    pub fn set_saturation_threshold(&mut self, threshold: f64) {
        self.config.step_function.saturation_threshold = threshold;
        self.sync_components();
    }

    pub fn set_step_interval(&mut self, interval_ms: u64) {
        self.config.step_function.step_interval = interval_ms;
        self.sync_components();
    }

    pub fn set_spawn_count(&mut self, count: i64) {
        self.config.spawner.spawn_count = count;
        self.sync_components();
    }

    pub fn set_spawn_interval(&mut self, interval: i64) {
        self.config.spawner.spawn_interval = interval;
        self.sync_components();
    }

    // --- Geometry Mutators (recreate the exposure grid) ---

    /// Changes the ellipse. Invalid geometry is rejected and nothing changes.
    /// Dividers outside the new bounds are dropped and all exposure is lost.
    pub fn set_ellipse(&mut self, ellipse: EllipseConfig) -> Result<()> {
        let mut candidate = self.config.clone();
        candidate.ellipse = ellipse;
        candidate.validate()?;
        self.config = candidate;
        self.sync_components();
        Ok(())
    }

    pub fn set_mask_resolution(&mut self, resolution: i64) {
        self.config.system.mask_resolution = resolution;
        self.sync_components();
    }

    pub fn set_grid_padding(&mut self, padding: f64) {
        self.config.system.grid_padding = padding;
        self.sync_components();
    }

    pub fn set_count_particles(&mut self, enabled: bool) {
        self.config.system.count_particles = enabled;
        self.sync_components();
    }

    /// Applies a whole configuration record. The divider set is replaced by the record's
    /// list; the grid is recreated only if geometry or resolution changed. The RNG is
    /// not reseeded.
    pub fn apply_config(&mut self, config: SimulationConfig) -> Result<()> {
        config.validate()?;
        self.dividers = DividerManager::from_configs(&config.dividers, config.ellipse());
        self.config = config;
        self.sync_components();
        Ok(())
    }

    /// Re-derives runtime parameters from `config` and pushes them into every component.
    fn sync_components(&mut self) {
        let params = self.config.get_sim_params();
        let ellipse = params.ellipse;

        self.particles.set_ellipse(ellipse);
        self.particles.set_lifetime(params.particles.lifetime);
        self.particles.set_bounce(params.particles.bounce);
        self.particles.set_movement_mode(params.particles.movement_mode);

        self.spawner.set_spawn_count(params.spawn.spawn_count as i64);
        self.spawner.set_spawn_interval(params.spawn.spawn_interval as i64);
        self.spawner.update_position(&ellipse);

        if self.dividers.bounds() != ellipse {
            for dropped in self.dividers.update_bounds(ellipse) {
                warn!("Divider '{}' at x={:.2} removed: outside new ellipse bounds.", dropped.name, dropped.x);
            }
        }

        if self.mask.set_geometry(ellipse, params.grid) {
            info!("Grid geometry changed; accumulated exposure discarded.");
        }

        if params != self.params {
            debug!("Parameters updated: {:?}", params);
        }
        self.params = params;
    }

    // --- Divider Mutators ---

    pub fn add_divider(&mut self, name: &str, x: f64, probability: f64, color: &str) -> bool {
        self.dividers.add(name, x, probability, color)
    }

    pub fn remove_divider(&mut self, name: &str) -> bool {
        self.dividers.remove(name)
    }

    pub fn rename_divider(&mut self, old_name: &str, new_name: &str) -> bool {
        self.dividers.rename(old_name, new_name)
    }

    pub fn set_divider_probability(&mut self, name: &str, probability: f64) -> bool {
        self.dividers.set_probability(name, probability)
    }

    pub fn set_divider_position(&mut self, name: &str, x: f64) -> bool {
        self.dividers.set_position(name, x)
    }

    pub fn clear_dividers(&mut self) -> usize {
        self.dividers.clear()
    }

    // --- Read-only Accessors ---

    /// Copy of all particle positions.
    pub fn particle_positions(&self) -> Vec<(f64, f64)> {
        self.particles.positions()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn particles(&self) -> &ParticleManager {
        &self.particles
    }

    /// Copy of the row-major exposure grid.
    pub fn exposure_grid(&self) -> Vec<f32> {
        self.mask.exposure_data()
    }

    /// Copy of the row-major capture count grid, if counting is enabled.
    pub fn count_grid(&self) -> Option<Vec<u32>> {
        self.mask.count_data()
    }

    pub fn mask(&self) -> &MaskSystem {
        &self.mask
    }

    /// `(x_min, x_max, y_min, y_max)`.
    pub fn grid_bounds(&self) -> (f64, f64, f64, f64) {
        self.mask.bounds()
    }

    /// `(width, height)`.
    pub fn grid_dimensions(&self) -> (usize, usize) {
        self.mask.dimensions()
    }

    pub fn dividers(&self) -> Vec<Divider> {
        self.dividers.dividers()
    }

    pub fn divider_manager(&self) -> &DividerManager {
        &self.dividers
    }

    pub fn spawner_status(&self) -> SpawnerStatus {
        self.spawner.status()
    }

    pub fn particle_statistics(&self) -> ParticleStatistics {
        self.particles.statistics()
    }

    pub fn divider_statistics(&self) -> DividerStatistics {
        self.dividers.statistics()
    }

    pub fn mask_statistics(&self) -> MaskStatistics {
        self.mask.statistics()
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The configuration record reflecting every mutation so far, including dividers.
    pub fn current_config(&self) -> SimulationConfig {
        let mut config = self.config.clone();
        config.dividers = self.dividers.to_configs();
        config
    }

    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    /// Total particles caught by `(regions, cells)` since the last clear.
    pub fn total_catches(&self) -> (u64, u64) {
        (self.total_region_catches, self.total_cell_catches)
    }

    // --- Snapshots & Persistence ---

    /// Builds a snapshot of the current state.
    pub fn snapshot(&self, include_positions: bool, include_mask: bool) -> Snapshot {
        Snapshot {
            step: self.current_step,
            total_particle_count: self.particles.len() as u32,
            total_region_catches: self.total_region_catches,
            total_cell_catches: self.total_cell_catches,
            mask: self.mask.statistics(),
            exposure_grid: include_mask.then(|| self.mask.exposure_data()),
            positions: include_positions.then(|| self.particles.positions()),
        }
    }

    /// Records a snapshot using the output flags from the configuration.
    pub fn record_snapshot(&mut self) {
        let output = &self.config.output;
        let snapshot = self.snapshot(output.save_positions_in_snapshot, output.save_mask_in_snapshot);
        debug!(
            "Recorded snapshot at step {}: {} particles, coverage {:.2}%.",
            snapshot.step, snapshot.total_particle_count, snapshot.mask.coverage_percentage
        );
        self.recorded_snapshots.push(snapshot);
    }

    /// Provides access to the recorded snapshots.
    pub fn recorded_snapshots(&self) -> &[Snapshot] {
        &self.recorded_snapshots
    }

    pub fn save_mask<P: AsRef<Path>>(&self, path: P) -> MaskResult<()> {
        self.mask.save_grid(path)
    }

    pub fn load_mask<P: AsRef<Path>>(&mut self, path: P) -> MaskResult<()> {
        self.mask.load_grid(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mask_painter_common::DividerConfig;

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.system.seed = Some(42);
        config
    }

    #[test]
    fn test_spawns_on_interval() {
        let mut config = config();
        config.spawner.spawn_interval = 2;
        config.spawner.spawn_count = 4;
        config.catching.probability = 0.0;
        let mut sim = MaskPainterSimulation::new(config).unwrap();
        assert_eq!(sim.step().spawned, 0);
        assert_eq!(sim.step().spawned, 4);
        assert_eq!(sim.particle_count(), 4);
    }

    #[test]
    fn test_region_capture_excludes_cell_capture() {
        let mut config = config();
        config.spawner.spawn_interval = 1;
        config.catching.probability = 1.0;
        // A certain-capture region covering the whole ellipse.
        config.dividers.push(DividerConfig {
            name: "all".into(),
            x: 0.0,
            probability: 1.0,
            color: "#fff".into(),
        });
        let mut sim = MaskPainterSimulation::new(config).unwrap();
        for _ in 0..5 {
            let report = sim.step();
            assert_eq!(report.cell_caught, 0);
            assert_eq!(report.region_caught, report.spawned);
        }
        assert_eq!(sim.particle_count(), 0);
        assert!(sim.exposure_grid().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_cell_capture_paints_mask() {
        let mut config = config();
        config.spawner.spawn_interval = 1;
        config.catching.probability = 1.0;
        config.step_function.decay_rate = 0.0;
        let mut sim = MaskPainterSimulation::new(config).unwrap();
        let report = sim.step();
        assert_eq!(report.cell_caught, 3);
        assert_eq!(report.particle_count, 0);
        assert!(sim.mask_statistics().painted_cells > 0);
        assert_eq!(sim.count_grid().unwrap().iter().sum::<u32>(), 3);
        assert_eq!(sim.total_catches(), (0, 3));
    }

    #[test]
    fn test_particles_expire() {
        let mut config = config();
        config.spawner.spawn_interval = 1000;
        config.catching.probability = 0.0;
        config.particles.lifetime = 3;
        let mut sim = MaskPainterSimulation::new(config).unwrap();
        assert_eq!(sim.spawn_now(), 3);
        assert_eq!(sim.step().expired, 0);
        assert_eq!(sim.step().expired, 0);
        let report = sim.step();
        assert_eq!(report.expired, 3);
        assert_eq!(report.particle_count, 0);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let mut config = config();
            config.spawner.spawn_interval = 1;
            config.catching.probability = 0.2;
            config.particles.movement_mode = MovementMode::Diffusive;
            let mut sim = MaskPainterSimulation::new(config).unwrap();
            let reports: Vec<StepReport> = (0..30).map(|_| sim.step()).collect();
            (reports, sim.particle_positions(), sim.exposure_grid())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_clear_returns_to_pristine_state() {
        let mut config = config();
        config.spawner.spawn_interval = 1;
        config.catching.probability = 0.5;
        let mut sim = MaskPainterSimulation::new(config).unwrap();
        for _ in 0..10 {
            sim.step();
        }
        sim.record_snapshot();
        sim.clear();
        assert_eq!(sim.particle_count(), 0);
        assert!(sim.exposure_grid().iter().all(|v| *v == 0.0));
        assert!(sim.count_grid().unwrap().iter().all(|c| *c == 0));
        assert_eq!(sim.spawner_status().step_counter, 0);
        assert_eq!(sim.current_step(), 0);
        assert!(sim.recorded_snapshots().is_empty());
    }

    #[test]
    fn test_leaf_mutators_keep_grid() {
        let mut config = config();
        config.spawner.spawn_interval = 1;
        config.catching.probability = 1.0;
        config.step_function.decay_rate = 0.0;
        let mut sim = MaskPainterSimulation::new(config).unwrap();
        sim.step();
        let painted = sim.mask_statistics().painted_cells;
        assert!(painted > 0);

        sim.set_velocity(3.0);
        sim.set_catch_radius(5.0);
        sim.set_decay_rate(0.1);
        sim.set_spawn_count(0);
        sim.set_spawn_interval(7);
        assert_eq!(sim.mask_statistics().painted_cells, painted);
        assert_eq!(sim.spawner_status().spawn_count, 1);
        assert_eq!(sim.spawner_status().spawn_interval, 7);
        assert_eq!(sim.params().particles.velocity, 3.0);
        assert_eq!(sim.params().decay.rate, 0.1f32);
    }

    #[test]
    fn test_geometry_change_recreates_grid_and_resyncs() {
        let mut config = config();
        config.spawner.spawn_interval = 1;
        config.catching.probability = 1.0;
        config.dividers.push(DividerConfig { name: "far".into(), x: 280.0, probability: 0.0, color: "#fff".into() });
        let mut sim = MaskPainterSimulation::new(config).unwrap();
        sim.step();

        sim.set_ellipse(EllipseConfig { center_x: 100.0, center_y: 100.0, radius_x: 100.0, radius_y: 50.0 })
            .unwrap();
        assert_eq!(sim.grid_dimensions(), (100, 50));
        assert!(sim.exposure_grid().iter().all(|v| *v == 0.0));
        assert_eq!(sim.spawner_status().position, (200.0, 100.0));
        assert!(sim.dividers().is_empty());
        assert_eq!(sim.particles().ellipse().radius_x, 100.0);

        sim.set_mask_resolution(40);
        assert_eq!(sim.grid_dimensions(), (40, 20));
    }

    #[test]
    fn test_invalid_ellipse_is_rejected() {
        let mut sim = MaskPainterSimulation::new(config()).unwrap();
        let before = sim.grid_dimensions();
        let bad = EllipseConfig { center_x: 0.0, center_y: 0.0, radius_x: -1.0, radius_y: 5.0 };
        assert!(sim.set_ellipse(bad).is_err());
        assert_eq!(sim.grid_dimensions(), before);
    }

    #[test]
    fn test_divider_mutators_and_current_config() {
        let mut sim = MaskPainterSimulation::new(config()).unwrap();
        assert!(sim.add_divider("a", 100.0, 0.3, "#f00"));
        assert!(!sim.add_divider("b", 400.0, 0.3, "#f00"));
        assert!(sim.rename_divider("a", "head"));
        assert!(sim.set_divider_probability("head", 0.6));
        assert!(sim.set_divider_position("head", 120.0));
        let config = sim.current_config();
        assert_eq!(config.dividers.len(), 1);
        assert_eq!(config.dividers[0].name, "head");
        assert_eq!(config.dividers[0].x, 120.0);
        assert_eq!(sim.divider_statistics().count, 1);
        assert!(sim.remove_divider("head"));
    }

    #[test]
    fn test_snapshot_contents() {
        let mut config = config();
        config.spawner.spawn_interval = 1;
        config.catching.probability = 0.0;
        let mut sim = MaskPainterSimulation::new(config).unwrap();
        sim.step();
        let snap = sim.snapshot(true, false);
        assert_eq!(snap.step, 1);
        assert_eq!(snap.total_particle_count, 3);
        assert_eq!(snap.positions.as_ref().map(Vec::len), Some(3));
        assert!(snap.exposure_grid.is_none());
    }
}
