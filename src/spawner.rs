use mask_painter_common::{clamp_count, Ellipse, SpawnParams, SpawnerStatus, Vec2};

/// Emits particles from a fixed point every `spawn_interval` steps.
#[derive(Debug, Clone)]
pub struct ParticleSpawner {
    position: Vec2,
    spawn_count: u32,
    spawn_interval: u32,
    step_counter: u64,
}

impl ParticleSpawner {
    /// Creates a spawner pinned to the rightmost tip of `ellipse`. Counts below 1 are raised to 1.
    pub fn new(params: &SpawnParams, ellipse: &Ellipse) -> Self {
        let mut spawner = ParticleSpawner {
            position: Vec2::zero(),
            spawn_count: params.spawn_count.max(1),
            spawn_interval: params.spawn_interval.max(1),
            step_counter: 0,
        };
        spawner.update_position(ellipse);
        spawner
    }

    /// Pins the emission point to the ellipse's rightmost tip.
    pub fn update_position(&mut self, ellipse: &Ellipse) {
        self.position = ellipse.rightmost_tip();
    }

    pub fn position(&self) -> (f64, f64) {
        (self.position.x, self.position.y)
    }

    /// Advances the internal counter and reports whether this step emits.
    /// Must be called exactly once per step.
    pub fn should_spawn(&mut self) -> bool {
        self.step_counter += 1;
        self.step_counter % self.spawn_interval as u64 == 0
    }

    /// Variant driven by an external step counter; the internal counter is not touched.
    pub fn should_spawn_at(&self, step: u64) -> bool {
        step % self.spawn_interval as u64 == 0
    }

    /// Resets the counter and reports that an emission should happen now.
    pub fn force_spawn(&mut self) -> bool {
        self.step_counter = 0;
        true
    }

    pub fn reset(&mut self) {
        self.step_counter = 0;
    }

    pub fn spawn_count(&self) -> u32 {
        self.spawn_count
    }

    pub fn set_spawn_count(&mut self, count: i64) {
        self.spawn_count = clamp_count(count);
    }

    pub fn spawn_interval(&self) -> u32 {
        self.spawn_interval
    }

    pub fn set_spawn_interval(&mut self, interval: i64) {
        self.spawn_interval = clamp_count(interval);
    }

    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    pub fn status(&self) -> SpawnerStatus {
        let interval = self.spawn_interval as u64;
        SpawnerStatus {
            position: self.position(),
            spawn_count: self.spawn_count,
            spawn_interval: self.spawn_interval,
            step_counter: self.step_counter,
            next_spawn_in: interval - (self.step_counter % interval),
        }
    }
}
