use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::{CatchParams, DecayParams, GridParams, ParticleParams, SimParams, SpawnParams};
use crate::vecmath::{clamp, Ellipse};
use std::path::Path;

// Geometry of the elliptical region
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EllipseConfig {
    pub center_x: f64,
    pub center_y: f64,
    pub radius_x: f64,
    pub radius_y: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MovementMode {
    #[default]
    Ballistic,
    Diffusive,
}

// Particle kinematics, loaded from the [particles] table
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ParticlesConfig {
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    #[serde(default = "default_lifetime")]
    pub lifetime: u32,
    #[serde(default)]
    pub movement_mode: MovementMode,
    #[serde(default = "default_bounce")]
    pub bounce: f64,
    #[serde(default = "default_dt")]
    pub dt: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SpawnerConfig {
    #[serde(default = "default_spawn_count")]
    pub spawn_count: i64, // Signed so out-of-range input can be clamped instead of rejected
    #[serde(default = "default_spawn_interval")]
    pub spawn_interval: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CatchingConfig {
    #[serde(default = "default_catch_probability")]
    pub probability: f64,
    #[serde(default = "default_catch_radius")]
    pub radius: f64,
    #[serde(default = "default_catch_exposure")]
    pub exposure: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StepFunctionConfig {
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_saturation_threshold")]
    pub saturation_threshold: f64,
    /// Milliseconds between automatic steps (driver only).
    #[serde(default = "default_step_interval")]
    pub step_interval: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SystemConfig {
    #[serde(default = "default_true")]
    pub count_particles: bool,
    #[serde(default = "default_mask_resolution")]
    pub mask_resolution: i64,
    #[serde(default)]
    pub grid_padding: f64,
    /// Seed for the shared RNG; a random seed is used when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DividerConfig {
    pub name: String,
    pub x: f64,
    #[serde(default = "default_divider_probability")]
    pub probability: f64,
    #[serde(default = "default_divider_color")]
    pub color: String,
}

// Run length and recording cadence for the headless driver
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RunConfig {
    #[serde(default = "default_total_steps")]
    pub total_steps: u64,
    #[serde(default = "default_record_interval")]
    pub record_interval_steps: u64,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default = "default_true")]
    pub save_stats: bool,
    #[serde(default)]
    pub save_positions: bool,
    #[serde(default = "default_true")]
    pub save_mask: bool,
    #[serde(default)]
    pub save_positions_in_snapshot: bool,
    #[serde(default)]
    pub save_mask_in_snapshot: bool,
}

/// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub ellipse: EllipseConfig,
    #[serde(default)]
    pub particles: ParticlesConfig,
    #[serde(default)]
    pub spawner: SpawnerConfig,
    #[serde(default)]
    pub catching: CatchingConfig,
    #[serde(default)]
    pub step_function: StepFunctionConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub dividers: Vec<DividerConfig>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for EllipseConfig {
    fn default() -> Self {
        EllipseConfig { center_x: 150.0, center_y: 100.0, radius_x: 150.0, radius_y: 50.0 }
    }
}

impl Default for ParticlesConfig {
    fn default() -> Self {
        ParticlesConfig {
            velocity: default_velocity(),
            lifetime: default_lifetime(),
            movement_mode: MovementMode::Ballistic,
            bounce: default_bounce(),
            dt: default_dt(),
        }
    }
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        SpawnerConfig { spawn_count: default_spawn_count(), spawn_interval: default_spawn_interval() }
    }
}

impl Default for CatchingConfig {
    fn default() -> Self {
        CatchingConfig {
            probability: default_catch_probability(),
            radius: default_catch_radius(),
            exposure: default_catch_exposure(),
        }
    }
}

impl Default for StepFunctionConfig {
    fn default() -> Self {
        StepFunctionConfig {
            decay_rate: default_decay_rate(),
            saturation_threshold: default_saturation_threshold(),
            step_interval: default_step_interval(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            count_particles: true,
            mask_resolution: default_mask_resolution(),
            grid_padding: 0.0,
            seed: None,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig { total_steps: default_total_steps(), record_interval_steps: default_record_interval() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: default_base_filename(),
            format: None,
            save_stats: true,
            save_positions: false,
            save_mask: true,
            save_positions_in_snapshot: false,
            save_mask_in_snapshot: false,
        }
    }
}

impl Default for SimulationConfig {
    /// The built-in default profile.
    fn default() -> Self {
        SimulationConfig {
            ellipse: EllipseConfig::default(),
            particles: ParticlesConfig::default(),
            spawner: SpawnerConfig::default(),
            catching: CatchingConfig::default(),
            step_function: StepFunctionConfig::default(),
            system: SystemConfig::default(),
            dividers: Vec::new(),
            run: RunConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects structural errors that no clamping can repair.
    /// Soft range errors (counts, probabilities) are clamped later by `get_sim_params`.
    pub fn validate(&self) -> Result<()> {
        let e = &self.ellipse;
        if !e.center_x.is_finite() || !e.center_y.is_finite() {
            anyhow::bail!("ellipse center must be finite.");
        }
        if !(e.radius_x.is_finite() && e.radius_x > 0.0) || !(e.radius_y.is_finite() && e.radius_y > 0.0) {
            anyhow::bail!("ellipse radii must be positive and finite.");
        }
        Ok(())
    }

    pub fn ellipse(&self) -> Ellipse {
        Ellipse::new(
            self.ellipse.center_x,
            self.ellipse.center_y,
            self.ellipse.radius_x,
            self.ellipse.radius_y,
        )
    }

    /// Converts the configuration into runtime parameters, clamping out-of-range values.
    pub fn get_sim_params(&self) -> SimParams {
        let p = &self.particles;
        let c = &self.catching;
        let s = &self.step_function;

        SimParams {
            ellipse: self.ellipse(),
            particles: ParticleParams {
                velocity: non_negative(p.velocity),
                lifetime: p.lifetime,
                movement_mode: p.movement_mode,
                bounce: clamp_unit(p.bounce),
                dt: non_negative(p.dt),
            },
            spawn: SpawnParams {
                spawn_count: clamp_count(self.spawner.spawn_count),
                spawn_interval: clamp_count(self.spawner.spawn_interval),
            },
            catching: CatchParams {
                probability: clamp_unit(c.probability),
                radius: non_negative(c.radius),
                exposure: non_negative(c.exposure) as f32,
            },
            decay: DecayParams {
                rate: clamp_unit(s.decay_rate) as f32,
                saturation_threshold: s.saturation_threshold as f32,
            },
            grid: GridParams {
                resolution: self.system.mask_resolution.max(1) as usize,
                padding: non_negative(self.system.grid_padding),
                count_particles: self.system.count_particles,
            },
            step_interval_ms: s.step_interval,
            seed: self.system.seed,
        }
    }
}

/// Clamps a probability-like value into [0, 1]; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { clamp(value, 0.0, 1.0) }
}

/// Clamps a count-like value to at least 1.
pub fn clamp_count(value: i64) -> u32 {
    value.clamp(1, u32::MAX as i64) as u32
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.max(0.0) }
}

// Default functions, matching the built-in default profile
fn default_velocity() -> f64 { 10.0 }
fn default_lifetime() -> u32 { 1000 }
fn default_bounce() -> f64 { 1.0 }
fn default_dt() -> f64 { 1.0 }
fn default_spawn_count() -> i64 { 3 }
fn default_spawn_interval() -> i64 { 5 }
fn default_catch_probability() -> f64 { 0.05 }
fn default_catch_radius() -> f64 { 3.0 }
fn default_catch_exposure() -> f64 { 0.2 }
fn default_decay_rate() -> f64 { 0.02 }
fn default_saturation_threshold() -> f64 { 0.95 }
fn default_step_interval() -> u64 { 100 }
fn default_mask_resolution() -> i64 { 100 }
fn default_divider_probability() -> f64 { 0.1 }
fn default_divider_color() -> String { "#FF5722".to_string() }
fn default_total_steps() -> u64 { 1000 }
fn default_record_interval() -> u64 { 100 }
fn default_base_filename() -> String { "mask_painter".to_string() }
fn default_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_default_profile() {
        let text = r#"
            [ellipse]
            center_x = 150.0
            center_y = 100.0
            radius_x = 150.0
            radius_y = 50.0
        "#;
        let config = SimulationConfig::from_toml_str(text).unwrap();
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_full_toml_parses_sections() {
        let text = r##"
            [ellipse]
            center_x = 0.0
            center_y = 0.0
            radius_x = 10.0
            radius_y = 5.0

            [particles]
            velocity = 2.5
            lifetime = 50
            movement_mode = "diffusive"
            bounce = 0.5

            [spawner]
            spawn_count = 0
            spawn_interval = -3

            [system]
            mask_resolution = 40
            seed = 7

            [[dividers]]
            name = "head"
            x = 2.0
            probability = 0.3
            color = "#00FF00"
        "##;
        let config = SimulationConfig::from_toml_str(text).unwrap();
        assert_eq!(config.particles.movement_mode, MovementMode::Diffusive);
        assert_eq!(config.dividers.len(), 1);
        assert_eq!(config.dividers[0].name, "head");
        assert_eq!(config.system.seed, Some(7));

        let params = config.get_sim_params();
        assert_eq!(params.spawn.spawn_count, 1);
        assert_eq!(params.spawn.spawn_interval, 1);
        assert_eq!(params.grid.resolution, 40);
        assert_eq!(params.particles.bounce, 0.5);
    }

    #[test]
    fn test_invalid_radius_is_rejected() {
        let text = r#"
            [ellipse]
            center_x = 0.0
            center_y = 0.0
            radius_x = 0.0
            radius_y = 5.0
        "#;
        assert!(SimulationConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_soft_parameters_are_clamped() {
        let mut config = SimulationConfig::default();
        config.catching.probability = 1.7;
        config.catching.radius = -2.0;
        config.step_function.decay_rate = -0.5;
        config.system.mask_resolution = 0;
        config.particles.bounce = 3.0;

        let params = config.get_sim_params();
        assert_eq!(params.catching.probability, 1.0);
        assert_eq!(params.catching.radius, 0.0);
        assert_eq!(params.decay.rate, 0.0);
        assert_eq!(params.grid.resolution, 1);
        assert_eq!(params.particles.bounce, 1.0);
    }

    #[test]
    fn test_clamp_unit_handles_nan() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(0.25), 0.25);
    }
}
