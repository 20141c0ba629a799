use log::{debug, trace};
use mask_painter_common::{angle_to_vec, vec_to_angle, Ellipse, MovementMode, ParticleParams, ParticleStatistics, Vec2};
use rand::Rng;
use rand_distr::StandardNormal;
use std::collections::HashSet;
use std::f64::consts::TAU;

/// Fraction of the boundary radius a particle is pulled back to after leaving the ellipse.
const BOUNDARY_PULLBACK: f64 = 0.99;

/// Stable identity of a particle within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleId(pub u64);

/// How a particle moves each step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// Straight-line motion with velocity components derived from `angle`.
    Ballistic { angle: f64, vx: f64, vy: f64 },
    /// Brownian motion; the particle's `velocity` acts as the diffusion coefficient.
    Diffusive,
}

/// A single point mass moving inside the ellipse.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    id: ParticleId,
    pub pos: Vec2,
    /// Speed (ballistic) or diffusion coefficient (diffusive).
    pub velocity: f64,
    /// Number of steps this particle has existed.
    pub age: u32,
    pub motion: Motion,
}

impl Particle {
    pub fn new(id: ParticleId, x: f64, y: f64, velocity: f64, angle: f64, mode: MovementMode) -> Self {
        let motion = match mode {
            MovementMode::Ballistic => {
                let v = angle_to_vec(angle).scale(velocity);
                Motion::Ballistic { angle, vx: v.x, vy: v.y }
            }
            MovementMode::Diffusive => Motion::Diffusive,
        };
        Particle { id, pos: Vec2::new(x, y), velocity, age: 0, motion }
    }

    pub fn id(&self) -> ParticleId {
        self.id
    }

    pub fn position(&self) -> (f64, f64) {
        (self.pos.x, self.pos.y)
    }

    pub fn mode(&self) -> MovementMode {
        match self.motion {
            Motion::Ballistic { .. } => MovementMode::Ballistic,
            Motion::Diffusive => MovementMode::Diffusive,
        }
    }

    /// Velocity vector; zero for diffusive particles.
    pub fn velocity_vector(&self) -> Vec2 {
        match self.motion {
            Motion::Ballistic { vx, vy, .. } => Vec2::new(vx, vy),
            Motion::Diffusive => Vec2::zero(),
        }
    }

    /// Heading of a ballistic particle.
    pub fn angle(&self) -> Option<f64> {
        match self.motion {
            Motion::Ballistic { angle, .. } => Some(angle),
            Motion::Diffusive => None,
        }
    }

    /// Advances the particle by one time step and increments its age.
    ///
    /// Diffusive particles take an isotropic Gaussian step with standard deviation
    /// `sqrt(2 * velocity * dt)` per axis.
    pub fn advance<R: Rng + ?Sized>(&mut self, dt: f64, rng: &mut R) {
        match self.motion {
            Motion::Ballistic { vx, vy, .. } => {
                self.pos.x += vx * dt;
                self.pos.y += vy * dt;
            }
            Motion::Diffusive => {
                let sigma = (2.0 * self.velocity * dt).max(0.0).sqrt();
                let dx: f64 = rng.sample(StandardNormal);
                let dy: f64 = rng.sample(StandardNormal);
                self.pos.x += dx * sigma;
                self.pos.y += dy * sigma;
            }
        }
        self.age = self.age.saturating_add(1);
    }

    /// Handles a particle that reached or crossed the ellipse boundary.
    ///
    /// The particle is pulled back inside along the ray from the center. A ballistic
    /// particle moving outward loses `(1 + bounce)` times its normal velocity component:
    /// `bounce = 0` cancels it (slip), `bounce = 1` mirrors it (elastic).
    /// Returns true if the particle was on or outside the boundary.
    pub fn reflect_at_boundary(&mut self, ellipse: &Ellipse, bounce: f64) -> bool {
        let d = ellipse.normalized_distance_sq(self.pos);
        if d < 1.0 {
            return false;
        }

        let normal = ellipse.gradient(self.pos).normalize_or_zero();

        let offset = self.pos - ellipse.center;
        self.pos = ellipse.center + offset.scale(BOUNDARY_PULLBACK / d.sqrt());

        if let Motion::Ballistic { angle, vx, vy } = &mut self.motion {
            let v = Vec2::new(*vx, *vy);
            let dot = v.dot(normal);
            if dot > 0.0 {
                let reflected = v - normal.scale((1.0 + bounce) * dot);
                *vx = reflected.x;
                *vy = reflected.y;
                *angle = vec_to_angle(reflected);
            }
        }
        true
    }

    pub fn is_expired(&self, max_lifetime: u32) -> bool {
        self.age >= max_lifetime
    }
}

/// Owns all live particles plus the geometry used for reflection and expiry.
#[derive(Debug, Clone)]
pub struct ParticleManager {
    particles: Vec<Particle>,
    ellipse: Ellipse,
    max_lifetime: u32,
    bounce: f64,
    movement_mode: MovementMode,
    next_id: u64,
}

impl ParticleManager {
    pub fn new(ellipse: Ellipse, params: &ParticleParams) -> Self {
        ParticleManager {
            particles: Vec::new(),
            ellipse,
            max_lifetime: params.lifetime,
            bounce: params.bounce,
            movement_mode: params.movement_mode,
            next_id: 0,
        }
    }

    /// Spawns one particle. A random heading in `[0, 2pi)` is drawn when `angle` is None.
    pub fn spawn<R: Rng + ?Sized>(
        &mut self,
        x: f64,
        y: f64,
        velocity: f64,
        angle: Option<f64>,
        rng: &mut R,
    ) -> ParticleId {
        let angle = angle.unwrap_or_else(|| rng.random_range(0.0..TAU));
        let id = ParticleId(self.next_id);
        self.next_id += 1;
        self.particles.push(Particle::new(id, x, y, velocity, angle, self.movement_mode));
        trace!("Spawned particle {:?} at ({:.2}, {:.2}), angle {:.3}.", id, x, y, angle);
        id
    }

    /// Spawns `count` particles at the same point, each with an independent random heading.
    pub fn spawn_many<R: Rng + ?Sized>(
        &mut self,
        x: f64,
        y: f64,
        count: u32,
        velocity: f64,
        rng: &mut R,
    ) -> Vec<ParticleId> {
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ids.push(self.spawn(x, y, velocity, None, &mut *rng));
        }
        ids
    }

    /// Moves every particle, then reflects it off the boundary.
    pub fn move_all<R: Rng + ?Sized>(&mut self, dt: f64, rng: &mut R) {
        let ellipse = self.ellipse;
        let bounce = self.bounce;
        let mut reflections = 0usize;
        for particle in &mut self.particles {
            particle.advance(dt, rng);
            if particle.reflect_at_boundary(&ellipse, bounce) {
                reflections += 1;
            }
        }
        trace!("Moved {} particles, {} boundary hits.", self.particles.len(), reflections);
    }

    /// Removes particles whose age reached the lifetime. Returns how many were removed.
    pub fn remove_expired(&mut self) -> usize {
        let before = self.particles.len();
        let max_lifetime = self.max_lifetime;
        self.particles.retain(|p| !p.is_expired(max_lifetime));
        before - self.particles.len()
    }

    pub fn remove(&mut self, id: ParticleId) -> bool {
        match self.particles.iter().position(|p| p.id == id) {
            Some(idx) => {
                self.particles.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Removes every particle whose id is in `ids`. Returns how many were removed.
    pub fn remove_many(&mut self, ids: &[ParticleId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let doomed: HashSet<ParticleId> = ids.iter().copied().collect();
        let before = self.particles.len();
        self.particles.retain(|p| !doomed.contains(&p.id));
        before - self.particles.len()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.particles.len();
        self.particles.clear();
        count
    }

    /// Copy of all particle positions.
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.particles.iter().map(Particle::position).collect()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn get(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn ellipse(&self) -> Ellipse {
        self.ellipse
    }

    pub fn set_ellipse(&mut self, ellipse: Ellipse) {
        self.ellipse = ellipse;
    }

    pub fn max_lifetime(&self) -> u32 {
        self.max_lifetime
    }

    pub fn set_lifetime(&mut self, lifetime: u32) {
        self.max_lifetime = lifetime;
    }

    pub fn bounce(&self) -> f64 {
        self.bounce
    }

    pub fn set_bounce(&mut self, bounce: f64) {
        self.bounce = if bounce.is_nan() { 0.0 } else { bounce.clamp(0.0, 1.0) };
    }

    /// Changes the mode for particles spawned from now on; live particles keep theirs.
    pub fn set_movement_mode(&mut self, mode: MovementMode) {
        if mode != self.movement_mode {
            debug!("Movement mode changed to {:?} for new particles.", mode);
        }
        self.movement_mode = mode;
    }

    pub fn movement_mode(&self) -> MovementMode {
        self.movement_mode
    }

    pub fn statistics(&self) -> ParticleStatistics {
        if self.particles.is_empty() {
            return ParticleStatistics::default();
        }
        let count = self.particles.len();
        let total_age: u64 = self.particles.iter().map(|p| p.age as u64).sum();
        let oldest_age = self.particles.iter().map(|p| p.age).max().unwrap_or(0);
        let total_velocity: f64 = self.particles.iter().map(|p| p.velocity).sum();
        ParticleStatistics {
            count,
            average_age: total_age as f64 / count as f64,
            oldest_age,
            average_velocity: total_velocity / count as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ellipse() -> Ellipse {
        Ellipse::new(150.0, 100.0, 150.0, 50.0)
    }

    fn params(mode: MovementMode) -> ParticleParams {
        ParticleParams { velocity: 10.0, lifetime: 5, movement_mode: mode, bounce: 1.0, dt: 1.0 }
    }

    #[test]
    fn test_ballistic_move() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = Particle::new(ParticleId(0), 10.0, 20.0, 2.0, 0.0, MovementMode::Ballistic);
        p.advance(1.5, &mut rng);
        assert!((p.pos.x - 13.0).abs() < 1e-12);
        assert!((p.pos.y - 20.0).abs() < 1e-12);
        assert_eq!(p.age, 1);
    }

    #[test]
    fn test_diffusive_move_is_reproducible() {
        let mut a = Particle::new(ParticleId(0), 0.0, 0.0, 4.0, 0.0, MovementMode::Diffusive);
        let mut b = a.clone();
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        for _ in 0..10 {
            a.advance(1.0, &mut rng_a);
            b.advance(1.0, &mut rng_b);
        }
        assert_eq!(a.pos, b.pos);
        assert_eq!(a.age, 10);
        assert_ne!(a.pos, Vec2::zero());
    }

    #[test]
    fn test_diffusive_spread_matches_coefficient() {
        // Per-axis variance after one step is 2 * D * dt.
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mut sum_sq = 0.0;
        for _ in 0..n {
            let mut p = Particle::new(ParticleId(0), 0.0, 0.0, 2.0, 0.0, MovementMode::Diffusive);
            p.advance(1.0, &mut rng);
            sum_sq += p.pos.x * p.pos.x;
        }
        let variance = sum_sq / n as f64;
        assert!((variance - 4.0).abs() < 0.3, "variance {}", variance);
    }

    #[test]
    fn test_zero_diffusion_does_not_move() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut p = Particle::new(ParticleId(0), 5.0, 5.0, 0.0, 0.0, MovementMode::Diffusive);
        p.advance(1.0, &mut rng);
        assert_eq!(p.pos, Vec2::new(5.0, 5.0));
    }

    #[test]
    fn test_elastic_reflection_at_tip() {
        let e = ellipse();
        let mut p = Particle::new(ParticleId(0), 301.0, 100.0, 5.0, 0.0, MovementMode::Ballistic);
        assert!(p.reflect_at_boundary(&e, 1.0));
        let v = p.velocity_vector();
        assert!((v.x + 5.0).abs() < 1e-9);
        assert!(v.y.abs() < 1e-9);
        assert!(e.normalized_distance_sq(p.pos) < 1.0);
        assert!((p.angle().unwrap().abs() - std::f64::consts::PI).abs() < 1e-9);
    }

    #[test]
    fn test_slip_boundary_cancels_normal_component() {
        let e = ellipse();
        // At the rightmost tip the normal is +x; velocity has outward and tangential parts.
        let angle = std::f64::consts::FRAC_PI_4;
        let mut p = Particle::new(ParticleId(0), 300.0, 100.0, 2.0, angle, MovementMode::Ballistic);
        p.reflect_at_boundary(&e, 0.0);
        let v = p.velocity_vector();
        assert!(v.x.abs() < 1e-9);
        assert!((v.y - 2.0 * angle.sin()).abs() < 1e-9);
    }

    #[test]
    fn test_inward_velocity_is_not_reflected() {
        let e = ellipse();
        let mut p = Particle::new(ParticleId(0), 300.5, 100.0, 3.0, std::f64::consts::PI, MovementMode::Ballistic);
        let before = p.velocity_vector();
        assert!(p.reflect_at_boundary(&e, 1.0));
        assert_eq!(p.velocity_vector(), before);
        assert!(e.contains(p.pos));
    }

    #[test]
    fn test_inside_particle_is_untouched() {
        let e = ellipse();
        let mut p = Particle::new(ParticleId(0), 150.0, 100.0, 3.0, 1.0, MovementMode::Ballistic);
        let before = p.clone();
        assert!(!p.reflect_at_boundary(&e, 1.0));
        assert_eq!(p, before);
    }

    #[test]
    fn test_diffusive_particle_is_pulled_inside() {
        let e = ellipse();
        let mut p = Particle::new(ParticleId(0), 150.0, 160.0, 3.0, 0.0, MovementMode::Diffusive);
        assert!(p.reflect_at_boundary(&e, 1.0));
        assert!((e.normalized_distance_sq(p.pos) - 0.99 * 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_spawn_many_assigns_unique_ids_and_speed() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut m = ParticleManager::new(ellipse(), &params(MovementMode::Ballistic));
        let ids = m.spawn_many(300.0, 100.0, 4, 10.0, &mut rng);
        assert_eq!(ids.len(), 4);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 4);
        for p in m.particles() {
            assert!((p.velocity_vector().length() - 10.0).abs() < 1e-9);
            let angle = p.angle().unwrap();
            assert!((0.0..TAU).contains(&angle));
        }
    }

    #[test]
    fn test_move_all_keeps_particles_inside() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut m = ParticleManager::new(ellipse(), &params(MovementMode::Ballistic));
        m.set_lifetime(10_000);
        m.spawn_many(300.0, 100.0, 20, 10.0, &mut rng);
        for _ in 0..200 {
            m.move_all(1.0, &mut rng);
            for p in m.particles() {
                assert!(ellipse().normalized_distance_sq(p.pos) < 1.0);
            }
        }
    }

    #[test]
    fn test_remove_expired_preserves_survivors() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut m = ParticleManager::new(ellipse(), &params(MovementMode::Ballistic));
        let old = m.spawn_many(150.0, 100.0, 3, 0.0, &mut rng);
        for _ in 0..3 {
            m.move_all(1.0, &mut rng);
        }
        let young = m.spawn_many(150.0, 100.0, 2, 0.0, &mut rng);
        for _ in 0..2 {
            m.move_all(1.0, &mut rng);
        }
        // Old particles are now 5 steps old, lifetime is 5.
        assert_eq!(m.remove_expired(), 3);
        let remaining: Vec<ParticleId> = m.particles().iter().map(Particle::id).collect();
        assert_eq!(remaining, young);
        assert!(old.iter().all(|id| m.get(*id).is_none()));
    }

    #[test]
    fn test_remove_many_and_clear() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut m = ParticleManager::new(ellipse(), &params(MovementMode::Ballistic));
        let ids = m.spawn_many(150.0, 100.0, 5, 1.0, &mut rng);
        assert_eq!(m.remove_many(&[ids[1], ids[3], ParticleId(999)]), 2);
        assert!(m.remove(ids[0]));
        assert!(!m.remove(ids[0]));
        assert_eq!(m.len(), 2);
        assert_eq!(m.clear(), 2);
        assert!(m.is_empty());
    }

    #[test]
    fn test_statistics() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut m = ParticleManager::new(ellipse(), &params(MovementMode::Ballistic));
        assert_eq!(m.statistics().count, 0);
        m.spawn(150.0, 100.0, 2.0, Some(0.0), &mut rng);
        m.move_all(1.0, &mut rng);
        m.spawn(150.0, 100.0, 4.0, Some(0.0), &mut rng);
        let stats = m.statistics();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.oldest_age, 1);
        assert!((stats.average_age - 0.5).abs() < 1e-12);
        assert!((stats.average_velocity - 3.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_reflection_never_gains_energy(
            theta in 0.0f64..TAU,
            heading in 0.0f64..TAU,
            overshoot in 1.0f64..1.5,
            speed in 0.1f64..50.0,
            bounce in 0.0f64..=1.0,
        ) {
            let e = ellipse();
            let x = e.center.x + e.radius_x * overshoot * theta.cos();
            let y = e.center.y + e.radius_y * overshoot * theta.sin();
            let mut p = Particle::new(ParticleId(0), x, y, speed, heading, MovementMode::Ballistic);
            let before = p.velocity_vector().length();
            p.reflect_at_boundary(&e, bounce);
            let after = p.velocity_vector().length();
            prop_assert!(after <= before + 1e-9);
            if bounce == 1.0 {
                prop_assert!((after - before).abs() < 1e-9);
            }
            prop_assert!(e.normalized_distance_sq(p.pos) < 1.0);
        }
    }
}
