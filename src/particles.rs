//! Lightweight particle system.
//!
//! Bounded-capacity list with radial burst emission. The manager is a
//! world resource; presets (count, color, speed, life, size, gravity)
//! come from tuning sections named `particles.<preset>`.

use crate::tuning::Tuning;
use crate::world::SimRng;
use bevy_ecs::prelude::*;
use rand::Rng;

/// One particle. Positions are world-tile coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub life: f32,
    pub max_life: f32,
    pub color: [u8; 3],
    pub size: f32,
    pub gravity: f32,
    pub drag: f32,
    pub fade: bool,
}

/// Parameters for a radial burst.
#[derive(Debug, Clone, Copy)]
pub struct BurstParams {
    pub count: u32,
    pub color: [u8; 3],
    /// Base speed in tiles/sec, randomized +-50%.
    pub speed: f32,
    /// Seconds each particle lives, randomized +-30%.
    pub life: f32,
    pub size: f32,
    pub gravity: f32,
    pub drag: f32,
    /// Arc width in radians (2*pi = full circle).
    pub spread: f32,
    /// Center angle of the arc.
    pub angle: f32,
    pub fade: bool,
}

impl Default for BurstParams {
    fn default() -> Self {
        Self {
            count: 8,
            color: [255, 255, 255],
            speed: 3.0,
            life: 0.5,
            size: 2.0,
            gravity: 0.0,
            drag: 0.96,
            spread: std::f32::consts::TAU,
            angle: 0.0,
            fade: true,
        }
    }
}

impl BurstParams {
    /// Build from a `particles.<name>` tuning section; missing keys keep
    /// the defaults above.
    pub fn from_preset(section: &toml::Table) -> Self {
        let num = |key: &str, default: f32| {
            section
                .get(key)
                .and_then(|v| {
                    v.as_float()
                        .map(|f| f as f32)
                        .or_else(|| v.as_integer().map(|i| i as f32))
                })
                .unwrap_or(default)
        };
        let mut p = Self::default();
        if let Some(v) = section.get("count").and_then(|v| v.as_integer()) {
            p.count = v.max(0) as u32;
        }
        if let Some(arr) = section.get("color").and_then(|v| v.as_array()) {
            for (i, v) in arr.iter().take(3).enumerate() {
                if let Some(n) = v.as_integer() {
                    p.color[i] = n.clamp(0, 255) as u8;
                }
            }
        }
        p.speed = num("speed", p.speed);
        p.life = num("life", p.life);
        p.size = num("size", p.size);
        p.gravity = num("gravity", p.gravity);
        p
    }
}

/// Manages all active particles. Stored as a world resource.
#[derive(Resource, Debug)]
pub struct ParticleManager {
    particles: Vec<Particle>,
    max_particles: usize,
}

impl Default for ParticleManager {
    fn default() -> Self {
        Self::with_capacity(512)
    }
}

impl ParticleManager {
    pub fn with_capacity(max_particles: usize) -> Self {
        Self {
            particles: Vec::new(),
            max_particles,
        }
    }

    pub fn count(&self) -> usize {
        self.particles.len()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Add a single particle; silently dropped at capacity.
    pub fn emit(&mut self, p: Particle) {
        if self.particles.len() < self.max_particles {
            self.particles.push(p);
        }
    }

    /// Emit a radial burst around `(x, y)`.
    pub fn emit_burst(&mut self, rng: &mut impl Rng, x: f32, y: f32, params: &BurstParams) {
        let half = params.spread / 2.0;
        for _ in 0..params.count {
            let a = params.angle + rng.gen_range(-half..=half);
            let s = params.speed * rng.gen_range(0.5..1.5);
            let life = params.life * rng.gen_range(0.7..1.3);
            self.emit(Particle {
                x,
                y,
                vx: a.cos() * s,
                vy: a.sin() * s,
                life,
                max_life: life,
                color: params.color,
                size: params.size + rng.gen_range(-0.5..0.5),
                gravity: params.gravity,
                drag: params.drag,
                fade: params.fade,
            });
        }
    }

    /// Age particles: drop dead ones, apply gravity and drag, integrate.
    pub fn update(&mut self, dt: f32) {
        self.particles.retain_mut(|p| {
            p.life -= dt;
            if p.life <= 0.0 {
                return false;
            }
            p.vy += p.gravity * dt;
            p.vx *= p.drag;
            p.vy *= p.drag;
            p.x += p.vx * dt;
            p.y += p.vy * dt;
            true
        });
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }
}

/// Emit a burst described by the tuning preset `particles.<preset>` at
/// `(x, y)`. No-op when the manager is absent (headless tests).
pub fn emit_preset(world: &mut World, x: f32, y: f32, preset: &str) {
    let params = world
        .get_resource::<Tuning>()
        .map(|t| BurstParams::from_preset(&t.section(&format!("particles.{preset}"))))
        .unwrap_or_default();
    emit_params(world, x, y, &params);
}

/// Emit a burst with explicit parameters (muzzle flash needs a custom
/// spread/angle on top of its preset).
pub fn emit_params(world: &mut World, x: f32, y: f32, params: &BurstParams) {
    if world.get_resource::<ParticleManager>().is_none() {
        return;
    }
    world.resource_scope(|world, mut pm: Mut<ParticleManager>| {
        let mut rng = world.resource_mut::<SimRng>();
        pm.emit_burst(&mut rng.0, x, y, params);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_burst_respects_capacity() {
        let mut pm = ParticleManager::with_capacity(10);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        pm.emit_burst(
            &mut rng,
            0.0,
            0.0,
            &BurstParams {
                count: 50,
                ..Default::default()
            },
        );
        assert_eq!(pm.count(), 10);
    }

    #[test]
    fn test_update_ages_and_culls() {
        let mut pm = ParticleManager::default();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        pm.emit_burst(
            &mut rng,
            0.0,
            0.0,
            &BurstParams {
                count: 6,
                life: 0.1,
                ..Default::default()
            },
        );
        assert_eq!(pm.count(), 6);
        pm.update(0.05);
        assert_eq!(pm.count(), 6);
        pm.update(1.0);
        assert_eq!(pm.count(), 0);
    }

    #[test]
    fn test_preset_parsing() {
        let table: toml::Table = r#"
            count = 12
            color = [255, 60, 50]
            speed = 2.5
            life = 0.3
            size = 2
            gravity = 4.0
        "#
        .parse()
        .unwrap();
        let p = BurstParams::from_preset(&table);
        assert_eq!(p.count, 12);
        assert_eq!(p.color, [255, 60, 50]);
        assert_eq!(p.speed, 2.5);
        assert_eq!(p.size, 2.0);
        assert_eq!(p.gravity, 4.0);
    }
}
