use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;

/// Side length of the square simulation region, in simulation units.
/// Positions are valid in `[radius, WORLD_SIZE - radius]` on both axes.
pub const WORLD_SIZE: f32 = 1000.0;

/// Engine construction options.
///
/// `subticks` is rounded up to the next even value: the particle double
/// buffer alternates every sub-tick, and an even count guarantees the
/// primary buffer is authoritative at frame end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Radius of every particle, in simulation units.
    pub particle_radius: f32,
    /// Number of integration sub-steps per rendered frame.
    pub subticks: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            particle_radius: 5.0,
            subticks: 64,
        }
    }
}

impl EngineOptions {
    /// Validate and normalize the options.
    ///
    /// Fails with [`EngineError::InvalidConfiguration`] on a non-positive
    /// radius or zero sub-tick count; odd sub-tick counts are rounded up.
    pub fn validated(mut self) -> Result<Self, EngineError> {
        if !(self.particle_radius > 0.0) {
            return Err(EngineError::InvalidConfiguration(format!(
                "particle radius must be positive, got {}",
                self.particle_radius
            )));
        }
        if self.subticks == 0 {
            return Err(EngineError::InvalidConfiguration(
                "sub-tick count must be positive".into(),
            ));
        }
        if self.subticks % 2 != 0 {
            self.subticks += 1;
        }
        Ok(self)
    }

    /// Duration of one sub-tick in internal time units (the full frame is 1).
    pub fn dt(&self) -> f32 {
        1.0 / self.subticks as f32
    }
}

/// Physics constants shared by the compute kernels and the snapshot codec.
///
/// The first eight scalars (gravity x/y plus the six tuning scalars) form
/// the constants slab of a snapshot, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConstants {
    /// Constant acceleration applied to every particle each sub-tick.
    pub gravity: Vec2,
    /// Velocity retained (negated) on the clamped axis at a border hit.
    pub border_elasticity: f32,
    /// Friction applied to the orthogonal axis at a border hit.
    pub border_friction: f32,
    /// Restitution of particle-particle collisions.
    pub elasticity: f32,
    /// Tangential friction of particle-particle collisions.
    pub friction: f32,
    /// Per-component drag coefficient.
    pub drag_coeff: f32,
    /// Per-component drag exponent.
    pub drag_exp: f32,
    /// Scale applied to cursor and keyboard forces.
    pub user_strength: f32,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -0.5),
            border_elasticity: 0.5,
            border_friction: 0.5,
            elasticity: 0.5,
            friction: 0.2,
            drag_coeff: 0.02,
            drag_exp: 2.0,
            user_strength: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_subticks_round_up_to_even() {
        let opts = EngineOptions {
            particle_radius: 5.0,
            subticks: 63,
        };
        assert_eq!(opts.validated().unwrap().subticks, 64);

        let opts = EngineOptions {
            particle_radius: 5.0,
            subticks: 64,
        };
        assert_eq!(opts.validated().unwrap().subticks, 64);
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(EngineOptions {
            particle_radius: 0.0,
            subticks: 64
        }
        .validated()
        .is_err());
        assert!(EngineOptions {
            particle_radius: -1.0,
            subticks: 64
        }
        .validated()
        .is_err());
        assert!(EngineOptions {
            particle_radius: 5.0,
            subticks: 0
        }
        .validated()
        .is_err());
    }

    #[test]
    fn dt_spans_one_frame() {
        let opts = EngineOptions::default();
        assert!((opts.dt() * opts.subticks as f32 - 1.0).abs() < 1e-6);
    }
}
