use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinConfig {
    /// rad/s
    pub max_spin_rate: f32,
    pub min_spin_threshold: f32,
    /// Multiplier applied to the rate once per tick.
    pub spin_decay_rate: f32,
    pub magnus_coefficient: f32,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            max_spin_rate: 150.0,
            min_spin_threshold: 0.5,
            spin_decay_rate: 0.99,
            magnus_coefficient: 0.0005,
        }
    }
}

/// Rotational state carried alongside a ball: unit axis plus rate.
///
/// The axis is zero exactly when the rate is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpinState {
    axis: Vec3,
    rate: f32,
}

impl SpinState {
    pub const NONE: Self = Self {
        axis: Vec3::ZERO,
        rate: 0.0,
    };

    /// Takes an authoritative value as-is. Only normalizes the axis.
    pub fn from_wire(axis: Vec3, rate: f32) -> Self {
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO || rate <= 0.0 {
            return Self::NONE;
        }
        Self { axis, rate }
    }

    pub fn axis(&self) -> Vec3 {
        self.axis
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.axis * self.rate
    }

    pub fn is_active(&self, config: &SpinConfig) -> bool {
        self.rate > config.min_spin_threshold
    }

    /// Vector-sums a new spin impulse with the current one.
    pub fn add_spin(&mut self, axis: Vec3, rate: f32, config: &SpinConfig) {
        let combined = self.angular_velocity() + axis.normalize_or_zero() * rate;
        let magnitude = combined.length();
        if magnitude <= f32::EPSILON {
            *self = Self::NONE;
            return;
        }
        self.axis = combined / magnitude;
        self.rate = magnitude.min(config.max_spin_rate);
    }

    pub fn decay(&mut self, config: &SpinConfig) {
        self.rate *= config.spin_decay_rate;
        if self.rate < config.min_spin_threshold {
            *self = Self::NONE;
        }
    }

    pub fn compute_magnus_force(&self, velocity: Vec3, config: &SpinConfig) -> Vec3 {
        if !self.is_active(config) {
            return Vec3::ZERO;
        }
        self.axis.cross(velocity) * velocity.length() * config.magnus_coefficient
    }
}
