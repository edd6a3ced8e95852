use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::net::WireStatePacket;

pub const DEFAULT_GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub max_prediction_time_s: f32,
    /// Confidence at zero elapsed time; falls linearly to zero at the cap.
    pub prediction_confidence: f32,
    pub gravity: Vec3,
    /// Exponential smoothing rates, per second.
    pub position_smoothing: f32,
    pub rotation_smoothing: f32,
    pub velocity_smoothing: f32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_prediction_time_s: 0.1,
            prediction_confidence: 0.8,
            gravity: DEFAULT_GRAVITY,
            position_smoothing: 15.0,
            rotation_smoothing: 15.0,
            velocity_smoothing: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
    pub confidence: f32,
    /// Elapsed time actually used, after clamping.
    pub elapsed: f32,
    /// The requested interval ran past the cap.
    pub saturated: bool,
}

/// Dead reckoning from the last authoritative sample.
#[derive(Debug, Clone)]
pub struct MotionPredictor {
    config: PredictionConfig,
}

impl MotionPredictor {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// `None` while the ball is attached: the attachment owns its position.
    pub fn predict(&self, last: &WireStatePacket, elapsed: f32) -> Option<Prediction> {
        if last.is_attached {
            return None;
        }

        let max = self.config.max_prediction_time_s.max(0.0);
        let saturated = elapsed > max;
        let dt = elapsed.clamp(0.0, max);
        let gravity = self.config.gravity;
        let velocity = last.linear_velocity();

        let position = last.position() + velocity * dt + 0.5 * gravity * dt * dt;
        let predicted_velocity = velocity + gravity * dt;

        let omega = last.angular_velocity() + last.spin_axis() * last.spin_rate;
        let rotation = if omega.length_squared() > 0.0 {
            (Quat::from_scaled_axis(omega * dt) * last.rotation()).normalize()
        } else {
            last.rotation()
        };

        Some(Prediction {
            position,
            velocity: predicted_velocity,
            rotation,
            confidence: self.confidence(dt),
            elapsed: dt,
            saturated,
        })
    }

    pub fn confidence(&self, elapsed: f32) -> f32 {
        let max = self.config.max_prediction_time_s;
        if max <= 0.0 {
            return 0.0;
        }
        let remaining = (1.0 - elapsed / max).clamp(0.0, 1.0);
        self.config.prediction_confidence * remaining
    }
}

/// Replica-side bookkeeping for one ball. Thrown away whenever the
/// attachment state flips or the match resets.
#[derive(Debug, Clone, Default)]
pub struct PredictionState {
    pub last_applied: Option<WireStatePacket>,
    pub predicted_position: Vec3,
    pub predicted_velocity: Vec3,
    pub accumulated_time: f32,
    pub confidence: f32,
}

impl PredictionState {
    pub fn adopt(&mut self, packet: WireStatePacket) {
        self.predicted_position = packet.position();
        self.predicted_velocity = packet.linear_velocity();
        self.accumulated_time = 0.0;
        self.confidence = 1.0;
        self.last_applied = Some(packet);
    }

    pub fn advance(&mut self, predictor: &MotionPredictor, dt: f32) -> Option<Prediction> {
        let last = self.last_applied.as_ref()?;
        self.accumulated_time += dt;
        let prediction = predictor.predict(last, self.accumulated_time)?;
        self.predicted_position = prediction.position;
        self.predicted_velocity = prediction.velocity;
        self.confidence = prediction.confidence;
        Some(prediction)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
