use glam::{Quat, Vec3};

use super::predictor::PredictionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayState {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
}

/// Eases the locally shown state toward whatever the replica currently
/// believes, with independent rates per field.
#[derive(Debug, Clone)]
pub struct Reconciler {
    position_rate: f32,
    rotation_rate: f32,
    velocity_rate: f32,
    display: Option<DisplayState>,
}

impl Reconciler {
    pub fn new(config: &PredictionConfig) -> Self {
        Self {
            position_rate: config.position_smoothing,
            rotation_rate: config.rotation_smoothing,
            velocity_rate: config.velocity_smoothing,
            display: None,
        }
    }

    pub fn display(&self) -> Option<DisplayState> {
        self.display
    }

    /// Moves the display a frame-rate independent step toward `target`.
    /// The first call adopts the target outright.
    pub fn blend_toward(&mut self, target: DisplayState, dt: f32) -> DisplayState {
        let Some(current) = self.display else {
            return self.snap_to(target);
        };

        let blended = DisplayState {
            position: current
                .position
                .lerp(target.position, smoothing_factor(self.position_rate, dt)),
            rotation: current
                .rotation
                .slerp(target.rotation, smoothing_factor(self.rotation_rate, dt))
                .normalize(),
            velocity: current
                .velocity
                .lerp(target.velocity, smoothing_factor(self.velocity_rate, dt)),
        };

        self.display = Some(blended);
        blended
    }

    /// Jumps straight to `target`. Reserved for attach/detach transitions.
    pub fn snap_to(&mut self, target: DisplayState) -> DisplayState {
        self.display = Some(target);
        target
    }

    pub fn reset(&mut self) {
        self.display = None;
    }
}

fn smoothing_factor(rate: f32, dt: f32) -> f32 {
    if rate <= 0.0 {
        return 1.0;
    }
    1.0 - (-rate * dt.max(0.0)).exp()
}
