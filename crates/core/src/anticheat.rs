use serde::{Deserialize, Serialize};

use crate::net::WireStatePacket;

/// Reasons a client-submitted state update is refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Violation {
    #[error("NaN or Infinity in submitted state")]
    InvalidFloats,
    #[error("reported speed {speed:.2} m/s exceeds limit {limit:.2} m/s")]
    ExcessiveSpeed { speed: f32, limit: f32 },
    #[error("displacement implies {speed:.2} m/s over {interval:.4}s, limit {limit:.2} m/s")]
    ExcessiveImpliedSpeed { speed: f32, interval: f64, limit: f32 },
    #[error("implied acceleration {acceleration:.2} m/s^2 exceeds limit {limit:.2} m/s^2")]
    ExcessiveAcceleration { acceleration: f32, limit: f32 },
    #[error("timestamp {current} does not advance past {previous}")]
    NonMonotonicTimestamp { previous: f64, current: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiCheatConfig {
    pub max_speed: f32,
    pub max_acceleration: f32,
    /// Floor for the interval used in displacement checks, so two samples a
    /// hair apart do not imply absurd speeds.
    pub min_sample_interval_s: f64,
    /// Apply the displacement check to held balls as well.
    pub check_attached_displacement: bool,
    /// Longest interval credited when a submission is compared with the
    /// authority's own state, so an old timestamp cannot buy a long jump.
    pub authority_window_s: f64,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            max_speed: 40.0,
            max_acceleration: 1500.0,
            min_sample_interval_s: 0.01,
            check_attached_displacement: true,
            authority_window_s: 0.25,
        }
    }
}

/// Server-side plausibility bounds for submitted state.
#[derive(Debug, Clone)]
pub struct StateValidator {
    config: AntiCheatConfig,
}

impl StateValidator {
    pub fn new(config: AntiCheatConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AntiCheatConfig {
        &self.config
    }

    /// Checks `new` on its own and, when there is one, against the previous
    /// accepted sample for the same ball.
    pub fn is_plausible(
        &self,
        prev: Option<&WireStatePacket>,
        new: &WireStatePacket,
    ) -> Result<(), Violation> {
        if !all_finite(new) {
            return Err(Violation::InvalidFloats);
        }

        let limit = self.config.max_speed;
        let velocity = new.linear_velocity();
        let speed = velocity.length();
        if speed > limit {
            return Err(Violation::ExcessiveSpeed { speed, limit });
        }

        let Some(prev) = prev else {
            return Ok(());
        };

        let elapsed = new.timestamp - prev.timestamp;
        if elapsed <= 0.0 {
            return Err(Violation::NonMonotonicTimestamp {
                previous: prev.timestamp,
                current: new.timestamp,
            });
        }
        let interval = elapsed.max(self.config.min_sample_interval_s);

        let held = new.is_attached || prev.is_attached;
        let exempt = held && !self.config.check_attached_displacement;
        if !exempt {
            let displacement = (new.position() - prev.position()).length();
            let implied = (f64::from(displacement) / interval) as f32;
            if implied > limit {
                return Err(Violation::ExcessiveImpliedSpeed {
                    speed: implied,
                    interval,
                    limit,
                });
            }
        }

        if !held && new.has_velocity && prev.has_velocity {
            let delta_v = (velocity - prev.linear_velocity()).length();
            let acceleration = (f64::from(delta_v) / interval) as f32;
            if acceleration > self.config.max_acceleration {
                return Err(Violation::ExcessiveAcceleration {
                    acceleration,
                    limit: self.config.max_acceleration,
                });
            }
        }

        Ok(())
    }
}

impl StateValidator {
    /// Bounds how far `new` may sit from the authority's current state for
    /// the same ball. `authoritative.timestamp` is the authority's clock.
    pub fn is_consistent_with(
        &self,
        authoritative: &WireStatePacket,
        new: &WireStatePacket,
    ) -> Result<(), Violation> {
        let held = new.is_attached || authoritative.is_attached;
        if held && !self.config.check_attached_displacement {
            return Ok(());
        }

        let interval = (new.timestamp - authoritative.timestamp)
            .abs()
            .min(self.config.authority_window_s)
            .max(self.config.min_sample_interval_s);
        let displacement = (new.position() - authoritative.position()).length();
        let implied = (f64::from(displacement) / interval) as f32;
        let limit = self.config.max_speed;
        if implied > limit {
            return Err(Violation::ExcessiveImpliedSpeed {
                speed: implied,
                interval,
                limit,
            });
        }
        Ok(())
    }
}

impl Default for StateValidator {
    fn default() -> Self {
        Self::new(AntiCheatConfig::default())
    }
}

fn all_finite(packet: &WireStatePacket) -> bool {
    packet.timestamp.is_finite()
        && packet
            .position
            .iter()
            .chain(&packet.linear_velocity)
            .chain(&packet.angular_velocity)
            .chain(&packet.rotation)
            .chain(&packet.spin_axis)
            .chain(std::iter::once(&packet.spin_rate))
            .all(|v| v.is_finite())
}
