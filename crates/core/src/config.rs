use serde::{Deserialize, Serialize};

use crate::anticheat::AntiCheatConfig;
use crate::matchplay::MatchConfig;
use crate::physics::{PredictionConfig, SpinConfig};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be within {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },
}

/// Replication scheduling and buffering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on authoritative broadcasts per second.
    pub sync_rate_hz: f32,
    pub tick_rate_hz: f32,
    /// Metres.
    pub position_threshold: f32,
    /// Radians.
    pub rotation_threshold: f32,
    /// Metres per second.
    pub velocity_threshold: f32,
    /// An unchanged ball is still re-sent at this interval so replicas can
    /// tell a resting ball from a lost link.
    pub keepalive_interval_s: f64,
    pub max_buffer_size: usize,
    pub max_packet_age_s: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_rate_hz: 20.0,
            tick_rate_hz: 60.0,
            position_threshold: 0.001,
            rotation_threshold: 0.01,
            velocity_threshold: 0.01,
            keepalive_interval_s: 0.5,
            max_buffer_size: 32,
            max_packet_age_s: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RallyConfig {
    pub sync: SyncConfig,
    pub prediction: PredictionConfig,
    pub spin: SpinConfig,
    pub anticheat: AntiCheatConfig,
    #[serde(rename = "match")]
    pub matchplay: MatchConfig,
}

impl RallyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("sync.sync_rate_hz", self.sync.sync_rate_hz.into())?;
        positive("sync.tick_rate_hz", self.sync.tick_rate_hz.into())?;
        positive("sync.max_buffer_size", self.sync.max_buffer_size as f64)?;
        positive("sync.max_packet_age_s", self.sync.max_packet_age_s)?;
        positive("sync.keepalive_interval_s", self.sync.keepalive_interval_s)?;
        non_negative("sync.position_threshold", self.sync.position_threshold.into())?;
        non_negative("sync.rotation_threshold", self.sync.rotation_threshold.into())?;
        non_negative("sync.velocity_threshold", self.sync.velocity_threshold.into())?;

        positive(
            "prediction.max_prediction_time_s",
            self.prediction.max_prediction_time_s.into(),
        )?;
        within(
            "prediction.prediction_confidence",
            "[0, 1]",
            self.prediction.prediction_confidence.into(),
            |v| (0.0..=1.0).contains(&v),
        )?;

        positive("spin.max_spin_rate", self.spin.max_spin_rate.into())?;
        non_negative("spin.min_spin_threshold", self.spin.min_spin_threshold.into())?;
        within(
            "spin.spin_decay_rate",
            "(0, 1]",
            self.spin.spin_decay_rate.into(),
            |v| v > 0.0 && v <= 1.0,
        )?;
        non_negative("spin.magnus_coefficient", self.spin.magnus_coefficient.into())?;

        positive("anticheat.max_speed", self.anticheat.max_speed.into())?;
        positive(
            "anticheat.max_acceleration",
            self.anticheat.max_acceleration.into(),
        )?;
        positive("anticheat.authority_window_s", self.anticheat.authority_window_s)?;

        positive(
            "match.serve_rotation_score",
            self.matchplay.serve_rotation_score.into(),
        )?;
        positive("match.max_score", self.matchplay.max_score.into())?;
        non_negative("match.post_match_delay_s", self.matchplay.post_match_delay_s)?;
        positive(
            "match.match_state_resend_s",
            self.matchplay.match_state_resend_s,
        )?;
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    within(field, "[0, inf)", value, |v| v >= 0.0)
}

fn within(
    field: &'static str,
    range: &'static str,
    value: f64,
    accept: impl Fn(f64) -> bool,
) -> Result<(), ConfigError> {
    if value.is_finite() && accept(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            range,
            value,
        })
    }
}
