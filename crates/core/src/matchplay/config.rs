use serde::{Deserialize, Serialize};

use crate::net::EntityId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Serve passes to the other player every this many total points.
    pub serve_rotation_score: u32,
    pub max_score: u32,
    pub enable_deuce: bool,
    pub min_participants: usize,
    /// Time spent in `PostMatch` before the table drops back to practice.
    pub post_match_delay_s: f64,
    /// Full match state is re-broadcast at this interval.
    pub match_state_resend_s: f64,
    /// Players allowed to send lifecycle commands. Empty means anyone.
    pub admins: Vec<EntityId>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            serve_rotation_score: 2,
            max_score: 11,
            enable_deuce: true,
            min_participants: 2,
            post_match_delay_s: 5.0,
            match_state_resend_s: 1.0,
            admins: Vec::new(),
        }
    }
}

impl MatchConfig {
    pub fn is_admin(&self, player: EntityId) -> bool {
        self.admins.is_empty() || self.admins.contains(&player)
    }
}
