use rkyv::Archive;

use crate::net::EntityId;

use super::config::MatchConfig;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub enum Phase {
    Practice,
    PreMatch,
    InMatch,
    PostMatch,
    Paused,
}

impl Phase {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::InMatch | Self::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// Server-owned match record, mirrored read-only on replicas.
///
/// `revision` grows with every authoritative change so mirrors can discard
/// out-of-date copies.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct MatchState {
    pub revision: u64,
    pub phase: Phase,
    pub player_a: Option<EntityId>,
    pub player_b: Option<EntityId>,
    pub score_a: u32,
    pub score_b: u32,
    /// Only meaningful while `InMatch` or `Paused`.
    pub current_server: Option<EntityId>,
    pub serve_count: u32,
    pub set_number: u32,
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            revision: 0,
            phase: Phase::Practice,
            player_a: None,
            player_b: None,
            score_a: 0,
            score_b: 0,
            current_server: None,
            serve_count: 0,
            set_number: 0,
        }
    }

    pub fn total_points(&self) -> u32 {
        self.score_a + self.score_b
    }

    pub fn side_of(&self, player: EntityId) -> Option<Side> {
        if self.player_a == Some(player) {
            Some(Side::A)
        } else if self.player_b == Some(player) {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn is_match_player(&self, player: EntityId) -> bool {
        self.side_of(player).is_some()
    }

    pub fn player(&self, side: Side) -> Option<EntityId> {
        match side {
            Side::A => self.player_a,
            Side::B => self.player_b,
        }
    }

    pub fn score_of(&self, player: EntityId) -> Option<u32> {
        self.side_of(player).map(|side| match side {
            Side::A => self.score_a,
            Side::B => self.score_b,
        })
    }

    pub fn opponent_of(&self, player: EntityId) -> Option<EntityId> {
        match self.side_of(player)? {
            Side::A => self.player_b,
            Side::B => self.player_a,
        }
    }

    /// `None` on a tie.
    pub fn leader(&self) -> Option<EntityId> {
        match self.score_a.cmp(&self.score_b) {
            std::cmp::Ordering::Greater => self.player_a,
            std::cmp::Ordering::Less => self.player_b,
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn in_deuce(&self, config: &MatchConfig) -> bool {
        let threshold = config.max_score.saturating_sub(1);
        config.enable_deuce && self.score_a >= threshold && self.score_b >= threshold
    }

    /// Who has won on the current score, if anyone. Reaching `max_score`
    /// is not enough without a two point lead.
    pub fn winner(&self, config: &MatchConfig) -> Option<EntityId> {
        let high = self.score_a.max(self.score_b);
        let lead = self.score_a.abs_diff(self.score_b);
        if high >= config.max_score && lead >= 2 {
            self.leader()
        } else {
            None
        }
    }
}
