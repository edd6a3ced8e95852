use crate::anticheat::Violation;
use crate::matchplay::Phase;
use crate::net::{EntityId, ObjectId, PeerId};

#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    ParticipantJoined {
        player_id: EntityId,
    },
    ParticipantLeft {
        player_id: EntityId,
    },
    MatchStarted {
        player_a: EntityId,
        player_b: EntityId,
        server: EntityId,
    },
    PointScored {
        scorer: EntityId,
        score_a: u32,
        score_b: u32,
    },
    /// Mirror-side score change, where the scorer is not known.
    ScoreChanged {
        score_a: u32,
        score_b: u32,
    },
    ServeRotated {
        server: EntityId,
        total_points: u32,
    },
    ServeGranted {
        player_id: EntityId,
    },
    ServeDenied {
        player_id: EntityId,
        reason: String,
    },
    MatchWon {
        winner: EntityId,
        score_a: u32,
        score_b: u32,
    },
    MatchEnded {
        winner: Option<EntityId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StateApplied {
        object_id: ObjectId,
        sequence: u32,
    },
    AttachmentChanged {
        object_id: ObjectId,
        holder: Option<EntityId>,
    },
    UpdateRejected {
        object_id: ObjectId,
        from: PeerId,
        violation: Violation,
    },
    Frozen {
        object_id: ObjectId,
    },
    Resumed {
        object_id: ObjectId,
    },
    RequestDenied {
        reason: String,
    },
    MalformedPacket {
        from: PeerId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Match(MatchEvent),
    Sync(SyncEvent),
}

impl From<MatchEvent> for SessionEvent {
    fn from(event: MatchEvent) -> Self {
        Self::Match(event)
    }
}

impl From<SyncEvent> for SessionEvent {
    fn from(event: SyncEvent) -> Self {
        Self::Sync(event)
    }
}

impl MatchEvent {
    /// Events worth an `info` line rather than `debug`.
    pub fn is_notable(&self) -> bool {
        matches!(
            self,
            Self::MatchStarted { .. }
                | Self::MatchWon { .. }
                | Self::MatchEnded { .. }
                | Self::PhaseChanged { .. }
        )
    }
}
