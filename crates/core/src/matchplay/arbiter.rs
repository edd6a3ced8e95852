use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::event::{EventQueue, MatchEvent};
use crate::net::EntityId;

use super::config::MatchConfig;
use super::state::{MatchState, Phase, Side};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("only the authority may change match state")]
    NotAuthority,
    #[error("{action} is not allowed while {phase:?}")]
    WrongPhase { action: &'static str, phase: Phase },
    #[error("need {required} participants, have {present}")]
    NotEnoughParticipants { required: usize, present: usize },
    #[error("unknown player {0}")]
    UnknownPlayer(EntityId),
    #[error("player {player} may not serve, {server} holds the serve")]
    NotYourServe { player: EntityId, server: EntityId },
    #[error("a match is already in progress")]
    AlreadyInMatch,
    #[error("player {0} may not administer the match")]
    NotAdmin(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Owns the match and may mutate it.
    Server,
    /// Mirrors state received from the server.
    Observer,
}

/// Match lifecycle, scoring and serve rotation.
///
/// Only the `Server` instance mutates; observers take snapshots through
/// [`ServeArbiter::apply_remote`] and answer `can_serve` locally.
#[derive(Debug)]
pub struct ServeArbiter {
    config: MatchConfig,
    authority: Authority,
    state: MatchState,
    participants: Vec<EntityId>,
    events: EventQueue<MatchEvent>,
    rng: StdRng,
}

impl ServeArbiter {
    pub fn new(config: MatchConfig, authority: Authority) -> Self {
        Self::with_rng(config, authority, StdRng::from_entropy())
    }

    pub fn with_seed(config: MatchConfig, authority: Authority, seed: u64) -> Self {
        Self::with_rng(config, authority, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: MatchConfig, authority: Authority, rng: StdRng) -> Self {
        Self {
            config,
            authority,
            state: MatchState::new(),
            participants: Vec::new(),
            events: EventQueue::new(256),
            rng,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn participants(&self) -> &[EntityId] {
        &self.participants
    }

    pub fn is_authority(&self) -> bool {
        self.authority == Authority::Server
    }

    pub fn drain_events(&mut self) -> Vec<MatchEvent> {
        self.events.drain()
    }

    /// Returns `false` if the player was already known.
    pub fn register_participant(&mut self, player_id: EntityId) -> Result<bool, MatchError> {
        self.require_authority()?;
        if self.participants.contains(&player_id) {
            return Ok(false);
        }
        self.participants.push(player_id);
        self.events.push(MatchEvent::ParticipantJoined { player_id });
        log::info!("participant {} joined ({} known)", player_id, self.participants.len());
        Ok(true)
    }

    /// Forgets a participant. Losing a match player mid-match forfeits the
    /// match to the opponent.
    pub fn remove_participant(&mut self, player_id: EntityId) -> Result<(), MatchError> {
        self.require_authority()?;
        let Some(index) = self.participants.iter().position(|&p| p == player_id) else {
            log::warn!("remove_participant: unknown player {}", player_id);
            return Err(MatchError::UnknownPlayer(player_id));
        };
        self.participants.remove(index);
        self.events.push(MatchEvent::ParticipantLeft { player_id });
        log::info!("participant {} left", player_id);

        if self.state.phase.is_live() && self.state.is_match_player(player_id) {
            let opponent = self.state.opponent_of(player_id);
            log::info!("match forfeited by {}", player_id);
            match opponent {
                Some(winner) => self.finish(winner),
                None => self.set_phase(Phase::PostMatch),
            }
            self.touch();
        }
        Ok(())
    }

    pub fn enter_pre_match(&mut self) -> Result<(), MatchError> {
        self.require_authority()?;
        match self.state.phase {
            Phase::Practice | Phase::PostMatch => {}
            Phase::PreMatch => return Ok(()),
            phase => {
                return Err(MatchError::WrongPhase {
                    action: "enter_pre_match",
                    phase,
                });
            }
        }
        self.require_participants()?;
        self.set_phase(Phase::PreMatch);
        self.touch();
        Ok(())
    }

    /// Takes the first two known participants as players A and B and picks
    /// the opening server at random.
    pub fn start_match(&mut self) -> Result<(), MatchError> {
        self.require_authority()?;
        if self.state.phase.is_live() {
            return Err(MatchError::AlreadyInMatch);
        }
        self.require_participants()?;

        let player_a = self.participants[0];
        let player_b = self.participants[1];
        let server = if self.rng.gen_bool(0.5) {
            player_a
        } else {
            player_b
        };

        self.state.player_a = Some(player_a);
        self.state.player_b = Some(player_b);
        self.state.score_a = 0;
        self.state.score_b = 0;
        self.state.current_server = Some(server);
        self.state.serve_count = 0;
        self.state.set_number = 0;
        self.set_phase(Phase::InMatch);
        self.events.push(MatchEvent::MatchStarted {
            player_a,
            player_b,
            server,
        });
        self.touch();

        log::info!(
            "match started: {} vs {}, {} serves first",
            player_a,
            player_b,
            server
        );
        Ok(())
    }

    /// Awards a point. Returns the winner if this point ended the match.
    pub fn record_point(&mut self, scoring_player: EntityId) -> Result<Option<EntityId>, MatchError> {
        self.require_authority()?;
        if self.state.phase != Phase::InMatch {
            return Err(MatchError::WrongPhase {
                action: "record_point",
                phase: self.state.phase,
            });
        }
        let Some(side) = self.state.side_of(scoring_player) else {
            log::warn!("point for unknown player {} ignored", scoring_player);
            return Err(MatchError::UnknownPlayer(scoring_player));
        };

        match side {
            Side::A => self.state.score_a += 1,
            Side::B => self.state.score_b += 1,
        }
        self.state.serve_count += 1;
        self.events.push(MatchEvent::PointScored {
            scorer: scoring_player,
            score_a: self.state.score_a,
            score_b: self.state.score_b,
        });
        log::debug!(
            "point to {}: {}-{}",
            scoring_player,
            self.state.score_a,
            self.state.score_b
        );

        if let Some(winner) = self.state.winner(&self.config) {
            self.finish(winner);
            self.touch();
            return Ok(Some(winner));
        }

        if self.rotation_due() {
            self.rotate_serve();
        }
        self.touch();
        Ok(None)
    }

    /// Read-only serve check, usable on observers.
    pub fn can_serve(&self, player_id: EntityId) -> bool {
        match self.state.phase {
            Phase::Practice => true,
            Phase::InMatch => self.state.current_server == Some(player_id),
            _ => false,
        }
    }

    /// Like [`Self::can_serve`] but explains a refusal and records the
    /// outcome as an event.
    pub fn request_serve(&mut self, player_id: EntityId) -> Result<(), MatchError> {
        let outcome = self.check_serve(player_id);
        match &outcome {
            Ok(()) => self.events.push(MatchEvent::ServeGranted { player_id }),
            Err(err) => {
                log::debug!("serve denied for {}: {}", player_id, err);
                self.events.push(MatchEvent::ServeDenied {
                    player_id,
                    reason: err.to_string(),
                })
            }
        };
        outcome
    }

    fn check_serve(&self, player_id: EntityId) -> Result<(), MatchError> {
        match self.state.phase {
            Phase::Practice => Ok(()),
            Phase::InMatch => {
                if !self.state.is_match_player(player_id) {
                    return Err(MatchError::UnknownPlayer(player_id));
                }
                match self.state.current_server {
                    Some(server) if server == player_id => Ok(()),
                    Some(server) => Err(MatchError::NotYourServe {
                        player: player_id,
                        server,
                    }),
                    None => Err(MatchError::WrongPhase {
                        action: "serve",
                        phase: Phase::InMatch,
                    }),
                }
            }
            phase => Err(MatchError::WrongPhase {
                action: "serve",
                phase,
            }),
        }
    }

    /// Confirms that `player_id` may put a held ball into play right now.
    pub fn serve_taken(&mut self, player_id: EntityId) -> Result<(), MatchError> {
        self.require_authority()?;
        self.check_serve(player_id)?;
        log::debug!("serve taken by {}", player_id);
        Ok(())
    }

    pub fn end_match(&mut self, winner: Option<EntityId>) -> Result<(), MatchError> {
        self.require_authority()?;
        if self.state.phase == Phase::Practice {
            return Err(MatchError::WrongPhase {
                action: "end_match",
                phase: Phase::Practice,
            });
        }
        if let Some(w) = winner
            && !self.state.is_match_player(w)
        {
            log::warn!("end_match: unknown winner {}", w);
            return Err(MatchError::UnknownPlayer(w));
        }

        self.state.current_server = None;
        self.set_phase(Phase::Practice);
        self.events.push(MatchEvent::MatchEnded { winner });
        self.touch();
        log::info!("match ended, winner {:?}", winner);
        Ok(())
    }

    pub fn start_practice(&mut self) -> Result<(), MatchError> {
        self.require_authority()?;
        if self.state.phase == Phase::Practice {
            return Ok(());
        }
        self.state.current_server = None;
        self.set_phase(Phase::Practice);
        self.touch();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), MatchError> {
        self.require_authority()?;
        if self.state.phase != Phase::InMatch {
            return Err(MatchError::WrongPhase {
                action: "pause",
                phase: self.state.phase,
            });
        }
        self.set_phase(Phase::Paused);
        self.touch();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), MatchError> {
        self.require_authority()?;
        if self.state.phase != Phase::Paused {
            return Err(MatchError::WrongPhase {
                action: "resume",
                phase: self.state.phase,
            });
        }
        self.set_phase(Phase::InMatch);
        self.touch();
        Ok(())
    }

    /// Adopts a snapshot from the authority. Stale or duplicate revisions
    /// are ignored. Returns whether the snapshot was applied.
    pub fn apply_remote(&mut self, remote: MatchState) -> bool {
        if self.is_authority() {
            log::warn!("authority ignored a remote match state");
            return false;
        }
        if remote.revision <= self.state.revision {
            return false;
        }

        let previous = std::mem::replace(&mut self.state, remote);
        if previous.phase != self.state.phase {
            self.events.push(MatchEvent::PhaseChanged {
                from: previous.phase,
                to: self.state.phase,
            });
        }
        if (previous.score_a, previous.score_b) != (self.state.score_a, self.state.score_b) {
            self.events.push(MatchEvent::ScoreChanged {
                score_a: self.state.score_a,
                score_b: self.state.score_b,
            });
        }
        if self.state.phase == Phase::InMatch
            && previous.current_server.is_some()
            && previous.current_server != self.state.current_server
            && let Some(server) = self.state.current_server
        {
            self.events.push(MatchEvent::ServeRotated {
                server,
                total_points: self.state.total_points(),
            });
        }
        true
    }

    /// Observer-side view of a rotation notice. The serve is handed over
    /// immediately; the next full snapshot confirms it.
    pub fn apply_rotation(&mut self, server: EntityId, total_points: u32) {
        if self.is_authority() || self.state.current_server == Some(server) {
            return;
        }
        self.state.current_server = Some(server);
        self.state.serve_count = 0;
        self.events.push(MatchEvent::ServeRotated {
            server,
            total_points,
        });
    }

    fn rotation_due(&self) -> bool {
        let total = self.state.total_points();
        let every = self.config.serve_rotation_score.max(1);
        total % every == 0
    }

    fn rotate_serve(&mut self) {
        let Some(current) = self.state.current_server else {
            return;
        };
        let Some(next) = self.state.opponent_of(current) else {
            return;
        };
        self.state.current_server = Some(next);
        self.state.serve_count = 0;
        self.events.push(MatchEvent::ServeRotated {
            server: next,
            total_points: self.state.total_points(),
        });
        log::debug!("serve rotated to {}", next);
    }

    fn finish(&mut self, winner: EntityId) {
        self.state.current_server = None;
        self.set_phase(Phase::PostMatch);
        self.events.push(MatchEvent::MatchWon {
            winner,
            score_a: self.state.score_a,
            score_b: self.state.score_b,
        });
        log::info!(
            "match won by {} ({}-{})",
            winner,
            self.state.score_a,
            self.state.score_b
        );
    }

    fn set_phase(&mut self, to: Phase) {
        let from = self.state.phase;
        if from == to {
            return;
        }
        self.state.phase = to;
        self.events.push(MatchEvent::PhaseChanged { from, to });
    }

    fn touch(&mut self) {
        self.state.revision += 1;
    }

    fn require_authority(&self) -> Result<(), MatchError> {
        if self.is_authority() {
            Ok(())
        } else {
            Err(MatchError::NotAuthority)
        }
    }

    fn require_participants(&self) -> Result<(), MatchError> {
        let required = self.config.min_participants.max(2);
        if self.participants.len() < required {
            return Err(MatchError::NotEnoughParticipants {
                required,
                present: self.participants.len(),
            });
        }
        Ok(())
    }
}
