use std::collections::{BTreeMap, HashMap};

use glam::Vec3;

use crate::anticheat::StateValidator;
use crate::config::RallyConfig;
use crate::event::{EventQueue, MatchEvent, SessionEvent, SyncEvent};
use crate::matchplay::{Authority as MatchAuthority, MatchError, Phase, ServeArbiter};
use crate::net::{
    sequence_greater_than, EntityId, Message, ObjectId, PeerId, SyncStats, WireStatePacket,
};
use crate::physics::BallState;
use crate::simulation::{FixedTimestep, TimerQueue};

use super::{Outbound, SyncRole};

const NOT_JOINED: &str = "peer has not joined the session";

bitflags::bitflags! {
    /// Which parts of a ball moved past their send threshold.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChangeMask: u8 {
        const POSITION = 1 << 0;
        const ROTATION = 1 << 1;
        const VELOCITY = 1 << 2;
        const ATTACHMENT = 1 << 3;
        const SPIN = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    ReturnToPractice { revision: u64 },
    ResendMatchState,
}

#[derive(Debug)]
struct AuthorityObject {
    state: BallState,
    last_sent: Option<BallState>,
    last_sent_at: f64,
    /// Set when an accepted client update must go out on the next send tick.
    force_send: bool,
}

/// Server-side role: owns ball state and the match, broadcasts deltas and
/// vets everything peers submit.
pub struct Authority {
    config: RallyConfig,
    objects: BTreeMap<ObjectId, AuthorityObject>,
    arbiter: ServeArbiter,
    validator: StateValidator,
    send_gate: FixedTimestep,
    timers: TimerQueue<Timer>,
    players: HashMap<PeerId, EntityId>,
    accepted_requests: HashMap<(PeerId, ObjectId), WireStatePacket>,
    next_sequence: u32,
    last_broadcast_revision: u64,
    simulate: bool,
    now: f64,
    outbound: Vec<Outbound>,
    events: EventQueue<SessionEvent>,
    stats: SyncStats,
}

impl Authority {
    pub fn new(config: RallyConfig) -> Self {
        let arbiter = ServeArbiter::new(config.matchplay.clone(), MatchAuthority::Server);
        Self::with_arbiter(config, arbiter)
    }

    pub fn with_seed(config: RallyConfig, seed: u64) -> Self {
        let arbiter =
            ServeArbiter::with_seed(config.matchplay.clone(), MatchAuthority::Server, seed);
        Self::with_arbiter(config, arbiter)
    }

    fn with_arbiter(config: RallyConfig, arbiter: ServeArbiter) -> Self {
        let mut timers = TimerQueue::new();
        timers.schedule(config.matchplay.match_state_resend_s, Timer::ResendMatchState);
        Self {
            validator: StateValidator::new(config.anticheat.clone()),
            send_gate: FixedTimestep::new(config.sync.sync_rate_hz),
            objects: BTreeMap::new(),
            arbiter,
            timers,
            players: HashMap::new(),
            accepted_requests: HashMap::new(),
            next_sequence: 0,
            last_broadcast_revision: 0,
            simulate: true,
            now: 0.0,
            outbound: Vec::new(),
            events: EventQueue::default(),
            stats: SyncStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &RallyConfig {
        &self.config
    }

    /// Turns built-in free-flight integration on or off. Off means the
    /// embedding layer writes ball state itself each tick.
    pub fn set_simulate(&mut self, simulate: bool) {
        self.simulate = simulate;
    }

    pub fn spawn_ball(&mut self, object_id: ObjectId, state: BallState) {
        self.objects.insert(
            object_id,
            AuthorityObject {
                state,
                last_sent: None,
                last_sent_at: f64::NEG_INFINITY,
                force_send: true,
            },
        );
    }

    pub fn ball(&self, object_id: ObjectId) -> Option<&BallState> {
        self.objects.get(&object_id).map(|o| &o.state)
    }

    pub fn ball_mut(&mut self, object_id: ObjectId) -> Option<&mut BallState> {
        self.objects.get_mut(&object_id).map(|o| &mut o.state)
    }

    pub fn ball_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn attach(&mut self, object_id: ObjectId, holder: EntityId) -> bool {
        self.ball_mut(object_id).map(|b| b.attach(holder)).is_some()
    }

    pub fn release(&mut self, object_id: ObjectId, linear: Vec3, angular: Vec3) -> bool {
        self.ball_mut(object_id)
            .map(|b| b.release(linear, angular))
            .is_some()
    }

    pub fn add_spin(&mut self, object_id: ObjectId, axis: Vec3, rate: f32) -> bool {
        let spin_config = self.config.spin.clone();
        self.ball_mut(object_id)
            .map(|b| b.spin.add_spin(axis, rate, &spin_config))
            .is_some()
    }

    pub fn arbiter(&self) -> &ServeArbiter {
        &self.arbiter
    }

    /// Local administrative access. Changes are broadcast on the next tick.
    pub fn arbiter_mut(&mut self) -> &mut ServeArbiter {
        &mut self.arbiter
    }

    /// The authority-internal scoring path.
    pub fn record_point(&mut self, scoring_player: EntityId) -> Result<Option<EntityId>, MatchError> {
        self.arbiter.record_point(scoring_player)
    }

    pub fn player_for_peer(&self, peer: PeerId) -> Option<EntityId> {
        self.players.get(&peer).copied()
    }

    fn handle_join(&mut self, from: PeerId, player_id: EntityId) {
        if let Some((&owner, _)) = self
            .players
            .iter()
            .find(|&(&peer, &player)| player == player_id && peer != from)
        {
            log::warn!(
                "peer {} tried to join as player {}, already held by peer {}",
                from,
                player_id,
                owner
            );
            self.deny(from, format!("player {} is taken", player_id));
            return;
        }

        match self.arbiter.register_participant(player_id) {
            Ok(_) => {
                self.players.insert(from, player_id);
                self.outbound.push(Outbound::to(
                    from,
                    Message::MatchStateUpdate(self.arbiter.state().clone()),
                ));
            }
            Err(err) => {
                log::warn!("join from peer {} failed: {}", from, err);
                self.deny(from, err.to_string());
            }
        }
    }

    fn handle_leave(&mut self, from: PeerId, player_id: EntityId) {
        if self.players.get(&from) != Some(&player_id) {
            log::warn!("peer {} tried to remove player {}", from, player_id);
            return;
        }
        self.players.remove(&from);
        self.accepted_requests.retain(|(peer, _), _| *peer != from);
        if let Err(err) = self.arbiter.remove_participant(player_id) {
            log::warn!("leave from peer {} failed: {}", from, err);
        }
    }

    fn handle_state_request(&mut self, from: PeerId, packet: WireStatePacket) {
        let object_id = packet.object_id;
        let Some(object) = self.objects.get(&object_id) else {
            log::warn!("peer {} submitted state for unknown object {}", from, object_id);
            self.deny(from, format!("unknown object {}", object_id));
            return;
        };
        let authoritative = object.state.to_packet(object_id, self.next_sequence, self.now);
        let releases_held = object.state.is_attached() && !packet.is_attached;

        let key = (from, object_id);
        let previous = self.accepted_requests.get(&key);
        if let Some(prev) = previous
            && !sequence_greater_than(packet.sequence, prev.sequence)
        {
            log::trace!(
                "stale state request {} from peer {} (last {})",
                packet.sequence,
                from,
                prev.sequence
            );
            self.stats.stale_dropped += 1;
            return;
        }

        let verdict = self
            .validator
            .is_plausible(previous, &packet)
            .and_then(|()| self.validator.is_consistent_with(&authoritative, &packet));
        if let Err(violation) = verdict {
            log::warn!(
                "dropped implausible update for object {} from peer {}: {}",
                object_id,
                from,
                violation
            );
            self.stats.implausible_dropped += 1;
            self.events.push(
                SyncEvent::UpdateRejected {
                    object_id,
                    from,
                    violation,
                }
                .into(),
            );
            return;
        }

        if releases_held && self.arbiter.phase() == Phase::InMatch {
            let outcome = match self.players.get(&from).copied() {
                Some(player) => self.arbiter.serve_taken(player).map_err(|e| e.to_string()),
                None => Err(NOT_JOINED.to_string()),
            };
            if let Err(reason) = outcome {
                log::info!(
                    "release of object {} by peer {} refused: {}",
                    object_id,
                    from,
                    reason
                );
                self.deny(from, reason);
                return;
            }
        }

        let Some(object) = self.objects.get_mut(&object_id) else {
            return;
        };
        let holder_changed = object.state.attached_to != packet.attached_entity_id;
        object.state = BallState::from_packet(&packet);
        object.force_send = true;
        self.accepted_requests.insert(key, packet);
        self.stats.state_packets_applied += 1;
        if holder_changed {
            self.events.push(
                SyncEvent::AttachmentChanged {
                    object_id,
                    holder: packet.attached_entity_id,
                }
                .into(),
            );
        }
    }

    fn handle_serve_request(&mut self, from: PeerId, player_id: EntityId) {
        let refusal = match self.players.get(&from) {
            None => Some(NOT_JOINED),
            Some(&player) if player != player_id => Some("player id does not match sender"),
            Some(_) => None,
        };
        if let Some(reason) = refusal {
            log::warn!("peer {} asked to serve as player {}: {}", from, player_id, reason);
            self.stats.requests_denied += 1;
            self.outbound.push(Outbound::to(
                from,
                Message::ServePermission {
                    player_id,
                    granted: false,
                    reason: Some(reason.to_string()),
                },
            ));
            return;
        }

        let reply = match self.arbiter.request_serve(player_id) {
            Ok(()) => Message::ServePermission {
                player_id,
                granted: true,
                reason: None,
            },
            Err(err) => {
                log::info!("serve denied for player {}: {}", player_id, err);
                self.stats.requests_denied += 1;
                Message::ServePermission {
                    player_id,
                    granted: false,
                    reason: Some(err.to_string()),
                }
            }
        };
        self.outbound.push(Outbound::to(from, reply));
    }

    fn handle_admin(&mut self, from: PeerId, message: &Message) {
        let refusal = match self.players.get(&from).copied() {
            Some(player) if !self.config.matchplay.is_admin(player) => {
                Some(MatchError::NotAdmin(player).to_string())
            }
            None if !self.config.matchplay.admins.is_empty() => Some(NOT_JOINED.to_string()),
            _ => None,
        };
        if let Some(reason) = refusal {
            log::info!("{} from peer {} denied: {}", message.kind(), from, reason);
            self.deny(from, reason);
            return;
        }

        let result = match message {
            Message::PrepareMatch => self.arbiter.enter_pre_match(),
            Message::StartMatch => self.arbiter.start_match(),
            Message::EndMatch { winner } => self.arbiter.end_match(*winner),
            Message::StartPractice => self.arbiter.start_practice(),
            Message::PauseMatch => self.arbiter.pause(),
            Message::ResumeMatch => self.arbiter.resume(),
            _ => Ok(()),
        };
        if let Err(err) = result {
            log::info!("{} from peer {} denied: {}", message.kind(), from, err);
            self.deny(from, err.to_string());
        }
    }

    fn deny(&mut self, to: PeerId, reason: String) {
        self.stats.requests_denied += 1;
        self.outbound
            .push(Outbound::to(to, Message::RequestDenied { reason }));
    }

    fn run_timers(&mut self) {
        for timer in self.timers.pop_due(self.now) {
            match timer {
                Timer::ReturnToPractice { revision } => {
                    let state = self.arbiter.state();
                    if state.phase == Phase::PostMatch && state.revision == revision {
                        if let Err(err) = self.arbiter.start_practice() {
                            log::warn!("return to practice failed: {}", err);
                        }
                    }
                }
                Timer::ResendMatchState => {
                    self.outbound.push(Outbound::broadcast(Message::MatchStateUpdate(
                        self.arbiter.state().clone(),
                    )));
                    self.timers.schedule(
                        self.now + self.config.matchplay.match_state_resend_s,
                        Timer::ResendMatchState,
                    );
                }
            }
        }
    }

    fn publish_match_events(&mut self) {
        for event in self.arbiter.drain_events() {
            match &event {
                MatchEvent::ServeRotated {
                    server,
                    total_points,
                } => {
                    log::info!("serve rotated to {} after {} points", server, total_points);
                    self.outbound.push(Outbound::broadcast(Message::RotateServeRight {
                        server_id: *server,
                        total_points: *total_points,
                    }));
                }
                MatchEvent::MatchWon { .. } => {
                    self.timers.cancel_where(|t| matches!(t, Timer::ReturnToPractice { .. }));
                    self.timers.schedule(
                        self.now + self.config.matchplay.post_match_delay_s,
                        Timer::ReturnToPractice {
                            revision: self.arbiter.state().revision,
                        },
                    );
                }
                MatchEvent::MatchEnded { .. } => {
                    self.timers.cancel_where(|t| matches!(t, Timer::ReturnToPractice { .. }));
                }
                _ => {}
            }
            self.events.push(event.into());
        }

        let revision = self.arbiter.state().revision;
        if revision != self.last_broadcast_revision {
            self.last_broadcast_revision = revision;
            self.outbound.push(Outbound::broadcast(Message::MatchStateUpdate(
                self.arbiter.state().clone(),
            )));
        }
    }

    fn broadcast_dirty_balls(&mut self) {
        let thresholds = &self.config.sync;
        let keepalive = thresholds.keepalive_interval_s;
        let now = self.now;

        let mut packets = Vec::new();
        for (&object_id, object) in self.objects.iter_mut() {
            let mask = object
                .last_sent
                .as_ref()
                .map_or(ChangeMask::all(), |sent| {
                    change_mask(sent, &object.state, thresholds)
                });
            let stale = now - object.last_sent_at >= keepalive;
            if mask.is_empty() && !stale && !object.force_send {
                continue;
            }

            self.next_sequence = self.next_sequence.wrapping_add(1);
            packets.push(object.state.to_packet(object_id, self.next_sequence, now));
            object.last_sent = Some(object.state);
            object.last_sent_at = now;
            object.force_send = false;
        }

        for packet in packets {
            self.stats.state_packets_sent += 1;
            self.outbound
                .push(Outbound::broadcast(Message::BroadcastState(packet)));
        }
    }
}

/// Compares a ball against what was last broadcast for it.
pub fn change_mask(
    sent: &BallState,
    current: &BallState,
    thresholds: &crate::config::SyncConfig,
) -> ChangeMask {
    let mut mask = ChangeMask::empty();
    if sent.position.distance(current.position) > thresholds.position_threshold {
        mask |= ChangeMask::POSITION;
    }
    if sent.rotation.angle_between(current.rotation) > thresholds.rotation_threshold {
        mask |= ChangeMask::ROTATION;
    }
    let velocity_delta = sent.linear_velocity.distance(current.linear_velocity)
        + sent.angular_velocity.distance(current.angular_velocity);
    if velocity_delta > thresholds.velocity_threshold {
        mask |= ChangeMask::VELOCITY;
    }
    if sent.attached_to != current.attached_to {
        mask |= ChangeMask::ATTACHMENT;
    }
    if sent.spin != current.spin {
        mask |= ChangeMask::SPIN;
    }
    mask
}

impl SyncRole for Authority {
    fn handle_message(&mut self, from: PeerId, message: Message, now: f64) {
        self.now = self.now.max(now);
        match message {
            Message::JoinSession { player_id } => self.handle_join(from, player_id),
            Message::LeaveSession { player_id } => self.handle_leave(from, player_id),
            Message::RequestStateUpdate(packet) => self.handle_state_request(from, packet),
            Message::RequestServePermission { player_id } => {
                self.handle_serve_request(from, player_id)
            }
            Message::UpdateScore { scoring_player } => {
                log::warn!(
                    "peer {} tried to score a point for {}",
                    from,
                    scoring_player
                );
                self.deny(from, MatchError::NotAuthority.to_string());
            }
            Message::PrepareMatch
            | Message::StartMatch
            | Message::EndMatch { .. }
            | Message::StartPractice
            | Message::PauseMatch
            | Message::ResumeMatch => self.handle_admin(from, &message),
            other => {
                log::debug!("authority ignored {} from peer {}", other.kind(), from);
            }
        }
    }

    fn tick(&mut self, now: f64, dt: f32) {
        self.now = self.now.max(now);

        if self.simulate {
            let gravity = self.config.prediction.gravity;
            for object in self.objects.values_mut() {
                object.state.step_free_flight(dt, gravity, &self.config.spin);
            }
        }

        self.run_timers();
        self.publish_match_events();

        self.send_gate.accumulate(dt);
        if self.send_gate.consume_latest() {
            self.broadcast_dirty_balls();
        }
    }

    fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain()
    }

    fn stats(&self) -> &SyncStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut SyncStats {
        &mut self.stats
    }

    fn reset(&mut self) {
        self.timers.clear();
        self.outbound.clear();
        self.accepted_requests.clear();
        self.send_gate.reset();
        for object in self.objects.values_mut() {
            object.last_sent = None;
            object.force_send = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;
    use crate::physics::SpinState;

    const CLIENT: PeerId = 2;

    fn authority() -> Authority {
        let mut authority = Authority::with_seed(RallyConfig::default(), 1);
        authority.set_simulate(false);
        authority.spawn_ball(0, BallState::at(Vec3::new(0.0, 1.0, 0.0)));
        authority
    }

    fn state_broadcasts(outbound: &[Outbound]) -> Vec<WireStatePacket> {
        outbound
            .iter()
            .filter_map(|o| match &o.message {
                Message::BroadcastState(packet) => Some(*packet),
                _ => None,
            })
            .collect()
    }

    fn submitted(sequence: u32, timestamp: f64, position: Vec3, velocity: Vec3) -> WireStatePacket {
        let mut packet = WireStatePacket::new(0, sequence, timestamp);
        packet.set_position(position);
        packet.set_velocity(velocity, Vec3::ZERO);
        packet
    }

    /// Peers 10 and 11 joined as players 1 and 2, match under way.
    fn joined_match(seed: u64) -> (Authority, EntityId, PeerId, PeerId) {
        let mut authority = Authority::with_seed(RallyConfig::default(), seed);
        authority.set_simulate(false);
        authority.handle_message(10, Message::JoinSession { player_id: 1 }, 0.0);
        authority.handle_message(11, Message::JoinSession { player_id: 2 }, 0.0);
        authority.arbiter_mut().start_match().unwrap();
        authority.take_outbound();

        let server = authority.arbiter().state().current_server.unwrap();
        let (server_peer, other_peer) = if server == 1 { (10, 11) } else { (11, 10) };
        (authority, server, server_peer, other_peer)
    }

    fn is_denial(outbound: &[Outbound], peer: PeerId) -> bool {
        matches!(
            outbound,
            [Outbound {
                target: crate::net::SendTarget::Peer(p),
                message: Message::RequestDenied { .. },
            }] if *p == peer
        )
    }

    #[test]
    fn test_first_tick_broadcasts_every_ball() {
        let mut authority = authority();
        authority.tick(0.1, 0.1);
        let sent = state_broadcasts(&authority.take_outbound());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].object_id, 0);
    }

    #[test]
    fn test_unchanged_ball_waits_for_keepalive() {
        let mut authority = authority();
        authority.tick(0.1, 0.1);
        authority.take_outbound();

        authority.tick(0.2, 0.1);
        assert!(state_broadcasts(&authority.take_outbound()).is_empty());

        authority.tick(0.7, 0.1);
        assert_eq!(state_broadcasts(&authority.take_outbound()).len(), 1);
    }

    #[test]
    fn test_sequences_increase_across_sends() {
        let mut authority = authority();
        let mut last = 0;
        for step in 1..20 {
            if let Some(ball) = authority.ball_mut(0) {
                ball.position.x += 0.1;
            }
            authority.tick(step as f64 * 0.1, 0.1);
            for packet in state_broadcasts(&authority.take_outbound()) {
                assert!(sequence_greater_than(packet.sequence, last));
                last = packet.sequence;
            }
        }
        assert!(last > 0);
    }

    #[test]
    fn test_change_mask_thresholds() {
        let config = RallyConfig::default().sync;
        let sent = BallState::at(Vec3::ZERO);

        let mut moved = sent;
        moved.position.x = 0.0005;
        assert!(change_mask(&sent, &moved, &config).is_empty());

        moved.position.x = 0.5;
        moved.rotation = Quat::from_rotation_y(0.5);
        moved.spin = SpinState::from_wire(Vec3::Y, 10.0);
        let mask = change_mask(&sent, &moved, &config);
        assert!(mask.contains(ChangeMask::POSITION | ChangeMask::ROTATION | ChangeMask::SPIN));
        assert!(!mask.contains(ChangeMask::ATTACHMENT));

        let mut held = sent;
        held.attach(7);
        assert_eq!(change_mask(&sent, &held, &config), ChangeMask::ATTACHMENT);
    }

    #[test]
    fn test_implausible_request_is_not_applied_or_rebroadcast() {
        let mut authority = authority();
        authority.tick(0.1, 0.1);
        authority.take_outbound();

        let cheat = submitted(1, 0.1, Vec3::new(0.0, 1.0, 0.0), Vec3::new(90.0, 0.0, 0.0));
        authority.handle_message(CLIENT, Message::RequestStateUpdate(cheat), 0.15);
        authority.tick(0.2, 0.1);

        assert_eq!(authority.ball(0).map(|b| b.linear_velocity), Some(Vec3::ZERO));
        assert!(state_broadcasts(&authority.take_outbound()).is_empty());
        assert_eq!(authority.stats().implausible_dropped, 1);
        assert!(authority.take_events().iter().any(|e| matches!(
            e,
            SessionEvent::Sync(SyncEvent::UpdateRejected { from: CLIENT, .. })
        )));
    }

    #[test]
    fn test_plausible_request_is_applied_and_forwarded() {
        let mut authority = authority();
        let hit = submitted(1, 0.1, Vec3::new(0.0, 1.0, 0.0), Vec3::new(6.0, 2.0, 0.0));
        authority.handle_message(CLIENT, Message::RequestStateUpdate(hit), 0.1);
        authority.tick(0.1, 0.1);

        assert_eq!(
            authority.ball(0).map(|b| b.linear_velocity),
            Some(Vec3::new(6.0, 2.0, 0.0))
        );
        let sent = state_broadcasts(&authority.take_outbound());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].linear_velocity(), Vec3::new(6.0, 2.0, 0.0));

        let replay = submitted(1, 0.1, Vec3::ZERO, Vec3::ZERO);
        authority.handle_message(CLIENT, Message::RequestStateUpdate(replay), 0.2);
        assert_eq!(authority.stats().stale_dropped, 1);
        assert_eq!(
            authority.ball(0).map(|b| b.linear_velocity),
            Some(Vec3::new(6.0, 2.0, 0.0))
        );
    }

    #[test]
    fn test_first_request_cannot_teleport_the_ball() {
        let mut authority = authority();
        authority.tick(0.1, 0.1);
        authority.take_outbound();

        let jump = submitted(1, 0.11, Vec3::new(500.0, 1.0, 0.0), Vec3::ZERO);
        authority.handle_message(CLIENT, Message::RequestStateUpdate(jump), 0.11);
        authority.tick(0.2, 0.1);

        assert_eq!(
            authority.ball(0).map(|b| b.position),
            Some(Vec3::new(0.0, 1.0, 0.0))
        );
        assert_eq!(authority.stats().implausible_dropped, 1);
        assert!(state_broadcasts(&authority.take_outbound()).is_empty());
    }

    #[test]
    fn test_rejoin_does_not_reset_the_baseline() {
        let mut authority = authority();
        authority.handle_message(CLIENT, Message::JoinSession { player_id: 1 }, 0.0);
        let hit = submitted(1, 0.1, Vec3::new(0.05, 1.0, 0.0), Vec3::new(6.0, 2.0, 0.0));
        authority.handle_message(CLIENT, Message::RequestStateUpdate(hit), 0.1);
        assert_eq!(authority.stats().state_packets_applied, 1);

        authority.handle_message(CLIENT, Message::LeaveSession { player_id: 1 }, 0.2);
        authority.handle_message(CLIENT, Message::JoinSession { player_id: 1 }, 0.2);
        let jump = submitted(1, 0.25, Vec3::new(80.0, 1.0, 0.0), Vec3::new(6.0, 2.0, 0.0));
        authority.handle_message(CLIENT, Message::RequestStateUpdate(jump), 0.25);

        assert_eq!(authority.stats().implausible_dropped, 1);
        assert_eq!(
            authority.ball(0).map(|b| b.position),
            Some(Vec3::new(0.05, 1.0, 0.0))
        );
    }

    #[test]
    fn test_release_in_match_needs_the_serve() {
        let (mut authority, server, server_peer, other_peer) = joined_match(8);
        let mut held = BallState::at(Vec3::new(0.0, 1.0, 0.0));
        held.attach(server);
        authority.spawn_ball(0, held);

        let toss = submitted(1, 0.05, Vec3::new(0.0, 1.0, 0.0), Vec3::new(4.0, 2.0, 0.0));
        authority.handle_message(other_peer, Message::RequestStateUpdate(toss), 0.05);
        assert_eq!(authority.ball(0).and_then(|b| b.attached_to), Some(server));
        assert!(is_denial(&authority.take_outbound(), other_peer));

        authority.handle_message(server_peer, Message::RequestStateUpdate(toss), 0.06);
        assert_eq!(authority.ball(0).and_then(|b| b.attached_to), None);
        assert_eq!(
            authority.ball(0).map(|b| b.linear_velocity),
            Some(Vec3::new(4.0, 2.0, 0.0))
        );
    }

    #[test]
    fn test_release_from_unjoined_peer_is_refused_in_match() {
        let (mut authority, server, _, _) = joined_match(12);
        let mut held = BallState::at(Vec3::new(0.0, 1.0, 0.0));
        held.attach(server);
        authority.spawn_ball(0, held);

        let toss = submitted(1, 0.05, Vec3::new(0.0, 1.0, 0.0), Vec3::new(4.0, 2.0, 0.0));
        authority.handle_message(42, Message::RequestStateUpdate(toss), 0.05);
        assert_eq!(authority.ball(0).and_then(|b| b.attached_to), Some(server));
        assert!(is_denial(&authority.take_outbound(), 42));
    }

    #[test]
    fn test_serve_request_from_unjoined_peer_is_refused() {
        let (mut authority, server, _, _) = joined_match(9);
        authority.handle_message(42, Message::RequestServePermission { player_id: server }, 0.0);
        assert!(matches!(
            authority.take_outbound().as_slice(),
            [Outbound {
                message: Message::ServePermission { granted: false, .. },
                ..
            }]
        ));
        assert_eq!(authority.stats().requests_denied, 1);
    }

    #[test]
    fn test_join_as_taken_player_is_refused() {
        let mut authority = Authority::with_seed(RallyConfig::default(), 10);
        authority.handle_message(10, Message::JoinSession { player_id: 1 }, 0.0);
        authority.take_outbound();

        authority.handle_message(11, Message::JoinSession { player_id: 1 }, 0.0);
        assert_eq!(authority.player_for_peer(10), Some(1));
        assert_eq!(authority.player_for_peer(11), None);
        assert!(is_denial(&authority.take_outbound(), 11));
        assert_eq!(authority.arbiter().participants(), &[1]);
    }

    #[test]
    fn test_prepare_match_then_start() {
        let mut authority = Authority::with_seed(RallyConfig::default(), 11);
        authority.handle_message(10, Message::PrepareMatch, 0.0);
        assert_eq!(authority.arbiter().phase(), Phase::Practice);
        assert!(is_denial(&authority.take_outbound(), 10));

        authority.handle_message(10, Message::JoinSession { player_id: 1 }, 0.0);
        authority.handle_message(11, Message::JoinSession { player_id: 2 }, 0.0);
        authority.handle_message(10, Message::PrepareMatch, 0.0);
        assert_eq!(authority.arbiter().phase(), Phase::PreMatch);
        authority.handle_message(10, Message::StartMatch, 0.0);
        assert_eq!(authority.arbiter().phase(), Phase::InMatch);
    }

    #[test]
    fn test_remote_score_is_denied() {
        let mut authority = authority();
        authority.handle_message(CLIENT, Message::UpdateScore { scoring_player: 1 }, 0.0);
        let outbound = authority.take_outbound();
        assert!(matches!(
            outbound.as_slice(),
            [Outbound {
                message: Message::RequestDenied { .. },
                ..
            }]
        ));
    }

    #[test]
    fn test_non_admin_cannot_start_match() {
        let mut config = RallyConfig::default();
        config.matchplay.admins = vec![1];
        let mut authority = Authority::with_seed(config, 3);
        authority.handle_message(1, Message::JoinSession { player_id: 1 }, 0.0);
        authority.handle_message(2, Message::JoinSession { player_id: 2 }, 0.0);
        authority.take_outbound();

        authority.handle_message(2, Message::StartMatch, 0.0);
        assert_eq!(authority.arbiter().phase(), Phase::Practice);
        assert!(matches!(
            authority.take_outbound().as_slice(),
            [Outbound {
                message: Message::RequestDenied { .. },
                ..
            }]
        ));

        authority.handle_message(1, Message::StartMatch, 0.0);
        assert_eq!(authority.arbiter().phase(), Phase::InMatch);
    }

    #[test]
    fn test_serve_requests_are_answered() {
        let mut authority = Authority::with_seed(RallyConfig::default(), 4);
        authority.handle_message(10, Message::JoinSession { player_id: 1 }, 0.0);
        authority.handle_message(11, Message::JoinSession { player_id: 2 }, 0.0);
        authority.arbiter_mut().start_match().unwrap();
        authority.take_outbound();

        let server = authority.arbiter().state().current_server.unwrap();
        let (server_peer, other_peer, other) = if server == 1 { (10, 11, 2) } else { (11, 10, 1) };

        authority.handle_message(server_peer, Message::RequestServePermission { player_id: server }, 0.0);
        authority.handle_message(other_peer, Message::RequestServePermission { player_id: other }, 0.0);
        let replies: Vec<_> = authority
            .take_outbound()
            .into_iter()
            .filter_map(|o| match o.message {
                Message::ServePermission { granted, .. } => Some((o.target, granted)),
                _ => None,
            })
            .collect();
        assert_eq!(
            replies,
            vec![
                (crate::net::SendTarget::Peer(server_peer), true),
                (crate::net::SendTarget::Peer(other_peer), false)
            ]
        );
    }

    #[test]
    fn test_post_match_returns_to_practice_after_delay() {
        let mut config = RallyConfig::default();
        config.matchplay.max_score = 1;
        config.matchplay.enable_deuce = false;
        let mut authority = Authority::with_seed(config, 5);
        authority.set_simulate(false);
        authority.handle_message(10, Message::JoinSession { player_id: 1 }, 0.0);
        authority.handle_message(11, Message::JoinSession { player_id: 2 }, 0.0);
        authority.arbiter_mut().start_match().unwrap();
        assert_eq!(authority.record_point(1).unwrap(), None);
        assert_eq!(authority.record_point(1).unwrap(), Some(1));

        authority.tick(1.0, 0.05);
        assert_eq!(authority.arbiter().phase(), Phase::PostMatch);
        authority.tick(5.5, 0.05);
        assert_eq!(authority.arbiter().phase(), Phase::PostMatch);
        authority.tick(6.1, 0.05);
        assert_eq!(authority.arbiter().phase(), Phase::Practice);
    }

    #[test]
    fn test_match_changes_are_broadcast() {
        let mut authority = Authority::with_seed(RallyConfig::default(), 6);
        authority.set_simulate(false);
        authority.handle_message(10, Message::JoinSession { player_id: 1 }, 0.0);
        authority.handle_message(11, Message::JoinSession { player_id: 2 }, 0.0);
        authority.take_outbound();
        authority.arbiter_mut().start_match().unwrap();
        authority.record_point(1).unwrap();
        authority.record_point(2).unwrap();

        authority.tick(0.05, 0.05);
        let outbound = authority.take_outbound();
        assert!(outbound
            .iter()
            .any(|o| matches!(o.message, Message::RotateServeRight { total_points: 2, .. })));
        assert!(outbound.iter().any(|o| matches!(
            &o.message,
            Message::MatchStateUpdate(state) if state.phase == Phase::InMatch && state.total_points() == 2
        )));
    }
}
