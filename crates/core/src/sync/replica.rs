use std::collections::BTreeMap;

use crate::config::RallyConfig;
use crate::event::{EventQueue, MatchEvent, SessionEvent, SyncEvent};
use crate::matchplay::{Authority as MatchAuthority, MatchState, ServeArbiter};
use crate::net::{
    EnqueueOutcome, EntityId, JitterBuffer, Message, ObjectId, PeerId, SyncStats, WireStatePacket,
};
use crate::physics::{
    BallState, DisplayState, MotionPredictor, PredictionState, Reconciler, SpinState,
};

use super::{Outbound, SyncRole};

#[derive(Debug)]
struct ReplicaObject {
    buffer: JitterBuffer,
    prediction: PredictionState,
    reconciler: Reconciler,
    spin: SpinState,
    attached_to: Option<EntityId>,
    has_sample: bool,
    frozen: bool,
    last_receive: f64,
}

impl ReplicaObject {
    fn new(config: &RallyConfig, now: f64) -> Self {
        Self {
            buffer: JitterBuffer::new(config.sync.max_buffer_size, config.sync.max_packet_age_s),
            prediction: PredictionState::default(),
            reconciler: Reconciler::new(&config.prediction),
            spin: SpinState::NONE,
            attached_to: None,
            has_sample: false,
            frozen: false,
            last_receive: now,
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.prediction.reset();
        self.reconciler.reset();
        self.has_sample = false;
        self.frozen = false;
    }
}

fn authoritative_display(packet: &WireStatePacket) -> DisplayState {
    DisplayState {
        position: packet.position(),
        rotation: packet.rotation(),
        velocity: packet.linear_velocity(),
    }
}

/// Peer-side role: mirrors the authority's balls and match, predicting
/// between arrivals and smoothing corrections.
pub struct Replica {
    config: RallyConfig,
    local_player: Option<EntityId>,
    authority_peer: PeerId,
    predictor: MotionPredictor,
    objects: BTreeMap<ObjectId, ReplicaObject>,
    mirror: ServeArbiter,
    request_sequence: u32,
    outbound: Vec<Outbound>,
    events: EventQueue<SessionEvent>,
    stats: SyncStats,
}

impl Replica {
    pub fn new(config: RallyConfig, authority_peer: PeerId, local_player: Option<EntityId>) -> Self {
        Self {
            predictor: MotionPredictor::new(config.prediction.clone()),
            mirror: ServeArbiter::new(config.matchplay.clone(), MatchAuthority::Observer),
            local_player,
            authority_peer,
            objects: BTreeMap::new(),
            request_sequence: 0,
            outbound: Vec::new(),
            events: EventQueue::default(),
            stats: SyncStats::default(),
            config,
        }
    }

    pub fn local_player(&self) -> Option<EntityId> {
        self.local_player
    }

    pub fn match_state(&self) -> &MatchState {
        self.mirror.state()
    }

    /// Local answer from the mirror; the authority still has the final say.
    pub fn can_serve(&self, player_id: EntityId) -> bool {
        self.mirror.can_serve(player_id)
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn display(&self, object_id: ObjectId) -> Option<DisplayState> {
        self.objects.get(&object_id)?.reconciler.display()
    }

    pub fn prediction(&self, object_id: ObjectId) -> Option<&PredictionState> {
        self.objects.get(&object_id).map(|o| &o.prediction)
    }

    pub fn spin(&self, object_id: ObjectId) -> Option<SpinState> {
        self.objects.get(&object_id).map(|o| o.spin)
    }

    pub fn holder(&self, object_id: ObjectId) -> Option<EntityId> {
        self.objects.get(&object_id)?.attached_to
    }

    pub fn last_applied_sequence(&self, object_id: ObjectId) -> Option<u32> {
        self.objects.get(&object_id)?.buffer.last_applied()
    }

    pub fn is_frozen(&self, object_id: ObjectId) -> bool {
        self.objects.get(&object_id).is_some_and(|o| o.frozen)
    }

    pub fn join(&mut self) {
        if let Some(player_id) = self.local_player {
            self.send(Message::JoinSession { player_id });
        }
    }

    pub fn leave(&mut self) {
        if let Some(player_id) = self.local_player {
            self.send(Message::LeaveSession { player_id });
        }
    }

    pub fn request_serve(&mut self) {
        if let Some(player_id) = self.local_player {
            self.send(Message::RequestServePermission { player_id });
        }
    }

    /// Proposes a new state for a ball, e.g. after the local player hit it.
    /// The authority validates it before adopting.
    pub fn submit_state(&mut self, object_id: ObjectId, state: &BallState, timestamp: f64) {
        self.request_sequence = self.request_sequence.wrapping_add(1);
        let packet = state.to_packet(object_id, self.request_sequence, timestamp);
        self.send(Message::RequestStateUpdate(packet));
    }

    pub fn request_prepare_match(&mut self) {
        self.send(Message::PrepareMatch);
    }

    pub fn request_start_match(&mut self) {
        self.send(Message::StartMatch);
    }

    pub fn request_end_match(&mut self, winner: Option<EntityId>) {
        self.send(Message::EndMatch { winner });
    }

    pub fn request_start_practice(&mut self) {
        self.send(Message::StartPractice);
    }

    pub fn request_pause(&mut self) {
        self.send(Message::PauseMatch);
    }

    pub fn request_resume(&mut self) {
        self.send(Message::ResumeMatch);
    }

    fn send(&mut self, message: Message) {
        self.outbound.push(Outbound::to(self.authority_peer, message));
    }

    fn receive_state(&mut self, packet: WireStatePacket, now: f64) {
        let config = &self.config;
        let object = self
            .objects
            .entry(packet.object_id)
            .or_insert_with(|| ReplicaObject::new(config, now));
        object.last_receive = now;

        match object.buffer.enqueue(packet) {
            EnqueueOutcome::Queued => {}
            EnqueueOutcome::Evicted { sequence } => {
                log::debug!(
                    "jitter buffer full for object {}, evicted {}",
                    packet.object_id,
                    sequence
                );
                self.stats.evicted += 1;
            }
            EnqueueOutcome::Stale => {
                log::trace!(
                    "stale packet {} for object {}",
                    packet.sequence,
                    packet.object_id
                );
                self.stats.stale_dropped += 1;
            }
        }
    }

    fn receive_match_state(&mut self, state: MatchState) {
        let was_live = self.mirror.state().phase.is_live();
        let previous_revision = self.mirror.state().revision;
        if !self.mirror.apply_remote(state) {
            return;
        }
        log::debug!(
            "match mirror {} -> {}",
            previous_revision,
            self.mirror.state().revision
        );

        let is_live = self.mirror.state().phase.is_live();
        if was_live != is_live {
            self.reset_objects();
        }
        self.forward_mirror_events();
    }

    fn forward_mirror_events(&mut self) {
        for event in self.mirror.drain_events() {
            if event.is_notable() {
                log::info!("match: {:?}", event);
            }
            self.events.push(event.into());
        }
    }

    fn reset_objects(&mut self) {
        for object in self.objects.values_mut() {
            object.reset();
        }
    }

    fn apply_packet(object: &mut ReplicaObject, packet: WireStatePacket) -> bool {
        let holder = packet.attached_entity_id;
        let transition = object.has_sample && holder != object.attached_to;

        object.spin = SpinState::from_wire(packet.spin_axis(), packet.spin_rate);
        object.attached_to = holder;
        object.has_sample = true;

        if transition {
            object.prediction.reset();
            object.prediction.adopt(packet);
            object.reconciler.snap_to(authoritative_display(&packet));
        } else {
            object.prediction.adopt(packet);
        }
        transition
    }
}

impl SyncRole for Replica {
    fn handle_message(&mut self, from: PeerId, message: Message, now: f64) {
        if from != self.authority_peer {
            log::warn!("replica ignored {} from non-authority peer {}", message.kind(), from);
            return;
        }

        match message {
            Message::BroadcastState(packet) => self.receive_state(packet, now),
            Message::MatchStateUpdate(state) => self.receive_match_state(state),
            Message::RotateServeRight {
                server_id,
                total_points,
            } => {
                self.mirror.apply_rotation(server_id, total_points);
                self.forward_mirror_events();
            }
            Message::ServePermission {
                player_id,
                granted,
                reason,
            } => {
                let event = if granted {
                    MatchEvent::ServeGranted { player_id }
                } else {
                    let reason = reason.unwrap_or_default();
                    log::info!("serve denied for {}: {}", player_id, reason);
                    self.stats.requests_denied += 1;
                    MatchEvent::ServeDenied { player_id, reason }
                };
                self.events.push(event.into());
            }
            Message::RequestDenied { reason } => {
                log::info!("request denied: {}", reason);
                self.stats.requests_denied += 1;
                self.events.push(SyncEvent::RequestDenied { reason }.into());
            }
            other => {
                log::debug!("replica ignored {} from authority", other.kind());
            }
        }
    }

    fn tick(&mut self, now: f64, dt: f32) {
        let max_silence = self.config.sync.max_packet_age_s;

        for (&object_id, object) in self.objects.iter_mut() {
            let drained = object.buffer.drain_in_order(now);
            self.stats.aged_out += drained.aged_out as u64;
            self.stats.stale_dropped += drained.stale as u64;

            let mut last_sequence = None;
            for packet in drained.packets {
                if Self::apply_packet(object, packet) {
                    self.events.push(
                        SyncEvent::AttachmentChanged {
                            object_id,
                            holder: packet.attached_entity_id,
                        }
                        .into(),
                    );
                }
                self.stats.state_packets_applied += 1;
                last_sequence = Some(packet.sequence);
            }

            if let Some(sequence) = last_sequence {
                if object.frozen {
                    object.frozen = false;
                    log::debug!("object {} resumed", object_id);
                    self.events.push(SyncEvent::Resumed { object_id }.into());
                }
                self.events
                    .push(SyncEvent::StateApplied { object_id, sequence }.into());
            } else if !object.frozen
                && object.has_sample
                && now - object.last_receive > max_silence
            {
                object.frozen = true;
                self.stats.freezes += 1;
                log::debug!(
                    "object {} frozen after {:.2}s of silence",
                    object_id,
                    now - object.last_receive
                );
                self.events.push(SyncEvent::Frozen { object_id }.into());
            }

            if object.frozen {
                continue;
            }
            let Some(last) = object.prediction.last_applied else {
                continue;
            };

            let target = match object.prediction.advance(&self.predictor, dt) {
                Some(prediction) => DisplayState {
                    position: prediction.position,
                    rotation: prediction.rotation,
                    velocity: prediction.velocity,
                },
                // Attached: the holder drives the position.
                None => authoritative_display(&last),
            };
            object.reconciler.blend_toward(target, dt);
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
        self.reset_objects();
        self.outbound.clear();
    }
}
