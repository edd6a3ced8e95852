use crate::event::{EventQueue, SessionEvent, SyncEvent};
use crate::net::{
    inbound_channel, Envelope, Header, Inbound, InboundReceiver, PeerId, SyncStats, Transport,
};

use super::{Outbound, SyncRole};

/// Binds one role to one transport for the lifetime of a session.
///
/// Inbound bytes land in a queue from whatever context the transport
/// delivers on. They are only decoded and applied inside [`Session::tick`].
pub struct Session<R: SyncRole, T: Transport> {
    role: R,
    transport: T,
    inbound: InboundReceiver,
    events: EventQueue<SessionEvent>,
    send_sequence: u32,
    active: bool,
}

impl<R: SyncRole, T: Transport> Session<R, T> {
    pub fn new(role: R, mut transport: T) -> Self {
        let (sender, inbound) = inbound_channel();
        transport.on_receive(Box::new(move |from, bytes| {
            sender.push(from, bytes);
        }));
        log::debug!("session opened on peer {}", transport.local_peer());

        Self {
            role,
            transport,
            inbound,
            events: EventQueue::default(),
            send_sequence: 0,
            active: true,
        }
    }

    pub fn role(&self) -> &R {
        &self.role
    }

    pub fn role_mut(&mut self) -> &mut R {
        &mut self.role
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn local_peer(&self) -> PeerId {
        self.transport.local_peer()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stats(&self) -> &SyncStats {
        self.role.stats()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain()
    }

    /// Drain inbound, run the role, flush outbound.
    pub fn tick(&mut self, now: f64, dt: f32) {
        if !self.active {
            return;
        }

        for Inbound { from, bytes } in self.inbound.drain() {
            self.role.stats_mut().messages_received += 1;
            match Envelope::deserialize(&bytes) {
                Ok(envelope) => self.role.handle_message(from, envelope.message, now),
                Err(err) => {
                    log::warn!("dropped malformed packet from peer {}: {}", from, err);
                    self.role.stats_mut().malformed_dropped += 1;
                    self.events.push(SyncEvent::MalformedPacket { from }.into());
                }
            }
        }

        self.role.tick(now, dt);
        self.flush();

        for event in self.role.take_events() {
            self.events.push(event);
        }
    }

    /// Sends anything the role has queued without waiting for the next tick.
    pub fn flush(&mut self) {
        for outbound in self.role.take_outbound() {
            self.send(outbound);
        }
    }

    fn send(&mut self, outbound: Outbound) {
        let Outbound { target, message } = outbound;
        let reliability = message.reliability();
        let kind = message.kind();

        self.send_sequence = self.send_sequence.wrapping_add(1);
        let envelope = Envelope::new(Header::new(self.send_sequence), message);
        let bytes = match envelope.serialize() {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("failed to encode {}: {}", kind, err);
                self.role.stats_mut().send_failures += 1;
                return;
            }
        };

        match self.transport.send(target, reliability, &bytes) {
            Ok(()) => self.role.stats_mut().messages_sent += 1,
            Err(err) => {
                log::warn!("failed to send {} to {:?}: {}", kind, target, err);
                self.role.stats_mut().send_failures += 1;
            }
        }
    }

    /// Tears the session down. Outbound messages already queued (a final
    /// `LeaveSession`, say) still go out; unread inbound traffic is discarded
    /// and the role drops all per-object state and timers.
    pub fn end(&mut self) {
        if !self.active {
            return;
        }
        self.flush();
        self.inbound.drain();
        self.role.reset();
        self.events.clear();
        self.active = false;
        log::info!(
            "session on peer {} ended: {}",
            self.transport.local_peer(),
            self.role.stats()
        );
    }
}
