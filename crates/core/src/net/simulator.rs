use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::transport::{PeerId, ReceiveCallback, Reliability, SendTarget, Transport, TransportError};

/// Impairments applied to messages delivered to one peer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConditions {
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl LinkConditions {
    pub fn is_perfect(&self) -> bool {
        self.loss_percent <= 0.0 && self.max_latency_ms == 0 && self.jitter_ms == 0
    }

    fn should_drop(&self, rng: &mut StdRng) -> bool {
        self.loss_percent > 0.0 && rng.gen_range(0.0..100.0) < self.loss_percent
    }

    fn delay_secs(&self, rng: &mut StdRng) -> f64 {
        let base = self.min_latency_ms.min(self.max_latency_ms);
        let range = self.max_latency_ms.saturating_sub(base);
        let spread = if range > 0 { rng.gen_range(0..=range) } else { 0 };
        let jitter = if self.jitter_ms > 0 {
            rng.gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        f64::from(base + spread + jitter) / 1000.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatorStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
}

struct DelayedMessage {
    release_time: f64,
    order: u64,
    from: PeerId,
    to: PeerId,
    bytes: Vec<u8>,
}

impl PartialEq for DelayedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DelayedMessage {}

impl PartialOrd for DelayedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_time
            .total_cmp(&self.release_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

struct Hub {
    rng: StdRng,
    now: f64,
    next_order: u64,
    peers: Vec<PeerId>,
    conditions: HashMap<PeerId, LinkConditions>,
    callbacks: HashMap<PeerId, ReceiveCallback>,
    in_flight: BinaryHeap<DelayedMessage>,
    stats: SimulatorStats,
}

impl Hub {
    fn route(&mut self, from: PeerId, to: PeerId, reliability: Reliability, bytes: &[u8]) {
        self.stats.sent += 1;
        let conditions = self.conditions.get(&to).cloned().unwrap_or_default();

        if !reliability.is_reliable() && conditions.should_drop(&mut self.rng) {
            self.stats.dropped += 1;
            return;
        }

        let release_time = self.now + conditions.delay_secs(&mut self.rng);
        let order = self.next_order;
        self.next_order += 1;

        self.in_flight.push(DelayedMessage {
            release_time,
            order,
            from,
            to,
            bytes: bytes.to_vec(),
        });
    }
}

/// In-memory message relay with per-peer loss, latency and jitter.
///
/// Time only moves through [`SimulatedNetwork::advance_to`], which makes runs
/// reproducible for a given seed.
#[derive(Clone)]
pub struct SimulatedNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl SimulatedNetwork {
    pub fn new(seed: u64) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub {
                rng: StdRng::seed_from_u64(seed),
                now: 0.0,
                next_order: 0,
                peers: Vec::new(),
                conditions: HashMap::new(),
                callbacks: HashMap::new(),
                in_flight: BinaryHeap::new(),
                stats: SimulatorStats::default(),
            })),
        }
    }

    pub fn endpoint(&self, peer: PeerId) -> SimulatedEndpoint {
        let mut hub = self.lock();
        if !hub.peers.contains(&peer) {
            hub.peers.push(peer);
        }
        SimulatedEndpoint {
            peer,
            hub: Arc::clone(&self.hub),
        }
    }

    pub fn set_conditions(&self, peer: PeerId, conditions: LinkConditions) {
        let mut hub = self.lock();
        if conditions.is_perfect() {
            hub.conditions.remove(&peer);
        } else {
            hub.conditions.insert(peer, conditions);
        }
    }

    /// Cuts a peer off: nothing further is delivered to or from it.
    pub fn disconnect(&self, peer: PeerId) {
        let mut hub = self.lock();
        hub.peers.retain(|&p| p != peer);
        hub.callbacks.remove(&peer);
        let remaining: Vec<DelayedMessage> = hub
            .in_flight
            .drain()
            .filter(|m| m.to != peer && m.from != peer)
            .collect();
        hub.in_flight.extend(remaining);
    }

    /// Moves the clock forward and delivers every message now due.
    pub fn advance_to(&self, now: f64) -> usize {
        let mut hub = self.lock();
        hub.now = hub.now.max(now);

        let mut delivered = 0;
        while hub
            .in_flight
            .peek()
            .is_some_and(|m| m.release_time <= hub.now)
        {
            let Some(message) = hub.in_flight.pop() else {
                break;
            };
            if let Some(callback) = hub.callbacks.get_mut(&message.to) {
                callback(message.from, message.bytes);
                delivered += 1;
            }
        }
        hub.stats.delivered += delivered as u64;
        delivered
    }

    pub fn now(&self) -> f64 {
        self.lock().now
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn stats(&self) -> SimulatorStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SimulatedEndpoint {
    peer: PeerId,
    hub: Arc<Mutex<Hub>>,
}

impl Transport for SimulatedEndpoint {
    fn local_peer(&self) -> PeerId {
        self.peer
    }

    fn send(
        &mut self,
        target: SendTarget,
        reliability: Reliability,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        let mut hub = self.hub.lock().unwrap_or_else(PoisonError::into_inner);
        if !hub.peers.contains(&self.peer) {
            return Err(TransportError::Closed);
        }

        match target {
            SendTarget::Peer(to) => {
                if !hub.peers.contains(&to) {
                    return Err(TransportError::UnknownPeer(to));
                }
                hub.route(self.peer, to, reliability, bytes);
            }
            SendTarget::Broadcast => {
                let recipients: Vec<PeerId> = hub
                    .peers
                    .iter()
                    .copied()
                    .filter(|&p| p != self.peer)
                    .collect();
                for to in recipients {
                    hub.route(self.peer, to, reliability, bytes);
                }
            }
        }
        Ok(())
    }

    fn on_receive(&mut self, callback: ReceiveCallback) {
        let mut hub = self.hub.lock().unwrap_or_else(PoisonError::into_inner);
        hub.callbacks.insert(self.peer, callback);
    }
}
