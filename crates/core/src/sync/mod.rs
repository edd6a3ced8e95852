mod authority;
mod replica;
mod session;

pub use authority::{Authority, ChangeMask};
pub use replica::Replica;
pub use session::Session;

use crate::event::SessionEvent;
use crate::net::{Message, PeerId, SendTarget, SyncStats};

/// A message a role wants sent at the end of the current tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: SendTarget,
    pub message: Message,
}

impl Outbound {
    pub fn broadcast(message: Message) -> Self {
        Self {
            target: SendTarget::Broadcast,
            message,
        }
    }

    pub fn to(peer: PeerId, message: Message) -> Self {
        Self {
            target: SendTarget::Peer(peer),
            message,
        }
    }
}

/// One side of a replication session. A [`Session`] feeds it decoded
/// messages, ticks it, and ships whatever it queued.
pub trait SyncRole {
    fn handle_message(&mut self, from: PeerId, message: Message, now: f64);

    fn tick(&mut self, now: f64, dt: f32);

    fn take_outbound(&mut self) -> Vec<Outbound>;

    fn take_events(&mut self) -> Vec<SessionEvent>;

    fn stats(&self) -> &SyncStats;

    fn stats_mut(&mut self) -> &mut SyncStats;

    /// Drops all per-object buffers, prediction state and pending timers.
    fn reset(&mut self);
}
