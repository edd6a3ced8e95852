/// Address of a peer on the message relay.
pub type PeerId = u32;

pub type ReceiveCallback = Box<dyn FnMut(PeerId, Vec<u8>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendTarget {
    Broadcast,
    Peer(PeerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reliability {
    Unreliable,
    Reliable,
}

impl Reliability {
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::Reliable)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("transport closed")]
    Closed,
}

/// Best-effort byte delivery between peers.
///
/// Reliable sends arrive at most once; nothing is ordered across messages.
/// `on_receive` callbacks run on whatever context the relay delivers from.
pub trait Transport {
    fn local_peer(&self) -> PeerId;

    fn send(
        &mut self,
        target: SendTarget,
        reliability: Reliability,
        bytes: &[u8],
    ) -> Result<(), TransportError>;

    fn on_receive(&mut self, callback: ReceiveCallback);
}
