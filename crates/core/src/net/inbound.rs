use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use super::transport::PeerId;

#[derive(Debug, Clone)]
pub struct Inbound {
    pub from: PeerId,
    pub bytes: Vec<u8>,
}

/// Producer half, handed to the transport's receive callback.
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: UnboundedSender<Inbound>,
}

/// Consumer half, drained once at the start of the owning role's tick.
#[derive(Debug)]
pub struct InboundReceiver {
    rx: UnboundedReceiver<Inbound>,
}

pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboundSender { tx }, InboundReceiver { rx })
}

impl InboundSender {
    /// Returns false once the receiving session is gone.
    pub fn push(&self, from: PeerId, bytes: Vec<u8>) -> bool {
        self.tx.send(Inbound { from, bytes }).is_ok()
    }
}

impl InboundReceiver {
    pub fn drain(&mut self) -> Vec<Inbound> {
        let mut messages = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(message) => messages.push(message),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        messages
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
