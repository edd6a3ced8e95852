mod inbound;
mod jitter;
mod protocol;
mod simulator;
mod stats;
mod transport;

pub use inbound::{inbound_channel, Inbound, InboundReceiver, InboundSender};
pub use jitter::{Drained, EnqueueOutcome, JitterBuffer};
pub use protocol::{
    sequence_greater_than, EntityId, Envelope, Header, Message, ObjectId, PacketError,
    WireStatePacket, MAX_PACKET_SIZE, PROTOCOL_MAGIC, PROTOCOL_VERSION,
};
pub use protocol::{ArchivedEnvelope, ArchivedMessage};
pub use simulator::{LinkConditions, SimulatedEndpoint, SimulatedNetwork, SimulatorStats};
pub use stats::SyncStats;
pub use transport::{PeerId, ReceiveCallback, Reliability, SendTarget, Transport, TransportError};
