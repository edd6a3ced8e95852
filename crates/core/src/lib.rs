pub mod anticheat;
pub mod config;
pub mod event;
pub mod matchplay;
pub mod net;
pub mod physics;
pub mod simulation;
pub mod sync;

pub use anticheat::{AntiCheatConfig, StateValidator, Violation};
pub use config::{ConfigError, RallyConfig, SyncConfig};
pub use event::{EventQueue, MatchEvent, SessionEvent, SyncEvent};
pub use matchplay::{Authority as MatchAuthority, MatchConfig, MatchError, MatchState, Phase, ServeArbiter};
pub use net::{
    EntityId, Envelope, JitterBuffer, LinkConditions, Message, ObjectId, PacketError, PeerId,
    Reliability, SendTarget, SimulatedEndpoint, SimulatedNetwork, SyncStats, Transport,
    TransportError, WireStatePacket,
};
pub use physics::{
    BallState, DisplayState, MotionPredictor, PredictionConfig, PredictionState, Reconciler,
    SpinConfig, SpinState,
};
pub use simulation::{FixedTimestep, TimerQueue};
pub use sync::{Authority, Outbound, Replica, Session, SyncRole};
