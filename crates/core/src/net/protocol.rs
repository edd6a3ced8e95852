use glam::{Quat, Vec3};
use rkyv::{rancor, Archive, Deserialize, Serialize};

use crate::matchplay::MatchState;

use super::transport::Reliability;

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x52414C59;

/// Identifies a participant or holder (player, hand, paddle).
pub type EntityId = u64;
/// Identifies a replicated ball.
pub type ObjectId = u32;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;
const ROTATION_NORM_TOLERANCE: f32 = 0.01;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct Header {
    pub magic: u32,
    pub version: u32,
    pub sender_sequence: u32,
}

impl Header {
    pub fn new(sender_sequence: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sender_sequence,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

/// Fixed-shape sample of one ball, sent once per object per send tick.
///
/// Vectors travel as plain arrays; use the accessors to get `glam` types.
/// When `is_attached` is set the velocity fields carry no meaning and
/// receivers ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct WireStatePacket {
    pub object_id: ObjectId,
    pub sequence: u32,
    pub timestamp: f64,
    pub is_attached: bool,
    pub attached_entity_id: Option<EntityId>,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub has_velocity: bool,
    pub linear_velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub spin_axis: [f32; 3],
    pub spin_rate: f32,
}

impl WireStatePacket {
    pub fn new(object_id: ObjectId, sequence: u32, timestamp: f64) -> Self {
        Self {
            object_id,
            sequence,
            timestamp,
            is_attached: false,
            attached_entity_id: None,
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            has_velocity: false,
            linear_velocity: [0.0; 3],
            angular_velocity: [0.0; 3],
            spin_axis: [0.0; 3],
            spin_rate: 0.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation).normalize()
    }

    /// Linear velocity as receivers should see it: zero while attached or
    /// when the sender omitted velocity.
    pub fn linear_velocity(&self) -> Vec3 {
        if self.is_attached || !self.has_velocity {
            Vec3::ZERO
        } else {
            Vec3::from(self.linear_velocity)
        }
    }

    pub fn angular_velocity(&self) -> Vec3 {
        if self.is_attached || !self.has_velocity {
            Vec3::ZERO
        } else {
            Vec3::from(self.angular_velocity)
        }
    }

    pub fn spin_axis(&self) -> Vec3 {
        Vec3::from(self.spin_axis)
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position.into();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.to_array();
    }

    pub fn set_velocity(&mut self, linear: Vec3, angular: Vec3) {
        self.has_velocity = true;
        self.linear_velocity = linear.into();
        self.angular_velocity = angular.into();
    }

    pub fn set_attached(&mut self, holder: Option<EntityId>) {
        self.is_attached = holder.is_some();
        self.attached_entity_id = holder;
        if self.is_attached {
            self.has_velocity = false;
            self.linear_velocity = [0.0; 3];
            self.angular_velocity = [0.0; 3];
        }
    }

    /// Shape checks a decoded packet must pass before anything reads it.
    pub fn validate(&self) -> Result<(), PacketError> {
        let mut floats = self
            .position
            .iter()
            .chain(&self.rotation)
            .chain(&self.linear_velocity)
            .chain(&self.angular_velocity)
            .chain(&self.spin_axis)
            .chain(std::iter::once(&self.spin_rate));

        if !self.timestamp.is_finite() || floats.any(|v| !v.is_finite()) {
            return Err(PacketError::NonFinite {
                object_id: self.object_id,
            });
        }

        let norm = Quat::from_array(self.rotation).length();
        if (norm - 1.0).abs() > ROTATION_NORM_TOLERANCE {
            return Err(PacketError::Malformed(format!(
                "rotation of object {} is not a unit quaternion (norm {norm})",
                self.object_id
            )));
        }

        if self.is_attached != self.attached_entity_id.is_some() {
            return Err(PacketError::Malformed(format!(
                "object {} attachment flag disagrees with holder id",
                self.object_id
            )));
        }

        if self.spin_rate < 0.0 {
            return Err(PacketError::Malformed(format!(
                "object {} has negative spin rate",
                self.object_id
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Message {
    BroadcastState(WireStatePacket),
    RequestStateUpdate(WireStatePacket),
    JoinSession {
        player_id: EntityId,
    },
    LeaveSession {
        player_id: EntityId,
    },
    RequestServePermission {
        player_id: EntityId,
    },
    ServePermission {
        player_id: EntityId,
        granted: bool,
        reason: Option<String>,
    },
    RotateServeRight {
        server_id: EntityId,
        total_points: u32,
    },
    UpdateScore {
        scoring_player: EntityId,
    },
    MatchStateUpdate(MatchState),
    PrepareMatch,
    StartMatch,
    EndMatch {
        winner: Option<EntityId>,
    },
    StartPractice,
    PauseMatch,
    ResumeMatch,
    RequestDenied {
        reason: String,
    },
}

impl Message {
    pub fn reliability(&self) -> Reliability {
        match self {
            Self::BroadcastState(_) | Self::RequestStateUpdate(_) => Reliability::Unreliable,
            // Resent periodically, so a lost copy is recovered anyway.
            Self::MatchStateUpdate(_) => Reliability::Unreliable,
            _ => Reliability::Reliable,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BroadcastState(_) => "BroadcastState",
            Self::RequestStateUpdate(_) => "RequestStateUpdate",
            Self::JoinSession { .. } => "JoinSession",
            Self::LeaveSession { .. } => "LeaveSession",
            Self::RequestServePermission { .. } => "RequestServePermission",
            Self::ServePermission { .. } => "ServePermission",
            Self::RotateServeRight { .. } => "RotateServeRight",
            Self::UpdateScore { .. } => "UpdateScore",
            Self::MatchStateUpdate(_) => "MatchStateUpdate",
            Self::PrepareMatch => "PrepareMatch",
            Self::StartMatch => "StartMatch",
            Self::EndMatch { .. } => "EndMatch",
            Self::StartPractice => "StartPractice",
            Self::PauseMatch => "PauseMatch",
            Self::ResumeMatch => "ResumeMatch",
            Self::RequestDenied { .. } => "RequestDenied",
        }
    }

    fn validate(&self) -> Result<(), PacketError> {
        match self {
            Self::BroadcastState(packet) | Self::RequestStateUpdate(packet) => packet.validate(),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Envelope {
    pub header: Header,
    pub message: Message,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("packet of {0} bytes exceeds the {MAX_PACKET_SIZE} byte limit")]
    TooLarge(usize),
    #[error("bad header: magic {magic:#x}, version {version}")]
    BadHeader { magic: u32, version: u32 },
    #[error("non-finite field in state of object {object_id}")]
    NonFinite { object_id: ObjectId },
    #[error("malformed packet: {0}")]
    Malformed(String),
}

impl Envelope {
    pub fn new(header: Header, message: Message) -> Self {
        Self { header, message }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let bytes = rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.to_vec())
            .map_err(PacketError::Serialize)?;

        if bytes.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    /// Decodes and shape-checks an inbound datagram.
    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(data.len()));
        }

        // Transport buffers carry no alignment guarantee.
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(data);

        let envelope = rkyv::from_bytes::<Self, rancor::Error>(&aligned)
            .map_err(PacketError::Deserialize)?;

        if !envelope.header.is_valid() {
            return Err(PacketError::BadHeader {
                magic: envelope.header.magic,
                version: envelope.header.version,
            });
        }

        envelope.message.validate()?;
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> WireStatePacket {
        let mut packet = WireStatePacket::new(3, 42, 1.5);
        packet.set_position(Vec3::new(0.5, 1.2, -0.3));
        packet.set_rotation(Quat::from_rotation_y(0.7));
        packet.set_velocity(Vec3::new(4.0, 1.0, 0.0), Vec3::new(0.0, 20.0, 0.0));
        packet.spin_axis = [0.0, 1.0, 0.0];
        packet.spin_rate = 20.0;
        packet
    }

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(!sequence_greater_than(5, 5));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
    }

    #[test]
    fn test_state_packet_survives_the_wire() {
        let packet = sample_packet();
        let envelope = Envelope::new(Header::new(7), Message::BroadcastState(packet));

        let bytes = envelope.serialize().unwrap();
        let decoded = Envelope::deserialize(&bytes).unwrap();

        assert_eq!(decoded.header, envelope.header);
        match decoded.message {
            Message::BroadcastState(received) => {
                assert_eq!(received, packet);
                assert_eq!(received.spin_rate.to_bits(), packet.spin_rate.to_bits());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_attached_packet_hides_velocity() {
        let mut packet = sample_packet();
        packet.set_attached(Some(99));

        assert!(packet.is_attached);
        assert!(!packet.has_velocity);
        assert_eq!(packet.linear_velocity(), Vec3::ZERO);
        assert!(packet.validate().is_ok());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = Envelope::deserialize(&[0xde, 0xad, 0xbe, 0xef, 1, 2, 3]);
        assert!(matches!(result, Err(PacketError::Deserialize(_))));
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let mut envelope = Envelope::new(Header::new(1), Message::StartPractice);
        envelope.header.magic = 0x1234;
        let bytes = envelope.serialize().unwrap();

        assert!(matches!(
            Envelope::deserialize(&bytes),
            Err(PacketError::BadHeader { magic: 0x1234, .. })
        ));
    }

    #[test]
    fn test_non_finite_state_is_rejected() {
        let mut packet = sample_packet();
        packet.position[1] = f32::NAN;
        let bytes = Envelope::new(Header::new(1), Message::RequestStateUpdate(packet))
            .serialize()
            .unwrap();

        assert!(matches!(
            Envelope::deserialize(&bytes),
            Err(PacketError::NonFinite { object_id: 3 })
        ));
    }

    #[test]
    fn test_inconsistent_attachment_is_rejected() {
        let mut packet = sample_packet();
        packet.is_attached = true;
        packet.attached_entity_id = None;

        assert!(matches!(packet.validate(), Err(PacketError::Malformed(_))));
    }

    #[test]
    fn test_reliability_classes() {
        assert_eq!(
            Message::BroadcastState(sample_packet()).reliability(),
            Reliability::Unreliable
        );
        assert_eq!(
            Message::RotateServeRight {
                server_id: 1,
                total_points: 2
            }
            .reliability(),
            Reliability::Reliable
        );
    }
}
