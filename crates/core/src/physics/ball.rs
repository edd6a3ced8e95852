use glam::{Quat, Vec3};

use crate::net::{EntityId, ObjectId, WireStatePacket};

use super::spin::{SpinConfig, SpinState};

/// Authoritative plain state of one ball.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallState {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub spin: SpinState,
    pub attached_to: Option<EntityId>,
}

impl Default for BallState {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

impl BallState {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            spin: SpinState::NONE,
            attached_to: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached_to.is_some()
    }

    pub fn attach(&mut self, holder: EntityId) {
        self.attached_to = Some(holder);
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
    }

    /// Releases the ball into free flight.
    pub fn release(&mut self, linear_velocity: Vec3, angular_velocity: Vec3) {
        self.attached_to = None;
        self.linear_velocity = linear_velocity;
        self.angular_velocity = angular_velocity;
    }

    /// Integrates one short interval of free flight: gravity, Magnus
    /// deflection, rotation from angular velocity and spin decay.
    /// Contact response is not modelled.
    pub fn step_free_flight(&mut self, dt: f32, gravity: Vec3, spin_config: &SpinConfig) {
        if self.is_attached() {
            return;
        }

        let magnus = self
            .spin
            .compute_magnus_force(self.linear_velocity, spin_config);
        self.linear_velocity += (gravity + magnus) * dt;
        self.position += self.linear_velocity * dt;

        let spin_omega = self.angular_velocity + self.spin.angular_velocity();
        if spin_omega.length_squared() > 0.0 {
            self.rotation = (Quat::from_scaled_axis(spin_omega * dt) * self.rotation).normalize();
        }

        self.spin.decay(spin_config);
    }

    pub fn to_packet(&self, object_id: ObjectId, sequence: u32, timestamp: f64) -> WireStatePacket {
        let mut packet = WireStatePacket::new(object_id, sequence, timestamp);
        packet.set_position(self.position);
        packet.set_rotation(self.rotation.normalize());
        if !self.is_attached() {
            packet.set_velocity(self.linear_velocity, self.angular_velocity);
        }
        packet.set_attached(self.attached_to);
        packet.spin_axis = self.spin.axis().into();
        packet.spin_rate = self.spin.rate();
        packet
    }

    pub fn from_packet(packet: &WireStatePacket) -> Self {
        Self {
            position: packet.position(),
            rotation: packet.rotation(),
            linear_velocity: packet.linear_velocity(),
            angular_velocity: packet.angular_velocity(),
            spin: SpinState::from_wire(packet.spin_axis(), packet.spin_rate),
            attached_to: packet.attached_entity_id,
        }
    }
}
