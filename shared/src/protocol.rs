//! Wire format of every datagram.
//!
//! A datagram is a little-endian `u32` message tag followed by the
//! bincode-encoded payload of that message type. Messages without a payload
//! consist of the tag alone.

use crate::input::PlayerInput;
use crate::snapshot::WorldSnapshot;
use crate::PlayerId;
use thiserror::Error;

/// Largest datagram either side will send or accept.
pub const MAX_PACKET_SIZE: usize = 8192;

const TAG_SIZE: usize = std::mem::size_of::<u32>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    GameState = 1,
    PlayerInput = 2,
    PlayerId = 3,
    Heartbeat = 4,
    Disconnect = 5,
    Join = 6,
    ClientSimulation = 7,
    ServerValidation = 8,
    PlayerLeft = 9,
}

impl TryFrom<u32> for MessageType {
    type Error = CodecError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        Ok(match tag {
            1 => MessageType::GameState,
            2 => MessageType::PlayerInput,
            3 => MessageType::PlayerId,
            4 => MessageType::Heartbeat,
            5 => MessageType::Disconnect,
            6 => MessageType::Join,
            7 => MessageType::ClientSimulation,
            8 => MessageType::ServerValidation,
            9 => MessageType::PlayerLeft,
            other => return Err(CodecError::UnknownMessageType(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Periodic world broadcast from the server.
    GameState(WorldSnapshot),
    PlayerInput(PlayerInput),
    /// Identity assigned to a client that joined.
    PlayerId(PlayerId),
    Heartbeat,
    Disconnect,
    Join { client_version: u32 },
    /// A client's own view of its vehicle, uploaded for validation.
    ClientSimulation(WorldSnapshot),
    /// Server verdict on a client simulation; authoritative when it is a
    /// correction.
    ServerValidation(WorldSnapshot),
    PlayerLeft(PlayerId),
}

impl Packet {
    pub fn message_type(&self) -> MessageType {
        match self {
            Packet::GameState(_) => MessageType::GameState,
            Packet::PlayerInput(_) => MessageType::PlayerInput,
            Packet::PlayerId(_) => MessageType::PlayerId,
            Packet::Heartbeat => MessageType::Heartbeat,
            Packet::Disconnect => MessageType::Disconnect,
            Packet::Join { .. } => MessageType::Join,
            Packet::ClientSimulation(_) => MessageType::ClientSimulation,
            Packet::ServerValidation(_) => MessageType::ServerValidation,
            Packet::PlayerLeft(_) => MessageType::PlayerLeft,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("datagram of {0} bytes is too short for a message tag")]
    Truncated(usize),

    #[error("unknown message type {0}")]
    UnknownMessageType(u32),

    #[error("malformed payload: {0}")]
    Payload(#[from] bincode::Error),

    #[error("encoded message of {0} bytes exceeds the datagram limit")]
    TooLarge(usize),
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let mut data = (packet.message_type() as u32).to_le_bytes().to_vec();

    match packet {
        Packet::GameState(snapshot)
        | Packet::ClientSimulation(snapshot)
        | Packet::ServerValidation(snapshot) => bincode::serialize_into(&mut data, snapshot)?,
        Packet::PlayerInput(input) => bincode::serialize_into(&mut data, input)?,
        Packet::PlayerId(id) | Packet::PlayerLeft(id) => bincode::serialize_into(&mut data, id)?,
        Packet::Join { client_version } => bincode::serialize_into(&mut data, client_version)?,
        Packet::Heartbeat | Packet::Disconnect => {}
    }

    if data.len() > MAX_PACKET_SIZE {
        return Err(CodecError::TooLarge(data.len()));
    }
    Ok(data)
}

pub fn decode(data: &[u8]) -> Result<Packet, CodecError> {
    if data.len() < TAG_SIZE {
        return Err(CodecError::Truncated(data.len()));
    }
    let (tag, payload) = data.split_at(TAG_SIZE);
    let tag = u32::from_le_bytes([tag[0], tag[1], tag[2], tag[3]]);

    Ok(match MessageType::try_from(tag)? {
        MessageType::GameState => Packet::GameState(bincode::deserialize(payload)?),
        MessageType::PlayerInput => Packet::PlayerInput(bincode::deserialize(payload)?),
        MessageType::PlayerId => Packet::PlayerId(bincode::deserialize(payload)?),
        MessageType::Heartbeat => Packet::Heartbeat,
        MessageType::Disconnect => Packet::Disconnect,
        MessageType::Join => Packet::Join {
            client_version: bincode::deserialize(payload)?,
        },
        MessageType::ClientSimulation => Packet::ClientSimulation(bincode::deserialize(payload)?),
        MessageType::ServerValidation => Packet::ServerValidation(bincode::deserialize(payload)?),
        MessageType::PlayerLeft => Packet::PlayerLeft(bincode::deserialize(payload)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyId, Color};
    use crate::math::Vec2;
    use crate::snapshot::{BodyState, VehicleState};
    use crate::vehicle::VehicleKind;

    fn snapshot() -> WorldSnapshot {
        WorldSnapshot {
            sequence: 42,
            timestamp: 2.1,
            is_authoritative: true,
            vehicles: vec![VehicleState {
                player_id: 3,
                mode: VehicleKind::Car,
                position: Vec2::new(10.0, -20.0),
                velocity: Vec2::new(0.5, 0.25),
                rotation: 45.0,
                angular_velocity: 0.0,
                thrust_level: 0.75,
                mass: 1.0,
                color: Color::RED,
                timestamp: 2.1,
                is_authoritative: true,
            }],
            bodies: vec![BodyState {
                id: BodyId(0),
                position: Vec2::new(400.0, 300.0),
                velocity: Vec2::ZERO,
                mass: 50000.0,
                radius: 100.0,
                color: Color::YELLOW,
                owner: None,
                timestamp: 2.1,
            }],
        }
    }

    #[test]
    fn test_tag_is_little_endian_prefix() {
        let data = encode(&Packet::PlayerId(7)).unwrap();
        assert_eq!(&data[..4], &[3, 0, 0, 0]);
        assert_eq!(&data[4..], &[7, 0, 0, 0]);

        let data = encode(&Packet::Heartbeat).unwrap();
        assert_eq!(data, vec![4, 0, 0, 0]);
    }

    #[test]
    fn test_snapshot_header_layout() {
        let data = encode(&Packet::GameState(snapshot())).unwrap();
        assert_eq!(&data[4..8], &42u32.to_le_bytes());
        assert_eq!(&data[8..12], &2.1f32.to_le_bytes());
        assert_eq!(data[12], 1);
        // Collections carry a u64 element count.
        assert_eq!(&data[13..21], &1u64.to_le_bytes());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let original = snapshot();
        for packet in [
            Packet::GameState(original.clone()),
            Packet::ClientSimulation(original.clone()),
            Packet::ServerValidation(original.clone()),
        ] {
            let decoded = decode(&encode(&packet).unwrap()).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_input_round_trip() {
        let input = PlayerInput {
            player_id: 9,
            sequence: 12,
            thrust_forward: true,
            rotate_left: true,
            thrust_level: 0.5,
            delta_time: 0.016,
            client_timestamp: 3.0,
            server_timestamp: 2.95,
            client_state: snapshot().vehicles.pop(),
            ..Default::default()
        };
        let packet = Packet::PlayerInput(input);
        assert_eq!(decode(&encode(&packet).unwrap()).unwrap(), packet);
    }

    #[test]
    fn test_rejects_short_datagram() {
        assert!(matches!(decode(&[1, 0]), Err(CodecError::Truncated(2))));
    }

    #[test]
    fn test_rejects_unknown_tag() {
        assert!(matches!(
            decode(&[99, 0, 0, 0]),
            Err(CodecError::UnknownMessageType(99))
        ));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let mut data = encode(&Packet::GameState(snapshot())).unwrap();
        data.truncate(data.len() - 10);
        assert!(matches!(decode(&data), Err(CodecError::Payload(_))));
    }

    #[test]
    fn test_rejects_oversized_message() {
        let mut big = snapshot();
        big.bodies = vec![big.bodies[0].clone(); 400];
        assert!(matches!(
            encode(&Packet::GameState(big)),
            Err(CodecError::TooLarge(_))
        ));
    }
}
