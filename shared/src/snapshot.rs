//! Complete, sequence-numbered world snapshots.
//!
//! Field order of every struct here is part of the wire format: the codec
//! serializes fields in declaration order.

use crate::body::{BodyId, Color};
use crate::math::Vec2;
use crate::vehicle::VehicleKind;
use crate::PlayerId;
use serde::{Deserialize, Serialize};

/// Serializable state of one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub player_id: PlayerId,
    pub mode: VehicleKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub angular_velocity: f32,
    pub thrust_level: f32,
    pub mass: f32,
    pub color: Color,
    /// Simulation time this state describes.
    pub timestamp: f32,
    pub is_authoritative: bool,
}

/// Serializable state of one massive body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub id: BodyId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass: f32,
    pub radius: f32,
    pub color: Color,
    pub owner: Option<PlayerId>,
    pub timestamp: f32,
}

/// Full world state. Never a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldSnapshot {
    pub sequence: u32,
    pub timestamp: f32,
    /// Receivers must overwrite their state with this snapshot instead of
    /// merging it.
    pub is_authoritative: bool,
    pub vehicles: Vec<VehicleState>,
    pub bodies: Vec<BodyState>,
}

impl WorldSnapshot {
    pub fn vehicle(&self, player_id: PlayerId) -> Option<&VehicleState> {
        self.vehicles.iter().find(|v| v.player_id == player_id)
    }

    pub fn contains_vehicle(&self, player_id: PlayerId) -> bool {
        self.vehicle(player_id).is_some()
    }

    /// Whether this snapshot should be accepted after `last_accepted`.
    pub fn is_newer_than(&self, last_accepted: Option<u32>) -> bool {
        match last_accepted {
            Some(last) => self.sequence > last,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle_state(player_id: PlayerId) -> VehicleState {
        VehicleState {
            player_id,
            mode: VehicleKind::Rocket,
            position: Vec2::new(1.0, 2.0),
            velocity: Vec2::ZERO,
            rotation: 0.0,
            angular_velocity: 0.0,
            thrust_level: 0.5,
            mass: 1.0,
            color: Color::WHITE,
            timestamp: 0.0,
            is_authoritative: false,
        }
    }

    #[test]
    fn test_vehicle_lookup() {
        let snapshot = WorldSnapshot {
            vehicles: vec![vehicle_state(3), vehicle_state(7)],
            ..Default::default()
        };
        assert_eq!(snapshot.vehicle(7).map(|v| v.player_id), Some(7));
        assert!(snapshot.contains_vehicle(3));
        assert!(!snapshot.contains_vehicle(4));
    }

    #[test]
    fn test_sequence_ordering() {
        let snapshot = WorldSnapshot {
            sequence: 5,
            ..Default::default()
        };
        assert!(snapshot.is_newer_than(None));
        assert!(snapshot.is_newer_than(Some(4)));
        assert!(!snapshot.is_newer_than(Some(5)));
        assert!(!snapshot.is_newer_than(Some(6)));
    }
}
