use crate::body::MassiveBody;
use crate::snapshot::VehicleState;
use crate::vehicle::Vehicle;
use crate::{PlayerId, MAX_INPUT_DELTA, REVERSE_THRUST, ROTATION_STEP};
use serde::{Deserialize, Serialize};

/// One frame of player controls, as sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerInput {
    pub player_id: PlayerId,
    pub sequence: u32,
    pub thrust_forward: bool,
    pub thrust_backward: bool,
    pub rotate_left: bool,
    pub rotate_right: bool,
    pub switch_vehicle: bool,
    pub thrust_level: f32,
    /// Frame time the client sampled this input over.
    pub delta_time: f32,
    pub client_timestamp: f32,
    /// Latest server simulation time the client had seen.
    pub server_timestamp: f32,
    pub client_state: Option<VehicleState>,
}

impl PlayerInput {
    /// Whether every float field is finite.
    pub fn is_well_formed(&self) -> bool {
        self.thrust_level.is_finite()
            && self.delta_time.is_finite()
            && self.client_timestamp.is_finite()
            && self.server_timestamp.is_finite()
    }

    /// Frame time clamped to the range the simulation accepts.
    pub fn clamped_delta(&self) -> f32 {
        self.delta_time.clamp(0.0, MAX_INPUT_DELTA)
    }
}

/// Applies one input frame to a vehicle. Server and client both go through
/// here so a predicted frame matches the authoritative one.
///
/// The thrust level is set before any thrust is applied.
pub fn apply_input(vehicle: &mut Vehicle, input: &PlayerInput, bodies: &[MassiveBody]) {
    vehicle.set_thrust_level(input.thrust_level);

    if input.thrust_forward {
        vehicle.apply_thrust(1.0);
    }
    if input.thrust_backward {
        vehicle.apply_thrust(-REVERSE_THRUST);
    }

    let step = ROTATION_STEP * input.clamped_delta() * 60.0;
    if input.rotate_left {
        vehicle.rotate(-step);
    }
    if input.rotate_right {
        vehicle.rotate(step);
    }

    if input.switch_vehicle {
        vehicle.switch_vehicle(bodies);
    }
}
