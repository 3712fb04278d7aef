//! Simulation core shared by the server and the client.
//!
//! Both sides run the exact same physics step so that client prediction and
//! server authority only drift apart through timing and input differences,
//! never through diverging rules.

pub mod body;
pub mod input;
pub mod math;
pub mod physics;
pub mod protocol;
pub mod snapshot;
pub mod vehicle;
pub mod world;

pub use body::{radius_for_mass, BodyId, Color, MassiveBody};
pub use input::{apply_input, PlayerInput};
pub use math::Vec2;
pub use physics::PhysicsEngine;
pub use protocol::{decode, encode, CodecError, MessageType, Packet, MAX_PACKET_SIZE};
pub use snapshot::{BodyState, VehicleState, WorldSnapshot};
pub use vehicle::{Car, Rocket, Vehicle, VehicleKind, VehicleMode};
pub use world::World;

/// Identifier of a connected player. Also used as the owner tag of bodies.
pub type PlayerId = u32;

pub const G: f32 = 100.0;

pub const BASE_RADIUS_FACTOR: f32 = 100.0;
pub const REFERENCE_MASS: f32 = 50000.0;

pub const MAIN_PLANET_MASS: f32 = 50000.0;
pub const MAIN_PLANET_RADIUS: f32 = 100.0;
pub const MAIN_PLANET_X: f32 = 400.0;
pub const MAIN_PLANET_Y: f32 = 300.0;
/// Desired orbital period of the reference secondary body, in seconds.
pub const ORBIT_PERIOD: f32 = 420.0;
pub const SECONDARY_PLANET_MASS: f32 = MAIN_PLANET_MASS * 0.06;

/// Bodies lighter than this are removed by the engine.
pub const MIN_BODY_MASS: f32 = 10.0;

pub const ROCKET_MASS: f32 = 1.0;
/// Contact radius of a vehicle against a body surface.
pub const VEHICLE_COLLISION_RADIUS: f32 = 15.0;
/// Inside `radius + this` a body no longer pulls on a vehicle.
pub const GRAVITY_SKIP_RADIUS: f32 = 12.0;

pub const FRICTION: f32 = 0.98;
pub const TRANSFORM_DISTANCE: f32 = 40.0;
pub const GROUND_TOLERANCE: f32 = 2.0;
pub const ENGINE_THRUST_POWER: f32 = G * 1.875;
pub const CAR_ACCELERATION: f32 = 60.0;

/// Rotation rate, in degrees per 60Hz frame, applied while a rotate key is held.
pub const ROTATION_STEP: f32 = 6.0;
pub const REVERSE_THRUST: f32 = 0.5;
/// Upper bound accepted for an input's frame delta.
pub const MAX_INPUT_DELTA: f32 = 0.1;

pub const PROTOCOL_VERSION: u32 = 1;

/// Distance of the reference secondary body from the anchor for a circular
/// orbit of period [`ORBIT_PERIOD`].
pub fn planet_orbit_distance() -> f32 {
    let pi = std::f32::consts::PI;
    ((G * MAIN_PLANET_MASS * ORBIT_PERIOD * ORBIT_PERIOD) / (4.0 * pi * pi)).powf(1.0 / 3.0)
}

/// Speed of a circular orbit at `distance` around a body of `central_mass`.
pub fn circular_orbit_speed(central_mass: f32, distance: f32) -> f32 {
    (G * central_mass / distance).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_orbit_distance_matches_period() {
        let r = planet_orbit_distance();
        let v = circular_orbit_speed(MAIN_PLANET_MASS, r);
        let period = 2.0 * std::f32::consts::PI * r / v;
        assert_approx_eq!(period, ORBIT_PERIOD, 0.5);
    }

    #[test]
    fn test_circular_orbit_speed() {
        assert_approx_eq!(circular_orbit_speed(50000.0, 1000.0), 5000f32.sqrt(), 1e-3);
    }
}
