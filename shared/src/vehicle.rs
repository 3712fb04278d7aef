//! Player vehicles and the controls that act on them.
//!
//! A vehicle is either flying (a rocket) or driving on a body surface (a car).
//! Both modes share a positional state; the active payload decides how thrust
//! and rotation are interpreted.

use crate::body::{Color, MassiveBody};
use crate::math::Vec2;
use crate::snapshot::VehicleState;
use crate::{
    PlayerId, CAR_ACCELERATION, ENGINE_THRUST_POWER, FRICTION, GROUND_TOLERANCE, ROCKET_MASS,
    TRANSFORM_DISTANCE, VEHICLE_COLLISION_RADIUS,
};
use serde::{Deserialize, Serialize};

/// Discriminant of [`VehicleMode`], as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleKind {
    Rocket,
    Car,
}

/// Flight mode: inertial thrust and inertial turning.
#[derive(Debug, Clone, PartialEq)]
pub struct Rocket {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Heading in degrees, 0 pointing up the screen.
    pub rotation: f32,
    pub angular_velocity: f32,
}

impl Rocket {
    pub fn new(position: Vec2, velocity: Vec2) -> Self {
        Self {
            position,
            velocity,
            rotation: 0.0,
            angular_velocity: 0.0,
        }
    }

    pub fn apply_thrust(&mut self, amount: f32, thrust_level: f32, mass: f32) {
        let direction = Vec2::from_heading(self.rotation);
        self.velocity += direction * (amount * thrust_level * ENGINE_THRUST_POWER / mass);
    }

    /// Turning only changes angular velocity; the heading follows through
    /// integration.
    pub fn rotate(&mut self, amount: f32) {
        self.angular_velocity += amount;
    }

    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        self.rotation += self.angular_velocity * dt;
        self.angular_velocity *= FRICTION;
    }
}

/// Ground mode: drives along the surface of the body it rests on.
#[derive(Debug, Clone, PartialEq)]
pub struct Car {
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    on_ground: bool,
    surface_normal: Vec2,
}

impl Car {
    pub fn new(position: Vec2, velocity: Vec2) -> Self {
        Self {
            position,
            velocity,
            rotation: 0.0,
            on_ground: false,
            surface_normal: Vec2::new(0.0, -1.0),
        }
    }

    pub fn from_rocket(rocket: &Rocket) -> Self {
        let mut car = Car::new(rocket.position, rocket.velocity);
        car.rotation = rocket.rotation;
        car
    }

    pub fn is_on_ground(&self) -> bool {
        self.on_ground
    }

    /// Finds a body whose surface the car is touching and aligns the car with
    /// that surface.
    pub fn check_grounding(&mut self, bodies: &[MassiveBody]) {
        let contact = bodies.iter().find(|body| {
            self.position.distance(body.position)
                <= body.radius() + VEHICLE_COLLISION_RADIUS + GROUND_TOLERANCE
        });

        match contact {
            Some(body) => {
                let normal = (self.position - body.position).normalize();
                if normal != Vec2::ZERO {
                    self.surface_normal = normal;
                    self.rotation = normal.x.atan2(-normal.y).to_degrees();
                }
                self.on_ground = true;
            }
            None => self.on_ground = false,
        }
    }

    /// Drives along the surface tangent. Has no effect while airborne.
    pub fn accelerate(&mut self, amount: f32, mass: f32) {
        if !self.on_ground {
            return;
        }
        let tangent = self.surface_normal.perp();
        self.velocity += tangent * (amount * CAR_ACCELERATION / mass);
    }

    /// On the ground the heading follows the surface, so this only turns an
    /// airborne car.
    pub fn rotate(&mut self, amount: f32) {
        if !self.on_ground {
            self.rotation += amount;
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        if self.on_ground {
            self.velocity = self.velocity * FRICTION;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VehicleMode {
    Rocket(Rocket),
    Car(Car),
}

/// A player-controlled vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub player_id: PlayerId,
    mass: f32,
    pub color: Color,
    thrust_level: f32,
    /// Simulation time of the last authoritative state applied.
    pub last_state_timestamp: f32,
    pub active: bool,
    pub mode: VehicleMode,
}

impl Vehicle {
    pub fn new(player_id: PlayerId, position: Vec2, color: Color) -> Self {
        Self {
            player_id,
            mass: ROCKET_MASS,
            color,
            thrust_level: 0.0,
            last_state_timestamp: 0.0,
            active: true,
            mode: VehicleMode::Rocket(Rocket::new(position, Vec2::ZERO)),
        }
    }

    /// Rebuilds a vehicle from a received state, regardless of timestamps.
    pub fn from_state(state: &VehicleState) -> Self {
        let mut vehicle = Vehicle::new(state.player_id, state.position, state.color);
        vehicle.overwrite_state(state);
        vehicle
    }

    pub fn kind(&self) -> VehicleKind {
        match self.mode {
            VehicleMode::Rocket(_) => VehicleKind::Rocket,
            VehicleMode::Car(_) => VehicleKind::Car,
        }
    }

    pub fn position(&self) -> Vec2 {
        match &self.mode {
            VehicleMode::Rocket(rocket) => rocket.position,
            VehicleMode::Car(car) => car.position,
        }
    }

    pub fn set_position(&mut self, position: Vec2) {
        match &mut self.mode {
            VehicleMode::Rocket(rocket) => rocket.position = position,
            VehicleMode::Car(car) => car.position = position,
        }
    }

    pub fn velocity(&self) -> Vec2 {
        match &self.mode {
            VehicleMode::Rocket(rocket) => rocket.velocity,
            VehicleMode::Car(car) => car.velocity,
        }
    }

    pub fn set_velocity(&mut self, velocity: Vec2) {
        match &mut self.mode {
            VehicleMode::Rocket(rocket) => rocket.velocity = velocity,
            VehicleMode::Car(car) => car.velocity = velocity,
        }
    }

    pub fn rotation(&self) -> f32 {
        match &self.mode {
            VehicleMode::Rocket(rocket) => rocket.rotation,
            VehicleMode::Car(car) => car.rotation,
        }
    }

    pub fn set_rotation(&mut self, rotation: f32) {
        match &mut self.mode {
            VehicleMode::Rocket(rocket) => rocket.rotation = rotation,
            VehicleMode::Car(car) => car.rotation = rotation,
        }
    }

    pub fn angular_velocity(&self) -> f32 {
        match &self.mode {
            VehicleMode::Rocket(rocket) => rocket.angular_velocity,
            VehicleMode::Car(_) => 0.0,
        }
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Returns false, leaving the mass untouched, for a non-positive mass.
    pub fn set_mass(&mut self, mass: f32) -> bool {
        if !(mass > 0.0 && mass.is_finite()) {
            return false;
        }
        self.mass = mass;
        true
    }

    pub fn thrust_level(&self) -> f32 {
        self.thrust_level
    }

    pub fn set_thrust_level(&mut self, level: f32) {
        self.thrust_level = if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, 1.0)
        };
    }

    /// Positive amounts push forward, negative ones backward.
    pub fn apply_thrust(&mut self, amount: f32) {
        let mass = self.mass;
        let thrust_level = self.thrust_level;
        match &mut self.mode {
            VehicleMode::Rocket(rocket) => rocket.apply_thrust(amount, thrust_level, mass),
            VehicleMode::Car(car) => car.accelerate(amount, mass),
        }
    }

    pub fn rotate(&mut self, amount: f32) {
        match &mut self.mode {
            VehicleMode::Rocket(rocket) => rocket.rotate(amount),
            VehicleMode::Car(car) => car.rotate(amount),
        }
    }

    pub fn update(&mut self, dt: f32) {
        match &mut self.mode {
            VehicleMode::Rocket(rocket) => rocket.update(dt),
            VehicleMode::Car(car) => car.update(dt),
        }
    }

    /// Re-evaluates ground contact of a driving vehicle.
    pub fn check_grounding(&mut self, bodies: &[MassiveBody]) {
        if let VehicleMode::Car(car) = &mut self.mode {
            car.check_grounding(bodies);
        }
    }

    pub fn is_on_ground(&self) -> bool {
        matches!(&self.mode, VehicleMode::Car(car) if car.is_on_ground())
    }

    /// Toggles between flight and ground mode. Returns whether the mode
    /// changed.
    ///
    /// Landing requires being within [`TRANSFORM_DISTANCE`] of a body
    /// surface; taking off requires the car to be on the ground, and starts
    /// the rocket at rest.
    pub fn switch_vehicle(&mut self, bodies: &[MassiveBody]) -> bool {
        match &self.mode {
            VehicleMode::Rocket(rocket) => {
                let near_surface = bodies.iter().any(|body| {
                    rocket.position.distance(body.position) <= body.radius() + TRANSFORM_DISTANCE
                });
                if !near_surface {
                    return false;
                }
                let mut car = Car::from_rocket(rocket);
                car.check_grounding(bodies);
                self.mode = VehicleMode::Car(car);
                true
            }
            VehicleMode::Car(car) => {
                if !car.is_on_ground() {
                    return false;
                }
                let mut rocket = Rocket::new(car.position, Vec2::ZERO);
                rocket.rotation = car.rotation;
                self.mode = VehicleMode::Rocket(rocket);
                true
            }
        }
    }

    pub fn create_state(&self) -> VehicleState {
        VehicleState {
            player_id: self.player_id,
            mode: self.kind(),
            position: self.position(),
            velocity: self.velocity(),
            rotation: self.rotation(),
            angular_velocity: self.angular_velocity(),
            thrust_level: self.thrust_level,
            mass: self.mass,
            color: self.color,
            timestamp: self.last_state_timestamp,
            is_authoritative: false,
        }
    }

    /// Applies `state` only if it belongs to this vehicle and is strictly
    /// newer than the last applied state. Returns whether it was applied.
    pub fn apply_state(&mut self, state: &VehicleState) -> bool {
        if state.player_id != self.player_id || state.timestamp <= self.last_state_timestamp {
            return false;
        }
        self.overwrite_state(state);
        true
    }

    /// Unconditionally replaces this vehicle's state, including its mode.
    pub fn overwrite_state(&mut self, state: &VehicleState) {
        self.mode = match state.mode {
            VehicleKind::Rocket => VehicleMode::Rocket(Rocket {
                position: state.position,
                velocity: state.velocity,
                rotation: state.rotation,
                angular_velocity: state.angular_velocity,
            }),
            VehicleKind::Car => {
                let mut car = Car::new(state.position, state.velocity);
                car.rotation = state.rotation;
                // Ground contact is re-derived on the next physics tick.
                car.on_ground = true;
                VehicleMode::Car(car)
            }
        };
        self.set_thrust_level(state.thrust_level);
        self.set_mass(state.mass);
        self.color = state.color;
        self.last_state_timestamp = state.timestamp;
    }
}
