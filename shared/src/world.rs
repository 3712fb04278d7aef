//! Arena holding every body and vehicle of one simulation.
//!
//! Bodies live in a `Vec` in insertion order. Index 0 is the anchor body;
//! everything else refers to bodies through their [`BodyId`].

use crate::body::{BodyId, Color, MassiveBody};
use crate::input::{apply_input, PlayerInput};
use crate::math::Vec2;
use crate::snapshot::BodyState;
use crate::vehicle::Vehicle;
use crate::{
    circular_orbit_speed, planet_orbit_distance, PlayerId, MAIN_PLANET_MASS, MAIN_PLANET_RADIUS,
    MAIN_PLANET_X, MAIN_PLANET_Y, SECONDARY_PLANET_MASS,
};

const ORBIT_DISTANCE_FACTORS: [f32; 9] = [0.4, 0.7, 1.0, 1.5, 2.2, 3.0, 4.0, 5.0, 6.0];
const ORBIT_MASS_FACTORS: [f32; 9] = [0.1, 0.8, 1.0, 0.5, 11.0, 9.5, 4.0, 3.8, 0.05];
const ORBIT_ANGLE_STEP: f32 = 40.0;

const PLANET_COLORS: [Color; 9] = [
    Color::rgb(160, 160, 160),
    Color::rgb(230, 190, 110),
    Color::rgb(70, 130, 220),
    Color::rgb(200, 80, 50),
    Color::rgb(210, 170, 120),
    Color::rgb(230, 210, 150),
    Color::rgb(150, 210, 230),
    Color::rgb(60, 90, 200),
    Color::rgb(190, 170, 160),
];

#[derive(Debug, Clone, Default)]
pub struct World {
    pub(crate) bodies: Vec<MassiveBody>,
    pub vehicles: Vec<Vehicle>,
    next_body_id: u32,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// The anchor plus nine bodies on circular orbits around it.
    pub fn solar_system() -> Self {
        let mut world = World::new();
        let anchor_position = Vec2::new(MAIN_PLANET_X, MAIN_PLANET_Y);
        world.add_body(MassiveBody::new(
            anchor_position,
            MAIN_PLANET_MASS,
            Some(MAIN_PLANET_RADIUS),
            Color::YELLOW,
        ));

        let base_distance = planet_orbit_distance();
        for (i, (distance_factor, mass_factor)) in ORBIT_DISTANCE_FACTORS
            .iter()
            .zip(ORBIT_MASS_FACTORS.iter())
            .enumerate()
        {
            let distance = base_distance * distance_factor;
            let angle = (i as f32 * ORBIT_ANGLE_STEP).to_radians();
            let offset = Vec2::new(angle.cos(), angle.sin()) * distance;
            let speed = circular_orbit_speed(MAIN_PLANET_MASS, distance);
            let velocity = Vec2::new(-angle.sin(), angle.cos()) * speed;

            world.add_body(
                MassiveBody::new(
                    anchor_position + offset,
                    SECONDARY_PLANET_MASS * mass_factor,
                    None,
                    PLANET_COLORS[i],
                )
                .with_velocity(velocity),
            );
        }

        world
    }

    /// Inserts a body and hands out a fresh handle for it.
    pub fn add_body(&mut self, mut body: MassiveBody) -> BodyId {
        let id = BodyId(self.next_body_id);
        self.next_body_id = self.next_body_id.saturating_add(1);
        body.id = id;
        self.bodies.push(body);
        id
    }

    /// Inserts a body under a handle assigned elsewhere, e.g. by the server.
    pub fn restore_body(&mut self, mut body: MassiveBody, id: BodyId) {
        body.id = id;
        self.next_body_id = self.next_body_id.max(id.0.saturating_add(1));
        self.bodies.push(body);
    }

    pub fn bodies(&self) -> &[MassiveBody] {
        &self.bodies
    }

    pub fn body(&self, id: BodyId) -> Option<&MassiveBody> {
        self.bodies.iter().find(|b| b.id == id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut MassiveBody> {
        self.bodies.iter_mut().find(|b| b.id == id)
    }

    pub fn anchor(&self) -> Option<&MassiveBody> {
        self.bodies.first()
    }

    pub fn remove_body(&mut self, id: BodyId) -> bool {
        let before = self.bodies.len();
        self.bodies.retain(|b| b.id != id);
        self.bodies.len() != before
    }

    pub fn vehicle(&self, player_id: PlayerId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.player_id == player_id)
    }

    pub fn vehicle_mut(&mut self, player_id: PlayerId) -> Option<&mut Vehicle> {
        self.vehicles.iter_mut().find(|v| v.player_id == player_id)
    }

    /// Adds a vehicle, replacing any existing one of the same player.
    pub fn add_vehicle(&mut self, vehicle: Vehicle) {
        match self.vehicle_mut(vehicle.player_id) {
            Some(existing) => *existing = vehicle,
            None => self.vehicles.push(vehicle),
        }
    }

    pub fn remove_vehicle(&mut self, player_id: PlayerId) -> Option<Vehicle> {
        let index = self.vehicles.iter().position(|v| v.player_id == player_id)?;
        Some(self.vehicles.remove(index))
    }

    /// Applies an input frame to the vehicle of `input.player_id`. Returns
    /// false if that player has no vehicle here.
    pub fn apply_input(&mut self, input: &PlayerInput) -> bool {
        match self
            .vehicles
            .iter_mut()
            .find(|v| v.player_id == input.player_id)
        {
            Some(vehicle) => {
                apply_input(vehicle, input, &self.bodies);
                true
            }
            None => false,
        }
    }

    pub fn body_states(&self, timestamp: f32) -> Vec<BodyState> {
        self.bodies
            .iter()
            .map(|body| BodyState {
                id: body.id,
                position: body.position,
                velocity: body.velocity,
                mass: body.mass(),
                radius: body.radius(),
                color: body.color,
                owner: body.owner,
                timestamp,
            })
            .collect()
    }

    /// Replaces every body with the given states, keeping their handles.
    pub fn replace_bodies(&mut self, states: &[BodyState]) {
        self.bodies.clear();
        for state in states {
            let body = MassiveBody::new(state.position, state.mass, Some(state.radius), state.color)
                .with_velocity(state.velocity)
                .with_owner(state.owner);
            self.restore_body(body, state.id);
        }
    }

    pub fn total_body_mass(&self) -> f32 {
        self.bodies.iter().map(|b| b.mass()).sum()
    }
}
