use crate::body::MassiveBody;
use crate::math::Vec2;
use crate::world::World;
use crate::{PlayerId, FRICTION, G, GRAVITY_SKIP_RADIUS, MIN_BODY_MASS, VEHICLE_COLLISION_RADIUS};

/// Acceleration `source` imparts on a point at `target`.
///
/// Returns zero for coincident points.
pub fn gravitational_acceleration(source_position: Vec2, source_mass: f32, target: Vec2) -> Vec2 {
    let offset = source_position - target;
    let distance_sq = offset.dot(offset);
    if distance_sq == 0.0 {
        return Vec2::ZERO;
    }
    offset.normalize() * (G * source_mass / distance_sq)
}

/// Advances a [`World`] by fixed steps.
///
/// An engine scoped to a player only moves shared entities and entities that
/// player owns; the unscoped engine used by the server moves everything.
#[derive(Debug, Clone)]
pub struct PhysicsEngine {
    scope: Option<PlayerId>,
    simulate_body_gravity: bool,
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine {
    pub fn new() -> Self {
        Self {
            scope: None,
            simulate_body_gravity: true,
        }
    }

    pub fn scoped(owner: PlayerId) -> Self {
        Self {
            scope: Some(owner),
            simulate_body_gravity: true,
        }
    }

    pub fn set_scope(&mut self, scope: Option<PlayerId>) {
        self.scope = scope;
    }

    pub fn set_simulate_body_gravity(&mut self, enabled: bool) {
        self.simulate_body_gravity = enabled;
    }

    pub fn in_scope(&self, owner: Option<PlayerId>) -> bool {
        match (self.scope, owner) {
            (None, _) | (_, None) => true,
            (Some(scope), Some(owner)) => scope == owner,
        }
    }

    fn pair_in_scope(&self, a: &MassiveBody, b: &MassiveBody) -> bool {
        self.in_scope(a.owner) || self.in_scope(b.owner)
    }

    /// Runs one step: body gravity, vehicle gravity, vehicle collisions,
    /// body merges and finally integration.
    pub fn update(&self, world: &mut World, dt: f32) {
        if !(dt > 0.0 && dt.is_finite()) {
            return;
        }

        if self.simulate_body_gravity {
            self.apply_body_gravity(world, dt);
        }
        self.apply_vehicle_gravity(world, dt);
        self.resolve_vehicle_collisions(world);
        self.merge_bodies(world);
        self.integrate(world, dt);
    }

    fn apply_body_gravity(&self, world: &mut World, dt: f32) {
        let bodies = &world.bodies;
        let mut accelerations = vec![Vec2::ZERO; bodies.len()];

        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                let (a, b) = (&bodies[i], &bodies[j]);
                if !self.pair_in_scope(a, b) || a.overlaps(b) {
                    continue;
                }
                accelerations[i] += gravitational_acceleration(b.position, b.mass(), a.position);
                accelerations[j] += gravitational_acceleration(a.position, a.mass(), b.position);
            }
        }

        // The anchor attracts but is never moved.
        let moved = world.bodies.iter_mut().zip(accelerations).enumerate();
        for (index, (body, acceleration)) in moved {
            if index == 0 || !self.in_scope(body.owner) {
                continue;
            }
            body.velocity += acceleration * dt;
        }
    }

    fn apply_vehicle_gravity(&self, world: &mut World, dt: f32) {
        let bodies = &world.bodies;
        for vehicle in world.vehicles.iter_mut() {
            if !vehicle.active || !self.in_scope(Some(vehicle.player_id)) {
                continue;
            }
            let position = vehicle.position();
            let mut acceleration = Vec2::ZERO;
            for body in bodies {
                if position.distance(body.position) <= body.radius() + GRAVITY_SKIP_RADIUS {
                    continue;
                }
                acceleration += gravitational_acceleration(body.position, body.mass(), position);
            }
            vehicle.set_velocity(vehicle.velocity() + acceleration * dt);
        }
    }

    fn resolve_vehicle_collisions(&self, world: &mut World) {
        let bodies = &world.bodies;
        for vehicle in world.vehicles.iter_mut() {
            if !vehicle.active || !self.in_scope(Some(vehicle.player_id)) {
                continue;
            }
            for body in bodies {
                let contact_distance = body.radius() + VEHICLE_COLLISION_RADIUS;
                let offset = vehicle.position() - body.position;
                if offset.length() > contact_distance {
                    continue;
                }
                let normal = offset.normalize();
                if normal == Vec2::ZERO {
                    continue;
                }

                let velocity = vehicle.velocity();
                let normal_speed = velocity.dot(normal);
                if normal_speed >= 0.0 {
                    continue;
                }

                let tangential = velocity - normal * normal_speed;
                vehicle.set_velocity(tangential * FRICTION);
                vehicle.set_position(body.position + normal * contact_distance);
            }
            vehicle.check_grounding(bodies);
        }
    }

    /// The anchor at index 0 never takes part in a merge.
    fn merge_bodies(&self, world: &mut World) {
        let bodies = &mut world.bodies;
        let mut i = 1;
        while i < bodies.len() {
            let mut absorbed = false;
            let mut j = i + 1;
            while j < bodies.len() {
                if !self.pair_in_scope(&bodies[i], &bodies[j]) || !bodies[i].overlaps(&bodies[j]) {
                    j += 1;
                    continue;
                }

                let (winner, loser) = if bodies[j].mass() > bodies[i].mass() {
                    (j, i)
                } else {
                    (i, j)
                };
                let absorbed_body = bodies[loser].clone();
                absorb(&mut bodies[winner], &absorbed_body);
                log::debug!(
                    "Body {:?} absorbed body {:?}",
                    bodies[winner].id(),
                    absorbed_body.id()
                );
                bodies.remove(loser);

                if loser == i {
                    absorbed = true;
                    break;
                }
            }
            if !absorbed {
                i += 1;
            }
        }

        bodies.retain(|body| body.mass() >= MIN_BODY_MASS);
    }

    fn integrate(&self, world: &mut World, dt: f32) {
        for (index, body) in world.bodies.iter_mut().enumerate() {
            if index == 0 || !self.in_scope(body.owner) {
                continue;
            }
            body.update(dt);
        }

        for vehicle in world.vehicles.iter_mut() {
            if vehicle.active && self.in_scope(Some(vehicle.player_id)) {
                vehicle.update(dt);
            }
        }
    }
}

/// Folds `other` into `survivor`, conserving momentum.
fn absorb(survivor: &mut MassiveBody, other: &MassiveBody) {
    let total = survivor.mass() + other.mass();
    survivor.velocity =
        (survivor.velocity * survivor.mass() + other.velocity * other.mass()) / total;
    survivor.set_mass(total);
}
