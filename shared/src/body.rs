use crate::math::Vec2;
use crate::{PlayerId, BASE_RADIUS_FACTOR, REFERENCE_MASS};
use serde::{Deserialize, Serialize};

/// Stable handle of a body inside a [`crate::World`] arena.
///
/// Handles are never reused, so a handle held across a merge either still
/// resolves to the same body or resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u32);

/// RGBA color. Purely cosmetic, carried through the simulation untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Radius implied by a mass: cube-root scaling around the reference mass.
pub fn radius_for_mass(mass: f32) -> f32 {
    BASE_RADIUS_FACTOR * (mass / REFERENCE_MASS).powf(1.0 / 3.0)
}

/// A planet-like body that attracts everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct MassiveBody {
    pub(crate) id: BodyId,
    pub position: Vec2,
    pub velocity: Vec2,
    mass: f32,
    radius: f32,
    pub color: Color,
    /// `None` marks a shared body every simulation advances.
    pub owner: Option<PlayerId>,
}

impl MassiveBody {
    /// Creates a body at rest. A positive `radius` is kept until the mass next
    /// changes; anything else derives the radius from `mass`.
    ///
    /// Non-positive masses are replaced by a tiny positive one so the body is
    /// still valid; the engine removes it on the next tick.
    pub fn new(position: Vec2, mass: f32, radius: Option<f32>, color: Color) -> Self {
        let mass = if mass > 0.0 && mass.is_finite() {
            mass
        } else {
            f32::MIN_POSITIVE
        };
        let radius = match radius {
            Some(r) if r > 0.0 => r,
            _ => radius_for_mass(mass),
        };

        Self {
            id: BodyId(0),
            position,
            velocity: Vec2::ZERO,
            mass,
            radius,
            color,
            owner: None,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_owner(mut self, owner: Option<PlayerId>) -> Self {
        self.owner = owner;
        self
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Sets the mass and re-derives the radius from it.
    ///
    /// Returns false, leaving the body untouched, for a non-positive or
    /// non-finite mass.
    pub fn set_mass(&mut self, mass: f32) -> bool {
        if !(mass > 0.0 && mass.is_finite()) {
            return false;
        }
        self.mass = mass;
        self.radius = radius_for_mass(mass);
        true
    }

    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
    }

    pub fn overlaps(&self, other: &MassiveBody) -> bool {
        self.position.distance(other.position) <= self.radius + other.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_reference_mass_has_base_radius() {
        assert_approx_eq!(radius_for_mass(REFERENCE_MASS), BASE_RADIUS_FACTOR, 1e-3);
    }

    #[test]
    fn test_radius_derived_when_not_given() {
        let body = MassiveBody::new(Vec2::ZERO, 6250.0, None, Color::WHITE);
        // (6250 / 50000)^(1/3) = 0.5
        assert_approx_eq!(body.radius(), 50.0, 1e-3);
    }

    #[test]
    fn test_explicit_radius_kept_until_mass_changes() {
        let mut body = MassiveBody::new(Vec2::ZERO, 50000.0, Some(42.0), Color::WHITE);
        assert_eq!(body.radius(), 42.0);

        assert!(body.set_mass(400000.0));
        assert_approx_eq!(body.radius(), 200.0, 1e-2);
    }

    #[test]
    fn test_set_mass_derives_radius() {
        let mut body = MassiveBody::new(Vec2::ZERO, 100.0, None, Color::WHITE);
        for mass in [1.0, 10.0, 3000.0, 50000.0, 123456.0] {
            assert!(body.set_mass(mass));
            assert_approx_eq!(body.radius(), radius_for_mass(mass), 1e-4);
        }
    }

    #[test]
    fn test_set_mass_rejects_non_positive() {
        let mut body = MassiveBody::new(Vec2::ZERO, 100.0, None, Color::WHITE);
        let radius = body.radius();
        assert!(!body.set_mass(0.0));
        assert!(!body.set_mass(-5.0));
        assert!(!body.set_mass(f32::NAN));
        assert_eq!(body.mass(), 100.0);
        assert_eq!(body.radius(), radius);
    }

    #[test]
    fn test_update_integrates_position() {
        let mut body = MassiveBody::new(Vec2::ZERO, 100.0, None, Color::WHITE)
            .with_velocity(Vec2::new(2.0, -4.0));
        body.update(0.5);
        assert_approx_eq!(body.position.x, 1.0);
        assert_approx_eq!(body.position.y, -2.0);
    }
}
