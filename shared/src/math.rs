use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Represents a vector in 2D space.
///
/// Screen convention: x grows to the right, y grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns the magnitude of the vector.
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the unit vector, or zero for a zero-length vector.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.length();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / mag, self.y / mag)
        }
    }

    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (other - *self).length()
    }

    /// Counter-clockwise perpendicular of this vector.
    pub fn perp(&self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }

    pub fn lerp(&self, target: Vec2, factor: f32) -> Vec2 {
        *self + (target - *self) * factor
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Unit vector a vehicle points along for the given rotation in degrees.
    /// Rotation 0 points up the screen.
    pub fn from_heading(degrees: f32) -> Vec2 {
        let radians = degrees.to_radians();
        Vec2::new(radians.sin(), -radians.cos())
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, other: Vec2) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, other: Vec2) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, scalar: f32) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }
}

impl Div<f32> for Vec2 {
    type Output = Vec2;

    fn div(self, scalar: f32) -> Vec2 {
        Vec2::new(self.x / scalar, self.y / scalar)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_normalize() {
        let v = Vec2::new(3.0, 4.0).normalize();
        assert_approx_eq!(v.x, 0.6);
        assert_approx_eq!(v.y, 0.8);
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
    }

    #[test]
    fn test_distance() {
        let a = Vec2::new(1.0, 1.0);
        let b = Vec2::new(4.0, 5.0);
        assert_approx_eq!(a.distance(b), 5.0);
        assert_approx_eq!(b.distance(a), 5.0);
    }

    #[test]
    fn test_heading_points_up_at_zero() {
        let up = Vec2::from_heading(0.0);
        assert_approx_eq!(up.x, 0.0);
        assert_approx_eq!(up.y, -1.0);

        let right = Vec2::from_heading(90.0);
        assert_approx_eq!(right.x, 1.0);
        assert_approx_eq!(right.y, 0.0, 1e-6);
    }

    #[test]
    fn test_lerp() {
        let a = Vec2::new(0.0, 10.0);
        let b = Vec2::new(10.0, 20.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        let mid = a.lerp(b, 0.5);
        assert_approx_eq!(mid.x, 5.0);
        assert_approx_eq!(mid.y, 15.0);
    }
}
