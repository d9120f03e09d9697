//! Core geometry types for the rally field.

use serde::{Deserialize, Serialize};

/// A 2D vector in field units (position or per-tick velocity).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    /// X component (grows to the right)
    pub x: f32,
    /// Y component (grows downward)
    pub y: f32,
}

impl Vec2 {
    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Vector of the given length at `angle` radians below the +x axis.
    #[must_use]
    pub fn from_polar(length: f32, angle: f32) -> Self {
        Self::new(length * libm::cosf(angle), length * libm::sinf(angle))
    }

    /// Euclidean length.
    #[must_use]
    pub fn magnitude(&self) -> f32 {
        libm::sqrtf(self.x * self.x + self.y * self.y)
    }
}

impl core::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl core::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

/// Dimensions of the play field in field units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSize {
    /// Field width
    pub width: u32,
    /// Field height
    pub height: u32,
}

impl FieldSize {
    /// Create a new field size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width as `f32`.
    #[inline]
    #[must_use]
    pub fn w(&self) -> f32 {
        self.width as f32
    }

    /// Height as `f32`.
    #[inline]
    #[must_use]
    pub fn h(&self) -> f32 {
        self.height as f32
    }

    /// Centre point of the field.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        Vec2::new(round_units(self.w() / 2.0), round_units(self.h() / 2.0))
    }

    /// Check that both dimensions are non-zero.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl Default for FieldSize {
    fn default() -> Self {
        Self::new(1000, 1000)
    }
}

/// Round to the nearest whole field unit.
#[inline]
#[must_use]
pub fn round_units(value: f32) -> f32 {
    libm::roundf(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_polar() {
        let v = Vec2::from_polar(20.0, core::f32::consts::FRAC_PI_4);
        assert!((v.magnitude() - 20.0).abs() < 0.01);
        assert!((v.x - v.y).abs() < 0.01);
    }

    #[test]
    fn test_field_center() {
        let field = FieldSize::new(1001, 600);
        let c = field.center();
        assert!((c.x - 501.0).abs() < 0.01);
        assert!((c.y - 300.0).abs() < 0.01);
    }
}
