use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// A simple 2D vector in world space.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    /// Creates a new Vec2.
    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    /// Creates a zero vector.
    pub fn zero() -> Self {
        Vec2 { x: 0.0, y: 0.0 }
    }

    /// Calculates the squared length (magnitude) of the vector.
    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Calculates the length (magnitude) of the vector.
    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Returns a normalized version of the vector (unit vector).
    /// Returns a zero vector if the original vector's length is zero.
    pub fn normalize_or_zero(&self) -> Self {
        let len_sq = self.length_squared();
        if len_sq > 1e-24 {
            let inv_len = 1.0 / len_sq.sqrt();
            Vec2 { x: self.x * inv_len, y: self.y * inv_len }
        } else {
            Vec2::zero()
        }
    }

    /// Calculates the dot product with another vector.
    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Calculates the squared distance to another point.
    pub fn distance_squared(&self, other: Vec2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Calculates the distance to another point.
    pub fn distance(&self, other: Vec2) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Scales the vector by a scalar value.
    pub fn scale(&self, scalar: f64) -> Self {
        Vec2 { x: self.x * scalar, y: self.y * scalar }
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self { x: self.x + other.x, y: self.y + other.y }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self { x: self.x - other.x, y: self.y - other.y }
    }
}

/// Converts an angle (in radians) to a unit vector.
pub fn angle_to_vec(angle_rad: f64) -> Vec2 {
    Vec2::new(angle_rad.cos(), angle_rad.sin())
}

/// Converts a vector to an angle (in radians).
/// Uses atan2 for quadrant correctness.
pub fn vec_to_angle(vec: Vec2) -> f64 {
    vec.y.atan2(vec.x)
}

/// Clamps a value between a minimum and maximum.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Axis-aligned ellipse that bounds the simulated region.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub center: Vec2,
    pub radius_x: f64,
    pub radius_y: f64,
}

impl Ellipse {
    pub fn new(center_x: f64, center_y: f64, radius_x: f64, radius_y: f64) -> Self {
        Ellipse { center: Vec2::new(center_x, center_y), radius_x, radius_y }
    }

    /// `((x-cx)/rx)^2 + ((y-cy)/ry)^2`; 1.0 on the boundary.
    #[inline]
    pub fn normalized_distance_sq(&self, p: Vec2) -> f64 {
        let dx = (p.x - self.center.x) / self.radius_x;
        let dy = (p.y - self.center.y) / self.radius_y;
        dx * dx + dy * dy
    }

    /// True for points inside or on the boundary.
    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        self.normalized_distance_sq(p) <= 1.0
    }

    /// Outward (unnormalized) boundary normal at `p`: the gradient of the implicit equation.
    #[inline]
    pub fn gradient(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            2.0 * (p.x - self.center.x) / (self.radius_x * self.radius_x),
            2.0 * (p.y - self.center.y) / (self.radius_y * self.radius_y),
        )
    }

    /// Horizontal extent `(min_x, max_x)`.
    pub fn x_bounds(&self) -> (f64, f64) {
        (self.center.x - self.radius_x, self.center.x + self.radius_x)
    }

    /// The rightmost point of the ellipse, `(cx + rx, cy)`.
    pub fn rightmost_tip(&self) -> Vec2 {
        Vec2::new(self.center.x + self.radius_x, self.center.y)
    }
}
