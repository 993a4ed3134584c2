//! Shared entity definitions.

use serde::{Deserialize, Serialize};

/// A 2D vector in world units (x to the right, y down the map)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector
    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len > 1e-9 {
            Self { x: self.x / len, y: self.y / len }
        } else {
            Self::ZERO
        }
    }

    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn distance_to(&self, other: Vec2) -> f64 {
        (other - *self).length()
    }

    /// Perpendicular vector (rotated 90 degrees)
    pub fn perp(&self) -> Self {
        Self { x: -self.y, y: self.x }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2 { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2 { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl std::ops::Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2 { x: self.x * rhs, y: self.y * rhs }
    }
}

/// NPC behaviour state as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AiState {
    #[default]
    Idle,
    Patrol,
    Chase,
    Attack,
    Retreat,
    Search,
}

impl AiState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Patrol => "patrol",
            Self::Chase => "chase",
            Self::Attack => "attack",
            Self::Retreat => "retreat",
            Self::Search => "search",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_zero_vector() {
        assert_eq!(Vec2::ZERO.normalized(), Vec2::ZERO);
        let n = Vec2::new(3.0, 4.0).normalized();
        assert!((n.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_perp_is_orthogonal() {
        let v = Vec2::new(0.6, -0.8);
        assert!(v.dot(v.perp()).abs() < 1e-12);
    }

    #[test]
    fn test_ai_state_wire_name() {
        let json = serde_json::to_string(&AiState::Retreat).unwrap();
        assert_eq!(json, "\"retreat\"");
        assert_eq!(AiState::Search.name(), "search");
    }
}
