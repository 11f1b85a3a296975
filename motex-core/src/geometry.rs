use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

/// Point or direction in scene units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero-length vector.
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len > f32::EPSILON {
            self * (1.0 / len)
        } else {
            Vec3::ZERO
        }
    }

    /// Moves `self` toward `target` by at most `max_delta` units.
    ///
    /// Lands exactly on `target` when it is within reach, so callers can use
    /// equality to detect arrival.
    pub fn move_towards(self, target: Vec3, max_delta: f32) -> Vec3 {
        let delta = target - self;
        let dist = delta.length();
        if dist == 0.0 || (max_delta >= 0.0 && dist <= max_delta) {
            return target;
        }
        self + delta * (max_delta / dist)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_towards_snaps_onto_target_within_reach() {
        let p = Vec3::new(0.0, 0.0, 0.0).move_towards(Vec3::new(0.3, 0.0, 0.0), 0.5);
        assert_eq!(p, Vec3::new(0.3, 0.0, 0.0));
    }

    #[test]
    fn move_towards_steps_by_max_delta() {
        let p = Vec3::ZERO.move_towards(Vec3::new(0.0, 4.0, 0.0), 1.0);
        assert!((p.y - 1.0).abs() < 1e-6);
        assert_eq!(p.x, 0.0);
    }

    #[test]
    fn zero_speed_never_leaves_start() {
        let p = Vec3::ZERO.move_towards(Vec3::new(1.0, 0.0, 0.0), 0.0);
        assert_eq!(p, Vec3::ZERO);
    }

    #[test]
    fn normalized_zero_is_zero() {
        assert_eq!(Vec3::ZERO.normalized(), Vec3::ZERO);
        let n = Vec3::new(3.0, 4.0, 0.0).normalized();
        assert!((n.length() - 1.0).abs() < 1e-6);
    }
}
