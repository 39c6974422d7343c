//! Rigid poses.
//!
//! A [`Pose`] is a position plus a rotation. Scene nodes store their pose
//! relative to their parent; composing poses down the hierarchy yields the
//! world pose.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid transform: translation and unit-quaternion rotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    /// Position, in the parent's space (or world space for roots).
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
}

impl Pose {
    /// The identity pose: origin, no rotation.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Create a pose from a position and rotation.
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Create a pose at `position` with no rotation.
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Express `child` (relative to `self`) in the space `self` lives in.
    #[must_use]
    pub fn compose(&self, child: &Pose) -> Pose {
        Pose {
            position: self.position + self.rotation * child.position,
            rotation: (self.rotation * child.rotation).normalize(),
        }
    }

    /// The pose that undoes `self`.
    #[must_use]
    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose {
            position: rotation * -self.position,
            rotation,
        }
    }

    /// Express the world-space `world` pose relative to `self`.
    #[must_use]
    pub fn relative(&self, world: &Pose) -> Pose {
        self.inverse().compose(world)
    }

    /// The local +Z axis rotated into this pose's space.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// Translate the pose by the given offset.
    #[must_use]
    pub fn translated(mut self, offset: Vec3) -> Self {
        self.position += offset;
        self
    }

    /// Approximate equality within `max_abs_diff` on every component.
    #[must_use]
    pub fn abs_diff_eq(&self, other: &Pose, max_abs_diff: f32) -> bool {
        self.position.abs_diff_eq(other.position, max_abs_diff)
            && (self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
                || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff))
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}
