//! Throw velocity.

use glam::Vec3;

/// Velocity for a throw along `forward`, tilted upwards by `lift` to give a
/// parabolic arc: `normalize(forward + up * lift) * force`.
///
/// A degenerate direction (zero forward with zero lift) yields zero velocity.
#[must_use]
pub fn throw_velocity(forward: Vec3, lift: f32, force: f32) -> Vec3 {
    (forward + Vec3::Y * lift).normalize_or_zero() * force
}
