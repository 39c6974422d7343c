//! # handoff_math
//!
//! Math types for the handoff protocol. Re-exports [`glam`] for linear
//! algebra and defines [`Pose`], the rigid transform carried by release
//! commands and replication snapshots.

pub mod pose;
pub mod throw;

// Re-export glam types for convenience.
pub use glam::{EulerRot, Quat, Vec3};

pub use pose::Pose;
pub use throw::throw_velocity;
