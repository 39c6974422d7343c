//! Session configuration.

use handoff_math::Vec3;

use crate::scene::LayerMask;

/// The layer grabbables live on unless configured otherwise.
pub const INTERACT_LAYER: u8 = 6;

/// Tuning for the pickup controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickupConfig {
    /// Radius of the sphere searched for grabbables around the participant.
    pub radius: f32,
    /// Layers the pickup search considers.
    pub interact_layer: LayerMask,
    /// Speed of a throw.
    pub throw_force: f32,
    /// Upward component mixed into the throw direction before normalising.
    pub throw_lift: f32,
}

impl Default for PickupConfig {
    fn default() -> Self {
        Self {
            radius: 2.0,
            interact_layer: LayerMask::layer(INTERACT_LAYER),
            throw_force: 15.0,
            throw_lift: 0.2,
        }
    }
}

/// Parameters of the scene's ballistic step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConfig {
    /// Acceleration applied to dynamic bodies.
    pub gravity: Vec3,
    /// Height of the ground plane.
    pub ground_height: f32,
    /// Fraction of horizontal speed lost per second while on the ground.
    pub ground_friction: f32,
    /// Below this speed a grounded body is considered at rest.
    pub rest_speed: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            ground_height: 0.0,
            ground_friction: 4.0,
            rest_speed: 0.05,
        }
    }
}

/// Configuration for one participant's session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session name; scopes the NATS subjects.
    pub session: String,
    /// Pickup controller tuning.
    pub pickup: PickupConfig,
    /// Scene step parameters.
    pub physics: PhysicsConfig,
    /// Optional NATS URL override (defaults to `NATS_URL` env or localhost).
    pub nats_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

impl SessionConfig {
    /// Create a config for the named session with default tuning.
    #[must_use]
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            pickup: PickupConfig::default(),
            physics: PhysicsConfig::default(),
            nats_url: None,
        }
    }

    /// Override the pickup tuning.
    #[must_use]
    pub fn with_pickup(mut self, pickup: PickupConfig) -> Self {
        self.pickup = pickup;
        self
    }

    /// Override the scene step parameters.
    #[must_use]
    pub fn with_physics(mut self, physics: PhysicsConfig) -> Self {
        self.physics = physics;
        self
    }

    /// Override the NATS URL.
    #[must_use]
    pub fn with_nats_url(mut self, url: impl Into<String>) -> Self {
        self.nats_url = Some(url.into());
        self
    }
}
