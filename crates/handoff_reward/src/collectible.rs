//! Grant-on-touch pickups.

use handoff_core::{LayerMask, NodeId, Scene};
use handoff_math::{Pose, Vec3};
use tracing::{debug, info, trace};

use crate::backend::RewardBackend;
use crate::client::RewardClient;

/// Only colliders carrying this tag consume collectibles.
pub const PLAYER_TAG: &str = "Player";

const COLLECTIBLE_TAG: &str = "Collectible";

/// A scene object that grants gold to the first player touching it.
///
/// Consumption is final: the node leaves the scene whether or not the grant
/// later succeeds.
#[derive(Debug, Clone)]
pub struct Collectible {
    node: NodeId,
    trigger_radius: f32,
    consumed: bool,
}

impl Collectible {
    /// Spawn a collectible at `position`.
    pub fn spawn(
        scene: &mut Scene,
        name: impl Into<String>,
        position: Vec3,
        trigger_radius: f32,
    ) -> Self {
        let node = scene.spawn(name, Pose::from_position(position));
        // Freshly spawned node.
        let _ = scene.set_tag(node, COLLECTIBLE_TAG);
        Self {
            node,
            trigger_radius,
            consumed: false,
        }
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn trigger_radius(&self) -> f32 {
        self.trigger_radius
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// `other` entered the trigger. Returns `true` if this consumed the
    /// collectible.
    pub fn on_trigger_enter<B: RewardBackend>(
        &mut self,
        other: NodeId,
        scene: &mut Scene,
        rewards: &mut RewardClient<B>,
    ) -> bool {
        if self.consumed {
            return false;
        }
        if scene.tag(other) != Some(PLAYER_TAG) {
            trace!(collectible = %self.node, %other, "ignored non-player");
            return false;
        }

        if let Err(err) = rewards.grant_reward() {
            debug!(collectible = %self.node, error = %err, "grant not started");
        }
        scene.despawn(self.node);
        self.consumed = true;
        info!(collectible = %self.node, player = %other, "collectible consumed");
        true
    }

    /// Test every collider inside the trigger sphere. Returns `true` if one
    /// of them consumed the collectible.
    pub fn check_overlaps<B: RewardBackend>(
        &mut self,
        scene: &mut Scene,
        rewards: &mut RewardClient<B>,
    ) -> bool {
        if self.consumed {
            return false;
        }
        let Some(pose) = scene.world_pose(self.node) else {
            return false;
        };
        let own = self.node;
        let touching = scene.overlap_sphere(pose.position, self.trigger_radius, LayerMask::ALL);
        touching
            .into_iter()
            .filter(|other| *other != own)
            .any(|other| self.on_trigger_enter(other, scene, rewards))
    }
}
