//! Hand slots.
//!
//! Each participant exposes one attachment point, the node named
//! [`HAND_MOUNT`] somewhere under its root. The slot is resolved once when the
//! participant is registered and addressed by [`ParticipantId`] afterwards, so
//! receiving a `SetHeldState` never searches the hierarchy.

use std::collections::HashMap;

use handoff_ids::ParticipantId;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::scene::{NodeId, Scene};

/// Name of the node a held object is parented to. Exact and case-sensitive.
pub const HAND_MOUNT: &str = "HandMount";

/// A participant's resolved hand slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandSlot {
    /// The participant's root node.
    pub root: NodeId,
    /// The `HandMount` node, if the root's subtree has one.
    pub frame: Option<NodeId>,
}

/// Maps participants to their hand slots.
#[derive(Debug, Default)]
pub struct AttachmentRegistry {
    slots: HashMap<ParticipantId, HandSlot>,
}

impl AttachmentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `participant`'s hand slot under `root` and remember it.
    ///
    /// A participant without a `HandMount` node is still registered; objects
    /// it picks up stay unparented.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SlotAlreadyRegistered`] if the participant has a
    /// slot, or [`CoreError::UnknownNode`] if `root` does not exist.
    pub fn register(
        &mut self,
        participant: ParticipantId,
        root: NodeId,
        scene: &Scene,
    ) -> Result<HandSlot, CoreError> {
        if self.slots.contains_key(&participant) {
            return Err(CoreError::SlotAlreadyRegistered(participant));
        }
        if !scene.contains(root) {
            return Err(CoreError::UnknownNode(root));
        }

        let frame = scene.find_descendant(root, HAND_MOUNT);
        match frame {
            Some(frame) => debug!(%participant, %frame, "hand slot registered"),
            None => warn!(%participant, %root, "no {HAND_MOUNT} under participant root"),
        }
        let slot = HandSlot { root, frame };
        self.slots.insert(participant, slot);
        Ok(slot)
    }

    /// Forget a participant's slot.
    pub fn unregister(&mut self, participant: ParticipantId) -> Option<HandSlot> {
        self.slots.remove(&participant)
    }

    /// The participant's slot.
    #[must_use]
    pub fn slot(&self, participant: ParticipantId) -> Option<&HandSlot> {
        self.slots.get(&participant)
    }

    /// The node a participant's held objects attach to.
    #[must_use]
    pub fn hand_frame(&self, participant: ParticipantId) -> Option<NodeId> {
        self.slots.get(&participant).and_then(|slot| slot.frame)
    }

    /// Number of registered participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no participant is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use handoff_math::Pose;

    use super::*;

    #[test]
    fn test_register_resolves_hand_mount() {
        let mut scene = Scene::new();
        let root = scene.spawn("avatar", Pose::IDENTITY);
        let hand = scene.spawn_child(root, HAND_MOUNT, Pose::IDENTITY).unwrap();

        let mut slots = AttachmentRegistry::new();
        let slot = slots.register(ParticipantId(1), root, &scene).unwrap();
        assert_eq!(slot.frame, Some(hand));
        assert_eq!(slots.hand_frame(ParticipantId(1)), Some(hand));
    }

    #[test]
    fn test_register_without_hand_mount() {
        let mut scene = Scene::new();
        let root = scene.spawn("avatar", Pose::IDENTITY);
        scene.spawn_child(root, "handmount", Pose::IDENTITY).unwrap();

        let mut slots = AttachmentRegistry::new();
        slots.register(ParticipantId(1), root, &scene).unwrap();
        assert_eq!(slots.hand_frame(ParticipantId(1)), None);
        assert!(slots.slot(ParticipantId(1)).is_some());
    }

    #[test]
    fn test_register_twice_fails() {
        let mut scene = Scene::new();
        let root = scene.spawn("avatar", Pose::IDENTITY);
        let mut slots = AttachmentRegistry::new();
        slots.register(ParticipantId(1), root, &scene).unwrap();
        assert!(matches!(
            slots.register(ParticipantId(1), root, &scene),
            Err(CoreError::SlotAlreadyRegistered(_))
        ));
    }
}
