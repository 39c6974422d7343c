//! The gate between a grabbable and the replication stream.
//!
//! A [`ReplicationView`] lists the views an object is observed through. While
//! the list is empty the object neither writes snapshots nor applies remote
//! ones, which is what "network physics off" means.

use handoff_ids::ParticipantId;
use handoff_math::{Pose, Vec3};
use handoff_net::StateSnapshot;

/// One replicated aspect of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedView {
    /// World pose.
    Transform,
    /// Linear velocity.
    Rigidbody,
}

/// Which views of an object are replicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationView {
    observed: Vec<ObservedView>,
    transform_enabled: bool,
    rigidbody_enabled: bool,
    last_applied: Option<(ParticipantId, u64)>,
}

impl Default for ReplicationView {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationView {
    /// A view observing both transform and rigid body.
    #[must_use]
    pub fn new() -> Self {
        let mut view = Self {
            observed: Vec::new(),
            transform_enabled: false,
            rigidbody_enabled: false,
            last_applied: None,
        };
        view.set_active(true);
        view
    }

    /// Observe both views and enable them, or clear and disable everything.
    pub fn set_active(&mut self, active: bool) {
        self.observed.clear();
        if active {
            self.observed
                .extend([ObservedView::Transform, ObservedView::Rigidbody]);
        }
        self.transform_enabled = active;
        self.rigidbody_enabled = active;
    }

    /// Returns `true` if the object takes part in replication.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.observed.is_empty() && (self.transform_enabled || self.rigidbody_enabled)
    }

    /// The views currently observed.
    #[must_use]
    pub fn observed(&self) -> &[ObservedView] {
        &self.observed
    }

    /// Snapshot the object's state, if replication is active.
    #[must_use]
    pub fn capture(&self, pose: Pose, velocity: Vec3, tick: u64) -> Option<StateSnapshot> {
        self.is_active().then_some(StateSnapshot {
            pose,
            velocity,
            tick,
        })
    }

    /// Decide whether a remote snapshot from `sender` may be applied.
    ///
    /// Refused while inactive, and for snapshots older than the last one
    /// applied from the same sender.
    pub fn accept(&mut self, sender: ParticipantId, snapshot: &StateSnapshot) -> bool {
        if !self.is_active() {
            return false;
        }
        if let Some((last_sender, last_tick)) = self.last_applied {
            if last_sender == sender && snapshot.tick <= last_tick {
                return false;
            }
        }
        self.last_applied = Some((sender, snapshot.tick));
        true
    }

    /// Which parts of a snapshot apply: `(pose, velocity)`.
    #[must_use]
    pub fn applies(&self) -> (bool, bool) {
        (
            self.transform_enabled && self.observed.contains(&ObservedView::Transform),
            self.rigidbody_enabled && self.observed.contains(&ObservedView::Rigidbody),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tick: u64) -> StateSnapshot {
        StateSnapshot {
            pose: Pose::IDENTITY,
            velocity: Vec3::ZERO,
            tick,
        }
    }

    #[test]
    fn test_inactive_clears_views() {
        let mut view = ReplicationView::new();
        assert_eq!(view.observed().len(), 2);
        view.set_active(false);
        assert!(view.observed().is_empty());
        assert!(!view.is_active());
        assert_eq!(view.applies(), (false, false));
        assert!(view.capture(Pose::IDENTITY, Vec3::ZERO, 1).is_none());
    }

    #[test]
    fn test_inactive_refuses_remote_state() {
        let mut view = ReplicationView::new();
        view.set_active(false);
        assert!(!view.accept(ParticipantId(2), &snapshot(1)));
        view.set_active(true);
        assert!(view.accept(ParticipantId(2), &snapshot(1)));
    }

    #[test]
    fn test_stale_snapshots_are_refused() {
        let mut view = ReplicationView::new();
        assert!(view.accept(ParticipantId(2), &snapshot(5)));
        assert!(!view.accept(ParticipantId(2), &snapshot(5)));
        assert!(!view.accept(ParticipantId(2), &snapshot(4)));
        // A different owner has its own clock.
        assert!(view.accept(ParticipantId(3), &snapshot(1)));
    }
}
