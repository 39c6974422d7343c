//! Message types exchanged between participants and the ownership arbiter.
//!
//! Everything on the channel is an [`Envelope`]: the sender, a per-sender
//! sequence number and a [`Payload`]. Sequence numbers only order messages
//! from one sender; there is no order across senders.

use handoff_ids::{ObjectId, ParticipantId};
use handoff_math::{Pose, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Identifies one outstanding ownership request of a requester.
///
/// Unique per requester, so `(requester, RequestId)` is unique per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Request({})", self.0)
    }
}

// ── Object RPCs (reliable, buffered) ────────────────────────────────────────

/// A state change broadcast to every copy of a grabbable object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectRpc {
    /// The object is now in `holder`'s hand.
    SetHeldState {
        /// The participant holding the object.
        holder: ParticipantId,
    },
    /// The object left the hand with a velocity impulse.
    Release {
        /// World-space position at the moment of release.
        position: Vec3,
        /// World-space rotation at the moment of release.
        rotation: Quat,
        /// Linear velocity to assign.
        velocity: Vec3,
        /// The participant that threw it.
        thrower: ParticipantId,
    },
}

impl ObjectRpc {
    /// The release pose, for [`ObjectRpc::Release`].
    #[must_use]
    pub fn release_pose(&self) -> Option<Pose> {
        match self {
            Self::Release {
                position, rotation, ..
            } => Some(Pose::new(*position, *rotation)),
            Self::SetHeldState { .. } => None,
        }
    }
}

// ── Ownership arbitration ───────────────────────────────────────────────────

/// Outcome notifications published by the ownership arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipEvent {
    /// A participant asked for ownership. Emitted before the decision.
    Requested {
        /// Who asked.
        requester: ParticipantId,
        /// The requester's ticket.
        request: RequestId,
    },
    /// Ownership moved (or was re-confirmed when `new_owner == previous_owner`).
    Transferred {
        /// The participant that is now the physics authority.
        new_owner: ParticipantId,
        /// The previous authority.
        previous_owner: ParticipantId,
        /// The ticket this transfer resolves, if any.
        request: Option<RequestId>,
    },
    /// A request was denied.
    TransferFailed {
        /// The participant whose request failed.
        failed_requester: ParticipantId,
        /// The ticket this failure resolves.
        request: RequestId,
    },
}

// ── Replication stream (unbuffered) ─────────────────────────────────────────

/// The owner's view of an object's physics state for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// World pose.
    pub pose: Pose,
    /// Linear velocity.
    pub velocity: Vec3,
    /// The owner's tick counter when the snapshot was taken.
    pub tick: u64,
}

// ── Envelope ────────────────────────────────────────────────────────────────

/// The body of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// An object state change.
    Rpc {
        /// The target object.
        object: ObjectId,
        /// The state change.
        rpc: ObjectRpc,
    },
    /// A request for exclusive write-ownership, addressed to the arbiter.
    OwnershipRequest {
        /// The target object.
        object: ObjectId,
        /// Who asks.
        requester: ParticipantId,
        /// The requester's ticket.
        request: RequestId,
    },
    /// An arbitration outcome.
    Ownership {
        /// The target object.
        object: ObjectId,
        /// The outcome.
        event: OwnershipEvent,
    },
    /// Replicated physics state from the owner.
    Snapshot {
        /// The target object.
        object: ObjectId,
        /// The state.
        snapshot: StateSnapshot,
    },
    /// A participant announces itself.
    Join {
        /// The participant joining.
        participant: ParticipantId,
    },
    /// The buffered log, sent by the session host to one late joiner.
    Replay {
        /// The joiner the batch is for.
        participant: ParticipantId,
        /// Buffered envelopes, oldest first.
        envelopes: Vec<Envelope>,
    },
}

impl Payload {
    /// The object this payload concerns, if any.
    #[must_use]
    pub fn object(&self) -> Option<ObjectId> {
        match self {
            Self::Rpc { object, .. }
            | Self::OwnershipRequest { object, .. }
            | Self::Ownership { object, .. }
            | Self::Snapshot { object, .. } => Some(*object),
            Self::Join { .. } | Self::Replay { .. } => None,
        }
    }

    /// Short name used in logs and headers.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Rpc {
                rpc: ObjectRpc::SetHeldState { .. },
                ..
            } => "set_held_state",
            Self::Rpc {
                rpc: ObjectRpc::Release { .. },
                ..
            } => "release",
            Self::OwnershipRequest { .. } => "ownership_request",
            Self::Ownership { .. } => "ownership",
            Self::Snapshot { .. } => "snapshot",
            Self::Join { .. } => "join",
            Self::Replay { .. } => "replay",
        }
    }
}

/// A sequenced message from one sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Who sent it.
    pub sender: ParticipantId,
    /// Per-sender sequence number, starting at 1.
    pub seq: u64,
    /// The message body.
    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_pose() {
        let rpc = ObjectRpc::Release {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::IDENTITY,
            velocity: Vec3::Z,
            thrower: ParticipantId(1),
        };
        assert_eq!(
            rpc.release_pose(),
            Some(Pose::from_position(Vec3::new(1.0, 2.0, 3.0)))
        );
        let held = ObjectRpc::SetHeldState {
            holder: ParticipantId(1),
        };
        assert_eq!(held.release_pose(), None);
    }

    #[test]
    fn test_payload_object() {
        let join = Payload::Join {
            participant: ParticipantId(3),
        };
        assert_eq!(join.object(), None);
        let request = Payload::OwnershipRequest {
            object: ObjectId(8),
            requester: ParticipantId(3),
            request: RequestId(1),
        };
        assert_eq!(request.object(), Some(ObjectId(8)));
        assert_eq!(request.kind_name(), "ownership_request");
    }

    #[test]
    fn test_ownership_event_roundtrip() {
        let event = OwnershipEvent::Transferred {
            new_owner: ParticipantId(2),
            previous_owner: ParticipantId::SCENE,
            request: Some(RequestId(4)),
        };
        let bytes = rmp_serde::to_vec(&event).unwrap();
        let restored: OwnershipEvent = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(event, restored);
    }
}
