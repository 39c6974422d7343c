//! Core error types.
//!
//! None of these are fatal to a session: the tick loop logs them and carries
//! on. They exist so callers of the public operations can tell why a request
//! was refused.

use handoff_ids::{ObjectId, ParticipantId};
use handoff_net::NetError;

use crate::scene::NodeId;

/// Errors raised by scene, object and session operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// No grabbable with this id exists in the session.
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    /// A grabbable with this id already exists.
    #[error("object {0} already exists")]
    DuplicateObject(ObjectId),

    /// No scene node with this id exists.
    #[error("unknown scene node {0}")]
    UnknownNode(NodeId),

    /// The node has no rigid body.
    #[error("scene node {0} has no rigid body")]
    NoBody(NodeId),

    /// Re-parenting would make a node its own ancestor.
    #[error("cannot parent {child} under its own descendant {parent}")]
    HierarchyCycle {
        /// The node being moved.
        child: NodeId,
        /// The requested parent.
        parent: NodeId,
    },

    /// `Pickup` on an object that is held or already being picked up.
    #[error("{object} is already held")]
    AlreadyHeld {
        /// The object.
        object: ObjectId,
    },

    /// `Drop` on an object that is not held.
    #[error("{object} is not held")]
    NotHeld {
        /// The object.
        object: ObjectId,
    },

    /// A participant's hand slot was registered twice.
    #[error("{0} already has a hand slot")]
    SlotAlreadyRegistered(ParticipantId),

    /// The session has no local pickup controller.
    #[error("no local pickup controller attached")]
    NoController,

    /// Publishing to the broadcast channel failed.
    #[error(transparent)]
    Net(#[from] NetError),
}
