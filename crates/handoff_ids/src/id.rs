//! Participant and object identifiers.
//!
//! Both identifiers are plain integers on the wire. Value `0` of
//! [`ParticipantId`] is reserved for the scene itself: objects placed in the
//! level before anyone joined start out owned by [`ParticipantId::SCENE`].

use serde::{Deserialize, Serialize};

/// A participant in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    /// Owner of scene-placed objects that nobody has claimed yet.
    pub const SCENE: ParticipantId = ParticipantId(0);

    /// The ownership arbiter's endpoint on the broadcast channel.
    pub const ARBITER: ParticipantId = ParticipantId(u32::MAX);

    /// Create a participant id from its raw actor number.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw actor number.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Returns `true` for ids that denote an actual player rather than the
    /// scene or the arbiter service.
    #[must_use]
    pub const fn is_player(self) -> bool {
        self.0 != Self::SCENE.0 && self.0 != Self::ARBITER.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::SCENE => write!(f, "Participant(scene)"),
            Self::ARBITER => write!(f, "Participant(arbiter)"),
            Self(id) => write!(f, "Participant({id})"),
        }
    }
}

/// A shared object visible to every participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Create an object id from its raw value.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Object({})", self.0)
    }
}

/// Allocates identifiers in increasing order, starting at 1.
///
/// The session host owns one allocator so that ids stay unique for the
/// lifetime of a session.
#[derive(Debug)]
pub struct IdAllocator {
    next_participant: u32,
    next_object: u64,
}

impl IdAllocator {
    /// Creates a new allocator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_participant: 1,
            next_object: 1,
        }
    }

    /// Allocates a fresh participant id.
    pub fn allocate_participant(&mut self) -> ParticipantId {
        let id = self.next_participant;
        self.next_participant += 1;
        ParticipantId(id)
    }

    /// Allocates a fresh object id.
    pub fn allocate_object(&mut self) -> ObjectId {
        let id = self.next_object;
        self.next_object += 1;
        ObjectId(id)
    }

    /// Returns how many objects have been allocated so far.
    #[must_use]
    pub fn object_count(&self) -> u64 {
        self.next_object - 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
