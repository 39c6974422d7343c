//! # handoff_ids
//!
//! Identifiers shared by every layer of the handoff protocol.
//!
//! - [`ParticipantId`] — a participant in a session (the "actor number").
//! - [`ObjectId`] — a shared, network-visible object.
//! - [`IdAllocator`] — monotonically increasing allocation of both.

pub mod id;

pub use id::{IdAllocator, ObjectId, ParticipantId};
