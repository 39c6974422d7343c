//! # handoff_core
//!
//! Distributed ownership of physically-simulated objects.
//!
//! Exactly one participant simulates a shared object at a time. Picking an
//! object up asks the ownership arbiter for authority and broadcasts the new
//! holder; throwing it broadcasts the release pose and velocity. Whether a
//! participant's copy follows replicated state is gated on two independent
//! signals, "is it held" and "am I the confirmed owner", with holding always
//! taking precedence.
//!
//! This crate provides:
//!
//! - [`scene`] — the minimal scene graph and rigid bodies the protocol drives.
//! - [`attachment`] — each participant's hand slot, resolved once.
//! - [`replication`] — the gate between an object and the replication stream.
//! - [`authority`] — the ownership arbiter and outstanding request tickets.
//! - [`grabbable`] — the per-object state machine.
//! - [`controller`] — nearest-object selection and grab/throw input handling.
//! - [`session`] — one participant's view of the session, driven per tick.
//! - [`tick`] — fixed-rate tick loop.
//! - [`config`] — session configuration.
//! - [`error`] — core error types.

pub mod attachment;
pub mod authority;
pub mod config;
pub mod controller;
pub mod error;
pub mod grabbable;
pub mod replication;
pub mod scene;
pub mod session;
pub mod tick;

pub use attachment::{AttachmentRegistry, HAND_MOUNT, HandSlot};
pub use authority::{
    ArbiterService, OwnershipArbiter, OwnershipPolicy, PendingOwnership, RequestStatus,
};
pub use config::{PhysicsConfig, PickupConfig, SessionConfig};
pub use controller::{Interaction, PickupController, select_nearest};
pub use error::CoreError;
pub use grabbable::{FlightSync, GrabContext, GrabState, GrabbableObject};
pub use replication::{ObservedView, ReplicationView};
pub use scene::{LayerMask, NodeId, RigidBody, Scene};
pub use session::{Session, TickInput, TickReport};
pub use tick::{TickConfig, TickLoop};
