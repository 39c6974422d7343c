//! # handoff_net
//!
//! Transport layer for the handoff protocol.
//!
//! This crate provides:
//!
//! - [`messages`] — the envelope and payload types exchanged by participants.
//! - [`codec`] — envelope wire encoding.
//! - [`event_log`] — the buffered log replayed to late joiners.
//! - [`bus`] — the [`Broadcast`] endpoint trait and the in-process [`LocalBus`].
//! - [`nats`] — a [`Broadcast`] endpoint backed by NATS.
//! - [`subjects`] — NATS subject builders.
//! - [`connection`] — NATS connection management.
//! - [`error`] — network-layer error types.

pub mod bus;
pub mod codec;
pub mod connection;
pub mod error;
pub mod event_log;
pub mod messages;
pub mod nats;
pub mod subjects;

pub use bus::{Broadcast, LocalBus, LocalEndpoint, Sequencer};
pub use codec::{decode, decode_envelope, encode};
pub use connection::NatsConnection;
pub use error::NetError;
pub use event_log::{BufferedLog, LogKind};
pub use messages::{Envelope, ObjectRpc, OwnershipEvent, Payload, RequestId, StateSnapshot};
pub use nats::{EndpointRole, NatsEndpoint};
