//! # handoff_reward
//!
//! The reward service boundary. A participant logs in with its device id,
//! learns its balance of the `"GD"` currency, and asks for gold whenever its
//! avatar walks into a collectible.
//!
//! Calls run as tokio tasks and never block the tick: [`RewardClient::poll`]
//! collects their results at the start of each tick, updates the
//! [`BalanceDisplay`] and files failures in the [`ErrorReport`].
//!
//! - [`api`] — request/reply types and constants.
//! - [`backend`] — the [`RewardBackend`] trait, over NATS or in memory.
//! - [`ledger`] — an in-memory account ledger.
//! - [`server`] — serves a ledger on the reward NATS subjects.
//! - [`client`] — the tick-side client.
//! - [`collectible`] — grant-on-touch pickups.

pub mod api;
pub mod backend;
pub mod client;
pub mod collectible;
pub mod error;
pub mod ledger;
pub mod server;

pub use api::{ApiError, CURRENCY, GRANT_FUNCTION, NEW_BALANCE_KEY, SessionTicket};
pub use backend::{InMemoryRewardBackend, NatsRewardBackend, RewardBackend};
pub use client::{BalanceDisplay, ErrorReport, ReportedError, RewardClient, RewardOp};
pub use collectible::{Collectible, PLAYER_TAG};
pub use error::RewardError;
pub use ledger::Ledger;
pub use server::RewardServer;
