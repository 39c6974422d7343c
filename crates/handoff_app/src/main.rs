//! # handoff_host — session host
//!
//! Arbitrates ownership for one session and replays the buffered log to
//! participants that join late. Optionally answers the `reward.*` subjects
//! from an in-memory ledger.
//!
//! ## Startup Sequence
//!
//! 1. Connect to NATS (`--nats-url`, else `NATS_URL`, else
//!    `nats://localhost:4222`).
//! 2. Subscribe to the session's request, outcome, RPC and join subjects.
//! 3. Pump the inbox at a fixed rate until Ctrl-C.

mod config;
mod host;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use handoff_core::OwnershipPolicy;
use handoff_ids::ParticipantId;
use handoff_net::connection::resolve_url;
use handoff_net::{EndpointRole, NatsConnection, NatsEndpoint};
use handoff_reward::{Ledger, RewardServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::HostConfig;
use host::SessionHost;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    /// Every request wins.
    Takeover,
    /// Only the current owner keeps ownership.
    Fixed,
}

impl From<Policy> for OwnershipPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Takeover => Self::Takeover,
            Policy::Fixed => Self::Fixed,
        }
    }
}

#[derive(Parser)]
#[command(name = "handoff_host", about = "Ownership arbiter and replay host for a handoff session")]
struct Args {
    /// Session name
    #[arg(short, long, default_value = "default")]
    session: String,

    /// NATS server URL
    #[arg(short, long)]
    nats_url: Option<String>,

    /// Ownership policy
    #[arg(short, long, value_enum, default_value = "takeover")]
    policy: Policy,

    /// Serve reward requests, granting this much gold per call
    #[arg(long)]
    rewards: Option<i64>,

    /// Inbox pumps per second
    #[arg(long, default_value_t = 60.0)]
    rate: f64,
}

impl Args {
    fn into_config(self) -> HostConfig {
        let config = HostConfig::new(self.session)
            .with_nats_url(self.nats_url)
            .with_policy(self.policy.into())
            .with_pump_rate(self.rate);
        match self.rewards {
            Some(amount) => config.with_rewards(amount),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("handoff_host=info".parse()?))
        .init();

    let config = Args::parse().into_config();
    let instance = uuid::Uuid::new_v4();
    info!(%instance, session = %config.session, "session host starting");

    let conn = NatsConnection::connect_to(&resolve_url(config.nats_url.as_deref())).await?;

    if config.serve_rewards {
        let ledger = Arc::new(Ledger::new(config.grant_amount));
        let server = RewardServer::new(ledger, conn.clone());
        tokio::spawn(async move {
            if let Err(err) = server.run().await {
                error!(%err, "reward service stopped");
            }
        });
        info!(grant = config.grant_amount, "serving rewards");
    }

    let endpoint = NatsEndpoint::open(
        conn,
        config.session.clone(),
        ParticipantId::ARBITER,
        EndpointRole::Host,
    )
    .await?;

    let mut host = SessionHost::new(endpoint, config.policy);
    host.run(config.pump_interval(), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to listen for Ctrl-C");
        }
    })
    .await;

    info!(%instance, "session host shut down");
    Ok(())
}
