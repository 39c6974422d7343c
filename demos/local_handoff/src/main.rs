//! Local handoff — two participants and the arbiter on one in-process bus.
//!
//! Alice picks the ball up, throws it towards Bob and then walks into a coin,
//! which grants her gold from an in-memory ledger. Bob picks the ball up
//! where it landed. Once a second both participants log what they see.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use demo_scene::{describe, demo_config, populate, walk};
use handoff_core::{
    ArbiterService, NodeId, OwnershipArbiter, OwnershipPolicy, Session, TickConfig, TickInput,
};
use handoff_ids::ParticipantId;
use handoff_math::Vec3;
use handoff_net::{LocalBus, LocalEndpoint};
use handoff_reward::{Collectible, InMemoryRewardBackend, Ledger, RewardClient};

const ALICE: ParticipantId = ParticipantId(1);
const BOB: ParticipantId = ParticipantId(2);

#[derive(Parser)]
#[command(name = "local_handoff", about = "Hand a ball over between two in-process participants")]
struct Args {
    /// Ticks to simulate
    #[arg(long, default_value_t = 360)]
    ticks: u64,

    /// Gold granted per coin
    #[arg(long, default_value_t = 10)]
    grant: i64,

    /// Ticks per second
    #[arg(long, default_value_t = 60.0)]
    rate: f64,
}

fn participant(bus: &LocalBus, me: ParticipantId) -> Result<(Session<LocalEndpoint>, NodeId)> {
    let mut session = Session::new(bus.join(me)?, demo_config("local"));
    let root = populate(&mut session, &[ALICE, BOB])?;
    Ok((session, root))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("local_handoff=info".parse()?)
                .add_directive("demo_scene=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let dt = TickConfig::default().with_tick_rate(args.rate).tick_duration();

    let bus = LocalBus::new();
    let arbiter = OwnershipArbiter::new(OwnershipPolicy::Takeover).with_auto_register(true);
    let mut arbiter = ArbiterService::new(arbiter, bus.join(ParticipantId::ARBITER)?);
    let (mut alice, alice_root) = participant(&bus, ALICE)?;
    let (mut bob, _) = participant(&bus, BOB)?;

    let ledger = Arc::new(Ledger::new(args.grant));
    let backend = Arc::new(InMemoryRewardBackend::new(Arc::clone(&ledger)));
    let mut rewards = RewardClient::with_random_device(backend);
    rewards.login()?;
    let mut coin = Collectible::spawn(alice.scene_mut(), "coin", Vec3::new(-3.0, 0.5, 0.0), 0.5);

    info!(ticks = args.ticks, "local handoff starting");
    let mut interval = tokio::time::interval(dt);
    for tick in 1..=args.ticks {
        interval.tick().await;
        arbiter.pump()?;
        rewards.poll();

        // Alice grabs on tick 20 and throws on tick 90; Bob grabs on tick 240.
        let alice_input = if tick == 20 || tick == 90 {
            TickInput::INTERACT
        } else {
            TickInput::default()
        };
        let bob_input = if tick == 240 {
            TickInput::INTERACT
        } else {
            TickInput::default()
        };

        if tick > 120 && !coin.is_consumed() {
            walk(&mut alice, alice_root, Vec3::new(-2.0 * dt.as_secs_f32(), 0.0, 0.0))?;
        }

        alice.tick(dt.as_secs_f32(), &alice_input);
        bob.tick(dt.as_secs_f32(), &bob_input);
        coin.check_overlaps(alice.scene_mut(), &mut rewards);

        if tick % 60 == 0 {
            describe(&alice, tick);
            describe(&bob, tick);
            info!(tick, balance = %rewards.display().text(), "alice");
        }
    }

    // Let the last reward call land.
    tokio::task::yield_now().await;
    rewards.poll();
    info!(
        balance = %rewards.display().text(),
        errors = rewards.errors().len(),
        "local handoff done"
    );
    Ok(())
}
