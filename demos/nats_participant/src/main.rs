//! NATS participant — one player of a handoff session.
//!
//! Start a `handoff_host` for the session first, then one participant per
//! id. Every participant builds the same scene from `--peers`. The one whose
//! avatar stands next to the ball grabs it and throws it at the scripted
//! ticks; any participant can be scripted to grab later.
//!
//! With `--rewards` the participant logs in to the reward service and walks
//! into a coin after its throw.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use demo_scene::{avatar_pose, demo_config, describe, populate, walk};
use handoff_core::{Session, TickConfig, TickInput, TickLoop};
use handoff_ids::ParticipantId;
use handoff_math::Vec3;
use handoff_net::connection::resolve_url;
use handoff_net::{EndpointRole, NatsConnection, NatsEndpoint};
use handoff_reward::{Collectible, NatsRewardBackend, RewardClient};

#[derive(Parser)]
#[command(name = "nats_participant", about = "Join a handoff session over NATS")]
struct Args {
    /// This participant's id (1 and up)
    #[arg(long)]
    id: u32,

    /// Every participant in the session, this one included
    #[arg(long, value_delimiter = ',', default_value = "1,2")]
    peers: Vec<u32>,

    /// Session name
    #[arg(short, long, default_value = "default")]
    session: String,

    /// NATS server URL
    #[arg(short, long)]
    nats_url: Option<String>,

    /// Press interact on these ticks
    #[arg(long, value_delimiter = ',', default_value = "60,150")]
    interact_at: Vec<u64>,

    /// Ticks to run; 0 runs until Ctrl-C
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    /// Log in to the reward service and collect a coin
    #[arg(long)]
    rewards: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("nats_participant=info".parse()?)
                .add_directive("demo_scene=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let me = ParticipantId(args.id);
    let everyone: Vec<ParticipantId> = args.peers.iter().copied().map(ParticipantId).collect();
    let url = resolve_url(args.nats_url.as_deref());

    let conn = NatsConnection::connect_to(&url).await?;
    let endpoint =
        NatsEndpoint::open(conn.clone(), args.session.clone(), me, EndpointRole::Participant).await?;
    let config = demo_config(&args.session).with_nats_url(url);
    let mut session = Session::new(endpoint, config);
    let root = populate(&mut session, &everyone)?;

    let mut rewards = if args.rewards {
        let mut client = RewardClient::with_random_device(Arc::new(NatsRewardBackend::new(conn)));
        client.login()?;
        Some(client)
    } else {
        None
    };
    let coin_at = avatar_pose(me).position + Vec3::new(-3.0, -0.5, 0.0);
    let mut coin = Collectible::spawn(session.scene_mut(), "coin", coin_at, 0.5);

    let tick_config = TickConfig::default().with_max_ticks(args.ticks);
    let step = tick_config.tick_duration().as_secs_f32();
    let walk_from = args.interact_at.iter().copied().max().unwrap_or(0);
    let mut tick_loop = TickLoop::new(tick_config);
    info!(participant = %me, session = %args.session, "participant starting");

    let script = |session: &mut Session<NatsEndpoint>, tick: u64| {
        if let Some(client) = rewards.as_mut() {
            client.poll();
            if tick > walk_from && !coin.is_consumed() {
                if let Err(err) = walk(session, root, Vec3::new(-2.0 * step, 0.0, 0.0)) {
                    warn!(%err, "avatar cannot move");
                }
            }
            if coin.check_overlaps(session.scene_mut(), client) {
                info!(tick, "coin collected");
            }
        }
        if tick % 60 == 0 {
            describe(session, tick);
            if let Some(client) = rewards.as_ref() {
                info!(tick, balance = %client.display().text(), "rewards");
            }
        }
        if args.interact_at.contains(&tick) {
            TickInput::INTERACT
        } else {
            TickInput::default()
        }
    };

    tokio::select! {
        ticks = tick_loop.run_async(&mut session, script) => {
            info!(ticks, "participant finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("participant interrupted");
        }
    }
    Ok(())
}
