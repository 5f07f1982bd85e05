//! party-node: in-process discovery and join demonstration.
//!
//! Starts two nodes on a loopback network.  The *remote* node hosts a session
//! and answers `getInfo`; the *local* node joins it, switching game mode if
//! needed, and the resulting [`JoinEvent`] is printed.
//!
//! # Usage
//!
//! ```text
//! party-node [OPTIONS]
//!
//! Options:
//!   --config     <PATH>  Node configuration file [default: party-node.toml]
//!   --map        <NAME>  Map the remote node is hosting [default: mp_foo]
//!   --gametype   <NAME>  Game type the remote node is hosting [default: dm]
//!   --mode       <WIRE>  Remote game mode: 0 zombies, 1 multiplayer, 2 campaign [default: 2]
//!   --local-mode <WIRE>  Local game mode before the join [default: 0]
//!   --stuck-mode         Local host never completes a mode switch
//! ```
//!
//! Every option can also be set through a `PARTY_*` environment variable;
//! command-line arguments take precedence.  `RUST_LOG` overrides the config
//! file's `log_level`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use party_core::GameMode;
use party_node::application::join::JoinEvent;
use party_node::infrastructure::host::SimulatedHost;
use party_node::infrastructure::network::loopback::LoopbackNetwork;
use party_node::infrastructure::runtime::{PartyService, ServiceSettings};
use party_node::infrastructure::storage::config::load_config;

const REMOTE_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 28960);
const LOCAL_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 28961);

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "party-node",
    about = "Discover a session host and join it over an in-process network",
    version
)]
struct Cli {
    /// TOML configuration file; defaults apply when it does not exist.
    #[arg(long, default_value = "party-node.toml", env = "PARTY_CONFIG")]
    config: PathBuf,

    /// Map advertised by the remote host.
    #[arg(long, default_value = "mp_foo", env = "PARTY_MAP")]
    map: String,

    /// Game type advertised by the remote host.
    #[arg(long, default_value = "dm", env = "PARTY_GAMETYPE")]
    gametype: String,

    /// Remote host's game mode, as its numeric wire value.
    #[arg(long, default_value = "2", env = "PARTY_MODE")]
    mode: String,

    /// Local game mode before joining, as its numeric wire value.
    #[arg(long, default_value = "0", env = "PARTY_LOCAL_MODE")]
    local_mode: String,

    /// Make the local host ignore mode-switch requests.
    #[arg(long, env = "PARTY_STUCK_MODE")]
    stuck_mode: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // `RUST_LOG` wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
        )
        .init();

    let settings = ServiceSettings::from(&config);
    let remote_addr = SocketAddr::from(REMOTE_ADDR);
    let local_addr = SocketAddr::from(LOCAL_ADDR);
    let net = LoopbackNetwork::new();

    // ── Remote node: hosts the session ────────────────────────────────────────
    let remote_host = SimulatedHost::hosting(
        GameMode::from_wire(&cli.mode),
        "110000100000001",
        &config.node.hostname,
        &cli.map,
        &cli.gametype,
    );
    let (transport, inbox) = net.bind(remote_addr)?;
    let (mut remote, _remote_events) =
        PartyService::start(&settings, Arc::new(transport), inbox, remote_host);

    // ── Local node: joins it ──────────────────────────────────────────────────
    let local_host = SimulatedHost::new(GameMode::from_wire(&cli.local_mode), "110000100000002");
    local_host.apply_mode_switches(!cli.stuck_mode);
    let (transport, inbox) = net.bind(local_addr)?;
    let (mut local, mut events) =
        PartyService::start(&settings, Arc::new(transport), inbox, local_host.clone());

    let join_id = local.join(remote_addr)?;
    info!(%join_id, %remote_addr, "join requested, press Ctrl-C to abort");

    // Worst case: the query times out, or it succeeds and waits out one
    // mode-switch delay.
    let deadline = settings.query_timeout + settings.sweep_interval + settings.mode_switch_delay;

    tokio::select! {
        event = tokio::time::timeout(deadline, events.recv()) => {
            match event {
                Ok(Some(event)) => report(&event, &local_host),
                Ok(None) => warn!("join event stream closed"),
                Err(_) => warn!("no join outcome within {deadline:?}"),
            }
        }
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    local.shutdown().await;
    remote.shutdown().await;
    Ok(())
}

fn report(event: &JoinEvent, host: &SimulatedHost) {
    match event {
        JoinEvent::Attached {
            target,
            mode,
            map_name,
            game_type,
            mode_confirmed,
            ..
        } => {
            println!(
                "attached to {target}: {map_name} / {game_type} ({mode}, mode confirmed: {mode_confirmed})"
            );
            println!("launch commands issued: {:?}", host.launch_log());
        }
        JoinEvent::Abandoned { target, reason, .. } => {
            println!("join to {target} abandoned: {reason}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
