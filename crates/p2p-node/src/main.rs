//! p2p-node entry point.
//!
//! Runs a local node and one simulated peer device on an in-process radio
//! medium, and drives them from commands typed on stdin.
//!
//! # Usage
//!
//! ```text
//! p2p-node [OPTIONS]
//!
//! Options:
//!   --config <PATH>       TOML config file [env: P2P_CONFIG]
//!   --auto-pair           Start pairing at startup [env: P2P_AUTO_PAIR]
//!   --peer-intent <0-15>  GO intent of the simulated peer [default: 0]
//!   --json                Print command results as JSON
//! ```
//!
//! Commands (one per line): `pair` (button 0), `stop` (button 1), `status`,
//! `leave`.  `pair` is also "pressed" on the simulated peer, the way both
//! users press their buttons at about the same time.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load NodeConfig (file or defaults)
//!  └─ SimulatedAir + SimulatedIpNetwork
//!  └─ spawn_node(local), spawn_node(peer)   -- dispatcher tasks start here
//!  └─ command loop: stdin lines / Ctrl-C
//!       └─ P2pNode::handle_command
//! ```
//!
//! The echo engine uses real UDP sockets.  With a simulated radio there is
//! no real P2P interface to carry them, so the group owner address is
//! replaced by loopback.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use p2p_core::{DiscoveredPeer, GoIntent, MacAddress, PeerFilter};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use p2p_node::application::commands::NodeCommand;
use p2p_node::application::node::P2pNode;
use p2p_node::infrastructure::sim::{spawn_node, SimulatedAir, SimulatedIpNetwork};
use p2p_node::infrastructure::status::{run_command, to_json};
use p2p_node::infrastructure::storage::config::{
    load_config, load_config_from, ConfigError, NodeConfig,
};

const LOCAL_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
const PEER_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Wi-Fi Direct pairing and UDP echo diagnostics node.
#[derive(Debug, Parser)]
#[command(
    name = "p2p-node",
    about = "Wi-Fi Direct pairing and UDP echo diagnostics over a simulated radio",
    version
)]
struct Cli {
    /// Path to the TOML config file.  Defaults to the platform config
    /// directory; a missing file means built-in defaults.
    #[arg(long, env = "P2P_CONFIG")]
    config: Option<PathBuf>,

    /// Start a pairing attempt immediately.
    #[arg(long, default_value_t = false, env = "P2P_AUTO_PAIR")]
    auto_pair: bool,

    /// GO intent of the simulated peer (0 = prefer client, 15 = prefer owner).
    #[arg(long, default_value_t = 0, env = "P2P_PEER_INTENT")]
    peer_intent: u8,

    /// Print each command result as a JSON line.
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<NodeConfig> {
        match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display())),
            None => match load_config() {
                Err(ConfigError::NoPlatformConfigDir) => Ok(NodeConfig::default()),
                other => other.context("failed to load config"),
            },
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
        )
        .init();

    info!("p2p-node starting (interface {})", config.node.interface);

    // ── Simulation wiring ─────────────────────────────────────────────────────
    let mut local_cfg = config.pairing_config()?;
    local_cfg.go_address = Ipv4Addr::LOCALHOST;

    let mut peer_cfg = local_cfg.clone();
    peer_cfg.interface = "p2p-peer0".to_string();
    peer_cfg.peer_filter = PeerFilter::Any;
    peer_cfg.go_intent = GoIntent::new(cli.peer_intent)
        .with_context(|| format!("invalid --peer-intent {}", cli.peer_intent))?;

    let air = Arc::new(SimulatedAir::new());
    let network = SimulatedIpNetwork::new();
    let echo = config.echo_settings();

    let local = spawn_node(
        &air,
        &network,
        DiscoveredPeer::new(LOCAL_MAC, config.node.name.clone(), -30),
        local_cfg,
        echo.clone(),
    );
    let peer = spawn_node(
        &air,
        &network,
        DiscoveredPeer::new(PEER_MAC, "sim-peer", -52),
        peer_cfg,
        echo,
    );

    // ── Command loop ──────────────────────────────────────────────────────────
    info!("commands: pair | stop | status | leave   (Ctrl+C to quit)");
    if cli.auto_pair {
        execute(&local.node, &peer.node, NodeCommand::Pair, cli.json).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<NodeCommand>() {
                    Ok(command) => execute(&local.node, &peer.node, command, cli.json).await,
                    Err(e) => warn!("{e}"),
                },
                Ok(None) => {
                    debug!("stdin closed; waiting for Ctrl+C");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("failed to read stdin: {e}");
                    stdin_open = false;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                info!("shutdown signal received");
                break;
            }
        }
    }

    local.node.shutdown().await;
    peer.node.shutdown().await;
    info!("p2p-node stopped");
    Ok(())
}

/// Runs `command` on the local node.  A pair request is mirrored on the
/// simulated peer.
async fn execute(local: &Arc<P2pNode>, peer: &Arc<P2pNode>, command: NodeCommand, json: bool) {
    if command == NodeCommand::Pair && !local.status().session.connected {
        if let Err(e) = peer.handle_command(NodeCommand::Pair).await {
            debug!("simulated peer did not start pairing: {e}");
        }
    }

    if json {
        println!("{}", to_json(&run_command(local, command).await));
        return;
    }
    if let Err(e) = local.handle_command(command).await {
        warn!("{command} failed: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["p2p-node"]);

        // Assert
        assert!(cli.config.is_none());
        assert!(!cli.auto_pair);
        assert_eq!(cli.peer_intent, 0);
        assert!(!cli.json);
    }

    #[test]
    fn test_cli_accepts_all_flags() {
        let cli = Cli::parse_from([
            "p2p-node",
            "--config",
            "/tmp/p2p.toml",
            "--auto-pair",
            "--peer-intent",
            "15",
            "--json",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p2p.toml")));
        assert!(cli.auto_pair);
        assert_eq!(cli.peer_intent, 15);
        assert!(cli.json);
    }

    #[test]
    fn test_explicit_missing_config_falls_back_to_defaults() {
        let cli = Cli::parse_from(["p2p-node", "--config", "/nonexistent/p2p/config.toml"]);

        let cfg = cli.load_config().unwrap();

        assert_eq!(cfg, NodeConfig::default());
    }
}
