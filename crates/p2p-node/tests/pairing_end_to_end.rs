//! End-to-end tests: two nodes on a simulated radio pair with each other and
//! run the UDP echo test over loopback.
//!
//! # Purpose
//!
//! These tests drive `P2pNode` through its public API exactly as `main.rs`
//! does.  They verify:
//!
//! - The happy path: the node with intent 15 becomes group owner, the node
//!   with intent 0 becomes client, and the client's echo run completes with
//!   every datagram accounted for.
//! - Teardown: a peer leaving stops the echo server on the other side, or
//!   cancels an echo client that has not started yet.
//! - Pairing again after a peer left.
//! - Stopping an unbounded echo run on request.
//! - The edge cases: nobody to pair with, and equal intents.
//!
//! # Timing
//!
//! All protocol delays are shortened to tens of milliseconds.  The echo
//! sockets are real, so these tests run on the real clock.
//!
//! ```text
//! node A (intent 15)                    node B (intent 0)
//! ──────────────────                    ─────────────────
//! discover ─────────── air ──────────── discover
//! connect(B) ─── NegotiationRequest ──▶ gate released
//!                                       connect(A)
//! ApEnableResult(0)  ◀── negotiation ──▶ ConnectResult(-1), ConnectResult(0)
//! static IP, pool, echo server          address bound ─▶ echo client
//! ```

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use p2p_core::{DiscoveredPeer, GoIntent, MacAddress, P2pRole, P2pState};
use p2p_node::application::commands::NodeCommand;
use p2p_node::application::node::CommandOutcome;
use p2p_node::application::orchestrator::{PairingConfig, PairingOutcome};
use p2p_node::application::ports::EchoService;
use p2p_node::infrastructure::echo::EchoSettings;
use p2p_node::infrastructure::sim::{
    spawn_node, SimulatedAir, SimulatedIpNetwork, SimulatedNode,
};

const MAC_A: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 0x0a]);
const MAC_B: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 0x0b]);

// ── Helpers ───────────────────────────────────────────────────────────────────

fn fast_pairing(intent: u8, interface: &str) -> PairingConfig {
    PairingConfig {
        interface: interface.to_string(),
        discovery_wait: Duration::from_millis(200),
        find_stop_delay: Duration::from_millis(20),
        go_neg_request_wait: Duration::from_millis(300),
        group_formation_timeout: Duration::from_secs(3),
        ap_sta_connected_timeout: Duration::from_secs(1),
        handshake_wait: Duration::from_millis(50),
        dhcp_start_delay: Duration::ZERO,
        client_connect_delay: Duration::from_millis(50),
        go_intent: GoIntent::new(intent).unwrap(),
        go_address: Ipv4Addr::LOCALHOST,
        ..PairingConfig::default()
    }
}

fn fast_echo(port: u16, count: u32) -> EchoSettings {
    EchoSettings {
        port,
        packet_size: 64,
        interval: Duration::from_millis(20),
        count,
        recv_timeout: Duration::from_millis(500),
        stop_grace: Duration::from_secs(1),
    }
}

/// A UDP port nobody is using right now.
fn free_port() -> u16 {
    let socket = UdpSocket::bind("0.0.0.0:0").unwrap();
    socket.local_addr().unwrap().port()
}

struct Pair {
    _air: Arc<SimulatedAir>,
    net: Arc<SimulatedIpNetwork>,
    a: SimulatedNode,
    b: SimulatedNode,
}

fn two_nodes(intent_a: u8, intent_b: u8, count: u32) -> Pair {
    two_nodes_with(intent_a, intent_b, count, |_| {})
}

/// Like [`two_nodes`], with a hook to adjust node B's pairing parameters.
fn two_nodes_with(
    intent_a: u8,
    intent_b: u8,
    count: u32,
    tweak_b: impl FnOnce(&mut PairingConfig),
) -> Pair {
    let mut config_b = fast_pairing(intent_b, "p2p-b");
    tweak_b(&mut config_b);
    let air = Arc::new(SimulatedAir::new());
    let net = SimulatedIpNetwork::new();
    let port = free_port();
    let a = spawn_node(
        &air,
        &net,
        DiscoveredPeer::new(MAC_A, "node-a", -40),
        fast_pairing(intent_a, "p2p-a"),
        fast_echo(port, count),
    );
    let b = spawn_node(
        &air,
        &net,
        DiscoveredPeer::new(MAC_B, "node-b", -50),
        config_b,
        fast_echo(port, count),
    );
    Pair {
        _air: air,
        net,
        a,
        b,
    }
}

/// Polls `check` every 20 ms for up to `limit`.
async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

// ── Happy path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_owner_and_client_pair_and_complete_echo_run() {
    // Arrange
    let pair = two_nodes(15, 0, 5);

    // Act
    let (outcome_a, outcome_b) = tokio::join!(pair.a.node.pair(), pair.b.node.pair());

    // Assert: roles.
    assert_eq!(outcome_a.unwrap(), PairingOutcome::GroupOwner);
    assert_eq!(outcome_b.unwrap(), PairingOutcome::Client);
    let a = pair.a.node.status().session;
    let b = pair.b.node.status().session;
    assert_eq!(a.role, P2pRole::GroupOwner);
    assert_eq!(b.role, P2pRole::Client);
    assert!(a.connected && a.group_formed && a.is_consistent());
    assert!(b.connected && b.group_formed && b.is_consistent());
    assert_eq!(b.state, P2pState::Connected);
    assert!(pair.a.link.is_operational());

    // Assert: addressing.
    assert_eq!(pair.net.static_address("node-a"), Some(Ipv4Addr::LOCALHOST));
    assert_eq!(
        pair.net.leased_address("node-b"),
        Some(Ipv4Addr::new(192, 168, 7, 10))
    );

    // Assert: the client's echo run finishes with every datagram accounted for.
    let finished = eventually(Duration::from_secs(10), || {
        pair.b.echo.stats().packets_sent == 5 && !pair.b.echo.is_running()
    })
    .await;
    assert!(finished, "echo client did not finish");
    let client = pair.b.echo.stats();
    assert_eq!(client.packets_received + client.packets_lost, 5);
    assert_eq!(client.packets_received, 5, "loopback must not lose datagrams");
    assert!(client.rtt_min_us <= client.rtt_max_us);

    let server = pair.a.echo.stats();
    assert!(pair.a.echo.is_running());
    assert_eq!(server.packets_received, 5);
    assert_eq!(server.bytes_sent, 5 * 64);
}

#[tokio::test]
async fn test_pair_button_after_connect_reports_stats() {
    // Arrange
    let pair = two_nodes(15, 0, 2);
    let (a, b) = tokio::join!(pair.a.node.pair(), pair.b.node.pair());
    a.unwrap();
    b.unwrap();

    // Act
    let outcome = pair.b.node.handle_command(NodeCommand::Pair).await.unwrap();

    // Assert
    assert!(matches!(outcome, CommandOutcome::Stats(_)));
    assert!(!pair.b.node.status().pairing_in_flight);
}

// ── Teardown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_client_leaving_stops_owner_echo_server() {
    // Arrange
    let pair = two_nodes(15, 0, 2);
    let (a, b) = tokio::join!(pair.a.node.pair(), pair.b.node.pair());
    a.unwrap();
    b.unwrap();
    assert!(pair.a.echo.is_running());

    // Act
    pair.b
        .node
        .handle_command(NodeCommand::Leave)
        .await
        .unwrap();

    // Assert
    assert_eq!(pair.b.node.status().session.state, P2pState::Idle);
    let stopped = eventually(Duration::from_secs(3), || !pair.a.echo.is_running()).await;
    assert!(stopped, "owner echo server still running after the client left");
    let owner = pair.a.node.status().session;
    assert!(!owner.connected);
    assert_eq!(owner.peer(), None);
}

#[tokio::test]
async fn test_owner_leaving_disconnects_client() {
    let pair = two_nodes(15, 0, 2);
    let (a, b) = tokio::join!(pair.a.node.pair(), pair.b.node.pair());
    a.unwrap();
    b.unwrap();

    pair.a.node.handle_command(NodeCommand::Leave).await.unwrap();

    let idle = eventually(Duration::from_secs(3), || {
        pair.b.node.status().session.state == P2pState::Idle
    })
    .await;
    assert!(idle);
    assert!(!pair.net.is_leasing());
    assert_eq!(pair.b.node.status().session.role, P2pRole::Undetermined);
}

/// The owner leaves while the client is still inside its connect delay:
/// the client must never start sending.
#[tokio::test]
async fn test_owner_leaving_before_client_echo_starts_cancels_it() {
    // Arrange
    let delay = Duration::from_millis(800);
    let pair = two_nodes_with(15, 0, 0, |cfg| cfg.client_connect_delay = delay);
    let (a, b) = tokio::join!(pair.a.node.pair(), pair.b.node.pair());
    assert_eq!(a.unwrap(), PairingOutcome::GroupOwner);
    assert_eq!(b.unwrap(), PairingOutcome::Client);

    // Act
    pair.a.node.handle_command(NodeCommand::Leave).await.unwrap();
    let idle = eventually(Duration::from_secs(3), || {
        pair.b.node.status().session.state == P2pState::Idle
    })
    .await;
    assert!(idle);
    tokio::time::sleep(delay + Duration::from_millis(300)).await;

    // Assert
    assert!(!pair.b.echo.is_running());
    assert_eq!(pair.b.echo.stats().packets_sent, 0);
}

/// After the client leaves, both nodes pair again.  The owner's old role
/// must not survive into the new attempt.
#[tokio::test]
async fn test_nodes_pair_again_after_client_left() {
    // Arrange: first round, then B leaves.
    let pair = two_nodes(7, 0, 1);
    let (a, b) = tokio::join!(pair.a.node.pair(), pair.b.node.pair());
    assert_eq!(a.unwrap(), PairingOutcome::GroupOwner);
    b.unwrap();
    pair.b.node.handle_command(NodeCommand::Leave).await.unwrap();
    let left = eventually(Duration::from_secs(3), || !pair.a.node.status().session.connected).await;
    assert!(left);
    assert_eq!(pair.a.node.status().session.role, P2pRole::GroupOwner);

    // Act
    let (a, during, b) = tokio::join!(
        pair.a.node.pair(),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pair.a.node.status().session
        },
        pair.b.node.pair()
    );

    // Assert: mid-discovery, with the old role already gone.
    assert!(matches!(during.state, P2pState::Finding | P2pState::Found));
    assert_eq!(during.role, P2pRole::Undetermined);
    assert!(during.is_consistent());
    assert_eq!(a.unwrap(), PairingOutcome::GroupOwner);
    assert_eq!(b.unwrap(), PairingOutcome::Client);
    assert!(pair.a.node.status().session.is_consistent());
}

#[tokio::test]
async fn test_stop_command_ends_unbounded_echo_run() {
    // Arrange
    let pair = two_nodes(15, 0, 0);
    let (a, b) = tokio::join!(pair.a.node.pair(), pair.b.node.pair());
    a.unwrap();
    b.unwrap();
    let sending = eventually(Duration::from_secs(5), || {
        pair.b.echo.stats().packets_sent >= 3
    })
    .await;
    assert!(sending);

    // Act
    let outcome = pair
        .b
        .node
        .handle_command(NodeCommand::StopEcho)
        .await
        .unwrap();

    // Assert
    let CommandOutcome::EchoStopped(Some(stats)) = outcome else {
        panic!("expected final statistics, got {outcome:?}");
    };
    assert!(stats.packets_sent >= 3);
    assert_eq!(stats.packets_received + stats.packets_lost, stats.packets_sent);
    assert!(!pair.b.echo.is_running());
}

// ── Edge cases ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_lonely_node_finds_no_peers() {
    let air = Arc::new(SimulatedAir::new());
    let net = SimulatedIpNetwork::new();
    let alone = spawn_node(
        &air,
        &net,
        DiscoveredPeer::new(MAC_A, "node-a", -40),
        fast_pairing(15, "p2p-a"),
        fast_echo(free_port(), 1),
    );

    let outcome = alone.node.pair().await.unwrap();

    assert_eq!(outcome, PairingOutcome::NoPeers);
    assert!(!alone.node.status().pairing_in_flight);
}

#[tokio::test]
async fn test_equal_intents_resolve_by_mac() {
    let pair = two_nodes(15, 15, 1);

    let (a, b) = tokio::join!(pair.a.node.pair(), pair.b.node.pair());

    // MAC_B > MAC_A, so B owns the group.
    assert_eq!(a.unwrap(), PairingOutcome::Client);
    assert_eq!(b.unwrap(), PairingOutcome::GroupOwner);
}
