//! Simulated radio, link, and IP adapters.
//!
//! There is no portable Rust API for driving a Wi-Fi Direct radio, so the
//! node ships with an in-process simulation of one.  It is used by the
//! binary's demo mode and by the end-to-end tests; a driver-backed adapter
//! only has to implement the same ports.
//!
//! ```text
//!  SimulatedAir ──── SimulatedRadio (node A)
//!       │       └─── SimulatedRadio (node B)
//!  SimulatedIpNetwork ── endpoint("A"), endpoint("B")
//!  SimulatedLink (one per node)
//! ```
//!
//! The echo engine is *not* simulated: it uses real UDP sockets, so on a
//! simulated link point `go_address` at loopback.

pub mod air;
pub mod ip;
pub mod link;

use std::sync::Arc;

use p2p_core::DiscoveredPeer;
use tokio::task::JoinHandle;

pub use air::{SimGroup, SimulatedAir, SimulatedRadio};
pub use ip::{SimulatedIpNetwork, SimulatedNetConfig};
pub use link::SimulatedLink;

use crate::application::node::P2pNode;
use crate::application::orchestrator::{PairingConfig, PairingPorts};
use crate::infrastructure::echo::{EchoController, EchoSettings};

/// A node wired to the simulation, with its dispatcher running.
pub struct SimulatedNode {
    pub node: Arc<P2pNode>,
    pub link: Arc<SimulatedLink>,
    pub echo: Arc<EchoController>,
    pub dispatcher: JoinHandle<()>,
}

/// Registers `identity` on `air`, builds a node on top of it, and starts the
/// node's dispatcher.  Must be called from within a Tokio runtime.
pub fn spawn_node(
    air: &Arc<SimulatedAir>,
    network: &Arc<SimulatedIpNetwork>,
    identity: DiscoveredPeer,
    config: PairingConfig,
    echo: EchoSettings,
) -> SimulatedNode {
    let mac = identity.mac;
    let endpoint = network.endpoint(identity.name.clone());
    let notifications = air.register(identity);

    let link = Arc::new(SimulatedLink::new());
    let echo = Arc::new(EchoController::new(echo));
    let ports = PairingPorts {
        radio: Arc::new(SimulatedRadio::new(Arc::clone(air), mac)),
        link: link.clone(),
        net: Arc::new(endpoint),
        echo: echo.clone(),
    };

    let node = P2pNode::new(config, ports);
    let dispatcher = node.start(notifications);
    SimulatedNode {
        node,
        link,
        echo,
        dispatcher,
    }
}
