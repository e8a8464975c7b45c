//! Simulated IPv4 configuration shared by all nodes of a simulation.
//!
//! The group owner assigns itself a static address and opens an address
//! pool; a client's dynamic-address request is served from that pool.  A
//! request made before the pool exists is parked and served the moment the
//! pool opens, which is how a real client keeps retrying until the group
//! owner's server answers.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::application::ports::{NetConfigError, NetworkConfigurator};

#[derive(Debug)]
struct Pool {
    owner: String,
    next: Ipv4Addr,
}

#[derive(Default)]
struct IpState {
    pool: Option<Pool>,
    static_addrs: HashMap<String, (Ipv4Addr, Ipv4Addr)>,
    leases: HashMap<String, Ipv4Addr>,
    parked: Vec<String>,
    waiters: HashMap<String, Vec<oneshot::Sender<Ipv4Addr>>>,
}

impl IpState {
    fn lease(&mut self, node: &str) -> Option<Ipv4Addr> {
        if let Some(addr) = self.leases.get(node) {
            return Some(*addr);
        }
        let pool = self.pool.as_mut()?;
        let addr = pool.next;
        pool.next = Ipv4Addr::from(u32::from(addr).wrapping_add(1));
        self.leases.insert(node.to_string(), addr);
        info!("leased {addr} to {node}");
        Some(addr)
    }

    fn bind(&mut self, node: &str) {
        let Some(addr) = self.lease(node) else {
            debug!("{node} parked until an address pool opens");
            if !self.parked.iter().any(|n| n == node) {
                self.parked.push(node.to_string());
            }
            return;
        };
        for waiter in self.waiters.remove(node).unwrap_or_default() {
            // A dropped receiver means nobody is waiting any more.
            let _ = waiter.send(addr);
        }
    }
}

/// The shared "IP network" of a simulation.
#[derive(Default)]
pub struct SimulatedIpNetwork {
    state: Mutex<IpState>,
}

impl SimulatedIpNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, IpState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configurator for one node.
    pub fn endpoint(self: &Arc<Self>, node: impl Into<String>) -> SimulatedNetConfig {
        SimulatedNetConfig {
            network: Arc::clone(self),
            node: node.into(),
        }
    }

    /// Static address assigned to `node`, if any.
    pub fn static_address(&self, node: &str) -> Option<Ipv4Addr> {
        self.lock().static_addrs.get(node).map(|(addr, _)| *addr)
    }

    /// Address leased to `node`, if any.
    pub fn leased_address(&self, node: &str) -> Option<Ipv4Addr> {
        self.lock().leases.get(node).copied()
    }

    pub fn is_leasing(&self) -> bool {
        self.lock().pool.is_some()
    }
}

/// [`NetworkConfigurator`] for one node of a [`SimulatedIpNetwork`].
pub struct SimulatedNetConfig {
    network: Arc<SimulatedIpNetwork>,
    node: String,
}

impl NetworkConfigurator for SimulatedNetConfig {
    fn assign_static_address(
        &self,
        iface: &str,
        addr: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), NetConfigError> {
        if iface.is_empty() {
            return Err(NetConfigError::UnknownInterface(iface.to_string()));
        }
        info!("{}: {iface} static {addr}/{netmask}", self.node);
        self.network
            .lock()
            .static_addrs
            .insert(self.node.clone(), (addr, netmask));
        Ok(())
    }

    fn start_address_leasing(&self, iface: &str, pool_start: Ipv4Addr) -> Result<(), NetConfigError> {
        let mut state = self.network.lock();
        if state.pool.is_some() {
            debug!("{}: address pool already running on {iface}", self.node);
            return Ok(());
        }
        info!("{}: address pool on {iface} from {pool_start}", self.node);
        state.pool = Some(Pool {
            owner: self.node.clone(),
            next: pool_start,
        });
        for node in std::mem::take(&mut state.parked) {
            state.bind(&node);
        }
        Ok(())
    }

    fn stop_address_leasing(&self, iface: &str) -> Result<(), NetConfigError> {
        let mut state = self.network.lock();
        if state.pool.as_ref().is_some_and(|p| p.owner == self.node) {
            info!("{}: address pool on {iface} stopped", self.node);
            state.pool = None;
            state.leases.clear();
        }
        Ok(())
    }

    fn register_address_bound(&self, _iface: &str) -> oneshot::Receiver<Ipv4Addr> {
        let (tx, rx) = oneshot::channel();
        self.network
            .lock()
            .waiters
            .entry(self.node.clone())
            .or_default()
            .push(tx);
        rx
    }

    fn request_dynamic_address(&self, iface: &str) -> Result<(), NetConfigError> {
        if iface.is_empty() {
            return Err(NetConfigError::UnknownInterface(iface.to_string()));
        }
        self.network.lock().bind(&self.node);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
