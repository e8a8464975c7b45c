//! In-process radio medium.
//!
//! Every [`SimulatedRadio`] registered on the same [`SimulatedAir`] can see
//! the others.  Discovery reports all other devices; a connect becomes a
//! group once both sides have asked to connect to each other.
//!
//! Group owner selection follows the real negotiation: the higher intent
//! wins, and on equal intent the higher MAC address wins.  The client is
//! told about one failed connect attempt before the successful one, the way
//! a real WPS exchange reports a failure mid-negotiation.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use p2p_core::{DiscoveredPeer, GoIntent, MacAddress};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::ports::{RadioError, RadioManager, RadioNotification};

/// Notification queue depth per device.
const NOTIFICATION_QUEUE: usize = 64;

/// Status code of the transient failure reported to the client.
const TRANSIENT_FAILURE: i32 = -1;

struct Device {
    peer: DiscoveredPeer,
    tx: mpsc::Sender<RadioNotification>,
    discovering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingConnect {
    from: MacAddress,
    to: MacAddress,
    intent: GoIntent,
}

/// A formed group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimGroup {
    pub owner: MacAddress,
    pub client: MacAddress,
}

#[derive(Default)]
struct AirState {
    devices: Vec<Device>,
    pending: Vec<PendingConnect>,
    groups: Vec<SimGroup>,
}

impl AirState {
    fn device(&self, mac: MacAddress) -> Option<&Device> {
        self.devices.iter().find(|d| d.peer.mac == mac)
    }

    fn device_mut(&mut self, mac: MacAddress) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.peer.mac == mac)
    }

    fn notify(&self, mac: MacAddress, notification: RadioNotification) {
        let Some(device) = self.device(mac) else {
            return;
        };
        if let Err(e) = device.tx.try_send(notification) {
            warn!("dropping notification for {mac}: {e}");
        }
    }
}

/// Shared medium for simulated radios.
#[derive(Default)]
pub struct SimulatedAir {
    state: Mutex<AirState>,
}

impl SimulatedAir {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AirState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a device and returns its notification stream.
    pub fn register(&self, peer: DiscoveredPeer) -> mpsc::Receiver<RadioNotification> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
        let mut state = self.lock();
        state.devices.retain(|d| d.peer.mac != peer.mac);
        debug!("device {} ({}) joined the air", peer.name, peer.mac);
        state.devices.push(Device {
            peer,
            tx,
            discovering: false,
        });
        rx
    }

    /// Groups formed so far and not yet removed.
    pub fn groups(&self) -> Vec<SimGroup> {
        self.lock().groups.clone()
    }

    fn start_discovery(&self, mac: MacAddress) -> Result<(), RadioError> {
        let mut state = self.lock();
        let device = state.device_mut(mac).ok_or(RadioError::NoInterface)?;
        device.discovering = true;
        let me = device.peer.clone();

        let others: Vec<(DiscoveredPeer, bool)> = state
            .devices
            .iter()
            .filter(|d| d.peer.mac != mac)
            .map(|d| (d.peer.clone(), d.discovering))
            .collect();
        for (other, other_discovering) in others {
            state.notify(mac, RadioNotification::DeviceFound(other.clone()));
            if other_discovering {
                state.notify(other.mac, RadioNotification::DeviceFound(me.clone()));
            }
        }
        Ok(())
    }

    fn stop_discovery(&self, mac: MacAddress) -> Result<(), RadioError> {
        let mut state = self.lock();
        let device = state.device_mut(mac).ok_or(RadioError::NoInterface)?;
        device.discovering = false;
        Ok(())
    }

    fn discovered_peers(&self, mac: MacAddress, max: usize) -> Result<Vec<DiscoveredPeer>, RadioError> {
        let state = self.lock();
        state.device(mac).ok_or(RadioError::NoInterface)?;
        Ok(state
            .devices
            .iter()
            .filter(|d| d.peer.mac != mac)
            .take(max)
            .map(|d| d.peer.clone())
            .collect())
    }

    fn connect(&self, from: MacAddress, to: MacAddress, intent: GoIntent) -> Result<(), RadioError> {
        let mut state = self.lock();
        state.device(from).ok_or(RadioError::NoInterface)?;
        if state.device(to).is_none() {
            return Err(RadioError::Unavailable(format!("peer {to} out of range")));
        }

        state.pending.retain(|p| p.from != from);
        state.notify(to, RadioNotification::NegotiationRequest { mac: from });

        let counterpart = state
            .pending
            .iter()
            .position(|p| p.from == to && p.to == from);
        let Some(index) = counterpart else {
            debug!("{from} waiting for {to} to answer negotiation");
            state.pending.push(PendingConnect { from, to, intent });
            return Ok(());
        };
        let theirs = state.pending.remove(index);

        let (owner, client) = if (intent, from) > (theirs.intent, to) {
            (from, to)
        } else {
            (to, from)
        };
        info!("negotiation {from} <-> {to}: {owner} is group owner");

        state.notify(owner, RadioNotification::ApEnableResult { status: 0 });
        state.notify(client, RadioNotification::ConnectResult { status: TRANSIENT_FAILURE });
        state.notify(owner, RadioNotification::ConnectResult { status: 0 });
        state.notify(client, RadioNotification::ConnectResult { status: 0 });
        state.notify(owner, RadioNotification::ApStaConnected { mac: client });
        state.groups.push(SimGroup { owner, client });
        Ok(())
    }

    fn remove_group(&self, mac: MacAddress) -> Result<(), RadioError> {
        let mut state = self.lock();
        state.device(mac).ok_or(RadioError::NoInterface)?;
        state.pending.retain(|p| p.from != mac);

        let Some(index) = state
            .groups
            .iter()
            .position(|g| g.owner == mac || g.client == mac)
        else {
            debug!("{mac} is not in a group");
            return Ok(());
        };
        let group = state.groups.remove(index);
        if group.owner == mac {
            state.notify(group.client, RadioNotification::Disconnected);
        } else {
            state.notify(group.owner, RadioNotification::ApStaDisconnected { mac });
        }
        info!("group {} / {} removed by {mac}", group.owner, group.client);
        Ok(())
    }
}

/// A [`RadioManager`] backed by a [`SimulatedAir`].
pub struct SimulatedRadio {
    air: std::sync::Arc<SimulatedAir>,
    mac: MacAddress,
}

impl SimulatedRadio {
    pub fn new(air: std::sync::Arc<SimulatedAir>, mac: MacAddress) -> Self {
        Self { air, mac }
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }
}

#[async_trait]
impl RadioManager for SimulatedRadio {
    async fn start_discovery(&self, timeout: Duration) -> Result<(), RadioError> {
        debug!("{} discovering for up to {timeout:?}", self.mac);
        self.air.start_discovery(self.mac)
    }

    async fn stop_discovery(&self) -> Result<(), RadioError> {
        self.air.stop_discovery(self.mac)
    }

    async fn connect(
        &self,
        peer: MacAddress,
        intent: GoIntent,
        frequency: u32,
    ) -> Result<(), RadioError> {
        debug!("{} connecting to {peer} (intent {intent}, {frequency} MHz)", self.mac);
        self.air.connect(self.mac, peer, intent)
    }

    async fn discovered_peers(&self, max: usize) -> Result<Vec<DiscoveredPeer>, RadioError> {
        self.air.discovered_peers(self.mac, max)
    }

    async fn remove_group(&self) -> Result<(), RadioError> {
        self.air.remove_group(self.mac)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn mac(last: u8) -> MacAddress {
        MacAddress([0x02, 0, 0, 0, 0, last])
    }

    fn intent(v: u8) -> GoIntent {
        GoIntent::new(v).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<RadioNotification>) -> Vec<RadioNotification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn pair_of_radios() -> (
        Arc<SimulatedAir>,
        (SimulatedRadio, mpsc::Receiver<RadioNotification>),
        (SimulatedRadio, mpsc::Receiver<RadioNotification>),
    ) {
        let air = Arc::new(SimulatedAir::new());
        let rx_a = air.register(DiscoveredPeer::new(mac(1), "node-a", -40));
        let rx_b = air.register(DiscoveredPeer::new(mac(2), "node-b", -55));
        (
            air.clone(),
            (SimulatedRadio::new(air.clone(), mac(1)), rx_a),
            (SimulatedRadio::new(air, mac(2)), rx_b),
        )
    }

    #[tokio::test]
    async fn test_discovery_reports_other_devices_to_both_discoverers() {
        // Arrange
        let (_air, (a, mut rx_a), (b, mut rx_b)) = pair_of_radios();

        // Act
        a.start_discovery(Duration::from_secs(30)).await.unwrap();
        b.start_discovery(Duration::from_secs(30)).await.unwrap();

        // Assert
        let seen_by_a = drain(&mut rx_a);
        let seen_by_b = drain(&mut rx_b);
        assert_eq!(seen_by_a.len(), 2, "a sees b when starting and when b starts");
        assert!(matches!(&seen_by_b[0], RadioNotification::DeviceFound(p) if p.mac == mac(1)));
        assert_eq!(a.discovered_peers(10).await.unwrap()[0].mac, mac(2));
    }

    #[tokio::test]
    async fn test_higher_intent_becomes_group_owner() {
        // Arrange
        let (air, (a, mut rx_a), (b, mut rx_b)) = pair_of_radios();

        // Act
        b.connect(mac(1), intent(15), 2437).await.unwrap();
        a.connect(mac(2), intent(0), 2437).await.unwrap();

        // Assert
        assert_eq!(air.groups(), vec![SimGroup { owner: mac(2), client: mac(1) }]);
        let to_client = drain(&mut rx_a);
        assert_eq!(
            to_client,
            vec![
                RadioNotification::NegotiationRequest { mac: mac(2) },
                RadioNotification::ConnectResult { status: TRANSIENT_FAILURE },
                RadioNotification::ConnectResult { status: 0 },
            ]
        );
        let to_owner = drain(&mut rx_b);
        assert_eq!(
            to_owner,
            vec![
                RadioNotification::NegotiationRequest { mac: mac(1) },
                RadioNotification::ApEnableResult { status: 0 },
                RadioNotification::ConnectResult { status: 0 },
                RadioNotification::ApStaConnected { mac: mac(1) },
            ]
        );
    }

    #[tokio::test]
    async fn test_equal_intent_is_broken_by_higher_mac() {
        let (air, (a, _rx_a), (b, _rx_b)) = pair_of_radios();

        a.connect(mac(2), intent(7), 0).await.unwrap();
        b.connect(mac(1), intent(7), 0).await.unwrap();

        assert_eq!(air.groups()[0].owner, mac(2));
    }

    #[tokio::test]
    async fn test_one_sided_connect_forms_no_group() {
        let (air, (a, _rx_a), (_b, mut rx_b)) = pair_of_radios();

        a.connect(mac(2), intent(15), 0).await.unwrap();

        assert!(air.groups().is_empty());
        assert_eq!(
            drain(&mut rx_b),
            vec![RadioNotification::NegotiationRequest { mac: mac(1) }]
        );
    }

    #[tokio::test]
    async fn test_connect_to_unknown_peer_is_rejected() {
        let (_air, (a, _rx_a), _b) = pair_of_radios();

        let err = a.connect(mac(9), intent(15), 0).await.unwrap_err();

        assert!(matches!(err, RadioError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_remove_group_notifies_the_other_side() {
        // Arrange
        let (air, (a, mut rx_a), (b, mut rx_b)) = pair_of_radios();
        a.connect(mac(2), intent(15), 0).await.unwrap();
        b.connect(mac(1), intent(0), 0).await.unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        // Act: the client leaves.
        b.remove_group().await.unwrap();

        // Assert
        assert!(air.groups().is_empty());
        assert_eq!(
            drain(&mut rx_a),
            vec![RadioNotification::ApStaDisconnected { mac: mac(2) }]
        );
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_radio_has_no_interface() {
        let air = Arc::new(SimulatedAir::new());
        let radio = SimulatedRadio::new(air, mac(5));

        let err = radio.start_discovery(Duration::from_secs(1)).await.unwrap_err();

        assert_eq!(err, RadioError::NoInterface);
    }
}
